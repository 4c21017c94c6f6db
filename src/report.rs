use std::fmt::Write;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::completion::{self, CompletionReport, TimeToCompletion};
use crate::context::MetricsContext;
use crate::effectiveness::{self, EffectivenessReport};
use crate::overview::{self, PlatformOverview};
use crate::performance::{self, PerformanceReport, PerformanceStatus};
use crate::trends::{self, TrendReport, TrendSeries};

/// Identifies one run. Every artifact written by the run carries the same header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportHeader {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: String,
}

impl ReportHeader {
    pub fn new(source: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at,
            source: source.into(),
        }
    }
}

/// Output of a single calculator, as written by the per-section subcommands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport<T> {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub metrics: T,
}

impl<T> SectionReport<T> {
    pub fn new(header: ReportHeader, metrics: T) -> Self {
        Self { header, metrics }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub overview: PlatformOverview,
    pub completion: CompletionReport,
    pub performance: PerformanceReport,
    pub effectiveness: EffectivenessReport,
    pub trends: TrendReport,
}

/// Runs every calculator over the same context. Calculators do not depend on
/// each other, so order only affects log output.
pub fn assemble(ctx: &MetricsContext<'_>, header: ReportHeader) -> Report {
    let report = Report {
        overview: overview::analyze(ctx),
        completion: completion::analyze(ctx),
        performance: performance::analyze(ctx),
        effectiveness: effectiveness::analyze(ctx),
        trends: trends::analyze(ctx),
        header,
    };
    info!(run_id = %report.header.run_id, "report assembled");
    report
}

/// One output file, rendered in full before anything touches the disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

impl Artifact {
    pub fn json<T: Serialize>(path: impl Into<PathBuf>, value: &T) -> anyhow::Result<Self> {
        let path = path.into();
        let contents = serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to serialize {}", path.display()))?;
        Ok(Self { path, contents })
    }
}

/// Writes the artifacts in order. When one fails, the ones already written
/// are removed so a failed run leaves nothing behind.
pub fn write_artifacts(artifacts: &[Artifact]) -> anyhow::Result<()> {
    for (index, artifact) in artifacts.iter().enumerate() {
        if let Err(err) = fs::write(&artifact.path, &artifact.contents) {
            for written in &artifacts[..index] {
                let _ = fs::remove_file(&written.path);
            }
            return Err(err).with_context(|| format!("failed to write {}", artifact.path.display()));
        }
        info!(path = %artifact.path.display(), "artifact written");
    }
    Ok(())
}

fn render_header(output: &mut String, title: &str, header: &ReportHeader) {
    let _ = writeln!(output, "# {title}");
    let _ = writeln!(
        output,
        "Run {} generated {} from {}",
        header.run_id,
        header.generated_at.format("%Y-%m-%d %H:%M UTC"),
        header.source
    );
}

pub fn render_section<T>(section: &SectionReport<T>, title: &str, body: fn(&mut String, &T)) -> String {
    let mut output = String::new();
    render_header(&mut output, title, &section.header);
    body(&mut output, &section.metrics);
    output
}

pub fn render_report(report: &Report) -> String {
    let mut output = String::new();
    render_header(&mut output, "Platform Analytics Report", &report.header);
    render_overview(&mut output, &report.overview);
    render_completion(&mut output, &report.completion);
    render_performance(&mut output, &report.performance);
    render_effectiveness(&mut output, &report.effectiveness);
    render_trends(&mut output, &report.trends);
    output
}

pub fn render_overview(output: &mut String, overview: &PlatformOverview) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Platform Overview");
    let _ = writeln!(
        output,
        "- Users: {} total, {} active, {} students, {} mentors ({} pending)",
        overview.users.total,
        overview.users.active,
        overview.users.students,
        overview.users.mentors,
        overview.users.pending_mentors
    );
    let _ = writeln!(
        output,
        "- Courses: {} total, {} active",
        overview.courses.total, overview.courses.active
    );
    let _ = writeln!(
        output,
        "- Enrollments: {} total, {} completed ({:.1}%)",
        overview.enrollments.total, overview.enrollments.completed, overview.enrollments.completion_rate
    );
    let _ = writeln!(
        output,
        "- Last {} days: {} registrations, {} enrollments",
        overview.recent_activity.days,
        overview.recent_activity.registrations,
        overview.recent_activity.enrollments
    );
    let _ = writeln!(
        output,
        "- Health: retention {:.1}%, {:.2} enrollments per active course, mentor approval {:.1}%",
        overview.health.retention_rate, overview.health.course_utilization, overview.health.mentor_approval_rate
    );
}

pub fn render_completion(output: &mut String, report: &CompletionReport) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Completion");
    let _ = writeln!(
        output,
        "{} enrollments across {} courses and {} students, {} completed ({:.1}%)",
        report.total_enrollments,
        report.total_courses,
        report.total_students,
        report.completed_enrollments,
        report.overall_completion_rate
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "### By Category");
    if report.by_category.is_empty() {
        let _ = writeln!(output, "No enrollments recorded.");
    } else {
        for group in report.by_category.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1}% of {} enrollments (avg progress {:.1}%)",
                group.key, group.completion_rate, group.enrollments, group.avg_progress
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### By Difficulty");
    for group in report.by_difficulty.iter() {
        let _ = writeln!(
            output,
            "- {}: {:.1}% of {} enrollments",
            group.key, group.completion_rate, group.enrollments
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Time To Completion");
    match &report.time_to_completion {
        TimeToCompletion::NoCompletedEnrollments => {
            let _ = writeln!(output, "No completed enrollments.");
        }
        TimeToCompletion::AllExcluded {
            excluded_outliers,
            missing_completion_date,
        } => {
            let _ = writeln!(
                output,
                "No plausible durations ({excluded_outliers} outliers, {missing_completion_date} without a completion date)."
            );
        }
        TimeToCompletion::Measured(stats) => {
            let _ = writeln!(
                output,
                "Mean {:.1} days, median {:.1} days, range {}-{} days over {} completions",
                stats.mean_days, stats.median_days, stats.min_days, stats.max_days, stats.measured
            );
            if stats.excluded_outliers > 0 {
                let _ = writeln!(output, "Excluded {} implausible durations.", stats.excluded_outliers);
            }
        }
    }

    if !report.popular_courses.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "### Most Popular Courses");
        for course in report.popular_courses.iter() {
            let _ = writeln!(output, "- {}: {} enrollments", course.course_title, course.enrollments);
        }
    }
}

pub fn render_performance(output: &mut String, report: &PerformanceReport) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Performance");

    if report.status == PerformanceStatus::NoGradedSubmissions {
        let _ = writeln!(
            output,
            "No graded submissions among {} records.",
            report.total_records
        );
        return;
    }

    let _ = writeln!(
        output,
        "{} graded submissions from {} students ({:.1}% of records graded)",
        report.graded_submissions, report.total_students, report.graded_share
    );
    let _ = writeln!(
        output,
        "Mean {:.1}, median {:.1}, range {:.1}-{:.1}, late rate {:.1}%",
        report.summary.mean,
        report.summary.median,
        report.summary.min,
        report.summary.max,
        report.late_submission_rate
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "### Grade Distribution");
    for bucket in report.distribution.iter() {
        let _ = writeln!(
            output,
            "- {}: {} ({:.1}%)",
            bucket.label, bucket.count, bucket.percentage
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Top Performers");
    if report.top_performers.is_empty() {
        let _ = writeln!(output, "No students with enough graded submissions.");
    } else {
        for student in report.top_performers.iter() {
            let _ = writeln!(
                output,
                "- {}: avg {:.1} across {} submissions",
                student.student_name, student.mean_grade, student.submissions
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Needs Attention");
    if report.needs_attention.is_empty() {
        let _ = writeln!(output, "No students below the attention threshold.");
    } else {
        for student in report.needs_attention.iter() {
            let _ = writeln!(
                output,
                "- {}: avg {:.1}, late rate {:.1}%",
                student.student_name, student.mean_grade, student.late_rate
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} scores at 90+, {} below {}, {} late submissions",
        report.insights.high_scores,
        report.insights.at_risk_scores,
        report.insights.at_risk_below,
        report.insights.late_submissions
    );
}

pub fn render_effectiveness(output: &mut String, report: &EffectivenessReport) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Mentor Effectiveness");
    let _ = writeln!(
        output,
        "{} mentors teaching {} courses to {} students",
        report.total_mentors, report.total_courses, report.total_students
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "### Most Effective Mentors");
    if report.top_effective.is_empty() {
        let _ = writeln!(output, "No eligible mentors.");
    } else {
        for mentor in report.top_effective.iter() {
            let _ = writeln!(
                output,
                "- {}: score {:.1} ({} courses, completion {:.1}%, rating {:.2})",
                mentor.mentor_name,
                mentor.effectiveness_score,
                mentor.courses,
                mentor.completion_rate,
                mentor.avg_course_rating
            );
        }
    }

    if !report.most_successful_courses.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "### Most Successful Courses");
        for course in report.most_successful_courses.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): success {:.1}",
                course.course_title, course.mentor_name, course.success_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Tiers: {} high performers, {} average, {} need improvement",
        report.tiers.high_performers, report.tiers.average_performers, report.tiers.needs_improvement
    );
    if let Some(expertise) = &report.insights.most_common_expertise {
        let _ = writeln!(output, "Most common expertise: {expertise}");
    }
}

fn render_series(output: &mut String, title: &str, series: &TrendSeries) {
    let _ = writeln!(output);
    let _ = writeln!(output, "### {title}");
    let _ = writeln!(
        output,
        "{} in window, {:.1} per month, {} outside the window",
        series.total, series.average_per_month, series.out_of_window
    );
    match &series.peak {
        Some(peak) => {
            let _ = writeln!(output, "Peak: {} with {}", peak.period, peak.count);
        }
        None => {
            let _ = writeln!(output, "No activity in this window.");
        }
    }
}

pub fn render_trends(output: &mut String, report: &TrendReport) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Growth Trends (last {} months)", report.window_months);
    render_series(output, "Registrations", &report.registrations);
    render_series(output, "Enrollments", &report.enrollments);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{Snapshot, SubmissionFact};
    use chrono::TimeZone;

    fn header() -> ReportHeader {
        ReportHeader::new("csv fixtures", Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap())
    }

    #[test]
    fn empty_snapshot_assembles_without_data() {
        let snapshot = Snapshot::default();
        let config = EngineConfig::default();
        let ctx = MetricsContext::new(&snapshot, &config, Utc::now());
        let report = assemble(&ctx, header());

        assert_eq!(report.completion.overall_completion_rate, 0.0);
        assert_eq!(report.performance.status, PerformanceStatus::NoGradedSubmissions);
        assert!(report.effectiveness.mentors.is_empty());
        assert_eq!(report.trends.registrations.months.len(), 12);

        let summary = render_report(&report);
        assert!(summary.contains("# Platform Analytics Report"));
        assert!(summary.contains("No completed enrollments."));
        assert!(summary.contains("No graded submissions among 0 records."));
        assert!(summary.contains("No eligible mentors."));
    }

    fn graded_row(student_id: i64, grade: f64, is_late: bool) -> SubmissionFact {
        SubmissionFact {
            student_id,
            student_name: format!("Student {student_id}"),
            course_id: 1,
            course_title: "Rust Fundamentals".to_string(),
            category: "Programming".to_string(),
            difficulty_level: "beginner".to_string(),
            enrolled_at: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
            is_completed: false,
            assignment_id: Some(7),
            max_points: Some(100.0),
            grade: Some(grade),
            submitted_at: None,
            is_late,
        }
    }

    #[test]
    fn performance_summary_labels_at_risk_cutoff() {
        let snapshot = Snapshot {
            submissions: vec![
                graded_row(1, 95.0, false),
                graded_row(2, 65.0, true),
                graded_row(3, 55.0, false),
            ],
            ..Default::default()
        };
        let config = EngineConfig::default();
        let ctx = MetricsContext::new(&snapshot, &config, Utc::now());

        let mut output = String::new();
        render_performance(&mut output, &performance::analyze(&ctx));
        assert!(output.contains("1 scores at 90+, 2 below 70, 1 late submissions"));
    }

    #[test]
    fn json_carries_flattened_header() {
        let snapshot = Snapshot::default();
        let config = EngineConfig::default();
        let ctx = MetricsContext::new(&snapshot, &config, Utc::now());
        let section = SectionReport::new(header(), trends::analyze(&ctx));

        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(value["source"], "csv fixtures");
        assert_eq!(value["generated_at"], "2024-06-15T09:30:00Z");
        assert!(value["run_id"].is_string());
        assert_eq!(value["metrics"]["window_months"], 12);
    }

    #[test]
    fn json_artifact_is_pretty_printed() {
        let snapshot = Snapshot::default();
        let config = EngineConfig::default();
        let ctx = MetricsContext::new(&snapshot, &config, Utc::now());
        let section = SectionReport::new(header(), trends::analyze(&ctx));

        let artifact = Artifact::json("trends.json", &section).unwrap();
        assert!(artifact.contents.contains("\n  \"metrics\""));
    }

    #[test]
    fn failed_write_removes_earlier_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("report.json");
        let artifacts = vec![
            Artifact {
                path: json.clone(),
                contents: "{}".to_string(),
            },
            Artifact {
                path: dir.path().join("missing").join("chart.svg"),
                contents: "<svg/>".to_string(),
            },
        ];

        assert!(write_artifacts(&artifacts).is_err());
        assert!(!json.exists());
    }

    #[test]
    fn writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = vec![
            Artifact {
                path: dir.path().join("a.json"),
                contents: "{}".to_string(),
            },
            Artifact {
                path: dir.path().join("b.svg"),
                contents: "<svg/>".to_string(),
            },
        ];

        write_artifacts(&artifacts).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("b.svg")).unwrap(), "<svg/>");
    }

    #[test]
    fn section_summary_starts_with_title() {
        let snapshot = Snapshot::default();
        let config = EngineConfig::default();
        let ctx = MetricsContext::new(&snapshot, &config, Utc::now());
        let section = SectionReport::new(header(), trends::analyze(&ctx));

        let summary = render_section(&section, "Growth Trends", render_trends);
        assert!(summary.starts_with("# Growth Trends\nRun "));
        assert!(summary.contains("generated 2024-06-15 09:30 UTC from csv fixtures"));
    }
}
