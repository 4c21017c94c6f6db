use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::{Thresholds, TopN};
use crate::context::MetricsContext;
use crate::models::SubmissionFact;
use crate::month::YearMonth;
use crate::stats::{self, round2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum GradeBucket {
    F,
    D,
    C,
    B,
    A,
}

impl GradeBucket {
    pub const ALL: [GradeBucket; 5] = [
        GradeBucket::F,
        GradeBucket::D,
        GradeBucket::C,
        GradeBucket::B,
        GradeBucket::A,
    ];

    /// F [0,60) D [60,70) C [70,80) B [80,90) A [90,100]. Scores outside
    /// 0-100 fall into the nearest end bucket.
    pub fn classify(score: f64) -> GradeBucket {
        if score < 60.0 {
            GradeBucket::F
        } else if score < 70.0 {
            GradeBucket::D
        } else if score < 80.0 {
            GradeBucket::C
        } else if score < 90.0 {
            GradeBucket::B
        } else {
            GradeBucket::A
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GradeBucket::F => "F (0-59)",
            GradeBucket::D => "D (60-69)",
            GradeBucket::C => "C (70-79)",
            GradeBucket::B => "B (80-89)",
            GradeBucket::A => "A (90-100)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub bucket: GradeBucket,
    pub label: &'static str,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradeSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAggregate {
    pub course_id: i64,
    pub course_title: String,
    pub category: String,
    pub mean_grade: f64,
    pub median_grade: f64,
    pub std_dev: f64,
    pub submissions: usize,
    pub unique_students: usize,
    pub late_submissions: usize,
    pub late_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAggregate {
    pub student_id: i64,
    pub student_name: String,
    pub mean_grade: f64,
    pub median_grade: f64,
    pub submissions: usize,
    pub courses: usize,
    pub late_submissions: usize,
    pub late_rate: f64,
    pub courses_completed: usize,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPerformance {
    pub key: String,
    pub mean_grade: f64,
    pub late_rate: f64,
    pub submissions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPerformance {
    pub period: YearMonth,
    pub mean_grade: f64,
    pub submissions: usize,
    pub late_rate: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceInsights {
    pub high_scores: usize,
    pub at_risk_scores: usize,
    pub at_risk_below: f64,
    pub late_submissions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Graded,
    NoGradedSubmissions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub status: PerformanceStatus,
    pub total_records: usize,
    pub total_students: usize,
    pub graded_submissions: usize,
    pub graded_share: f64,
    pub summary: GradeSummary,
    pub late_submission_rate: f64,
    pub distribution: Vec<BucketCount>,
    pub by_course: Vec<CourseAggregate>,
    pub top_courses: Vec<CourseAggregate>,
    pub late_courses: Vec<CourseAggregate>,
    pub by_student: Vec<StudentAggregate>,
    pub top_performers: Vec<StudentAggregate>,
    pub needs_attention: Vec<StudentAggregate>,
    pub by_category: Vec<GroupPerformance>,
    pub by_difficulty: Vec<GroupPerformance>,
    pub top_categories: Vec<GroupPerformance>,
    pub insights: PerformanceInsights,
    pub monthly: Vec<MonthlyPerformance>,
}

/// A submission row that carries a grade, with its score already resolved.
#[derive(Debug, Clone, Copy)]
pub struct Graded<'a> {
    pub row: &'a SubmissionFact,
    pub score: f64,
}

pub fn graded(rows: &[SubmissionFact]) -> Vec<Graded<'_>> {
    rows.iter()
        .filter_map(|row| row.score().map(|score| Graded { row, score }))
        .collect()
}

pub fn analyze(ctx: &MetricsContext<'_>) -> PerformanceReport {
    let rows = &ctx.snapshot.submissions;
    let graded = graded(rows);
    let top_n = &ctx.config.top_n;
    let thresholds = &ctx.config.thresholds;

    let scores: Vec<f64> = graded.iter().map(|g| g.score).collect();
    let late = graded.iter().filter(|g| g.row.is_late).count();

    let by_course = course_aggregates(&graded);
    let by_student = student_aggregates(&graded);
    let by_category = group_performance(&graded, |row| row.category.as_str());

    let report = PerformanceReport {
        status: if graded.is_empty() {
            PerformanceStatus::NoGradedSubmissions
        } else {
            PerformanceStatus::Graded
        },
        total_records: rows.len(),
        total_students: rows.iter().map(|r| r.student_id).collect::<HashSet<_>>().len(),
        graded_submissions: graded.len(),
        graded_share: round2(stats::rate(graded.len(), rows.len())),
        summary: grade_summary(&scores),
        late_submission_rate: round2(stats::rate(late, graded.len())),
        distribution: grade_distribution(&scores),
        top_courses: top_courses(&by_course, top_n),
        late_courses: late_courses(&by_course, thresholds, top_n),
        top_performers: top_performers(&by_student, thresholds, top_n),
        needs_attention: needs_attention(&by_student, thresholds, top_n),
        by_difficulty: group_performance(&graded, |row| row.difficulty_level.as_str()),
        top_categories: by_category.iter().take(top_n.categories).cloned().collect(),
        insights: insights(&graded, thresholds),
        monthly: monthly_performance(&graded, top_n.monthly_performance),
        by_course,
        by_student,
        by_category,
    };

    debug!(
        graded = report.graded_submissions,
        mean = report.summary.mean,
        "performance metrics computed"
    );
    report
}

pub fn grade_summary(scores: &[f64]) -> GradeSummary {
    if scores.is_empty() {
        return GradeSummary::default();
    }
    GradeSummary {
        mean: round2(stats::mean(scores)),
        median: round2(stats::median(scores)),
        min: round2(stats::min(scores)),
        max: round2(stats::max(scores)),
    }
}

/// Always five buckets, F first, so an empty set still charts.
pub fn grade_distribution(scores: &[f64]) -> Vec<BucketCount> {
    let mut counts: BTreeMap<GradeBucket, usize> = BTreeMap::new();
    for score in scores {
        *counts.entry(GradeBucket::classify(*score)).or_insert(0) += 1;
    }

    GradeBucket::ALL
        .iter()
        .map(|bucket| {
            let count = counts.get(bucket).copied().unwrap_or(0);
            BucketCount {
                bucket: *bucket,
                label: bucket.label(),
                count,
                percentage: round2(stats::rate(count, scores.len())),
            }
        })
        .collect()
}

/// Highest mean grade first.
pub fn course_aggregates(graded: &[Graded<'_>]) -> Vec<CourseAggregate> {
    let mut groups: BTreeMap<i64, Vec<&Graded<'_>>> = BTreeMap::new();
    for entry in graded {
        groups.entry(entry.row.course_id).or_default().push(entry);
    }

    let mut courses: Vec<CourseAggregate> = groups
        .into_values()
        .filter_map(|entries| {
            let first = entries.first()?.row;
            let scores: Vec<f64> = entries.iter().map(|g| g.score).collect();
            let late = entries.iter().filter(|g| g.row.is_late).count();
            Some(CourseAggregate {
                course_id: first.course_id,
                course_title: first.course_title.clone(),
                category: first.category.clone(),
                mean_grade: round2(stats::mean(&scores)),
                median_grade: round2(stats::median(&scores)),
                std_dev: round2(stats::sample_std_dev(&scores)),
                submissions: entries.len(),
                unique_students: entries
                    .iter()
                    .map(|g| g.row.student_id)
                    .collect::<HashSet<_>>()
                    .len(),
                late_submissions: late,
                late_rate: round2(stats::rate(late, entries.len())),
            })
        })
        .collect();

    courses.sort_by(|a, b| stats::cmp_f64(&b.mean_grade, &a.mean_grade));
    courses
}

/// Highest mean grade first.
pub fn student_aggregates(graded: &[Graded<'_>]) -> Vec<StudentAggregate> {
    let mut groups: BTreeMap<i64, Vec<&Graded<'_>>> = BTreeMap::new();
    for entry in graded {
        groups.entry(entry.row.student_id).or_default().push(entry);
    }

    let mut students: Vec<StudentAggregate> = groups
        .into_values()
        .filter_map(|entries| {
            let first = entries.first()?.row;
            let scores: Vec<f64> = entries.iter().map(|g| g.score).collect();
            let late = entries.iter().filter(|g| g.row.is_late).count();
            let courses: HashSet<i64> = entries.iter().map(|g| g.row.course_id).collect();
            let completed: HashSet<i64> = entries
                .iter()
                .filter(|g| g.row.is_completed)
                .map(|g| g.row.course_id)
                .collect();
            Some(StudentAggregate {
                student_id: first.student_id,
                student_name: first.student_name.clone(),
                mean_grade: round2(stats::mean(&scores)),
                median_grade: round2(stats::median(&scores)),
                submissions: entries.len(),
                courses: courses.len(),
                late_submissions: late,
                late_rate: round2(stats::rate(late, entries.len())),
                courses_completed: completed.len(),
                completion_rate: round2(stats::rate(completed.len(), courses.len())),
            })
        })
        .collect();

    students.sort_by(|a, b| stats::cmp_f64(&b.mean_grade, &a.mean_grade));
    students
}

pub fn top_courses(by_course: &[CourseAggregate], top_n: &TopN) -> Vec<CourseAggregate> {
    by_course.iter().take(top_n.courses).cloned().collect()
}

pub fn late_courses(
    by_course: &[CourseAggregate],
    thresholds: &Thresholds,
    top_n: &TopN,
) -> Vec<CourseAggregate> {
    let mut eligible: Vec<CourseAggregate> = by_course
        .iter()
        .filter(|c| c.submissions >= thresholds.late_rank_min_submissions)
        .cloned()
        .collect();
    eligible.sort_by(|a, b| stats::cmp_f64(&b.late_rate, &a.late_rate));
    eligible.truncate(top_n.late_courses);
    eligible
}

pub fn top_performers(
    by_student: &[StudentAggregate],
    thresholds: &Thresholds,
    top_n: &TopN,
) -> Vec<StudentAggregate> {
    let mut eligible: Vec<StudentAggregate> = by_student
        .iter()
        .filter(|s| s.submissions >= thresholds.top_performer_min_submissions)
        .cloned()
        .collect();
    eligible.sort_by(|a, b| stats::cmp_f64(&b.mean_grade, &a.mean_grade));
    eligible.truncate(top_n.students);
    eligible
}

/// Lowest mean grade first.
pub fn needs_attention(
    by_student: &[StudentAggregate],
    thresholds: &Thresholds,
    top_n: &TopN,
) -> Vec<StudentAggregate> {
    let mut eligible: Vec<StudentAggregate> = by_student
        .iter()
        .filter(|s| {
            s.submissions >= thresholds.attention_min_submissions
                && s.mean_grade < thresholds.attention_grade_below
        })
        .cloned()
        .collect();
    eligible.sort_by(|a, b| stats::cmp_f64(&a.mean_grade, &b.mean_grade));
    eligible.truncate(top_n.attention);
    eligible
}

/// Highest mean grade first.
pub fn group_performance<F>(graded: &[Graded<'_>], key: F) -> Vec<GroupPerformance>
where
    F: Fn(&SubmissionFact) -> &str,
{
    let mut groups: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();
    for entry in graded {
        let group = groups.entry(key(entry.row)).or_default();
        group.0.push(entry.score);
        if entry.row.is_late {
            group.1 += 1;
        }
    }

    let mut values: Vec<GroupPerformance> = groups
        .into_iter()
        .map(|(key, (scores, late))| GroupPerformance {
            key: key.to_string(),
            mean_grade: round2(stats::mean(&scores)),
            late_rate: round2(stats::rate(late, scores.len())),
            submissions: scores.len(),
        })
        .collect();
    values.sort_by(|a, b| stats::cmp_f64(&b.mean_grade, &a.mean_grade));
    values
}

/// Scores of 90 and up count as high; scores under the attention grade count
/// as at risk.
pub fn insights(graded: &[Graded<'_>], thresholds: &Thresholds) -> PerformanceInsights {
    let at_risk_below = thresholds.attention_grade_below;
    PerformanceInsights {
        high_scores: graded.iter().filter(|g| g.score >= 90.0).count(),
        at_risk_scores: graded.iter().filter(|g| g.score < at_risk_below).count(),
        at_risk_below,
        late_submissions: graded.iter().filter(|g| g.row.is_late).count(),
    }
}

/// Graded work grouped by the month the student enrolled, keeping the most
/// recent `keep` months in chronological order.
pub fn monthly_performance(graded: &[Graded<'_>], keep: usize) -> Vec<MonthlyPerformance> {
    let mut groups: BTreeMap<YearMonth, Vec<&Graded<'_>>> = BTreeMap::new();
    for entry in graded {
        groups
            .entry(YearMonth::of(&entry.row.enrolled_at))
            .or_default()
            .push(entry);
    }

    let months: Vec<MonthlyPerformance> = groups
        .into_iter()
        .map(|(period, entries)| {
            let scores: Vec<f64> = entries.iter().map(|g| g.score).collect();
            let late = entries.iter().filter(|g| g.row.is_late).count();
            let completed = entries.iter().filter(|g| g.row.is_completed).count();
            MonthlyPerformance {
                period,
                mean_grade: round2(stats::mean(&scores)),
                submissions: entries.len(),
                late_rate: round2(stats::rate(late, entries.len())),
                completion_rate: round2(stats::rate(completed, entries.len())),
            }
        })
        .collect();

    let skip = months.len().saturating_sub(keep);
    months.into_iter().skip(skip).collect()
}
