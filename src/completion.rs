use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::OutlierBounds;
use crate::context::MetricsContext;
use crate::models::EnrollmentFact;
use crate::stats::{self, round2};

const SECONDS_PER_DAY: i64 = 86_400;
const PROGRESS_BINS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCompletion {
    pub key: String,
    pub enrollments: usize,
    pub completed: usize,
    pub completion_rate: f64,
    pub avg_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDuration {
    pub category: String,
    pub mean_days: f64,
    pub median_days: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionTimeStats {
    pub measured: usize,
    pub excluded_outliers: usize,
    pub missing_completion_date: usize,
    pub mean_days: f64,
    pub median_days: f64,
    pub min_days: i64,
    pub max_days: i64,
    pub by_category: Vec<CategoryDuration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimeToCompletion {
    NoCompletedEnrollments,
    AllExcluded {
        excluded_outliers: usize,
        missing_completion_date: usize,
    },
    Measured(CompletionTimeStats),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseEnrollment {
    pub course_id: i64,
    pub course_title: String,
    pub enrollments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionReport {
    pub total_enrollments: usize,
    pub completed_enrollments: usize,
    pub total_courses: usize,
    pub total_students: usize,
    pub overall_completion_rate: f64,
    pub by_category: Vec<GroupCompletion>,
    pub by_difficulty: Vec<GroupCompletion>,
    pub top_categories: Vec<GroupCompletion>,
    pub popular_courses: Vec<CourseEnrollment>,
    pub progress_histogram: Vec<ProgressBin>,
    pub time_to_completion: TimeToCompletion,
}

/// A completed enrollment's duration, tagged with its category.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionDuration {
    pub category: String,
    pub days: i64,
}

pub fn analyze(ctx: &MetricsContext<'_>) -> CompletionReport {
    let enrollments = &ctx.snapshot.enrollments;
    let by_category = completion_by(enrollments, |e| e.category.as_str());
    let by_difficulty = completion_by(enrollments, |e| e.difficulty_level.as_str());
    let top_categories = by_category
        .iter()
        .take(ctx.config.top_n.categories)
        .cloned()
        .collect();

    let report = CompletionReport {
        total_enrollments: enrollments.len(),
        completed_enrollments: enrollments.iter().filter(|e| e.is_completed).count(),
        total_courses: distinct(enrollments.iter().map(|e| e.course_id)),
        total_students: distinct(enrollments.iter().map(|e| e.student_id)),
        overall_completion_rate: overall_completion_rate(enrollments),
        by_category,
        by_difficulty,
        top_categories,
        popular_courses: popular_courses(enrollments, ctx.config.top_n.popular_courses),
        progress_histogram: progress_histogram(enrollments),
        time_to_completion: time_to_completion(enrollments, ctx.config.outliers),
    };

    debug!(
        enrollments = report.total_enrollments,
        rate = report.overall_completion_rate,
        "completion metrics computed"
    );
    report
}

pub fn overall_completion_rate(enrollments: &[EnrollmentFact]) -> f64 {
    let completed = enrollments.iter().filter(|e| e.is_completed).count();
    round2(stats::rate(completed, enrollments.len()))
}

/// Groups enrollments by `key`, highest completion rate first.
pub fn completion_by<F>(enrollments: &[EnrollmentFact], key: F) -> Vec<GroupCompletion>
where
    F: Fn(&EnrollmentFact) -> &str,
{
    let mut groups: BTreeMap<&str, (usize, usize, f64)> = BTreeMap::new();
    for enrollment in enrollments {
        let entry = groups.entry(key(enrollment)).or_insert((0, 0, 0.0));
        entry.0 += 1;
        if enrollment.is_completed {
            entry.1 += 1;
        }
        entry.2 += enrollment.completion_percentage;
    }

    let mut values: Vec<GroupCompletion> = groups
        .into_iter()
        .map(|(key, (count, completed, progress))| GroupCompletion {
            key: key.to_string(),
            enrollments: count,
            completed,
            completion_rate: round2(stats::rate(completed, count)),
            avg_progress: round2(progress / count as f64),
        })
        .collect();

    values.sort_by(|a, b| stats::cmp_f64(&b.completion_rate, &a.completion_rate));
    values
}

/// Whole days from enrollment to completion, floored so that a completion a
/// few hours before enrollment counts as a negative duration.
pub fn completion_days(enrollment: &EnrollmentFact) -> Option<i64> {
    let completed_at = enrollment.completed_at?;
    let elapsed = completed_at - enrollment.enrolled_at;
    Some(elapsed.num_seconds().div_euclid(SECONDS_PER_DAY))
}

pub fn plausible_durations(
    durations: &[CompletionDuration],
    bounds: OutlierBounds,
) -> Vec<CompletionDuration> {
    durations
        .iter()
        .filter(|d| bounds.contains(d.days))
        .cloned()
        .collect()
}

pub fn time_to_completion(enrollments: &[EnrollmentFact], bounds: OutlierBounds) -> TimeToCompletion {
    let completed: Vec<&EnrollmentFact> = enrollments.iter().filter(|e| e.is_completed).collect();
    if completed.is_empty() {
        return TimeToCompletion::NoCompletedEnrollments;
    }

    let durations: Vec<CompletionDuration> = completed
        .iter()
        .filter_map(|e| {
            completion_days(e).map(|days| CompletionDuration {
                category: e.category.clone(),
                days,
            })
        })
        .collect();
    let missing_completion_date = completed.len() - durations.len();
    let kept = plausible_durations(&durations, bounds);
    let excluded_outliers = durations.len() - kept.len();

    if excluded_outliers > 0 {
        debug!(excluded_outliers, "dropped implausible completion durations");
    }

    if kept.is_empty() {
        return TimeToCompletion::AllExcluded {
            excluded_outliers,
            missing_completion_date,
        };
    }

    let days: Vec<f64> = kept.iter().map(|d| d.days as f64).collect();
    let mut per_category: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for duration in &kept {
        per_category
            .entry(duration.category.as_str())
            .or_default()
            .push(duration.days as f64);
    }

    let mut by_category: Vec<CategoryDuration> = per_category
        .into_iter()
        .map(|(category, values)| CategoryDuration {
            category: category.to_string(),
            mean_days: round2(stats::mean(&values)),
            median_days: round2(stats::median(&values)),
            count: values.len(),
        })
        .collect();
    by_category.sort_by(|a, b| stats::cmp_f64(&a.mean_days, &b.mean_days));

    TimeToCompletion::Measured(CompletionTimeStats {
        measured: kept.len(),
        excluded_outliers,
        missing_completion_date,
        mean_days: round2(stats::mean(&days)),
        median_days: round2(stats::median(&days)),
        min_days: kept.iter().map(|d| d.days).min().unwrap_or(0),
        max_days: kept.iter().map(|d| d.days).max().unwrap_or(0),
        by_category,
    })
}

pub fn popular_courses(enrollments: &[EnrollmentFact], limit: usize) -> Vec<CourseEnrollment> {
    let mut counts: BTreeMap<i64, CourseEnrollment> = BTreeMap::new();
    for enrollment in enrollments {
        counts
            .entry(enrollment.course_id)
            .or_insert_with(|| CourseEnrollment {
                course_id: enrollment.course_id,
                course_title: enrollment.course_title.clone(),
                enrollments: 0,
            })
            .enrollments += 1;
    }

    let mut courses: Vec<CourseEnrollment> = counts.into_values().collect();
    courses.sort_by(|a, b| b.enrollments.cmp(&a.enrollments));
    courses.truncate(limit);
    courses
}

/// Twenty equal-width bins over 0-100; 100 lands in the last bin.
pub fn progress_histogram(enrollments: &[EnrollmentFact]) -> Vec<ProgressBin> {
    let width = 100.0 / PROGRESS_BINS as f64;
    let mut bins: Vec<ProgressBin> = (0..PROGRESS_BINS)
        .map(|i| ProgressBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count: 0,
        })
        .collect();

    for enrollment in enrollments {
        let clamped = enrollment.completion_percentage.clamp(0.0, 100.0);
        let index = ((clamped / width) as usize).min(PROGRESS_BINS - 1);
        bins[index].count += 1;
    }

    bins
}

fn distinct<I: Iterator<Item = i64>>(ids: I) -> usize {
    ids.collect::<HashSet<_>>().len()
}
