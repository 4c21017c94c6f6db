use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::config::{ScoreWeights, Thresholds, TopN};
use crate::context::MetricsContext;
use crate::models::{CourseFact, MentorFact};
use crate::stats::{self, round1, round2};

/// `completion + rating * scale + secondary`, each term weighted. Ratings
/// missing because a course has no reviews enter as 0.
pub fn composite_score(weights: &ScoreWeights, completion_rate: f64, rating: f64, secondary: f64) -> f64 {
    weights.completion * completion_rate
        + weights.rating * rating * weights.rating_scale
        + weights.secondary * secondary
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    HighPerformer,
    Average,
    NeedsImprovement,
}

impl PerformanceTier {
    pub fn from_score(score: f64) -> PerformanceTier {
        if score >= 80.0 {
            PerformanceTier::HighPerformer
        } else if score >= 60.0 {
            PerformanceTier::Average
        } else {
            PerformanceTier::NeedsImprovement
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentorSummary {
    pub mentor_id: i64,
    pub mentor_name: String,
    pub expertise: Option<String>,
    pub courses: usize,
    pub enrolled_students: u32,
    pub completed_students: u32,
    pub completion_rate: f64,
    pub avg_course_rating: f64,
    pub total_reviews: u32,
    pub assignments_created: u32,
    pub graded_submissions: u32,
    pub avg_assignment_score: f64,
    pub modules_created: u32,
    pub effectiveness_score: f64,
    pub workload_score: f64,
    pub tier: PerformanceTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseSuccess {
    pub course_id: i64,
    pub course_title: String,
    pub mentor_name: String,
    pub enrolled_students: u32,
    pub completion_rate: f64,
    pub avg_rating: f64,
    pub review_count: u32,
    pub success_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentorWorkload {
    pub mentor_id: i64,
    pub mentor_name: String,
    pub courses: usize,
    pub enrolled_students: u32,
    pub avg_students_per_course: f64,
    pub grading_load: f64,
    pub content_density: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierDistribution {
    pub high_performers: usize,
    pub average_performers: usize,
    pub needs_improvement: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EffectivenessInsights {
    pub avg_completion_rate: f64,
    pub avg_course_rating: f64,
    pub most_common_expertise: Option<String>,
    pub avg_courses_per_mentor: f64,
    pub avg_effectiveness_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectivenessReport {
    pub total_mentors: usize,
    pub total_courses: usize,
    pub total_students: u32,
    pub mentors: Vec<MentorSummary>,
    pub top_effective: Vec<MentorSummary>,
    pub top_completion: Vec<MentorSummary>,
    pub top_rated: Vec<MentorSummary>,
    pub most_productive: Vec<MentorSummary>,
    pub courses: Vec<CourseSuccess>,
    pub highest_rated_courses: Vec<CourseSuccess>,
    pub most_successful_courses: Vec<CourseSuccess>,
    pub workload: Vec<MentorWorkload>,
    pub tiers: TierDistribution,
    pub insights: EffectivenessInsights,
}

pub fn analyze(ctx: &MetricsContext<'_>) -> EffectivenessReport {
    let config = ctx.config;
    let courses = eligible_courses(&ctx.snapshot.courses, &ctx.snapshot.mentors);

    let mentors = mentor_summaries(&courses, &config.scoring.mentor, &config.scoring.workload);
    let successes = course_successes(&courses, &config.scoring.course_success);
    let rankings = MentorRankings::build(&mentors, &config.thresholds, &config.top_n);

    let report = EffectivenessReport {
        total_mentors: mentors.len(),
        total_courses: courses.len(),
        total_students: mentors.iter().map(|m| m.enrolled_students).sum(),
        top_effective: rankings.top_effective,
        top_completion: rankings.top_completion,
        top_rated: rankings.top_rated,
        most_productive: rankings.most_productive,
        highest_rated_courses: highest_rated_courses(&successes, &config.thresholds, &config.top_n),
        most_successful_courses: most_successful_courses(&successes, &config.thresholds, &config.top_n),
        workload: workload(&courses),
        tiers: tier_distribution(&mentors),
        insights: insights(&courses, &mentors),
        courses: successes,
        mentors,
    };

    debug!(
        mentors = report.total_mentors,
        courses = report.total_courses,
        "effectiveness metrics computed"
    );
    report
}

/// Active courses whose mentor is approved and active. A mentor missing from
/// the mentor rows is given the benefit of the doubt.
pub fn eligible_courses<'a>(courses: &'a [CourseFact], mentors: &[MentorFact]) -> Vec<&'a CourseFact> {
    let standing: HashMap<i64, bool> = mentors
        .iter()
        .map(|m| (m.mentor_id, m.is_approved && m.is_active))
        .collect();

    courses
        .iter()
        .filter(|c| c.is_active)
        .filter(|c| standing.get(&c.mentor_id).copied().unwrap_or(true))
        .collect()
}

/// Highest effectiveness score first.
pub fn mentor_summaries(
    courses: &[&CourseFact],
    mentor_weights: &ScoreWeights,
    workload_weights: &ScoreWeights,
) -> Vec<MentorSummary> {
    let mut groups: BTreeMap<i64, Vec<&CourseFact>> = BTreeMap::new();
    for course in courses {
        groups.entry(course.mentor_id).or_default().push(*course);
    }

    let max_courses = groups.values().map(Vec::len).max().unwrap_or(0);

    let mut summaries: Vec<MentorSummary> = groups
        .into_values()
        .filter_map(|courses| {
            let first = *courses.first()?;
            let enrolled: u32 = courses.iter().map(|c| c.enrolled_students).sum();
            let completed: u32 = courses.iter().map(|c| c.completed_students).sum();
            let ratings: Vec<f64> = courses.iter().filter_map(|c| c.avg_rating).collect();
            let scores: Vec<f64> = courses.iter().filter_map(|c| c.avg_assignment_score).collect();

            let completion_rate = stats::rate(completed as usize, enrolled as usize);
            let avg_rating = stats::mean(&ratings);
            let avg_score = stats::mean(&scores);
            let course_share = stats::rate(courses.len(), max_courses);
            let effectiveness = round2(composite_score(mentor_weights, completion_rate, avg_rating, avg_score));

            Some(MentorSummary {
                mentor_id: first.mentor_id,
                mentor_name: first.mentor_name.clone(),
                expertise: first.mentor_expertise.clone(),
                courses: courses.len(),
                enrolled_students: enrolled,
                completed_students: completed,
                completion_rate: round2(completion_rate),
                avg_course_rating: round2(avg_rating),
                total_reviews: courses.iter().map(|c| c.review_count).sum(),
                assignments_created: courses.iter().map(|c| c.assignments_created).sum(),
                graded_submissions: courses.iter().map(|c| c.graded_submissions).sum(),
                avg_assignment_score: round2(avg_score),
                modules_created: courses.iter().map(|c| c.modules_created).sum(),
                effectiveness_score: effectiveness,
                workload_score: round2(composite_score(
                    workload_weights,
                    completion_rate,
                    avg_rating,
                    course_share,
                )),
                tier: PerformanceTier::from_score(effectiveness),
            })
        })
        .collect();

    summaries.sort_by(|a, b| stats::cmp_f64(&b.effectiveness_score, &a.effectiveness_score));
    summaries
}

struct MentorRankings {
    top_effective: Vec<MentorSummary>,
    top_completion: Vec<MentorSummary>,
    top_rated: Vec<MentorSummary>,
    most_productive: Vec<MentorSummary>,
}

impl MentorRankings {
    fn build(mentors: &[MentorSummary], thresholds: &Thresholds, top_n: &TopN) -> Self {
        let top_effective = mentors.iter().take(top_n.mentors).cloned().collect();

        let mut top_completion: Vec<MentorSummary> = mentors
            .iter()
            .filter(|m| m.enrolled_students >= thresholds.completion_rank_min_students)
            .cloned()
            .collect();
        top_completion.sort_by(|a, b| stats::cmp_f64(&b.completion_rate, &a.completion_rate));
        top_completion.truncate(top_n.mentor_rankings);

        let mut top_rated: Vec<MentorSummary> = mentors
            .iter()
            .filter(|m| m.total_reviews >= thresholds.rating_rank_min_reviews)
            .cloned()
            .collect();
        top_rated.sort_by(|a, b| stats::cmp_f64(&b.avg_course_rating, &a.avg_course_rating));
        top_rated.truncate(top_n.mentor_rankings);

        let mut most_productive = mentors.to_vec();
        most_productive.sort_by(|a, b| {
            b.courses
                .cmp(&a.courses)
                .then_with(|| b.enrolled_students.cmp(&a.enrolled_students))
        });
        most_productive.truncate(top_n.mentor_rankings);

        Self {
            top_effective,
            top_completion,
            top_rated,
            most_productive,
        }
    }
}

pub fn course_successes(courses: &[&CourseFact], weights: &ScoreWeights) -> Vec<CourseSuccess> {
    courses
        .iter()
        .map(|course| {
            let completion_rate = course.completion_rate();
            let rating = course.avg_rating.unwrap_or(0.0);
            CourseSuccess {
                course_id: course.course_id,
                course_title: course.title.clone(),
                mentor_name: course.mentor_name.clone(),
                enrolled_students: course.enrolled_students,
                completion_rate: round2(completion_rate),
                avg_rating: round2(rating),
                review_count: course.review_count,
                success_score: round2(composite_score(weights, completion_rate, rating, 0.0)),
            }
        })
        .collect()
}

pub fn highest_rated_courses(
    courses: &[CourseSuccess],
    thresholds: &Thresholds,
    top_n: &TopN,
) -> Vec<CourseSuccess> {
    let mut rated: Vec<CourseSuccess> = courses
        .iter()
        .filter(|c| c.review_count >= thresholds.rating_rank_min_reviews)
        .cloned()
        .collect();
    rated.sort_by(|a, b| stats::cmp_f64(&b.avg_rating, &a.avg_rating));
    rated.truncate(top_n.courses);
    rated
}

pub fn most_successful_courses(
    courses: &[CourseSuccess],
    thresholds: &Thresholds,
    top_n: &TopN,
) -> Vec<CourseSuccess> {
    let mut eligible: Vec<CourseSuccess> = courses
        .iter()
        .filter(|c| c.enrolled_students >= thresholds.success_rank_min_students)
        .cloned()
        .collect();
    eligible.sort_by(|a, b| stats::cmp_f64(&b.success_score, &a.success_score));
    eligible.truncate(top_n.courses);
    eligible
}

/// Busiest mentors first.
pub fn workload(courses: &[&CourseFact]) -> Vec<MentorWorkload> {
    let mut groups: BTreeMap<i64, Vec<&CourseFact>> = BTreeMap::new();
    for course in courses {
        groups.entry(course.mentor_id).or_default().push(*course);
    }

    let mut rows: Vec<MentorWorkload> = groups
        .into_values()
        .filter_map(|courses| {
            let first = *courses.first()?;
            let enrolled: u32 = courses.iter().map(|c| c.enrolled_students).sum();
            let graded: u32 = courses.iter().map(|c| c.graded_submissions).sum();
            let modules: u32 = courses.iter().map(|c| c.modules_created).sum();
            Some(MentorWorkload {
                mentor_id: first.mentor_id,
                mentor_name: first.mentor_name.clone(),
                courses: courses.len(),
                enrolled_students: enrolled,
                avg_students_per_course: round1(ratio(enrolled as f64, courses.len() as f64)),
                grading_load: round2(ratio(graded as f64, enrolled as f64)),
                content_density: round1(ratio(modules as f64, courses.len() as f64)),
            })
        })
        .collect();

    rows.sort_by(|a, b| b.enrolled_students.cmp(&a.enrolled_students));
    rows
}

pub fn tier_distribution(mentors: &[MentorSummary]) -> TierDistribution {
    let mut tiers = TierDistribution::default();
    for mentor in mentors {
        match mentor.tier {
            PerformanceTier::HighPerformer => tiers.high_performers += 1,
            PerformanceTier::Average => tiers.average_performers += 1,
            PerformanceTier::NeedsImprovement => tiers.needs_improvement += 1,
        }
    }
    tiers
}

pub fn insights(courses: &[&CourseFact], mentors: &[MentorSummary]) -> EffectivenessInsights {
    let completion: Vec<f64> = courses
        .iter()
        .filter(|c| c.enrolled_students > 0)
        .map(|c| c.completion_rate())
        .collect();
    let ratings: Vec<f64> = courses.iter().filter_map(|c| c.avg_rating).collect();
    let scores: Vec<f64> = mentors.iter().map(|m| m.effectiveness_score).collect();

    EffectivenessInsights {
        avg_completion_rate: round2(stats::mean(&completion)),
        avg_course_rating: round2(stats::mean(&ratings)),
        most_common_expertise: stats::mode(mentors.iter().filter_map(|m| m.expertise.as_deref())),
        avg_courses_per_mentor: round2(ratio(courses.len() as f64, mentors.len() as f64)),
        avg_effectiveness_score: round2(stats::mean(&scores)),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn course(course_id: i64, mentor_id: i64, enrolled: u32, completed: u32, rating: Option<f64>) -> CourseFact {
        CourseFact {
            course_id,
            title: format!("Course {course_id}"),
            category: "Machine Learning".to_string(),
            difficulty_level: "advanced".to_string(),
            is_active: true,
            mentor_id,
            mentor_name: format!("Mentor {mentor_id}"),
            mentor_expertise: Some("Python".to_string()),
            enrolled_students: enrolled,
            completed_students: completed,
            avg_rating: rating,
            review_count: if rating.is_some() { 4 } else { 0 },
            assignments_created: 3,
            graded_submissions: enrolled * 2,
            avg_assignment_score: Some(75.0),
            modules_created: 6,
        }
    }

    #[test]
    fn mentor_preset_matches_worked_example() {
        let score = composite_score(&ScoreWeights::MENTOR, 80.0, 4.0, 75.0);
        assert_eq!(round2(score), 66.5);
    }

    #[test]
    fn presets_disagree_on_rating_scale() {
        let mentor = composite_score(&ScoreWeights::MENTOR, 0.0, 5.0, 0.0);
        let workload = composite_score(&ScoreWeights::WORKLOAD, 0.0, 5.0, 0.0);
        assert_eq!(round2(mentor), 15.0);
        assert_eq!(round2(workload), 30.0);
        assert_eq!(round2(composite_score(&ScoreWeights::COURSE_SUCCESS, 50.0, 4.5, 99.0)), 66.0);
    }

    #[test]
    fn tiers_use_fixed_thresholds() {
        assert_eq!(PerformanceTier::from_score(80.0), PerformanceTier::HighPerformer);
        assert_eq!(PerformanceTier::from_score(79.99), PerformanceTier::Average);
        assert_eq!(PerformanceTier::from_score(60.0), PerformanceTier::Average);
        assert_eq!(PerformanceTier::from_score(59.99), PerformanceTier::NeedsImprovement);
    }

    #[test]
    fn mentor_summary_pools_courses() {
        let courses = vec![course(1, 7, 8, 6, Some(4.0)), course(2, 7, 2, 2, None)];
        let refs: Vec<&CourseFact> = courses.iter().collect();
        let summaries = mentor_summaries(&refs, &ScoreWeights::MENTOR, &ScoreWeights::WORKLOAD);
        assert_eq!(summaries.len(), 1);
        let mentor = &summaries[0];
        assert_eq!(mentor.courses, 2);
        assert_eq!(mentor.completion_rate, 80.0);
        assert_eq!(mentor.avg_course_rating, 4.0);
        assert_eq!(mentor.effectiveness_score, 66.5);
        assert_eq!(mentor.tier, PerformanceTier::Average);
        // 0.5 * 80 + 0.3 * 80 + 0.2 * 100
        assert_eq!(mentor.workload_score, 84.0);
    }

    #[test]
    fn workload_share_is_relative_to_busiest_mentor() {
        let courses = vec![
            course(1, 1, 10, 5, Some(4.0)),
            course(2, 1, 10, 5, Some(4.0)),
            course(3, 2, 10, 5, Some(4.0)),
        ];
        let refs: Vec<&CourseFact> = courses.iter().collect();
        let summaries = mentor_summaries(&refs, &ScoreWeights::MENTOR, &ScoreWeights::WORKLOAD);
        let busy = summaries.iter().find(|m| m.mentor_id == 1).unwrap();
        let light = summaries.iter().find(|m| m.mentor_id == 2).unwrap();
        assert_eq!(busy.workload_score - light.workload_score, 10.0);
    }

    #[test]
    fn leaderboards_apply_sample_thresholds() {
        let courses = vec![
            course(1, 1, 4, 4, Some(5.0)),
            course(2, 2, 20, 10, Some(3.0)),
            course(3, 3, 6, 3, None),
        ];
        let refs: Vec<&CourseFact> = courses.iter().collect();
        let mentors = mentor_summaries(&refs, &ScoreWeights::MENTOR, &ScoreWeights::WORKLOAD);
        let rankings = MentorRankings::build(&mentors, &Thresholds::default(), &TopN::default());

        let completion_ids: Vec<i64> = rankings.top_completion.iter().map(|m| m.mentor_id).collect();
        assert_eq!(completion_ids, vec![2, 3]);
        let rated_ids: Vec<i64> = rankings.top_rated.iter().map(|m| m.mentor_id).collect();
        assert_eq!(rated_ids, vec![1, 2]);
        assert_eq!(rankings.top_effective[0].mentor_id, 1);
    }

    #[test]
    fn course_rankings_need_reviews_and_students() {
        let courses = vec![
            course(1, 1, 3, 3, Some(5.0)),
            course(2, 1, 10, 9, Some(4.0)),
            course(3, 2, 10, 2, None),
        ];
        let refs: Vec<&CourseFact> = courses.iter().collect();
        let successes = course_successes(&refs, &ScoreWeights::COURSE_SUCCESS);
        let rated = highest_rated_courses(&successes, &Thresholds::default(), &TopN::default());
        assert_eq!(rated.len(), 2);
        assert_eq!(rated[0].course_id, 1);

        let successful = most_successful_courses(&successes, &Thresholds::default(), &TopN::default());
        let ids: Vec<i64> = successful.iter().map(|c| c.course_id).collect();
        assert_eq!(ids, vec![2, 3]);
        // 0.6 * 90 + 0.4 * 80
        assert_eq!(successful[0].success_score, 86.0);
    }

    #[test]
    fn unapproved_mentors_and_inactive_courses_are_dropped() {
        let mut inactive = course(2, 1, 5, 5, None);
        inactive.is_active = false;
        let courses = vec![course(1, 1, 5, 5, None), inactive, course(3, 2, 5, 5, None)];
        let mentors = vec![MentorFact {
            mentor_id: 2,
            name: "Mentor 2".to_string(),
            expertise: None,
            is_approved: false,
            is_active: true,
        }];
        let eligible = eligible_courses(&courses, &mentors);
        let ids: Vec<i64> = eligible.iter().map(|c| c.course_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn workload_ratios_guard_zero_students() {
        let courses = vec![course(1, 1, 0, 0, None), course(2, 1, 0, 0, None)];
        let refs: Vec<&CourseFact> = courses.iter().collect();
        let rows = workload(&refs);
        assert_eq!(rows[0].grading_load, 0.0);
        assert_eq!(rows[0].avg_students_per_course, 0.0);
        assert_eq!(rows[0].content_density, 6.0);
    }

    #[test]
    fn empty_input_is_all_zeroes() {
        let refs: Vec<&CourseFact> = Vec::new();
        let mentors = mentor_summaries(&refs, &ScoreWeights::MENTOR, &ScoreWeights::WORKLOAD);
        assert!(mentors.is_empty());
        assert_eq!(tier_distribution(&mentors), TierDistribution::default());
        let insights = insights(&refs, &mentors);
        assert_eq!(insights.avg_courses_per_mentor, 0.0);
        assert_eq!(insights.most_common_expertise, None);
    }

    proptest! {
        #[test]
        fn score_never_drops_when_a_metric_rises(
            completion in 0.0f64..100.0,
            rating in 0.0f64..5.0,
            secondary in 0.0f64..100.0,
            bump in 0.0f64..50.0,
            w1 in 0.0f64..1.0,
            w2 in 0.0f64..1.0,
            w3 in 0.0f64..1.0,
            scale in 0.0f64..25.0,
        ) {
            let weights = ScoreWeights { completion: w1, rating: w2, rating_scale: scale, secondary: w3 };
            let base = composite_score(&weights, completion, rating, secondary);
            prop_assert!(composite_score(&weights, completion + bump, rating, secondary) >= base);
            prop_assert!(composite_score(&weights, completion, rating + bump, secondary) >= base);
            prop_assert!(composite_score(&weights, completion, rating, secondary + bump) >= base);
        }
    }
}
