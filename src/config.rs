use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

/// Weights for `completion + rating * scale + secondary`. The rating term is
/// scaled from the 1-5 review range up to a 0-100 range before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub completion: f64,
    pub rating: f64,
    pub rating_scale: f64,
    pub secondary: f64,
}

impl ScoreWeights {
    /// Completion, ratings and average assignment score.
    pub const MENTOR: ScoreWeights = ScoreWeights {
        completion: 0.4,
        rating: 0.3,
        rating_scale: 10.0,
        secondary: 0.3,
    };

    /// Completion, ratings and course count relative to the busiest mentor.
    pub const WORKLOAD: ScoreWeights = ScoreWeights {
        completion: 0.5,
        rating: 0.3,
        rating_scale: 20.0,
        secondary: 0.2,
    };

    pub const COURSE_SUCCESS: ScoreWeights = ScoreWeights {
        completion: 0.6,
        rating: 0.4,
        rating_scale: 20.0,
        secondary: 0.0,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringConfig {
    pub mentor: ScoreWeights,
    pub workload: ScoreWeights,
    pub course_success: ScoreWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mentor: ScoreWeights::MENTOR,
            workload: ScoreWeights::WORKLOAD,
            course_success: ScoreWeights::COURSE_SUCCESS,
        }
    }
}

/// A preset table as written in the config file. Fields left out keep the
/// value of the preset being overridden.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WeightsOverride {
    completion: Option<f64>,
    rating: Option<f64>,
    rating_scale: Option<f64>,
    secondary: Option<f64>,
}

impl WeightsOverride {
    fn apply(self, base: ScoreWeights) -> ScoreWeights {
        ScoreWeights {
            completion: self.completion.unwrap_or(base.completion),
            rating: self.rating.unwrap_or(base.rating),
            rating_scale: self.rating_scale.unwrap_or(base.rating_scale),
            secondary: self.secondary.unwrap_or(base.secondary),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ScoringOverride {
    mentor: WeightsOverride,
    workload: WeightsOverride,
    course_success: WeightsOverride,
}

impl<'de> Deserialize<'de> for ScoringConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let overrides = ScoringOverride::deserialize(deserializer)?;
        Ok(Self {
            mentor: overrides.mentor.apply(ScoreWeights::MENTOR),
            workload: overrides.workload.apply(ScoreWeights::WORKLOAD),
            course_success: overrides.course_success.apply(ScoreWeights::COURSE_SUCCESS),
        })
    }
}

/// Minimum sample sizes that keep leaderboards from ranking on noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub top_performer_min_submissions: usize,
    pub attention_min_submissions: usize,
    pub attention_grade_below: f64,
    pub late_rank_min_submissions: usize,
    pub completion_rank_min_students: u32,
    pub rating_rank_min_reviews: u32,
    pub success_rank_min_students: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            top_performer_min_submissions: 3,
            attention_min_submissions: 2,
            attention_grade_below: 70.0,
            late_rank_min_submissions: 5,
            completion_rank_min_students: 5,
            rating_rank_min_reviews: 3,
            success_rank_min_students: 5,
        }
    }
}

/// Plausible completion durations, in whole days, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierBounds {
    pub min_days: i64,
    pub max_days: i64,
}

impl Default for OutlierBounds {
    fn default() -> Self {
        Self {
            min_days: 0,
            max_days: 365,
        }
    }
}

impl OutlierBounds {
    pub fn contains(&self, days: i64) -> bool {
        days >= self.min_days && days <= self.max_days
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopN {
    pub categories: usize,
    pub popular_courses: usize,
    pub courses: usize,
    pub late_courses: usize,
    pub students: usize,
    pub attention: usize,
    pub mentors: usize,
    pub mentor_rankings: usize,
    pub report_mentors: usize,
    pub monthly_performance: usize,
}

impl Default for TopN {
    fn default() -> Self {
        Self {
            categories: 3,
            popular_courses: 5,
            courses: 10,
            late_courses: 5,
            students: 5,
            attention: 5,
            mentors: 10,
            mentor_rankings: 5,
            report_mentors: 5,
            monthly_performance: 6,
        }
    }
}

const MAX_WINDOW_MONTHS: u32 = 120;
const MAX_RECENT_ACTIVITY_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub window_months: u32,
    pub recent_activity_days: i64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_months: 12,
            recent_activity_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub thresholds: Thresholds,
    pub outliers: OutlierBounds,
    pub top_n: TopN,
    pub trends: TrendConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, weights) in [
            ("mentor", &self.scoring.mentor),
            ("workload", &self.scoring.workload),
            ("course_success", &self.scoring.course_success),
        ] {
            if weights.completion < 0.0
                || weights.rating < 0.0
                || weights.secondary < 0.0
                || weights.rating_scale < 0.0
            {
                anyhow::bail!("scoring.{name}: weights and rating_scale must be non-negative");
            }
        }
        if self.outliers.min_days > self.outliers.max_days {
            anyhow::bail!(
                "outliers: min_days ({}) exceeds max_days ({})",
                self.outliers.min_days,
                self.outliers.max_days
            );
        }
        if !(1..=MAX_WINDOW_MONTHS).contains(&self.trends.window_months) {
            anyhow::bail!(
                "trends.window_months ({}) must be between 1 and {MAX_WINDOW_MONTHS}",
                self.trends.window_months
            );
        }
        if !(1..=MAX_RECENT_ACTIVITY_DAYS).contains(&self.trends.recent_activity_days) {
            anyhow::bail!(
                "trends.recent_activity_days ({}) must be between 1 and {MAX_RECENT_ACTIVITY_DAYS}",
                self.trends.recent_activity_days
            );
        }
        Ok(())
    }
}
