use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::models::Snapshot;

/// Everything a calculator may read during one pass. Calculators take this by
/// shared reference and never reach for anything else.
#[derive(Debug, Clone, Copy)]
pub struct MetricsContext<'a> {
    pub snapshot: &'a Snapshot,
    pub config: &'a EngineConfig,
    pub now: DateTime<Utc>,
}

impl<'a> MetricsContext<'a> {
    pub fn new(snapshot: &'a Snapshot, config: &'a EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            config,
            now,
        }
    }
}
