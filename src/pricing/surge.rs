use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;

use crate::error::AppError;
use crate::models::driver::GeoPoint;

/// Coarse demand region, a 0.1-degree grid cell (roughly a few miles across).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    lat_cell: i32,
    lng_cell: i32,
}

impl Region {
    pub fn containing(point: &GeoPoint) -> Self {
        Self {
            lat_cell: (point.lat * 10.0).floor() as i32,
            lng_cell: (point.lng * 10.0).floor() as i32,
        }
    }
}

/// Answers "how many ride requests since T in this region". Backed by the
/// trip store collaborator in production, an in-memory log here.
pub trait DemandSource: Send + Sync {
    fn count_since(&self, region: Region, since: DateTime<Utc>) -> Result<u32, AppError>;
}

/// In-memory demand log. Entries older than twice the surge window are
/// pruned on write, so the log stays bounded under steady traffic.
pub struct RequestLog {
    entries: DashMap<Region, Vec<DateTime<Utc>>>,
    retention: Duration,
}

impl RequestLog {
    pub fn new(surge_window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention: surge_window * 2,
        }
    }

    pub fn record(&self, region: Region, at: DateTime<Utc>) {
        let keep_after = Utc::now() - self.retention;
        let mut slot = self.entries.entry(region).or_default();
        slot.retain(|t| *t >= keep_after);
        slot.push(at);
    }
}

impl DemandSource for RequestLog {
    fn count_since(&self, region: Region, since: DateTime<Utc>) -> Result<u32, AppError> {
        let count = self
            .entries
            .get(&region)
            .map(|slot| slot.iter().filter(|t| **t >= since).count())
            .unwrap_or(0);
        Ok(count as u32)
    }
}

/// Demand-driven fare multiplier over a trailing window.
pub struct SurgeEstimator {
    source: Arc<dyn DemandSource>,
    window: Duration,
}

impl SurgeEstimator {
    pub fn new(source: Arc<dyn DemandSource>, window_mins: i64) -> Self {
        Self {
            source,
            window: Duration::minutes(window_mins),
        }
    }

    /// Fails open: a demand lookup error never blocks pricing, it just
    /// means no surge.
    pub fn current_multiplier(&self, region: Region) -> f64 {
        let since = Utc::now() - self.window;
        match self.source.count_since(region, since) {
            Ok(count) => multiplier_for_count(count),
            Err(err) => {
                warn!(error = %err, "surge lookup failed; defaulting to 1.0");
                1.0
            }
        }
    }
}

/// Step function over the demand count. Monotonically non-decreasing by
/// construction: thresholds and multipliers both ascend.
pub fn multiplier_for_count(count: u32) -> f64 {
    match count {
        c if c > 20 => 1.8,
        c if c > 15 => 1.5,
        c if c > 10 => 1.3,
        c if c > 5 => 1.2,
        _ => 1.0,
    }
}
