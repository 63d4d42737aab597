use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::state::{new_state, snapshot, Shared};

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectorHealth {
    pub uptime_seconds: u64,
    pub configured: bool,
    pub space_id: Option<String>,
    pub apps_tracked: u32,
    pub last_collection: Option<String>,
    pub last_collection_ms: Option<u64>,
    pub samples_last_tick: u32,
    pub auth_failures: u32,
    pub stats_failures: u32,
    pub memory_usage_mb: f32,
}

#[derive(Debug, Clone, Default)]
struct Progress {
    space_id: Option<String>,
    apps_tracked: u32,
    last_collection: Option<OffsetDateTime>,
    last_collection_ms: Option<u64>,
    samples_last_tick: u32,
}

/// Counters fed by the monitoring loop, read by `GET /health`
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    auth_failures: Arc<AtomicU32>,
    stats_failures: Arc<AtomicU32>,
    progress: Shared<Progress>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            auth_failures: Arc::new(AtomicU32::new(0)),
            stats_failures: Arc::new(AtomicU32::new(0)),
            progress: new_state(Progress::default()),
        }
    }

    pub fn mark_configured(&self, space_id: &str, apps: usize) {
        let mut p = self.progress.lock();
        p.space_id = Some(space_id.to_string());
        p.apps_tracked = apps as u32;
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collection(&self, elapsed: Duration, samples: usize, failures: usize) {
        self.stats_failures.fetch_add(failures as u32, Ordering::Relaxed);
        let mut p = self.progress.lock();
        p.last_collection = Some(OffsetDateTime::now_utc());
        p.last_collection_ms = Some(elapsed.as_millis() as u64);
        p.samples_last_tick = samples as u32;
    }

    pub fn get_health(&self) -> CollectorHealth {
        let p = snapshot(&self.progress);

        CollectorHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            configured: p.space_id.is_some(),
            space_id: p.space_id,
            apps_tracked: p.apps_tracked,
            last_collection: p.last_collection.and_then(|t| t.format(&Rfc3339).ok()),
            last_collection_ms: p.last_collection_ms,
            samples_last_tick: p.samples_last_tick,
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            stats_failures: self.stats_failures.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(Ok(kb)) = rest.split_whitespace().next().map(str::parse::<u64>) {
                        return kb as f32 / 1024.0; // KB -> MB
                    }
                }
            }
        }
    }

    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_health() {
        let health = HealthTracker::new().get_health();
        assert!(!health.configured);
        assert!(health.space_id.is_none());
        assert!(health.last_collection.is_none());
        assert_eq!(health.auth_failures, 0);
    }

    #[test]
    fn test_progress_is_shared_between_clones() {
        let tracker = HealthTracker::new();
        let writer = tracker.clone();

        writer.mark_configured("space-1", 3);
        writer.record_auth_failure();
        writer.record_collection(Duration::from_millis(42), 4, 1);
        writer.record_collection(Duration::from_millis(7), 2, 1);

        let health = tracker.get_health();
        assert!(health.configured);
        assert_eq!(health.space_id.as_deref(), Some("space-1"));
        assert_eq!(health.apps_tracked, 3);
        assert_eq!(health.auth_failures, 1);
        assert_eq!(health.stats_failures, 2);
        assert_eq!(health.samples_last_tick, 2);
        assert_eq!(health.last_collection_ms, Some(7));
        assert!(health.last_collection.is_some());
    }
}
