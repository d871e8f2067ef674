//! Environments: named groups of targets polled on a shared interval.

use crate::target::{Target, TargetSnapshot};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct PollState {
    last_query: Option<DateTime<Utc>>,
    last_duration_ms: u64,
}

#[derive(Debug)]
pub struct Environment {
    name: String,
    description: String,
    interval: Duration,
    targets: Vec<Arc<Target>>,
    poll: Mutex<PollState>,
}

/// Coverage counts across all targets of an environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentStatistics {
    pub total_servers: usize,
    pub available_servers: usize,
    pub total_counters: usize,
    /// Counted on available servers only.
    pub available_counters: usize,
    pub last_query: Option<DateTime<Utc>>,
    pub last_query_duration_ms: u64,
    pub interval_secs: u64,
}

impl Environment {
    pub fn new(
        name: &str,
        description: &str,
        interval: Duration,
        targets: Vec<Arc<Target>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            interval,
            targets,
            poll: Mutex::new(PollState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn last_query(&self) -> Option<DateTime<Utc>> {
        self.poll.lock().last_query
    }

    pub fn last_duration_ms(&self) -> u64 {
        self.poll.lock().last_duration_ms
    }

    pub(crate) fn begin_poll(&self, at: DateTime<Utc>) {
        self.poll.lock().last_query = Some(at);
    }

    pub(crate) fn finish_poll(&self, duration_ms: u64) {
        self.poll.lock().last_duration_ms = duration_ms;
    }

    pub fn statistics(&self) -> EnvironmentStatistics {
        let available: Vec<&Arc<Target>> =
            self.targets.iter().filter(|t| t.is_available()).collect();
        let poll = self.poll.lock();

        EnvironmentStatistics {
            total_servers: self.targets.len(),
            available_servers: available.len(),
            total_counters: self.targets.iter().map(|t| t.metrics().len()).sum(),
            available_counters: available
                .iter()
                .map(|t| t.metrics().iter().filter(|m| m.is_available()).count())
                .sum(),
            last_query: poll.last_query,
            last_query_duration_ms: poll.last_duration_ms,
            interval_secs: self.interval.as_secs(),
        }
    }

    pub fn snapshot(&self, with_targets: bool) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            name: self.name.clone(),
            description: self.description.clone(),
            statistics: self.statistics(),
            targets: with_targets.then(|| self.targets.iter().map(|t| t.snapshot(true)).collect()),
        }
    }
}

/// Read-only projection of an environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentSnapshot {
    pub name: String,
    pub description: String,
    pub statistics: EnvironmentStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<TargetSnapshot>>,
}
