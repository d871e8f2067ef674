//! Target aggregate: one host and the metrics polled from it.

use crate::metric::{MetricDefinition, MetricSnapshot, TargetBinding};
use crate::probe::ConnectivityProber;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Stored on a target that failed its connectivity probe.
pub const SERVER_NOT_REACHABLE: &str = "Server not reachable";

/// Connectivity state, set by the prober. Only `Available` targets are polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Availability {
    Unprobed,
    Available,
    Unavailable,
}

/// Counts rolled up from the member metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetStatistics {
    pub total_counters: usize,
    pub available_counters: usize,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct TargetState {
    availability: Availability,
    last_error: String,
    statistics: TargetStatistics,
}

#[derive(Debug)]
pub struct Target {
    host: String,
    comment: String,
    credential: Option<String>,
    metrics: Vec<Arc<MetricDefinition>>,
    state: RwLock<TargetState>,
}

impl Target {
    pub fn new(
        host: &str,
        comment: &str,
        credential: Option<&str>,
        metrics: Vec<Arc<MetricDefinition>>,
    ) -> Self {
        Self {
            host: host.to_string(),
            comment: comment.to_string(),
            credential: credential.map(str::to_string),
            metrics,
            state: RwLock::new(TargetState {
                availability: Availability::Unprobed,
                last_error: String::new(),
                statistics: TargetStatistics::default(),
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn binding(&self) -> TargetBinding {
        TargetBinding::new(&self.host, self.credential.as_deref())
    }

    pub fn metrics(&self) -> &[Arc<MetricDefinition>] {
        &self.metrics
    }

    pub fn availability(&self) -> Availability {
        self.state.read().availability
    }

    pub fn is_available(&self) -> bool {
        self.availability() == Availability::Available
    }

    pub fn last_error(&self) -> String {
        self.state.read().last_error.clone()
    }

    pub fn set_last_error(&self, message: &str) {
        self.state.write().last_error = message.to_string();
    }

    /// Apply a connectivity probe result.
    pub fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.write();
        if reachable {
            state.availability = Availability::Available;
            state.last_error.clear();
        } else {
            state.availability = Availability::Unavailable;
            state.last_error = SERVER_NOT_REACHABLE.to_string();
        }
    }

    /// Probe the host and update availability.
    pub async fn refresh_availability(&self, prober: &dyn ConnectivityProber) -> bool {
        let reachable = prober.probe(&self.host).await;
        self.set_reachable(reachable);
        reachable
    }

    /// Recompute the roll-up from current member state.
    pub fn update_statistics(&self) -> TargetStatistics {
        let statistics = TargetStatistics {
            total_counters: self.metrics.len(),
            available_counters: self.metrics.iter().filter(|m| m.is_available()).count(),
            last_update: self.metrics.iter().filter_map(|m| m.last_update()).max(),
        };
        self.state.write().statistics = statistics.clone();
        statistics
    }

    pub fn statistics(&self) -> TargetStatistics {
        self.state.read().statistics.clone()
    }

    pub fn snapshot(&self, with_metrics: bool) -> TargetSnapshot {
        let state = self.state.read();
        TargetSnapshot {
            host: self.host.clone(),
            comment: self.comment.clone(),
            availability: state.availability,
            last_error: state.last_error.clone(),
            statistics: state.statistics.clone(),
            metrics: with_metrics.then(|| self.metrics.iter().map(|m| m.snapshot()).collect()),
        }
    }
}

/// Read-only projection of a target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub host: String,
    pub comment: String,
    pub availability: Availability,
    pub last_error: String,
    pub statistics: TargetStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<MetricSnapshot>>,
}
