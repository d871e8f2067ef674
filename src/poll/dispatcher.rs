//! Target grouping and batched dispatch.
//!
//! Metrics are partitioned by (host, credential). Each partition is queried
//! once with all of its distinct paths, concurrently across partitions, and
//! the returned samples are routed back to every metric sharing that path.
//! Failures are recorded on the affected metrics; dispatching never fails.

use crate::catalog::normalize_path;
use crate::logging::Logger;
use crate::metric::MetricDefinition;
use crate::source::{MetricSource, QueryRequest, Sample, SourceError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Metrics share a batch iff they share this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub host: String,
    pub credential: Option<String>,
}

impl GroupKey {
    pub fn for_metric(metric: &MetricDefinition) -> Self {
        let binding = metric.binding();
        Self {
            host: binding.host.trim().to_lowercase(),
            credential: binding.credential.clone(),
        }
    }
}

/// All metrics of one target, ready for a single batched query.
#[derive(Debug)]
pub struct TargetGroup {
    key: GroupKey,
    host: String,
    paths: Vec<String>,
    by_path: HashMap<String, Vec<Arc<MetricDefinition>>>,
}

impl TargetGroup {
    fn new(key: GroupKey, host: &str) -> Self {
        Self {
            key,
            host: host.to_string(),
            paths: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    fn insert(&mut self, metric: &Arc<MetricDefinition>) {
        let owners = self
            .by_path
            .entry(metric.normalized_path().to_string())
            .or_default();
        if owners.is_empty() {
            self.paths.push(metric.path().to_string());
        }
        // The same metric reached through two targets is still one metric
        if !owners.iter().any(|m| Arc::ptr_eq(m, metric)) {
            owners.push(metric.clone());
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Distinct query paths, in first-seen order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Arc<MetricDefinition>> {
        self.by_path.values().flatten()
    }

    pub fn metric_count(&self) -> usize {
        self.by_path.values().map(Vec::len).sum()
    }
}

/// Partition resolved metrics by target. Groups come out in first-seen order.
pub fn group_metrics(metrics: &[Arc<MetricDefinition>]) -> Vec<TargetGroup> {
    let mut groups: Vec<TargetGroup> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for metric in metrics.iter().filter(|m| m.is_resolved()) {
        let key = GroupKey::for_metric(metric);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(TargetGroup::new(key, &metric.binding().host));
            groups.len() - 1
        });
        groups[slot].insert(metric);
    }

    groups
}

/// Dispatch tuning.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub max_samples: u32,
    /// Per-batch deadline; expiry fails the batch.
    pub timeout: Option<Duration>,
    /// Upper bound on batches in flight across all dispatch calls.
    pub max_concurrency: Option<usize>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_samples: 1,
            timeout: Some(Duration::from_secs(30)),
            max_concurrency: None,
        }
    }
}

/// Result of one batched query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupOutcome {
    pub host: String,
    pub credential: Option<String>,
    pub requested_paths: usize,
    pub metrics: usize,
    pub samples_returned: usize,
    pub updated: usize,
    pub conversion_errors: usize,
    pub missing: usize,
    pub duration_ms: u64,
    /// Set when the batch call itself failed.
    pub error: Option<String>,
}

impl GroupOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one dispatch across all groups.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub groups: Vec<GroupOutcome>,
    pub duration_ms: u64,
}

impl DispatchReport {
    pub fn query_count(&self) -> usize {
        self.groups.len()
    }

    pub fn failed_groups(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.groups.iter().filter(|g| !g.is_success())
    }

    pub fn updated(&self) -> usize {
        self.groups.iter().map(|g| g.updated).sum()
    }
}

/// Issues one batched query per target group.
pub struct BatchDispatcher {
    source: Arc<dyn MetricSource>,
    options: DispatchOptions,
    limiter: Option<Arc<Semaphore>>,
    logger: Logger,
}

impl BatchDispatcher {
    pub fn new(source: Arc<dyn MetricSource>, options: DispatchOptions, logger: Logger) -> Self {
        let limiter = options
            .max_concurrency
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        Self {
            source,
            options,
            limiter,
            logger,
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Group `metrics` by target and query every group concurrently.
    pub async fn dispatch(&self, metrics: &[Arc<MetricDefinition>]) -> DispatchReport {
        let started = Instant::now();
        let groups = group_metrics(metrics);

        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let source = self.source.clone();
                let options = self.options.clone();
                let limiter = self.limiter.clone();
                let logger = self.logger.clone();
                let host = group.host().to_string();
                let handle = tokio::spawn(async move {
                    let _permit = match limiter {
                        Some(sem) => sem.acquire_owned().await.ok(),
                        None => None,
                    };
                    run_group(source.as_ref(), &group, &options, &logger).await
                });
                (host, handle)
            })
            .collect();

        let mut report = DispatchReport::default();
        for (host, handle) in handles {
            match handle.await {
                Ok(outcome) => report.groups.push(outcome),
                Err(e) => self.logger.error(&format!("Batch task for '{}' failed: {}", host, e)),
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }
}

async fn run_group(
    source: &dyn MetricSource,
    group: &TargetGroup,
    options: &DispatchOptions,
    logger: &Logger,
) -> GroupOutcome {
    let request = QueryRequest {
        host: group.host().to_string(),
        credential: group.key().credential.clone(),
        paths: group.paths().to_vec(),
        max_samples: options.max_samples,
        timeout: options.timeout,
    };

    let started = Instant::now();
    let result = match options.timeout {
        Some(timeout) => tokio::time::timeout(timeout, source.query(&request))
            .await
            .unwrap_or(Err(SourceError::Timeout(timeout))),
        None => source.query(&request).await,
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    apply_result(group, result, duration_ms, Utc::now(), logger)
}

/// Route a batch result onto the group's metrics.
fn apply_result(
    group: &TargetGroup,
    result: Result<Vec<Sample>, SourceError>,
    duration_ms: u64,
    timestamp: DateTime<Utc>,
    logger: &Logger,
) -> GroupOutcome {
    let mut outcome = GroupOutcome {
        host: group.host().to_string(),
        credential: group.key().credential.clone(),
        requested_paths: group.paths().len(),
        metrics: group.metric_count(),
        duration_ms,
        ..Default::default()
    };

    let samples = match result {
        Ok(samples) => samples,
        Err(e) => {
            let message = e.to_string();
            for metric in group.metrics() {
                metric.record_batch_failure(&message);
            }
            logger.error(&format!(
                "Batch query to '{}' failed for {} counters: {}",
                group.host(),
                outcome.metrics,
                message
            ));
            outcome.error = Some(message);
            return outcome;
        }
    };

    outcome.samples_returned = samples.len();
    let mut seen: HashSet<String> = HashSet::new();

    for sample in &samples {
        let key = normalize_path(&sample.path);
        let Some(owners) = group.by_path.get(&key) else {
            logger.verbose(&format!("Ignoring unrequested sample path {}", sample.path));
            continue;
        };
        seen.insert(key);

        for metric in owners {
            match metric.record_sample(sample.value, timestamp) {
                Ok(_) => outcome.updated += 1,
                Err(e) => {
                    outcome.conversion_errors += 1;
                    logger.warning(&format!(
                        "Counter '{}' on '{}': {}",
                        metric.title(),
                        group.host(),
                        e
                    ));
                }
            }
        }
    }

    for (path, owners) in &group.by_path {
        if seen.contains(path) {
            continue;
        }
        for metric in owners {
            metric.record_no_data();
            outcome.missing += 1;
        }
    }

    for metric in group.metrics() {
        metric.set_execution_duration(duration_ms);
    }

    if outcome.missing > 0 {
        logger.warning(&format!(
            "'{}' returned no data for {} of {} counters",
            group.host(),
            outcome.missing,
            outcome.metrics
        ));
    }
    logger.verbose(&format!(
        "Queried '{}': {} paths, {} samples in {}ms",
        group.host(),
        outcome.requested_paths,
        outcome.samples_returned,
        duration_ms
    ));

    outcome
}
