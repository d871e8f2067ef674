//! Poll orchestration across targets and environments.

use super::dispatcher::{BatchDispatcher, DispatchReport};
use crate::environment::Environment;
use crate::logging::Logger;
use crate::metric::MetricDefinition;
use crate::target::Target;

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

/// Orchestrator-level failures. Per-target and per-metric errors never surface here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("invalid environment {name:?}: {reason}")]
    InvalidEnvironment { name: String, reason: String },
}

/// What one target contributed to an environment poll.
#[derive(Debug, Clone)]
pub struct TargetPoll {
    pub host: String,
    /// `None` when the target's poll task failed.
    pub report: Option<DispatchReport>,
}

/// Outcome of [`PollOrchestrator::poll_environment`].
#[derive(Debug, Clone)]
pub struct EnvironmentPoll {
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub targets: Vec<TargetPoll>,
    /// Targets left out because they are not available.
    pub skipped: usize,
}

/// Drives poll cycles, one task per available target.
pub struct PollOrchestrator {
    dispatcher: Arc<BatchDispatcher>,
    logger: Logger,
}

impl PollOrchestrator {
    pub fn new(dispatcher: Arc<BatchDispatcher>, logger: Logger) -> Self {
        Self { dispatcher, logger }
    }

    pub fn dispatcher(&self) -> &Arc<BatchDispatcher> {
        &self.dispatcher
    }

    /// Poll every available target of `env` concurrently and roll up statistics.
    pub async fn poll_environment(&self, env: &Environment) -> Result<EnvironmentPoll, PollError> {
        validate(env)?;

        let started_at = Utc::now();
        let started = Instant::now();
        env.begin_poll(started_at);

        let mut skipped = 0;
        let mut handles = Vec::new();
        for target in env.targets() {
            if !target.is_available() {
                skipped += 1;
                continue;
            }
            let target = target.clone();
            let dispatcher = self.dispatcher.clone();
            let handle = tokio::spawn({
                let target = target.clone();
                async move {
                    let report = dispatcher.dispatch(target.metrics()).await;
                    target.update_statistics();
                    report
                }
            });
            handles.push((target, handle));
        }

        let mut targets = Vec::with_capacity(handles.len());
        for (target, handle) in handles {
            let report = match handle.await {
                Ok(report) => Some(report),
                Err(e) => {
                    let message = format!("poll task failed: {}", e);
                    self.logger.error(&format!(
                        "Error querying server '{}': {}",
                        target.host(),
                        message
                    ));
                    target.set_last_error(&message);
                    None
                }
            };
            targets.push(TargetPoll {
                host: target.host().to_string(),
                report,
            });
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        env.finish_poll(duration_ms);
        self.logger.info(&format!(
            "Environment '{}' query completed in {}ms",
            env.name(),
            duration_ms
        ));

        Ok(EnvironmentPoll {
            environment: env.name().to_string(),
            started_at,
            duration_ms,
            targets,
            skipped,
        })
    }

    /// Flatten every available target's metrics into one dispatch.
    ///
    /// A target listed twice, or a definition held by several targets, is
    /// queried and recorded once.
    pub async fn poll_all_flat(&self, targets: &[Arc<Target>]) -> DispatchReport {
        let available = unique_available(targets);
        let metrics: Vec<Arc<MetricDefinition>> = available
            .iter()
            .flat_map(|t| t.metrics().iter().cloned())
            .collect();

        let report = self.dispatcher.dispatch(&metrics).await;

        for target in &available {
            target.update_statistics();
        }
        self.logger.verbose(&format!(
            "Flat poll of {} targets issued {} queries in {}ms",
            available.len(),
            report.query_count(),
            report.duration_ms
        ));
        report
    }

    /// Flat poll across several environments, recording timing on each.
    pub async fn poll_environments_flat(
        &self,
        envs: &[Arc<Environment>],
    ) -> Result<DispatchReport, PollError> {
        for env in envs {
            validate(env)?;
        }

        let started_at = Utc::now();
        let started = Instant::now();
        for env in envs {
            env.begin_poll(started_at);
        }

        let targets: Vec<Arc<Target>> =
            envs.iter().flat_map(|e| e.targets().iter().cloned()).collect();
        let report = self.poll_all_flat(&targets).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        for env in envs {
            env.finish_poll(duration_ms);
        }
        self.logger.info(&format!(
            "Flat query of {} environments completed in {}ms",
            envs.len(),
            duration_ms
        ));
        Ok(report)
    }
}

fn validate(env: &Environment) -> Result<(), PollError> {
    let invalid = |reason: &str| PollError::InvalidEnvironment {
        name: env.name().to_string(),
        reason: reason.to_string(),
    };

    if env.name().trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if env.interval().is_zero() {
        return Err(invalid("polling interval is zero"));
    }
    Ok(())
}

fn unique_available(targets: &[Arc<Target>]) -> Vec<Arc<Target>> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .filter(|t| t.is_available())
        .filter(|t| seen.insert(Arc::as_ptr(*t)))
        .cloned()
        .collect()
}
