//! Scriptable in-memory metric source for tests and demos.

use super::{MetricSource, QueryRequest, Sample, SourceError};
use crate::catalog::normalize_path;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
enum HostScript {
    Values(HashMap<String, f64>),
    Fail(SourceError),
}

/// Answers queries from per-host scripted values.
///
/// Reported sample paths carry a `\\HOST` prefix the way remote counter
/// sources do. Unscripted hosts and paths are omitted from the result.
#[derive(Debug, Default)]
pub struct FakeMetricSource {
    hosts: Mutex<HashMap<String, HostScript>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<QueryRequest>>,
}

impl FakeMetricSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the raw value returned for `path` on `host`.
    pub fn set_value(&self, host: &str, path: &str, value: f64) {
        let mut hosts = self.hosts.lock();
        let entry = hosts
            .entry(host.to_lowercase())
            .or_insert_with(|| HostScript::Values(HashMap::new()));
        if matches!(entry, HostScript::Fail(_)) {
            *entry = HostScript::Values(HashMap::new());
        }
        if let HostScript::Values(values) = entry {
            values.insert(path.to_string(), value);
        }
    }

    pub fn with_value(self, host: &str, path: &str, value: f64) -> Self {
        self.set_value(host, path, value);
        self
    }

    /// Every query against `host` fails with `error`.
    pub fn fail_host(&self, host: &str, error: SourceError) {
        self.hosts.lock().insert(host.to_lowercase(), HostScript::Fail(error));
    }

    /// Delay every answer from `host`.
    pub fn delay_host(&self, host: &str, delay: Duration) {
        self.delays.lock().insert(host.to_lowercase(), delay);
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<QueryRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl MetricSource for FakeMetricSource {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Sample>, SourceError> {
        self.calls.lock().push(request.clone());

        let host = request.host.to_lowercase();
        let delay = self.delays.lock().get(&host).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.hosts.lock().get(&host).cloned();
        let values = match script {
            Some(HostScript::Fail(e)) => return Err(e),
            Some(HostScript::Values(values)) => values,
            None => return Ok(Vec::new()),
        };

        let by_normalized: HashMap<String, f64> = values
            .iter()
            .map(|(path, value)| (normalize_path(path), *value))
            .collect();

        let prefix = format!("\\\\{}", request.host.to_uppercase());
        Ok(request
            .paths
            .iter()
            .filter_map(|path| {
                by_normalized
                    .get(&normalize_path(path))
                    .map(|value| Sample::new(&format!("{}{}", prefix, path), *value))
            })
            .collect())
    }
}
