//! Collector file: counter catalog, counter templates, and environments.

use crate::catalog::CounterCatalog;
use crate::environment::Environment;
use crate::logging::Logger;
use crate::metric::{MetricDefinition, MetricSpec, TargetBinding};
use crate::target::Target;

use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read collector file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse collector file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("server {host:?} references unknown counter {counter:?}")]
    UnknownCounter { host: String, counter: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorFile {
    pub catalog: CounterCatalog,
    /// Credential reference → bearer token for the metric agents.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    /// Named counter templates.
    #[serde(default)]
    pub counters: HashMap<String, MetricSpec>,
    #[serde(default)]
    pub environments: Vec<EnvironmentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

fn default_interval() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub host: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub counters: Vec<String>,
}

impl CollectorFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Materialize environments, targets and metric definitions.
    ///
    /// Each environment gets its own targets holding only the counters it
    /// lists. A counter on the same (host, credential) is one shared
    /// definition across environments, so a flat poll queries it once.
    pub fn build(&self, logger: &Logger) -> Result<Vec<Arc<Environment>>, ConfigError> {
        let mut definitions: HashMap<(ServerKey, &str), Arc<MetricDefinition>> = HashMap::new();
        let mut environments = Vec::with_capacity(self.environments.len());

        for entry in &self.environments {
            let mut members = Vec::new();
            for (server, counters) in merge_servers(&entry.servers) {
                let key = server_key(server);
                let mut metrics = Vec::with_capacity(counters.len());
                for name in counters {
                    let metric = match definitions.entry((key.clone(), name)) {
                        Entry::Occupied(e) => e.get().clone(),
                        Entry::Vacant(e) => {
                            let metric = self.define(server, name, logger)?;
                            e.insert(Arc::new(metric)).clone()
                        }
                    };
                    metrics.push(metric);
                }
                let target = Target::new(
                    &server.host,
                    &server.comment,
                    server.credential.as_deref(),
                    metrics,
                );
                members.push(Arc::new(target));
            }

            logger.info(&format!(
                "Environment '{}' initialized with {} servers",
                entry.name,
                members.len()
            ));
            environments.push(Arc::new(Environment::new(
                &entry.name,
                &entry.description,
                Duration::from_secs(entry.interval_secs),
                members,
            )));
        }

        Ok(environments)
    }

    fn define(
        &self,
        server: &ServerEntry,
        name: &str,
        logger: &Logger,
    ) -> Result<MetricDefinition, ConfigError> {
        let spec = self.counters.get(name).ok_or_else(|| ConfigError::UnknownCounter {
            host: server.host.clone(),
            counter: name.to_string(),
        })?;
        let binding = TargetBinding::new(&server.host, server.credential.as_deref());
        Ok(match MetricDefinition::new(spec.clone(), binding.clone(), &self.catalog) {
            Ok(metric) => metric,
            Err(e) => {
                logger.warning(&format!(
                    "Counter '{}' on '{}' is not available: {}",
                    spec.title, server.host, e
                ));
                MetricDefinition::unresolved(spec.clone(), binding, &e)
            }
        })
    }
}

type ServerKey = (String, Option<String>);

fn server_key(server: &ServerEntry) -> ServerKey {
    (server.host.to_lowercase(), server.credential.clone())
}

/// Collapse repeated (host, credential) entries of one environment, keeping
/// first-seen order and each distinct counter name once.
fn merge_servers(servers: &[ServerEntry]) -> Vec<(&ServerEntry, Vec<&str>)> {
    let mut merged: Vec<(&ServerEntry, Vec<&str>)> = Vec::new();
    let mut index: HashMap<ServerKey, usize> = HashMap::new();
    for server in servers {
        let slot = *index.entry(server_key(server)).or_insert_with(|| {
            merged.push((server, Vec::new()));
            merged.len() - 1
        });
        let counters = &mut merged[slot].1;
        for name in &server.counters {
            if !counters.contains(&name.as_str()) {
                counters.push(name);
            }
        }
    }
    merged
}
