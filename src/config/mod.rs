//! Configuration module for countertrail.
//!
//! Runtime settings come from environment variables with sensible defaults;
//! counters, targets and environments come from the collector file.

mod file;

pub use file::*;

use crate::poll::DispatchOptions;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the scheduler groups work per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// One loop per environment on its own interval.
    PerEnvironment,
    /// One loop over all environments, querying shared counters once.
    Flat,
}

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// HTTP port for the snapshot API (default: 8080)
    pub http_port: u16,
    /// Collector file path (default: "countertrail.json")
    pub config_path: PathBuf,
    /// Per-batch deadline; `None` disables it (default: 30s)
    pub query_timeout: Option<Duration>,
    /// Samples requested per path (default: 1)
    pub max_samples: u32,
    /// Batches in flight at once; `None` is unbounded (default)
    pub max_concurrency: Option<usize>,
    pub poll_mode: PollMode,
    /// Optional file log backend
    pub log_file: Option<PathBuf>,
    /// Metric agent scheme and port (default: http, 9182)
    pub source_scheme: String,
    pub source_port: u16,
    /// Connectivity probe timeout (default: 2s)
    pub probe_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            config_path: PathBuf::from("countertrail.json"),
            query_timeout: Some(Duration::from_secs(30)),
            max_samples: 1,
            max_concurrency: None,
            poll_mode: PollMode::PerEnvironment,
            log_file: None,
            source_scheme: "http".to_string(),
            source_port: 9182,
            probe_timeout: Duration::from_secs(2),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.parse().ok())
}

impl CollectorConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `COUNTERTRAIL_HTTP_PORT`: snapshot API port
    /// - `COUNTERTRAIL_CONFIG_PATH`: collector file
    /// - `COUNTERTRAIL_QUERY_TIMEOUT_SECS`: batch deadline, `0` disables it
    /// - `COUNTERTRAIL_MAX_SAMPLES`: samples per path
    /// - `COUNTERTRAIL_MAX_CONCURRENCY`: batch fan-out bound, `0` is unbounded
    /// - `COUNTERTRAIL_POLL_MODE`: `environment` or `flat`
    /// - `COUNTERTRAIL_LOG_FILE`: also log to this file
    /// - `COUNTERTRAIL_SOURCE_SCHEME` / `COUNTERTRAIL_SOURCE_PORT`: metric agent endpoint
    /// - `COUNTERTRAIL_PROBE_TIMEOUT_SECS`: connectivity probe timeout
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = parsed::<u16>(&lookup, "COUNTERTRAIL_HTTP_PORT") {
            cfg.http_port = port;
        }
        if let Some(path) = lookup("COUNTERTRAIL_CONFIG_PATH") {
            cfg.config_path = PathBuf::from(path);
        }
        if let Some(secs) = parsed::<u64>(&lookup, "COUNTERTRAIL_QUERY_TIMEOUT_SECS") {
            cfg.query_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(n) = parsed::<u32>(&lookup, "COUNTERTRAIL_MAX_SAMPLES") {
            cfg.max_samples = n.max(1);
        }
        if let Some(n) = parsed::<usize>(&lookup, "COUNTERTRAIL_MAX_CONCURRENCY") {
            cfg.max_concurrency = (n > 0).then_some(n);
        }
        if let Some(mode) = lookup("COUNTERTRAIL_POLL_MODE") {
            match mode.to_lowercase().as_str() {
                "flat" => cfg.poll_mode = PollMode::Flat,
                "environment" => cfg.poll_mode = PollMode::PerEnvironment,
                _ => {}
            }
        }
        if let Some(path) = lookup("COUNTERTRAIL_LOG_FILE").filter(|p| !p.is_empty()) {
            cfg.log_file = Some(PathBuf::from(path));
        }
        if let Some(scheme) = lookup("COUNTERTRAIL_SOURCE_SCHEME") {
            cfg.source_scheme = scheme;
        }
        if let Some(port) = parsed::<u16>(&lookup, "COUNTERTRAIL_SOURCE_PORT") {
            cfg.source_port = port;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "COUNTERTRAIL_PROBE_TIMEOUT_SECS") {
            cfg.probe_timeout = Duration::from_secs(secs.max(1));
        }

        cfg
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            max_samples: self.max_samples,
            timeout: self.query_timeout,
            max_concurrency: self.max_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> CollectorConfig {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        CollectorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = CollectorConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.config_path, PathBuf::from("countertrail.json"));
        assert_eq!(cfg.query_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.poll_mode, PollMode::PerEnvironment);
    }

    #[test]
    fn test_overrides() {
        let cfg = from_pairs(&[
            ("COUNTERTRAIL_HTTP_PORT", "9000"),
            ("COUNTERTRAIL_QUERY_TIMEOUT_SECS", "0"),
            ("COUNTERTRAIL_MAX_CONCURRENCY", "16"),
            ("COUNTERTRAIL_POLL_MODE", "FLAT"),
            ("COUNTERTRAIL_LOG_FILE", "/tmp/ct.log"),
        ]);
        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.query_timeout, None);
        assert_eq!(cfg.max_concurrency, Some(16));
        assert_eq!(cfg.poll_mode, PollMode::Flat);
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/ct.log")));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let cfg = from_pairs(&[
            ("COUNTERTRAIL_HTTP_PORT", "not-a-port"),
            ("COUNTERTRAIL_POLL_MODE", "sometimes"),
            ("COUNTERTRAIL_MAX_SAMPLES", "0"),
        ]);
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.poll_mode, PollMode::PerEnvironment);
        assert_eq!(cfg.max_samples, 1);
    }

    #[test]
    fn test_dispatch_options() {
        let cfg = from_pairs(&[("COUNTERTRAIL_MAX_SAMPLES", "3")]);
        let opts = cfg.dispatch_options();
        assert_eq!(opts.max_samples, 3);
        assert_eq!(opts.timeout, Some(Duration::from_secs(30)));
        assert_eq!(opts.max_concurrency, None);
    }
}
