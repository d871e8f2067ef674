//! Connectivity probing for targets.
//!
//! A target is probed once at construction or on refresh; unreachable
//! targets are left out of poll cycles.

mod ping;

pub use ping::*;

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait ConnectivityProber: Send + Sync {
    /// Whether `host` answered. Never fails; errors count as unreachable.
    async fn probe(&self, host: &str) -> bool;
}

/// Prober answering from a fixed set of reachable hosts.
#[derive(Debug, Clone, Default)]
pub struct StaticProber {
    reachable: HashSet<String>,
}

impl StaticProber {
    pub fn new<I, S>(reachable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            reachable: reachable.into_iter().map(|h| h.as_ref().to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl ConnectivityProber for StaticProber {
    async fn probe(&self, host: &str) -> bool {
        self.reachable.contains(&host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_prober_is_case_insensitive() {
        let prober = StaticProber::new(["WEB01"]);
        assert!(prober.probe("web01").await);
        assert!(!prober.probe("db01").await);
    }
}
