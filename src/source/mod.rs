//! Remote metric source interface.
//!
//! A source executes one batched query against a host and returns the raw
//! samples it could read. Paths it cannot read are omitted from the result
//! instead of failing the whole call.

mod fake;
mod http;

pub use fake::*;
pub use http::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Source error types. Any of these fails the whole batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("access denied: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Protocol(String),
}

/// A raw sample as reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub path: String,
    pub value: f64,
}

impl Sample {
    pub fn new(path: &str, value: f64) -> Self {
        Self {
            path: path.to_string(),
            value,
        }
    }
}

/// One batched query against one target.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub host: String,
    pub credential: Option<String>,
    pub paths: Vec<String>,
    pub max_samples: u32,
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Sample>, SourceError>;
}
