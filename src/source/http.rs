//! HTTP/JSON metric source.
//!
//! Each host runs a small agent answering `POST /counters/query` with the
//! cooked values of the requested counter paths.

use super::{MetricSource, QueryRequest, Sample, SourceError};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    paths: &'a [String],
    max_samples: u32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    samples: Vec<Sample>,
}

/// Metric source talking to per-host HTTP agents.
#[derive(Debug, Clone)]
pub struct HttpMetricSource {
    client: reqwest::Client,
    scheme: String,
    port: u16,
    /// Credential reference → bearer token.
    credentials: HashMap<String, String>,
}

impl HttpMetricSource {
    pub fn new(
        scheme: &str,
        port: u16,
        credentials: HashMap<String, String>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            scheme: scheme.to_string(),
            port,
            credentials,
        })
    }

    fn endpoint(&self, host: &str) -> String {
        format!("{}://{}:{}/counters/query", self.scheme, host, self.port)
    }

    fn token(&self, credential: Option<&str>) -> Result<Option<&str>, SourceError> {
        match credential {
            None => Ok(None),
            Some(name) => self
                .credentials
                .get(name)
                .map(|t| Some(t.as_str()))
                .ok_or_else(|| {
                    SourceError::Auth(format!("unknown credential reference: {}", name))
                }),
        }
    }
}

#[async_trait]
impl MetricSource for HttpMetricSource {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Sample>, SourceError> {
        let token = self.token(request.credential.as_deref())?;

        let mut builder = self.client.post(self.endpoint(&request.host)).json(&QueryBody {
            paths: &request.paths,
            max_samples: request.max_samples,
        });
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            match (e.is_timeout(), request.timeout) {
                (true, Some(timeout)) => SourceError::Timeout(timeout),
                _ => SourceError::Transport(e.to_string()),
            }
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::Auth(format!(
                    "{} rejected credentials ({})",
                    request.host,
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(SourceError::Transport(format!("{} returned {}", request.host, status)));
            }
            _ => {}
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Protocol(e.to_string()))?;

        Ok(body.samples)
    }
}
