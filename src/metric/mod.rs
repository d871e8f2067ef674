//! Metric definitions: one polled counter, its conversion rules, and its history.

mod conversion;
mod history;
mod presentation;

pub use conversion::*;
pub use history::*;
pub use presentation::*;

use crate::catalog::{normalize_path, resolve_path_tagged, CounterCatalog, PathError};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stored on a metric whose sample could not be converted.
pub const CONVERSION_ERROR: &str = "conversion error";
/// Stored on a metric whose path was omitted from a batch response.
pub const NO_DATA_RETURNED: &str = "no data returned";

/// Construction failure for a metric definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("invalid definition for counter {id:?}: {source}")]
    InvalidDefinition {
        id: String,
        #[source]
        source: PathError,
    },
}

/// Everything needed to construct a [`MetricDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub counter_id: String,
    pub set_type: String,
    #[serde(default)]
    pub instance: String,
    pub title: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub conversion: Conversion,
    #[serde(default)]
    pub colors: ColorMap,
    #[serde(default)]
    pub graph: GraphOptions,
    #[serde(default = "default_capacity")]
    pub history_capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl MetricSpec {
    pub fn new(counter_id: &str, set_type: &str, instance: &str, title: &str) -> Self {
        Self {
            counter_id: counter_id.to_string(),
            set_type: set_type.to_string(),
            instance: instance.to_string(),
            title: title.to_string(),
            unit: String::new(),
            kind: String::new(),
            format: String::new(),
            conversion: Conversion::default(),
            colors: ColorMap::new(),
            graph: GraphOptions::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

/// The host and access credential a metric is queried through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetBinding {
    pub host: String,
    pub credential: Option<String>,
}

impl TargetBinding {
    pub fn new(host: &str, credential: Option<&str>) -> Self {
        Self {
            host: host.to_string(),
            credential: credential.map(str::to_string),
        }
    }
}

#[derive(Debug)]
struct MetricState {
    available: bool,
    last_error: String,
    last_update: Option<DateTime<Utc>>,
    execution_duration_ms: u64,
    history: HistoryBuffer,
}

/// One counter on one target.
///
/// Identity and conversion rules are fixed at construction. Runtime state
/// sits behind a per-metric lock so concurrent batches never interleave
/// writes to the same history.
#[derive(Debug)]
pub struct MetricDefinition {
    spec: MetricSpec,
    binding: TargetBinding,
    path: String,
    normalized_path: String,
    state: Mutex<MetricState>,
}

impl MetricDefinition {
    /// Resolve the query path and build the definition.
    pub fn new(
        spec: MetricSpec,
        binding: TargetBinding,
        catalog: &CounterCatalog,
    ) -> Result<Self, DefinitionError> {
        let path = resolve_path_tagged(catalog, &spec.counter_id, &spec.set_type, &spec.instance)
            .map_err(|source| DefinitionError::InvalidDefinition {
                id: spec.counter_id.clone(),
                source,
            })?;

        Ok(Self::build(spec, binding, path, true, String::new()))
    }

    /// A definition whose path could not be resolved. It is never polled.
    pub fn unresolved(spec: MetricSpec, binding: TargetBinding, error: &DefinitionError) -> Self {
        Self::build(spec, binding, String::new(), false, error.to_string())
    }

    /// [`MetricDefinition::new`], falling back to [`MetricDefinition::unresolved`].
    pub fn resolve_or_unavailable(
        spec: MetricSpec,
        binding: TargetBinding,
        catalog: &CounterCatalog,
    ) -> Self {
        match Self::new(spec.clone(), binding.clone(), catalog) {
            Ok(metric) => metric,
            Err(e) => Self::unresolved(spec, binding, &e),
        }
    }

    fn build(
        mut spec: MetricSpec,
        binding: TargetBinding,
        path: String,
        available: bool,
        last_error: String,
    ) -> Self {
        spec.graph = spec.graph.clamped();
        let normalized_path = normalize_path(&path);
        let history = HistoryBuffer::new(spec.history_capacity);

        Self {
            spec,
            binding,
            path,
            normalized_path,
            state: Mutex::new(MetricState {
                available,
                last_error,
                last_update: None,
                execution_duration_ms: 0,
                history,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.counter_id
    }

    pub fn spec(&self) -> &MetricSpec {
        &self.spec
    }

    pub fn binding(&self) -> &TargetBinding {
        &self.binding
    }

    /// The resolved query path; empty for an unresolved definition.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn normalized_path(&self) -> &str {
        &self.normalized_path
    }

    /// Whether the query path resolved. Unresolved metrics are excluded from polling.
    pub fn is_resolved(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn title(&self) -> &str {
        &self.spec.title
    }

    pub fn unit(&self) -> &str {
        &self.spec.unit
    }

    pub fn formatted_title(&self) -> String {
        if self.spec.unit.is_empty() {
            self.spec.title.clone()
        } else {
            format!("{} ({})", self.spec.title, self.spec.unit)
        }
    }

    pub fn conversion(&self) -> &Conversion {
        &self.spec.conversion
    }

    pub fn colors(&self) -> &ColorMap {
        &self.spec.colors
    }

    pub fn graph_options(&self) -> &GraphOptions {
        &self.spec.graph
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().available
    }

    pub fn last_error(&self) -> String {
        self.state.lock().last_error.clone()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_update
    }

    pub fn execution_duration_ms(&self) -> u64 {
        self.state.lock().execution_duration_ms
    }

    /// Append an already converted value and recompute statistics.
    pub fn add_data_point(&self, value: f64, timestamp: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.history.push(HistoryPoint { timestamp, value });
        state.last_update = Some(timestamp);
    }

    /// Convert a raw sample and append it.
    ///
    /// On conversion failure the history is left untouched and the metric's
    /// last error becomes [`CONVERSION_ERROR`].
    pub fn record_sample(
        &self,
        raw: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<f64, ConversionError> {
        let mut state = self.state.lock();
        match self.spec.conversion.apply(raw) {
            Ok(value) => {
                state.history.push(HistoryPoint { timestamp, value });
                state.last_update = Some(timestamp);
                state.available = true;
                state.last_error.clear();
                Ok(value)
            }
            Err(e) => {
                state.last_error = CONVERSION_ERROR.to_string();
                Err(e)
            }
        }
    }

    pub fn record_no_data(&self) {
        self.state.lock().last_error = NO_DATA_RETURNED.to_string();
    }

    /// The whole batch failed: mark unavailable until a sample arrives again.
    pub fn record_batch_failure(&self, message: &str) {
        let mut state = self.state.lock();
        state.available = false;
        state.last_error = message.to_string();
    }

    pub fn set_execution_duration(&self, duration_ms: u64) {
        self.state.lock().execution_duration_ms = duration_ms;
    }

    pub fn statistics(&self) -> Option<Statistics> {
        self.state.lock().history.statistics().cloned()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn history_with_timestamps(&self) -> Vec<HistoryPoint> {
        self.state.lock().history.points()
    }

    /// The most recent `samples` values, zero-padded on the left.
    pub fn graph_data(&self, samples: usize) -> Vec<f64> {
        self.state.lock().history.graph_data(samples)
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let state = self.state.lock();
        MetricSnapshot {
            id: self.spec.counter_id.clone(),
            title: self.formatted_title(),
            unit: self.spec.unit.clone(),
            path: self.path.clone(),
            host: self.binding.host.clone(),
            available: state.available,
            last_error: state.last_error.clone(),
            last_update: state.last_update,
            execution_duration_ms: state.execution_duration_ms,
            statistics: state.history.statistics().cloned(),
            graph: state.history.graph_data(self.spec.graph.samples),
            colors: self.spec.colors.clone(),
            graph_options: self.spec.graph.clone(),
        }
    }
}

impl fmt::Display for MetricDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PerformanceCounter: {} - Available: {} - Data Points: {}",
            self.spec.title,
            self.is_available(),
            self.history_len()
        )
    }
}

/// Read-only projection of a metric for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub id: String,
    pub title: String,
    pub unit: String,
    pub path: String,
    pub host: String,
    pub available: bool,
    pub last_error: String,
    pub last_update: Option<DateTime<Utc>>,
    pub execution_duration_ms: u64,
    pub statistics: Option<Statistics>,
    pub graph: Vec<f64>,
    pub colors: ColorMap,
    pub graph_options: GraphOptions,
}
