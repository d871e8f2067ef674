//! countertrail - batched performance counter collection.
//!
//! Polls numeric counters from many hosts, one batched query per
//! (host, credential) pair, and keeps a bounded rolling history with summary
//! statistics per counter. A failing host or counter never stops the rest.

pub mod catalog;
pub mod config;
pub mod environment;
pub mod logging;
pub mod metric;
pub mod poll;
pub mod probe;
pub mod scheduler;
pub mod source;
pub mod target;
pub mod web;

pub use catalog::{resolve_path, CounterCatalog, PathError, SetType};
pub use environment::Environment;
pub use metric::{MetricDefinition, MetricSpec, Statistics, TargetBinding};
pub use poll::{BatchDispatcher, DispatchOptions, PollError, PollOrchestrator};
pub use source::{MetricSource, Sample, SourceError};
pub use target::Target;
