//! Presentation metadata carried through unchanged for dashboards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Smallest accepted graph sample window.
pub const MIN_GRAPH_SAMPLES: usize = 70;
/// Smallest accepted y-axis row count.
pub const MIN_GRAPH_ROWS: usize = 10;

/// Ascending threshold → color token table. Opaque to the engine.
pub type ColorMap = BTreeMap<i64, String>;

/// Graph display options. Values below the floors are clamped up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphOptions {
    #[serde(rename = "Samples", default = "default_samples")]
    pub samples: usize,
    #[serde(rename = "yAxisMaxRows", default = "default_rows")]
    pub y_axis_max_rows: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub colors: BTreeMap<String, String>,
    /// Any other keys, passed through as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_samples() -> usize {
    MIN_GRAPH_SAMPLES
}

fn default_rows() -> usize {
    MIN_GRAPH_ROWS
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            samples: MIN_GRAPH_SAMPLES,
            y_axis_max_rows: MIN_GRAPH_ROWS,
            colors: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl GraphOptions {
    pub fn new(samples: usize, y_axis_max_rows: usize) -> Self {
        Self {
            samples,
            y_axis_max_rows,
            ..Default::default()
        }
        .clamped()
    }

    /// Raise `samples` and `y_axis_max_rows` to their floors. Never lowers them.
    pub fn clamped(mut self) -> Self {
        self.samples = self.samples.max(MIN_GRAPH_SAMPLES);
        self.y_axis_max_rows = self.y_axis_max_rows.max(MIN_GRAPH_ROWS);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_options_clamped_up() {
        let opts = GraphOptions::new(20, 3);
        assert_eq!(opts.samples, 70);
        assert_eq!(opts.y_axis_max_rows, 10);
    }

    #[test]
    fn test_graph_options_never_lowered() {
        let opts = GraphOptions::new(120, 25);
        assert_eq!(opts.samples, 120);
        assert_eq!(opts.y_axis_max_rows, 25);
    }

    #[test]
    fn test_graph_options_from_json() {
        let opts: GraphOptions = serde_json::from_str(
            r#"{"Samples": 50, "yAxisMaxRows": 30, "colors": {"line": "green"}, "style": "bars"}"#,
        )
        .unwrap();
        let opts = opts.clamped();
        assert_eq!(opts.samples, 70);
        assert_eq!(opts.y_axis_max_rows, 30);
        assert_eq!(opts.colors.get("line").map(String::as_str), Some("green"));
        assert_eq!(opts.extra.get("style"), Some(&serde_json::json!("bars")));
    }

    #[test]
    fn test_color_map_is_ordered() {
        let raw = r#"{"80": "red", "0": "green", "50": "yellow"}"#;
        let map: ColorMap = serde_json::from_str(raw).unwrap();
        let thresholds: Vec<i64> = map.keys().copied().collect();
        assert_eq!(thresholds, vec![0, 50, 80]);
    }
}
