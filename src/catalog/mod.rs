//! Counter catalog and path resolution.
//!
//! The catalog maps the numeric ids used in compact counter ids (`"238-6"`)
//! to the set and counter names understood by the remote metric source.

mod path;

pub use path::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Read-only id → name mapping, shared freely once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterCatalog {
    names: HashMap<u32, String>,
}

impl CounterCatalog {
    pub fn new(names: HashMap<u32, String>) -> Self {
        Self { names }
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(u32, S)> for CounterCatalog {
    fn from_iter<I: IntoIterator<Item = (u32, S)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(|(id, name)| (id, name.into())).collect(),
        }
    }
}

/// Whether a counter set exposes one value or one value per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetType {
    SingleInstance,
    MultiInstance,
}

impl FromStr for SetType {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SingleInstance" => Ok(SetType::SingleInstance),
            "MultiInstance" => Ok(SetType::MultiInstance),
            other => Err(PathError::UnknownSetType(other.to_string())),
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetType::SingleInstance => f.write_str("SingleInstance"),
            SetType::MultiInstance => f.write_str("MultiInstance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_type_parse() {
        assert_eq!("SingleInstance".parse::<SetType>().unwrap(), SetType::SingleInstance);
        assert_eq!("MultiInstance".parse::<SetType>().unwrap(), SetType::MultiInstance);
        assert!(matches!(
            "singleinstance".parse::<SetType>(),
            Err(PathError::UnknownSetType(_))
        ));
    }

    #[test]
    fn test_catalog_from_json() {
        let catalog: CounterCatalog =
            serde_json::from_str(r#"{"238": "Memory", "6": "Available Bytes"}"#).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(238), Some("Memory"));
        assert_eq!(catalog.get(7), None);
    }
}
