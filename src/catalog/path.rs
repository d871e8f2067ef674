//! Query path construction and normalization.

use super::{CounterCatalog, SetType};
use thiserror::Error;

/// Path resolution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid counter id format: {0:?}")]
    MalformedId(String),
    #[error("set id {0} not found in counter catalog")]
    UnknownSetId(u32),
    #[error("path id {0} not found in counter catalog")]
    UnknownPathId(u32),
    #[error("unknown counter set type: {0:?}")]
    UnknownSetType(String),
}

/// Split a compact id such as `"238-6"` into its set and path components.
pub fn parse_counter_id(id: &str) -> Result<(u32, u32), PathError> {
    let malformed = || PathError::MalformedId(id.to_string());

    let mut parts = id.split('-');
    let (set, path) = match (parts.next(), parts.next(), parts.next()) {
        (Some(set), Some(path), None) => (set.trim(), path.trim()),
        _ => return Err(malformed()),
    };
    if set.is_empty() || path.is_empty() {
        return Err(malformed());
    }

    let set_id = set.parse().map_err(|_| malformed())?;
    let path_id = path.parse().map_err(|_| malformed())?;
    Ok((set_id, path_id))
}

/// Resolve a compact counter id into a fully qualified query path.
///
/// `SingleInstance` renders `\<set>\<path>`, `MultiInstance` renders
/// `\<set>(<instance>)\<path>`.
pub fn resolve_path(
    catalog: &CounterCatalog,
    id: &str,
    set_type: SetType,
    instance: &str,
) -> Result<String, PathError> {
    let (set_id, path_id) = parse_counter_id(id)?;

    let set_name = catalog.get(set_id).ok_or(PathError::UnknownSetId(set_id))?;
    let path_name = catalog.get(path_id).ok_or(PathError::UnknownPathId(path_id))?;

    Ok(match set_type {
        SetType::SingleInstance => format!("\\{}\\{}", set_name, path_name),
        SetType::MultiInstance => format!("\\{}({})\\{}", set_name, instance, path_name),
    })
}

/// Same as [`resolve_path`] but takes the set type as its textual tag.
pub fn resolve_path_tagged(
    catalog: &CounterCatalog,
    id: &str,
    set_type: &str,
    instance: &str,
) -> Result<String, PathError> {
    let set_type = set_type.parse()?;
    resolve_path(catalog, id, set_type, instance)
}

/// Normalize a query path for matching samples back to their metrics.
///
/// Lower-cases the path and strips a leading `\\HOST` qualifier, so
/// `\\WEB01\Memory\Available Bytes` and `\memory\available bytes` compare equal.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let local = match path.strip_prefix("\\\\") {
        Some(rest) => match rest.find('\\') {
            Some(idx) => &rest[idx..],
            None => path,
        },
        None => path,
    };
    local.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CounterCatalog {
        [(238, "Memory"), (6, "Available Bytes"), (230, "Process")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_single_instance_path() {
        let path = resolve_path(&catalog(), "238-6", SetType::SingleInstance, "").unwrap();
        assert_eq!(path, "\\Memory\\Available Bytes");
    }

    #[test]
    fn test_multi_instance_path() {
        let path = resolve_path(&catalog(), "238-6", SetType::MultiInstance, "_Total").unwrap();
        assert_eq!(path, "\\Memory(_Total)\\Available Bytes");
    }

    #[test]
    fn test_unknown_set_id() {
        let err = resolve_path(&catalog(), "999-6", SetType::SingleInstance, "").unwrap_err();
        assert_eq!(err, PathError::UnknownSetId(999));
    }

    #[test]
    fn test_unknown_path_id() {
        let err = resolve_path(&catalog(), "238-999", SetType::SingleInstance, "").unwrap_err();
        assert_eq!(err, PathError::UnknownPathId(999));
    }

    #[test]
    fn test_malformed_ids() {
        for id in ["", "238", "238-", "-6", "238-6-1", "abc-6", "238-x"] {
            assert!(
                matches!(parse_counter_id(id), Err(PathError::MalformedId(_))),
                "expected {:?} to be rejected",
                id
            );
        }
    }

    #[test]
    fn test_unknown_set_type_tag() {
        let err = resolve_path_tagged(&catalog(), "238-6", "Other", "").unwrap_err();
        assert_eq!(err, PathError::UnknownSetType("Other".to_string()));
    }

    #[test]
    fn test_normalize_strips_host_prefix() {
        assert_eq!(
            normalize_path("\\\\WEB01\\Memory\\Available Bytes"),
            "\\memory\\available bytes"
        );
        assert_eq!(normalize_path("\\Memory\\Available Bytes"), "\\memory\\available bytes");
        assert_eq!(
            normalize_path("\\\\web01.corp.local\\Process(_Total)\\% Processor Time"),
            "\\process(_total)\\% processor time"
        );
    }
}
