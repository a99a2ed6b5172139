//! Node path helpers.
//!
//! Paths are absolute, slash separated, without a trailing slash (except the
//! root `/` itself) and without empty segments.

use crate::{CoordinationError, Result};

/// Validate an absolute node path.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(CoordinationError::invalid_path(path, "path cannot be empty"));
    }
    if !path.starts_with('/') {
        return Err(CoordinationError::invalid_path(path, "path must start with '/'"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(CoordinationError::invalid_path(path, "path must not end with '/'"));
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() {
            return Err(CoordinationError::invalid_path(path, "empty path segment"));
        }
        if segment == "." || segment == ".." {
            return Err(CoordinationError::invalid_path(path, "relative segment"));
        }
    }
    Ok(())
}

/// Join a parent path and a child name.
///
/// ```rust
/// use warden_core::path::join_path;
///
/// assert_eq!(join_path("/utils/autoswitch", "billing"), "/utils/autoswitch/billing");
/// assert_eq!(join_path("/", "billing"), "/billing");
/// ```
pub fn join_path(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if parent.ends_with('/') {
        format!("{}{}", parent, child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Parent of a path, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a path.
pub fn node_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Every proper ancestor of `path`, outermost first, excluding the root.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut current = parent_path(path);
    while let Some(parent) = current {
        if parent == "/" {
            break;
        }
        result.push(parent);
        current = parent_path(parent);
    }
    result.reverse();
    result
}
