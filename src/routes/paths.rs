//! Route path checks, run before paths reach the axum router.

use regex::Regex;
use std::sync::OnceLock;

/// Paths served by the common and docs routers.
pub const RESERVED_PATHS: &[&str] = &["/health", "/ready", "/version", "/_docs"];

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(/(:[A-Za-z_][A-Za-z0-9_]*|[A-Za-z0-9_.~-]+))+$").expect("static regex"))
}

/// `/segment/:param/...`: leading slash, no empty segments, no wildcards.
pub fn is_valid_path(path: &str) -> bool {
    path_re().is_match(path)
}

/// The path is, or sits under, one of [`RESERVED_PATHS`].
pub fn is_reserved(path: &str) -> bool {
    RESERVED_PATHS.iter().any(|r| {
        path.strip_prefix(r)
            .map(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(false)
    })
}

/// Reason a path cannot be routed, if any.
pub fn check_path(path: &str) -> Result<(), String> {
    if !is_valid_path(path) {
        return Err(format!("malformed path '{}'", path));
    }
    if is_reserved(path) {
        return Err(format!("path '{}' is reserved", path));
    }
    Ok(())
}

/// Two paths that share their leading segments and then bind differently
/// named parameters at the same position cannot live on one router.
pub fn params_conflict(a: &str, b: &str) -> bool {
    for (x, y) in a.split('/').zip(b.split('/')) {
        if x == y {
            continue;
        }
        return x.starts_with(':') && y.starts_with(':');
    }
    false
}
