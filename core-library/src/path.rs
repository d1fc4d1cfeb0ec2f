//! Canonical path keys.
//!
//! Tracks and folders are identified by a *safe path*: a normalized,
//! lowercase form of the filesystem path, so that two spellings of the same
//! file (mixed separators, `.` components, different casing on
//! case-insensitive volumes) collapse to a single catalog row.

/// Canonicalize `path` into its safe-path key.
///
/// - `\` becomes `/`
/// - empty and `.` components are dropped
/// - trailing separators are trimmed
/// - the result is lowercased
///
/// A leading `/` (Unix root) or `//` (UNC share) prefix is preserved.
pub fn safe_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");

    let prefix = if unified.starts_with("//") {
        "//"
    } else if unified.starts_with('/') {
        "/"
    } else {
        ""
    };

    let body = unified
        .split('/')
        .filter(|component| !component.is_empty() && *component != ".")
        .collect::<Vec<_>>()
        .join("/");

    format!("{prefix}{body}").to_lowercase()
}

/// Whether `candidate` (a safe path) lies inside `folder` (a safe path).
pub fn is_within(candidate: &str, folder: &str) -> bool {
    let folder = folder.trim_end_matches('/');
    candidate.len() > folder.len()
        && candidate.starts_with(folder)
        && candidate.as_bytes()[folder.len()] == b'/'
}
