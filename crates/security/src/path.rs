//! Path validation: filesystem sandboxing to the workspace directory.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' is empty")]
    Empty { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `path` inside `workspace`.
///
/// Checks:
/// 1. Relative paths are joined onto the workspace; absolute paths must
///    already lie inside it
/// 2. `.` and `..` are folded lexically; a `..` that climbs above the
///    workspace root is a traversal
/// 3. If the target (or its parent) exists, its canonical form must still
///    be inside the canonical workspace, so symlinks cannot escape
///
/// Returns the joined path on success. The workspace itself is a valid
/// result (e.g. `"."`).
pub fn resolve_in_workspace(workspace: &Path, path: &str) -> Result<PathBuf, PathValidationError> {
    if path.trim().is_empty() {
        return Err(PathValidationError::Empty { path: path.into() });
    }

    let root = normalize(workspace).ok_or_else(|| PathValidationError::PathTraversal {
        path: workspace.display().to_string(),
    })?;

    let input = Path::new(path);
    let joined = if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    };

    let resolved = normalize(&joined).ok_or_else(|| PathValidationError::PathTraversal { path: path.into() })?;

    if !resolved.starts_with(&root) {
        warn!(path, workspace = %root.display(), "Rejected path outside workspace");
        return Err(PathValidationError::OutsideWorkspace { path: path.into() });
    }

    check_symlinks(&root, &resolved, path)?;
    Ok(resolved)
}

/// Display form of `path` relative to the workspace root.
pub fn relative_to_workspace(workspace: &Path, path: &Path) -> String {
    let root = normalize(workspace).unwrap_or_else(|| workspace.to_path_buf());
    path.strip_prefix(&root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Lexically fold `.` and `..`. Returns `None` if `..` would climb past the
/// first component.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

fn check_symlinks(root: &Path, resolved: &Path, raw: &str) -> Result<(), PathValidationError> {
    // The workspace may not exist yet (first run); nothing to follow then.
    let Ok(canonical_root) = root.canonicalize() else {
        return Ok(());
    };

    let existing = if resolved.exists() {
        Some(resolved)
    } else {
        resolved.parent().filter(|p| p.exists())
    };

    if let Some(target) = existing {
        let canonical = target
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: raw.into(),
                reason: e.to_string(),
            })?;
        if !canonical.starts_with(&canonical_root) {
            warn!(path = raw, "Rejected path resolving outside workspace");
            return Err(PathValidationError::OutsideWorkspace { path: raw.into() });
        }
    }
    Ok(())
}
