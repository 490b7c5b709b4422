//! Per-tenant filesystem sandboxing.
//!
//! Every path the engine (or an embedding file editor) touches for a tenant
//! goes through [`PathSandbox::resolve`]; nothing else re-implements the
//! containment check. Resolution is lexical: `.` and `..` components are
//! collapsed without consulting the filesystem, then the result is verified
//! to sit at or under the tenant's root. The containment check compares
//! whole path components, so a root of `/data/user_2` never matches
//! `/data/user_20`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::EngineError;
use crate::session::TenantId;

/// Resolves tenant-relative paths into absolute paths guaranteed to stay
/// inside that tenant's root directory.
pub struct PathSandbox {
    base_dir: PathBuf,
}

impl PathSandbox {
    /// `base_dir` is the directory under which every tenant root lives.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The tenant's private root directory, created on first use.
    pub fn tenant_root(&self, tenant: &TenantId) -> Result<PathBuf, EngineError> {
        let root = self.base_dir.join(tenant.as_str());
        fs::create_dir_all(&root)?;
        Ok(root)
    }

    /// Resolve a requested path for a tenant.
    ///
    /// Relative paths are interpreted against the tenant root; absolute
    /// paths are accepted only when already inside it. Any path that
    /// normalizes to a location outside the root is a hard [`PathEscape`]
    /// rejection, never clamped, never substituted.
    ///
    /// [`PathEscape`]: EngineError::PathEscape
    pub fn resolve(&self, tenant: &TenantId, requested: &str) -> Result<PathBuf, EngineError> {
        if requested.contains('\0') {
            return Err(EngineError::PathEscape);
        }

        let root = self.tenant_root(tenant)?;
        let requested_path = Path::new(requested);
        let joined = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            root.join(requested_path)
        };

        let normalized = normalize(&joined)?;
        if !normalized.starts_with(&root) {
            return Err(EngineError::PathEscape);
        }
        Ok(normalized)
    }
}

/// Collapse `.` and `..` components lexically. A `..` that would climb past
/// the start of the path is an escape.
fn normalize(path: &Path) -> Result<PathBuf, EngineError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping the root itself (or an empty path) means the
                // request climbs out of anything we could ever allow.
                if !out.pop() {
                    return Err(EngineError::PathEscape);
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    Ok(out)
}
