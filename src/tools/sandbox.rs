//! Base-directory confinement for file tools.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

use super::ToolError;

/// Root directory all file tools operate beneath.
#[derive(Clone, Debug)]
pub struct Sandbox {
    base: PathBuf,
}

impl Sandbox {
    /// Create `base` if needed and confine tools to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or resolved.
    pub fn open(base: impl AsRef<Path>) -> io::Result<Self> {
        let base = base.as_ref();
        std::fs::create_dir_all(base)?;
        Ok(Self {
            base: base.canonicalize()?,
        })
    }

    #[must_use]
    pub fn base(&self) -> &Path { &self.base }

    /// Resolve `relative` against the base directory.
    ///
    /// `..` components are collapsed lexically, then the deepest existing
    /// ancestor of the result is canonicalized so a symlink inside the base
    /// cannot lead outside it. The returned path is the lexical one.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::PathEscapes`] if the result lies outside the base,
    /// or an I/O error if an existing ancestor cannot be resolved.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, ToolError> {
        let escapes = || ToolError::PathEscapes(relative.to_owned());
        let candidate = normalize(&self.base.join(relative));
        if !candidate.starts_with(&self.base) {
            return Err(escapes());
        }
        let real = canonical_ancestor(&candidate)?;
        if real.starts_with(&self.base) {
            Ok(candidate)
        } else {
            Err(escapes())
        }
    }

    /// Forward-slash path of `path` relative to the base, `.` for the base.
    #[must_use]
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.base).unwrap_or(path);
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if joined.is_empty() { ".".to_owned() } else { joined }
    }
}

/// Canonical form of the deepest ancestor of `path` (itself included) that
/// exists.
fn canonical_ancestor(path: &Path) -> io::Result<PathBuf> {
    for ancestor in path.ancestors() {
        match ancestor.canonicalize() {
            Ok(real) => return Ok(real),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Err(io::ErrorKind::NotFound.into())
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
