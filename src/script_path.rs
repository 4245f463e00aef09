use crate::error::{CmdError, Result};
use std::path::{Component, Path, PathBuf};

/// Resolves script names against a fixed root directory.
///
/// Resolved paths never leave the root, whatever `..` segments or absolute
/// paths the caller supplies.
#[derive(Debug, Clone)]
pub struct ScriptPath {
    root: PathBuf,
}

impl ScriptPath {
    /// Create a resolver for `root`, which must be an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let raw = root.as_ref().to_string_lossy();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CmdError::InvalidArguments(
                "Script root must not be empty".to_string(),
            ));
        }

        let requested = PathBuf::from(trimmed);
        let root = requested
            .canonicalize()
            .map_err(|_| CmdError::ScriptRootNotFound(requested.clone()))?;
        if !root.is_dir() {
            return Err(CmdError::ScriptRootNotFound(requested));
        }

        tracing::debug!(root = %root.display(), "script root resolved");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `relative` under the root
    pub fn full_path(&self, relative: &str) -> Result<PathBuf> {
        let relative = relative.trim();
        if relative.is_empty() {
            return Err(CmdError::InvalidArguments(
                "No script specified".to_string(),
            ));
        }

        let joined = normalize(&self.root.join(relative));
        if joined == self.root || !joined.starts_with(&self.root) {
            return Err(CmdError::PathOutsideRoot(relative.to_string()));
        }
        Ok(joined)
    }
}

/// Resolve `.` and `..` lexically; the filesystem is not consulted
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        let scripts = ScriptPath::new(dir.path()).unwrap();

        let full = scripts.full_path("bin/tool.exe").unwrap();
        assert_eq!(full, scripts.root().join("bin").join("tool.exe"));

        let full = scripts.full_path(" ./bin/../run.bat ").unwrap();
        assert_eq!(full, scripts.root().join("run.bat"));
    }

    #[test]
    fn rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = ScriptPath::new(dir.path()).unwrap();

        for relative in ["../outside.exe", "bin/../../x", "..", "."] {
            assert!(
                matches!(scripts.full_path(relative), Err(CmdError::PathOutsideRoot(_))),
                "{relative} should be rejected"
            );
        }
        assert!(matches!(
            scripts.full_path("  "),
            Err(CmdError::InvalidArguments(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_paths_must_stay_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = ScriptPath::new(dir.path()).unwrap();

        assert!(scripts.full_path("/etc/passwd").is_err());
        let inside = scripts.root().join("tool");
        assert_eq!(scripts.full_path(inside.to_str().unwrap()).unwrap(), inside);
    }

    #[test]
    fn missing_root_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ScriptPath::new(&missing),
            Err(CmdError::ScriptRootNotFound(_))
        ));
        assert!(matches!(ScriptPath::new(""), Err(CmdError::InvalidArguments(_))));
    }

    #[test]
    fn file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            ScriptPath::new(&file),
            Err(CmdError::ScriptRootNotFound(_))
        ));
    }
}
