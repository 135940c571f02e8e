//! Sandbox containment for all filesystem access.
//!
//! Every operation the daemon performs resolves its paths through a
//! [`Sandbox`] before touching the filesystem. Canonicalization happens
//! first, so `..` components and symlinks cannot escape the configured root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced while resolving a path against the sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The supplied path was empty or whitespace-only.
    #[error("path is empty")]
    EmptyPath,

    /// The path resolves outside the sandbox root.
    #[error("path is outside the root directory: {0}")]
    OutsideRoot(PathBuf),

    /// The path does not exist.
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    /// The path exists but is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The final component of a destination path is not a plain name.
    #[error("invalid destination name: {0}")]
    InvalidName(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Path sandbox anchored at a single canonical root directory.
///
/// Relative inputs are interpreted relative to the root, never the process
/// working directory. Containment is checked on canonical paths, so a
/// symlink inside the root that points outside of it is rejected.
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Canonical root. Fixed at construction.
    root: PathBuf,
    /// Compare paths case-insensitively (for roots on filesystems that do).
    case_insensitive: bool,
}

impl Sandbox {
    /// Create a sandbox rooted at `root`.
    ///
    /// The root is canonicalized once here; it must exist and be a
    /// directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        let canonical =
            fs::canonicalize(root).map_err(|e| canonicalize_error(e, root.to_path_buf()))?;

        if !canonical.is_dir() {
            return Err(SandboxError::NotADirectory(canonical));
        }

        Ok(Self {
            root: canonical,
            case_insensitive: false,
        })
    }

    /// Set whether containment comparisons fold case.
    ///
    /// Off by default: on a case-sensitive filesystem `/data/Share` and
    /// `/data/share` are different directories and are treated as such.
    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    /// The canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `candidate` lies within the root.
    ///
    /// True iff the candidate canonicalizes to the root itself or to a path
    /// under it. Empty or whitespace-only input, unresolvable paths, and
    /// paths outside the root all return false. Trailing separators do not
    /// affect the result.
    pub fn contains(&self, candidate: impl AsRef<Path>) -> bool {
        let candidate = candidate.as_ref();
        match self.canonicalize_candidate(candidate) {
            Ok(canonical) => self.is_within(&canonical),
            Err(_) => false,
        }
    }

    /// Resolve a path that must already exist, verifying containment.
    ///
    /// Returns the canonical path on success.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        let canonical = self.canonicalize_candidate(Path::new(raw))?;
        if !self.is_within(&canonical) {
            return Err(SandboxError::OutsideRoot(self.join_root(raw.trim())));
        }
        Ok(canonical)
    }

    /// Resolve a path that must be an existing directory.
    pub fn resolve_dir(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        let canonical = self.resolve(raw)?;
        if !canonical.is_dir() {
            return Err(SandboxError::NotADirectory(canonical));
        }
        Ok(canonical)
    }

    /// Resolve a destination path that may not exist yet.
    ///
    /// The parent directory must exist inside the root; the final component
    /// must be a plain name (no separators, not `.` or `..`).
    pub fn resolve_for_creation(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SandboxError::EmptyPath);
        }

        let joined = self.join_root(trimmed);
        let file_name = joined
            .file_name()
            .ok_or_else(|| SandboxError::InvalidName(trimmed.to_string()))?
            .to_os_string();

        let parent = joined
            .parent()
            .ok_or_else(|| SandboxError::InvalidName(trimmed.to_string()))?;
        let parent_canonical = fs::canonicalize(parent)
            .map_err(|e| canonicalize_error(e, parent.to_path_buf()))?;
        if !self.is_within(&parent_canonical) {
            return Err(SandboxError::OutsideRoot(parent.to_path_buf()));
        }

        self.resolve_child(&parent_canonical, &file_name.to_string_lossy())
    }

    /// Join a validated plain name onto an already-canonical directory.
    ///
    /// Used when a destination arrives as directory + name, e.g. uploads
    /// and merge-into-directory moves.
    pub fn resolve_child(&self, dir: &Path, name: &str) -> Result<PathBuf, SandboxError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SandboxError::EmptyPath);
        }
        if name.contains('/') || name.contains('\\') {
            return Err(SandboxError::InvalidName(name.to_string()));
        }
        if name == "." || name == ".." {
            return Err(SandboxError::InvalidName(name.to_string()));
        }
        Ok(dir.join(name))
    }

    /// Canonicalize a candidate, interpreting relative paths from the root.
    fn canonicalize_candidate(&self, candidate: &Path) -> Result<PathBuf, SandboxError> {
        let text = candidate.to_string_lossy();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SandboxError::EmptyPath);
        }

        let joined = self.join_root(trimmed);
        fs::canonicalize(&joined).map_err(|e| canonicalize_error(e, joined))
    }

    /// Interpret `raw` relative to the root unless it is absolute.
    fn join_root(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Prefix check on canonical paths.
    ///
    /// `starts_with` compares whole components, so `/data/share` is never
    /// treated as a prefix of `/data/share2`.
    fn is_within(&self, canonical: &Path) -> bool {
        if !self.case_insensitive {
            return canonical.starts_with(&self.root);
        }

        let fold = |path: &Path| -> Vec<String> {
            path.components()
                .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                .collect()
        };
        let root = fold(&self.root);
        let candidate = fold(canonical);
        candidate.len() >= root.len() && candidate[..root.len()] == root[..]
    }
}

fn canonicalize_error(e: io::Error, path: PathBuf) -> SandboxError {
    if e.kind() == io::ErrorKind::NotFound {
        SandboxError::NotFound(path)
    } else {
        SandboxError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn sandbox_with_tree() -> (Sandbox, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("docs/archive")).unwrap();
        fs::write(temp_dir.path().join("readme.txt"), "hello").unwrap();
        fs::write(temp_dir.path().join("docs/plan.md"), "plan").unwrap();

        let sandbox = Sandbox::new(temp_dir.path()).unwrap();
        (sandbox, temp_dir)
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = Sandbox::new(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("root.txt");
        fs::write(&file, "x").unwrap();

        let result = Sandbox::new(&file);
        assert!(matches!(result, Err(SandboxError::NotADirectory(_))));
    }

    #[test]
    fn test_contains_root_itself() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        assert!(sandbox.contains(sandbox.root().to_path_buf()));
    }

    #[test]
    fn test_contains_children() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        assert!(sandbox.contains(temp_dir.path().join("readme.txt")));
        assert!(sandbox.contains(temp_dir.path().join("docs/archive")));
    }

    #[test]
    fn test_contains_trailing_separator() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        let with_slash = format!("{}/docs/", temp_dir.path().display());
        assert!(sandbox.contains(&with_slash));
    }

    #[test]
    fn test_contains_rejects_parent_escape() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("root");
        let other = parent.path().join("other");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&other).unwrap();

        let sandbox = Sandbox::new(&root).unwrap();
        let escape = format!("{}/../other", root.display());
        assert!(!sandbox.contains(&escape));
    }

    #[test]
    fn test_contains_rejects_sibling_prefix() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("share");
        let sibling = parent.path().join("share2");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&sibling).unwrap();

        let sandbox = Sandbox::new(&root).unwrap();
        assert!(!sandbox.contains(&sibling));
    }

    #[test]
    fn test_contains_rejects_empty_and_whitespace() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        assert!(!sandbox.contains(""));
        assert!(!sandbox.contains("   "));
    }

    #[test]
    fn test_contains_rejects_missing_path() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        assert!(!sandbox.contains(temp_dir.path().join("nope.txt")));
    }

    #[test]
    fn test_relative_paths_resolve_from_root() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        let resolved = sandbox.resolve("docs/plan.md").unwrap();
        assert_eq!(
            resolved,
            fs::canonicalize(temp_dir.path().join("docs/plan.md")).unwrap()
        );
    }

    #[test]
    fn test_resolve_traversal_within_root_is_allowed() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let resolved = sandbox.resolve("docs/../readme.txt").unwrap();
        assert!(resolved.ends_with("readme.txt"));
    }

    #[test]
    fn test_resolve_missing_path() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let result = sandbox.resolve("missing.txt");
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[test]
    fn test_resolve_outside_root() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let other = TempDir::new().unwrap();
        fs::write(other.path().join("secret.txt"), "x").unwrap();

        let raw = other.path().join("secret.txt");
        let result = sandbox.resolve(&raw.to_string_lossy());
        assert!(matches!(result, Err(SandboxError::OutsideRoot(_))));
    }

    #[test]
    fn test_resolve_empty_path() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        assert!(matches!(sandbox.resolve(""), Err(SandboxError::EmptyPath)));
        assert!(matches!(sandbox.resolve("  "), Err(SandboxError::EmptyPath)));
    }

    #[test]
    fn test_resolve_dir_rejects_file() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let result = sandbox.resolve_dir("readme.txt");
        assert!(matches!(result, Err(SandboxError::NotADirectory(_))));
    }

    #[test]
    fn test_symlink_escaping_root_is_rejected() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("target.txt"), "x").unwrap();

        let link = temp_dir.path().join("link.txt");
        symlink(outside.path().join("target.txt"), &link).unwrap();

        let result = sandbox.resolve("link.txt");
        assert!(matches!(result, Err(SandboxError::OutsideRoot(_))));
        assert!(!sandbox.contains(&link));
    }

    #[test]
    fn test_symlink_inside_root_is_allowed() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        let link = temp_dir.path().join("docs-link");
        symlink(temp_dir.path().join("docs"), &link).unwrap();

        let resolved = sandbox.resolve("docs-link").unwrap();
        assert!(resolved.ends_with("docs"));
    }

    #[test]
    fn test_resolve_for_creation_new_file() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        let resolved = sandbox.resolve_for_creation("docs/new.txt").unwrap();
        assert_eq!(
            resolved,
            fs::canonicalize(temp_dir.path().join("docs")).unwrap().join("new.txt")
        );
    }

    #[test]
    fn test_resolve_for_creation_missing_parent() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let result = sandbox.resolve_for_creation("nowhere/new.txt");
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[test]
    fn test_resolve_for_creation_outside_root() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let other = TempDir::new().unwrap();
        let raw = other.path().join("new.txt");
        let result = sandbox.resolve_for_creation(&raw.to_string_lossy());
        assert!(matches!(result, Err(SandboxError::OutsideRoot(_))));
    }

    #[test]
    fn test_resolve_child_rejects_separators_and_dots() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let root = sandbox.root().to_path_buf();

        assert!(matches!(
            sandbox.resolve_child(&root, "a/b"),
            Err(SandboxError::InvalidName(_))
        ));
        assert!(matches!(
            sandbox.resolve_child(&root, "a\\b"),
            Err(SandboxError::InvalidName(_))
        ));
        assert!(matches!(
            sandbox.resolve_child(&root, ".."),
            Err(SandboxError::InvalidName(_))
        ));
        assert!(matches!(
            sandbox.resolve_child(&root, "."),
            Err(SandboxError::InvalidName(_))
        ));
        assert!(matches!(
            sandbox.resolve_child(&root, ""),
            Err(SandboxError::EmptyPath)
        ));
    }

    #[test]
    fn test_resolve_child_plain_name() {
        let (sandbox, _temp_dir) = sandbox_with_tree();
        let root = sandbox.root().to_path_buf();
        let child = sandbox.resolve_child(&root, "report.csv").unwrap();
        assert_eq!(child, root.join("report.csv"));
    }

    #[test]
    fn test_case_insensitive_flag_keeps_basic_containment() {
        let (sandbox, temp_dir) = sandbox_with_tree();
        let sandbox = sandbox.case_insensitive(true);

        assert!(sandbox.contains(sandbox.root().to_path_buf()));
        assert!(sandbox.contains(temp_dir.path().join("docs")));
        assert!(!sandbox.contains(""));
    }
}
