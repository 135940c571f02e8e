//! Move, copy, and delete inside the sandbox.
//!
//! Moves are single renames and stay atomic on one filesystem. Directory
//! copies walk the tree with an explicit stack and overwrite collisions
//! file by file; a failure mid-walk leaves the partial copy in place.
//! Deletes remove directory trees post-order. None of these operations
//! retry: a locked or vanishing file surfaces to the caller immediately.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::sandbox::{Sandbox, SandboxError};
use super::OpError;

/// Whether a transfer relocates or duplicates its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Rename the source to the destination.
    Move,
    /// Copy bytes; the source is left unchanged.
    Copy,
}

/// Move/copy/delete engine bound to a sandbox root.
pub struct Transferer {
    /// Sandbox for path validation.
    sandbox: Sandbox,
}

impl Transferer {
    /// Create a new transferer.
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// Move or copy `source` to `dest`, returning the final destination.
    ///
    /// A destination naming an existing directory receives the source
    /// inside it, under the source's base name. A directory can never
    /// replace an existing file; that is a kind conflict and nothing is
    /// touched. File-level collisions overwrite.
    pub fn transfer(
        &self,
        source: &str,
        dest: &str,
        mode: TransferMode,
    ) -> Result<PathBuf, OpError> {
        let source_path = self.sandbox.resolve(source)?;
        let source_is_dir = source_path.is_dir();

        let final_dest = self.final_destination(&source_path, dest)?;

        if final_dest == source_path {
            return Err(OpError::InvalidPath(format!(
                "source and destination are the same: {}",
                source_path.display()
            )));
        }
        if source_is_dir && final_dest.starts_with(&source_path) {
            return Err(OpError::InvalidPath(format!(
                "destination is inside the source: {}",
                final_dest.display()
            )));
        }
        if source_is_dir && final_dest.is_file() {
            return Err(OpError::KindConflict {
                source: source_path,
                dest: final_dest,
            });
        }

        match mode {
            TransferMode::Move => {
                fs::rename(&source_path, &final_dest)?;
            }
            TransferMode::Copy if source_is_dir => {
                copy_tree(&source_path, &final_dest)?;
            }
            TransferMode::Copy => {
                fs::copy(&source_path, &final_dest)?;
            }
        }

        Ok(final_dest)
    }

    /// Delete a file or a whole directory tree.
    ///
    /// A missing path is reported as such and nothing is touched.
    pub fn delete(&self, path: &str) -> Result<(), OpError> {
        let target = self.sandbox.resolve(path)?;

        if target.is_dir() {
            delete_tree(&target)
        } else {
            fs::remove_file(&target)?;
            Ok(())
        }
    }

    /// Resolve where the source should land.
    ///
    /// An existing directory destination means "place inside"; anything
    /// else is taken as the final name, provided its parent exists inside
    /// the root.
    fn final_destination(&self, source: &Path, dest: &str) -> Result<PathBuf, OpError> {
        match self.sandbox.resolve(dest) {
            Ok(existing) if existing.is_dir() => {
                let name = source.file_name().ok_or_else(|| {
                    OpError::InvalidPath(format!("source has no base name: {}", source.display()))
                })?;
                Ok(existing.join(name))
            }
            Ok(existing) => Ok(existing),
            Err(SandboxError::NotFound(_)) => Ok(self.sandbox.resolve_for_creation(dest)?),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy a directory tree with an explicit stack of source/target pairs.
///
/// Files already present at the target are overwritten. Symlinked
/// directories are not walked, so a link cycle cannot make the copy
/// unbounded.
fn copy_tree(source: &Path, dest: &Path) -> Result<(), OpError> {
    let mut stack = vec![(source.to_path_buf(), dest.to_path_buf())];

    while let Some((from, to)) = stack.pop() {
        fs::create_dir_all(&to)?;

        for entry in fs::read_dir(&from)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let target = to.join(entry.file_name());

            if file_type.is_dir() {
                stack.push((entry.path(), target));
            } else if file_type.is_symlink() && entry.path().is_dir() {
                warn!(
                    path = %entry.path().display(),
                    "skipping symlinked directory during copy"
                );
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
    }

    Ok(())
}

/// Remove a directory tree: files as they are discovered, directories in
/// reverse discovery order once their contents are gone.
fn delete_tree(root: &Path) -> Result<(), OpError> {
    let mut stack = vec![root.to_path_buf()];
    let mut directories = Vec::new();

    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            // Symlinks are removed as links, never followed.
            if entry.file_type()?.is_dir() {
                stack.push(entry.path());
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        directories.push(dir);
    }

    for dir in directories.iter().rev() {
        fs::remove_dir(dir)?;
    }

    Ok(())
}
