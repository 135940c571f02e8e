//! Sandboxed filesystem engine: listing, transfer, and byte-level IO.
//!
//! This module implements the daemon's core file operations:
//! - Directory listing with optional recursion and name search
//! - Move, copy, and delete with directory-merge destination rules
//! - Chunked downloads and direct create/truncate uploads
//!
//! # Security
//!
//! Every operation resolves its paths through the [`Sandbox`] first.
//! Canonicalization runs before the containment check, so `..` components
//! and symlinks cannot reach outside the configured root.

pub mod io;
pub mod listing;
pub mod sandbox;
pub mod transfer;

pub use io::UploadTracker;
pub use listing::{Entry, Lister, Listing};
pub use sandbox::{Sandbox, SandboxError};
pub use transfer::{Transferer, TransferMode};

use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy shared by every engine operation.
///
/// Each failure surfaces as exactly one of these kinds; the router maps
/// them one-to-one onto wire error codes.
#[derive(Debug, Error)]
pub enum OpError {
    /// Path is empty, outside the root, or otherwise unusable.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A directory was required but the path names something else.
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Source or target does not exist.
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    /// A directory would replace an existing file.
    #[error("cannot replace file {dest} with directory {source}")]
    KindConflict {
        /// Directory being moved or copied.
        source: PathBuf,
        /// Existing file at the destination.
        dest: PathBuf,
    },

    /// An upload chunk arrived out of sequence.
    #[error("chunk offset mismatch: expected {expected}, got {got}")]
    ChunkMismatch {
        /// Byte offset the sink was waiting for.
        expected: u64,
        /// Offset carried by the chunk.
        got: u64,
    },

    /// Underlying filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SandboxError> for OpError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::EmptyPath => OpError::InvalidPath("path is empty".to_string()),
            SandboxError::OutsideRoot(path) => {
                OpError::InvalidPath(format!("outside the root directory: {}", path.display()))
            }
            SandboxError::NotFound(path) => OpError::NotFound(path),
            SandboxError::NotADirectory(path) => OpError::NotADirectory(path),
            SandboxError::InvalidName(name) => {
                OpError::InvalidPath(format!("invalid destination name: {name}"))
            }
            SandboxError::Io(e) => OpError::Io(e),
        }
    }
}
