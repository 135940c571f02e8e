//! Message router for dispatching incoming requests to the file engine.
//!
//! The router maps each request message to an engine call and each engine
//! failure to a wire error code. It never drops a connection itself;
//! malformed or unexpected messages produce an `InvalidRequest` error
//! response and the connection keeps serving.

use std::sync::Arc;

use protocol::messages::{
    Copied, Deleted, DownloadChunk, ErrorCode, ErrorMessage, Message, Moved, Pong, UploadProgress,
    UploadReady, Uploaded, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE,
};
use tracing::{debug, info, warn};

use crate::files::{io, Lister, OpError, Sandbox, Transferer, TransferMode, UploadTracker};

/// Result type for router operations.
pub type RouterResult = Result<Option<Message>, RouterError>;

/// Errors that can occur during message routing.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// File engine operation failed.
    #[error(transparent)]
    Op(#[from] OpError),

    /// Request was malformed or arrived out of protocol.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Declared upload size exceeds the configured bound.
    #[error("upload of {size} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge {
        /// Size the client declared.
        size: u64,
        /// Configured `files.max_upload_size`.
        limit: u64,
    },
}

impl RouterError {
    /// Convert the error to a protocol ErrorMessage.
    pub fn to_error_message(&self, context: Option<String>) -> ErrorMessage {
        let (code, recoverable) = match self {
            RouterError::Op(e) => match e {
                OpError::InvalidPath(_) | OpError::NotADirectory(_) => {
                    (ErrorCode::InvalidPath, false)
                }
                OpError::NotFound(_) => (ErrorCode::NotFound, false),
                OpError::KindConflict { .. } => (ErrorCode::Conflict, false),
                OpError::ChunkMismatch { .. } => (ErrorCode::InvalidRequest, false),
                OpError::Io(_) => (ErrorCode::Io, true),
            },
            RouterError::InvalidRequest(_) => (ErrorCode::InvalidRequest, false),
            RouterError::UploadTooLarge { .. } => (ErrorCode::InvalidRequest, false),
        };

        ErrorMessage {
            code,
            message: self.to_string(),
            context,
            recoverable,
        }
    }
}

/// Dispatches requests to the file engine.
///
/// The engine pieces share one sandbox; the upload tracker is behind an
/// `Arc` so the server's stale-upload sweep can hold its own handle.
pub struct Router {
    /// Sandbox for download path resolution.
    sandbox: Sandbox,
    /// Directory listing engine.
    lister: Arc<Lister>,
    /// Move/copy/delete engine.
    transferer: Arc<Transferer>,
    /// In-flight upload registry.
    uploads: Arc<UploadTracker>,
    /// Upper bound on a declared upload size.
    max_upload_size: u64,
    /// Upper bound on a download chunk, from config.
    max_chunk_size: u32,
}

impl Router {
    /// Create a router over the given sandbox and limits.
    pub fn new(sandbox: Sandbox, max_upload_size: u64, max_chunk_size: u32) -> Self {
        Self {
            lister: Arc::new(Lister::new(sandbox.clone())),
            transferer: Arc::new(Transferer::new(sandbox.clone())),
            uploads: Arc::new(UploadTracker::new(sandbox.clone())),
            sandbox,
            max_upload_size,
            max_chunk_size,
        }
    }

    /// Shared handle to the upload registry.
    pub fn uploads(&self) -> Arc<UploadTracker> {
        Arc::clone(&self.uploads)
    }

    /// Route a message to the appropriate handler.
    ///
    /// Returns `Ok(Some(response))` for requests, `Ok(None)` for messages
    /// that need no reply, or `Err(error)` if handling failed.
    pub fn handle(&self, message: Message) -> RouterResult {
        match message {
            Message::ListRequest(req) => {
                debug!(path = %req.path, search = ?req.search, recursive = req.recursive, "listing directory");

                let listing = self
                    .lister
                    .list(&req.path, req.search.as_deref(), req.recursive)?;

                Ok(Some(Message::ListResponse(
                    protocol::messages::ListResponse {
                        path: req.path,
                        file_count: listing.file_count(),
                        directory_count: listing.directory_count(),
                        entries: listing.to_protocol_entries(),
                    },
                )))
            }

            Message::DownloadRequest(req) => {
                debug!(path = %req.path, offset = req.offset, "downloading chunk");

                let path = self.sandbox.resolve(&req.path).map_err(OpError::from)?;
                let chunk_size = self.clamp_chunk(req.chunk_size);
                let (data, total_size, is_last) = io::read_chunk(&path, req.offset, chunk_size)?;

                Ok(Some(Message::DownloadChunk(DownloadChunk {
                    name: io::infer_name(&path),
                    offset: req.offset,
                    total_size,
                    data,
                    is_last,
                })))
            }

            Message::UploadStart(req) => {
                debug!(directory = %req.directory, name = %req.name, size = req.size, "starting upload");

                if req.size > self.max_upload_size {
                    return Err(RouterError::UploadTooLarge {
                        size: req.size,
                        limit: self.max_upload_size,
                    });
                }

                let dest = self.uploads.start(&req.directory, &req.name, req.size)?;

                Ok(Some(Message::UploadReady(UploadReady {
                    path: dest.display().to_string(),
                })))
            }

            Message::UploadChunk(req) => {
                let received = self.uploads.append(&req.path, req.offset, &req.data)?;

                Ok(Some(Message::UploadProgress(UploadProgress {
                    path: req.path,
                    received,
                })))
            }

            Message::UploadFinish(req) => {
                let size = self.uploads.finish(&req.path)?;
                info!(path = %req.path, size, "upload finished");

                Ok(Some(Message::Uploaded(Uploaded {
                    path: req.path,
                    size,
                })))
            }

            Message::DeleteRequest(req) => {
                self.transferer.delete(&req.path)?;
                info!(path = %req.path, "deleted");

                Ok(Some(Message::Deleted(Deleted { path: req.path })))
            }

            Message::MoveRequest(req) => {
                let dest = self
                    .transferer
                    .transfer(&req.source, &req.dest, TransferMode::Move)?;
                info!(source = %req.source, dest = %dest.display(), "moved");

                Ok(Some(Message::Moved(Moved {
                    source: req.source,
                    dest: dest.display().to_string(),
                })))
            }

            Message::CopyRequest(req) => {
                let dest = self
                    .transferer
                    .transfer(&req.source, &req.dest, TransferMode::Copy)?;
                info!(source = %req.source, dest = %dest.display(), "copied");

                Ok(Some(Message::Copied(Copied {
                    source: req.source,
                    dest: dest.display().to_string(),
                })))
            }

            Message::Ping(ping) => {
                debug!(timestamp = ping.timestamp, "ping");
                Ok(Some(Message::Pong(Pong {
                    timestamp: ping.timestamp,
                })))
            }

            Message::Error(err) => {
                // Peers report errors; replying with another error would
                // only bounce back and forth.
                warn!(code = ?err.code, message = %err.message, "error reported by peer");
                Ok(None)
            }

            // Response messages have no business arriving at the server.
            Message::ListResponse(_)
            | Message::DownloadChunk(_)
            | Message::UploadReady(_)
            | Message::UploadProgress(_)
            | Message::Uploaded(_)
            | Message::Deleted(_)
            | Message::Moved(_)
            | Message::Copied(_)
            | Message::Pong(_) => Err(RouterError::InvalidRequest(
                "response message received as request".to_string(),
            )),
        }
    }

    /// Clamp a requested download chunk size to the configured bounds.
    ///
    /// Zero means "use the default".
    fn clamp_chunk(&self, requested: u32) -> u32 {
        let size = if requested == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            requested
        };
        size.min(self.max_chunk_size).min(MAX_CHUNK_SIZE)
    }
}
