//! Protocol message definitions for Filebay.
//!
//! This module defines all request and response types exchanged between the
//! daemon and clients. Messages travel as JSON, one envelope per line; binary
//! chunk payloads are base64-encoded strings inside the JSON.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default chunk size for file transfers (64KB).
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Maximum chunk size for file transfers (1MB).
pub const MAX_CHUNK_SIZE: u32 = 1024 * 1024;

/// Kind label carried by directory entries.
///
/// Clients key off this exact string to tell directories from files, so it is
/// part of the wire contract rather than a display detail.
pub const FILE_FOLDER_KIND: &str = "File folder";

/// Envelope wrapper for all protocol messages.
///
/// The envelope provides versioning and sequence numbers for message ordering
/// and compatibility checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for compatibility checking.
    pub version: u8,
    /// Sequence number correlating responses to requests.
    pub sequence: u64,
    /// The actual message payload.
    pub payload: Message,
}

impl Envelope {
    /// Create a new envelope with the current protocol version.
    pub fn new(sequence: u64, payload: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequence,
            payload,
        }
    }
}

/// Top-level message enum containing all message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    // Listing messages
    /// Request to list a directory, optionally filtered and recursive.
    ListRequest(ListRequest),
    /// Response with a directory listing and its counts.
    ListResponse(ListResponse),

    // Transfer messages
    /// Request one chunk of a file download.
    DownloadRequest(DownloadRequest),
    /// Chunk of downloaded file data.
    DownloadChunk(DownloadChunk),
    /// Start a file upload.
    UploadStart(UploadStart),
    /// Upload destination is open and ready for chunks.
    UploadReady(UploadReady),
    /// Chunk of uploaded file data.
    UploadChunk(UploadChunk),
    /// Acknowledgement of a received upload chunk.
    UploadProgress(UploadProgress),
    /// Finish a file upload.
    UploadFinish(UploadFinish),
    /// Upload completed and flushed.
    Uploaded(Uploaded),

    // Management messages
    /// Request to delete a file or directory tree.
    DeleteRequest(DeleteRequest),
    /// Deletion succeeded.
    Deleted(Deleted),
    /// Request to move a file or directory.
    MoveRequest(MoveRequest),
    /// Move succeeded.
    Moved(Moved),
    /// Request to copy a file or directory tree.
    CopyRequest(CopyRequest),
    /// Copy succeeded.
    Copied(Copied),

    // Control messages
    /// Ping for connectivity checks.
    Ping(Ping),
    /// Pong response to ping.
    Pong(Pong),
    /// Error message.
    Error(ErrorMessage),
}

// ============================================================================
// Listing Messages
// ============================================================================

/// Request to list a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Path to list. An empty string means the configured root.
    pub path: String,
    /// Optional case-insensitive substring filter on entry names.
    pub search: Option<String>,
    /// Recurse into subdirectories.
    pub recursive: bool,
}

/// Response with directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Path that was listed.
    pub path: String,
    /// Entries, directories first, each set sorted by full path.
    pub entries: Vec<FileEntry>,
    /// Number of files after filtering.
    pub file_count: usize,
    /// Number of directories after filtering.
    pub directory_count: usize,
}

/// A single file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Absolute path of the containing directory.
    pub folder: String,
    /// Size in bytes. `None` for directories.
    pub size: Option<u64>,
    /// Kind label: [`FILE_FOLDER_KIND`] for directories, an
    /// extension-derived label for files.
    pub kind: String,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
    /// Absolute path of the entry itself.
    pub full_path: String,
}

impl FileEntry {
    /// Whether this entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == FILE_FOLDER_KIND
    }
}

// ============================================================================
// Transfer Messages
// ============================================================================

/// Request one chunk of a file download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Path to download.
    pub path: String,
    /// Starting offset (for resuming).
    pub offset: u64,
    /// Maximum chunk size.
    pub chunk_size: u32,
}

/// Chunk of downloaded file data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadChunk {
    /// Filename inferred from the downloaded path.
    pub name: String,
    /// Offset of this chunk.
    pub offset: u64,
    /// Total file size.
    pub total_size: u64,
    /// The chunk data.
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
    /// Whether this is the last chunk.
    pub is_last: bool,
}

/// Start a file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStart {
    /// Destination directory inside the root.
    pub directory: String,
    /// Name of the file to create.
    pub name: String,
    /// Total file size.
    pub size: u64,
}

/// Upload destination is open and ready for chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReady {
    /// Resolved destination path; clients send it back in every chunk.
    pub path: String,
}

/// Chunk of uploaded file data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadChunk {
    /// Destination path from [`UploadReady`].
    pub path: String,
    /// Offset of this chunk.
    pub offset: u64,
    /// The chunk data.
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
}

/// Acknowledgement of a received upload chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    /// Destination path.
    pub path: String,
    /// Total bytes received so far.
    pub received: u64,
}

/// Finish a file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFinish {
    /// Destination path.
    pub path: String,
}

/// Upload completed and flushed to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uploaded {
    /// Destination path.
    pub path: String,
    /// Final size in bytes.
    pub size: u64,
}

// ============================================================================
// Management Messages
// ============================================================================

/// Request to delete a file or directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Path to delete.
    pub path: String,
}

/// Deletion succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    /// Path that was deleted.
    pub path: String,
}

/// Request to move a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Source path.
    pub source: String,
    /// Destination path or existing destination directory.
    pub dest: String,
}

/// Move succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moved {
    /// Original source path.
    pub source: String,
    /// Final destination path after directory-merge resolution.
    pub dest: String,
}

/// Request to copy a file or directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRequest {
    /// Source path.
    pub source: String,
    /// Destination path or existing destination directory.
    pub dest: String,
}

/// Copy succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Copied {
    /// Original source path.
    pub source: String,
    /// Final destination path after directory-merge resolution.
    pub dest: String,
}

// ============================================================================
// Control Messages
// ============================================================================

/// Ping for connectivity checks and latency measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Timestamp when ping was sent (for latency calculation).
    pub timestamp: u64,
}

/// Pong response to ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Original timestamp from ping.
    pub timestamp: u64,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Optional context (operation name, offending path).
    pub context: Option<String>,
    /// Whether retrying the same request may succeed.
    pub recoverable: bool,
}

/// Error codes for common error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Path is empty, outside the root, or otherwise unusable.
    InvalidPath,
    /// Source or target does not exist.
    NotFound,
    /// Operation would place a directory onto an existing file.
    Conflict,
    /// Underlying filesystem operation failed.
    Io,
    /// Malformed or unexpected request.
    InvalidRequest,
    /// Server-side error.
    Internal,
}

// ============================================================================
// Serialization helpers
// ============================================================================

impl Envelope {
    /// Serialize the envelope to a JSON string (no trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize an envelope from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Verify the envelope speaks the protocol version this build implements.
    pub fn check_version(&self) -> Result<(), ProtocolError> {
        if self.version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                got: self.version,
            })
        }
    }
}

/// Serde adapter encoding byte payloads as base64 strings in JSON.
mod base64_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to test roundtrip serialization
    fn roundtrip_envelope(msg: Message) {
        let envelope = Envelope::new(42, msg);
        let json = envelope.to_json().expect("serialization failed");
        let decoded = Envelope::from_json(&json).expect("deserialization failed");
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_envelope_version() {
        let envelope = Envelope::new(1, Message::Ping(Ping { timestamp: 12345 }));
        assert_eq!(envelope.version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_envelope_sequence() {
        let envelope = Envelope::new(999, Message::Ping(Ping { timestamp: 0 }));
        assert_eq!(envelope.sequence, 999);
    }

    #[test]
    fn test_check_version() {
        let mut envelope = Envelope::new(1, Message::Ping(Ping { timestamp: 0 }));
        assert!(envelope.check_version().is_ok());

        envelope.version = PROTOCOL_VERSION + 1;
        let err = envelope.check_version().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                got,
            } if got == PROTOCOL_VERSION + 1
        ));
    }

    #[test]
    fn test_message_is_internally_tagged() {
        let envelope = Envelope::new(7, Message::Ping(Ping { timestamp: 1 }));
        let value: serde_json::Value =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["payload"]["type"], "Ping");
        assert_eq!(value["payload"]["data"]["timestamp"], 1);
    }

    // Listing message roundtrip tests

    #[test]
    fn test_list_request_roundtrip() {
        roundtrip_envelope(Message::ListRequest(ListRequest {
            path: "reports/2024".to_string(),
            search: Some("invoice".to_string()),
            recursive: true,
        }));
    }

    #[test]
    fn test_list_request_empty_path_roundtrip() {
        roundtrip_envelope(Message::ListRequest(ListRequest {
            path: String::new(),
            search: None,
            recursive: false,
        }));
    }

    #[test]
    fn test_list_response_roundtrip() {
        roundtrip_envelope(Message::ListResponse(ListResponse {
            path: "/srv/share".to_string(),
            entries: vec![
                FileEntry {
                    name: "docs".to_string(),
                    folder: "/srv/share".to_string(),
                    size: None,
                    kind: FILE_FOLDER_KIND.to_string(),
                    modified: 1704067200,
                    full_path: "/srv/share/docs".to_string(),
                },
                FileEntry {
                    name: "notes.txt".to_string(),
                    folder: "/srv/share".to_string(),
                    size: Some(1024),
                    kind: "Text document".to_string(),
                    modified: 1704067200,
                    full_path: "/srv/share/notes.txt".to_string(),
                },
            ],
            file_count: 1,
            directory_count: 1,
        }));
    }

    #[test]
    fn test_file_entry_directory_sentinel() {
        let dir = FileEntry {
            name: "docs".to_string(),
            folder: "/srv/share".to_string(),
            size: None,
            kind: FILE_FOLDER_KIND.to_string(),
            modified: 0,
            full_path: "/srv/share/docs".to_string(),
        };
        assert!(dir.is_directory());

        let file = FileEntry {
            kind: "PNG image".to_string(),
            size: Some(512),
            ..dir
        };
        assert!(!file.is_directory());
    }

    // Transfer message roundtrip tests

    #[test]
    fn test_download_request_roundtrip() {
        roundtrip_envelope(Message::DownloadRequest(DownloadRequest {
            path: "reports/q3.pdf".to_string(),
            offset: 65536,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }));
    }

    #[test]
    fn test_download_chunk_roundtrip() {
        roundtrip_envelope(Message::DownloadChunk(DownloadChunk {
            name: "q3.pdf".to_string(),
            offset: 0,
            total_size: 4096,
            data: vec![0u8, 1, 2, 255, 254, 253],
            is_last: false,
        }));
    }

    #[test]
    fn test_download_chunk_data_is_base64_string() {
        let envelope = Envelope::new(
            3,
            Message::DownloadChunk(DownloadChunk {
                name: "a.bin".to_string(),
                offset: 0,
                total_size: 3,
                data: vec![1, 2, 3],
                is_last: true,
            }),
        );
        let value: serde_json::Value =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert!(value["payload"]["data"]["data"].is_string());
    }

    #[test]
    fn test_upload_start_roundtrip() {
        roundtrip_envelope(Message::UploadStart(UploadStart {
            directory: "incoming".to_string(),
            name: "report.csv".to_string(),
            size: 2048,
        }));
    }

    #[test]
    fn test_upload_chunk_roundtrip() {
        roundtrip_envelope(Message::UploadChunk(UploadChunk {
            path: "/srv/share/incoming/report.csv".to_string(),
            offset: 1024,
            data: b"col1,col2\n1,2\n".to_vec(),
        }));
    }

    #[test]
    fn test_upload_finish_roundtrip() {
        roundtrip_envelope(Message::UploadFinish(UploadFinish {
            path: "/srv/share/incoming/report.csv".to_string(),
        }));
    }

    #[test]
    fn test_uploaded_roundtrip() {
        roundtrip_envelope(Message::Uploaded(Uploaded {
            path: "/srv/share/incoming/report.csv".to_string(),
            size: 2048,
        }));
    }

    // Management message roundtrip tests

    #[test]
    fn test_delete_request_roundtrip() {
        roundtrip_envelope(Message::DeleteRequest(DeleteRequest {
            path: "old/backup.tar".to_string(),
        }));
    }

    #[test]
    fn test_move_request_roundtrip() {
        roundtrip_envelope(Message::MoveRequest(MoveRequest {
            source: "drafts/plan.md".to_string(),
            dest: "published".to_string(),
        }));
    }

    #[test]
    fn test_copy_request_roundtrip() {
        roundtrip_envelope(Message::CopyRequest(CopyRequest {
            source: "templates".to_string(),
            dest: "projects/new-site".to_string(),
        }));
    }

    // Control message roundtrip tests

    #[test]
    fn test_ping_pong_roundtrip() {
        roundtrip_envelope(Message::Ping(Ping { timestamp: 1704067200 }));
        roundtrip_envelope(Message::Pong(Pong { timestamp: 1704067200 }));
    }

    #[test]
    fn test_error_message_roundtrip() {
        roundtrip_envelope(Message::Error(ErrorMessage {
            code: ErrorCode::NotFound,
            message: "path does not exist".to_string(),
            context: Some("delete /srv/share/missing.txt".to_string()),
            recoverable: false,
        }));
    }

    #[test]
    fn test_error_codes_roundtrip() {
        for code in [
            ErrorCode::InvalidPath,
            ErrorCode::NotFound,
            ErrorCode::Conflict,
            ErrorCode::Io,
            ErrorCode::InvalidRequest,
            ErrorCode::Internal,
        ] {
            roundtrip_envelope(Message::Error(ErrorMessage {
                code,
                message: "test".to_string(),
                context: None,
                recoverable: matches!(code, ErrorCode::Io),
            }));
        }
    }
}
