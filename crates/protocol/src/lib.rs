//! # Filebay Protocol Library
//!
//! This crate provides the wire-level definitions for the Filebay remote
//! file-management system.
//!
//! ## Overview
//!
//! The protocol crate is the foundation of Filebay's communication layer,
//! providing:
//!
//! - **Message Definitions**: Request/response types for listing, download,
//!   upload, delete, move, and copy operations
//! - **Entry Records**: The `FileEntry` shape shared by daemon and clients,
//!   including the `"File folder"` directory sentinel
//! - **Error Codes**: The structured error surface every failed operation
//!   reports through
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Application Messages           │  serde structs/enums
//! ├─────────────────────────────────────────┤
//! │              Envelope                   │  version + sequence
//! ├─────────────────────────────────────────┤
//! │           JSON line codec               │  one object per line
//! ├─────────────────────────────────────────┤
//! │            Transport (TCP)              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Envelope, Message};
//! use protocol::messages::ListRequest;
//!
//! // Create a listing request for the sandbox root
//! let message = Message::ListRequest(ListRequest {
//!     path: String::new(),
//!     search: None,
//!     recursive: false,
//! });
//! let envelope = Envelope::new(1, message);
//!
//! // Serialize to a JSON line for the transport
//! let line = envelope.to_json().unwrap();
//! assert!(line.contains("ListRequest"));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Protocol message definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    Envelope, ErrorCode, ErrorMessage, FileEntry, Message, DEFAULT_CHUNK_SIZE, FILE_FOLDER_KIND,
    MAX_CHUNK_SIZE, PROTOCOL_VERSION,
};
