//! # Filebay Daemon Library
//!
//! This crate provides the daemon (server) functionality for Filebay,
//! exposing one directory tree for remote file management.
//!
//! ## Overview
//!
//! The daemon runs on the machine whose files you want to reach. Every
//! operation is confined to a single configured root directory:
//!
//! - **Sandboxed Paths**: canonicalization plus a prefix check on every request
//! - **Listing**: directory listings with name search and optional recursion
//! - **Chunked Transfers**: client-driven downloads and acknowledged uploads
//! - **Tree Operations**: move, copy, and delete for files and directories
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            TCP JSON-line server               │
//! ├───────────────────────────────────────────────┤
//! │                   Router                      │
//! ├──────────────┬──────────────┬─────────────────┤
//! │    Lister    │  Transferer  │  UploadTracker  │
//! ├──────────────┴──────────────┴─────────────────┤
//! │          Sandbox (path containment)           │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::config::Config;
//! use daemon::files::Sandbox;
//! use daemon::router::Router;
//! use daemon::server::Server;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let sandbox = Sandbox::new(&config.files.root)?
//!         .case_insensitive(config.files.case_insensitive);
//!     let router = Router::new(
//!         sandbox,
//!         config.files.max_upload_size,
//!         config.server.max_chunk_size,
//!     );
//!     let server = Server::bind(&config.server.listen_addr, router).await?;
//!
//!     // Runs until the token is cancelled
//!     server.run(CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, env overrides, and validation
//! - [`files`]: Sandbox, listing, transfer, and upload engine
//! - [`router`]: Request dispatch to the engine
//! - [`server`]: TCP JSON-line server
//! - [`client`]: TCP client used by the CLI subcommands

pub mod client;
pub mod config;
pub mod files;
pub mod router;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export files types for convenience
pub use files::{
    Entry, Lister, Listing, OpError, Sandbox, SandboxError, TransferMode, Transferer,
    UploadTracker,
};

// Re-export router types for convenience
pub use router::{Router, RouterError, RouterResult};

// Re-export server and client types for convenience
pub use client::{Client, ClientError};
pub use server::{Server, ServerError};
