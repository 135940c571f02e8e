//! TCP server speaking the newline-delimited envelope protocol.
//!
//! Each connection is served by its own task: read a JSON line, dispatch
//! the envelope through the router, write the reply with the request's
//! sequence number. A malformed line or a failed operation produces an
//! error reply; the connection keeps serving until the client disconnects
//! or the daemon shuts down.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use protocol::messages::{Envelope, Message};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::router::{Router, RouterError};

/// How often the abandoned-upload sweep runs.
const STALE_UPLOAD_SWEEP_SECS: u64 = 60;

/// Idle time after which an in-flight upload counts as abandoned.
const STALE_UPLOAD_MAX_IDLE_SECS: u64 = 300;

/// Errors that can occur while serving connections.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A JSON serialization/deserialization error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A server that listens for client connections on a TCP socket.
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
}

impl Server {
    /// Bind the server to the specified address.
    pub async fn bind(addr: &str, router: Router) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: Arc::new(router),
        })
    }

    /// The address the server is actually listening on.
    ///
    /// Useful when bound to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        self.spawn_stale_upload_sweep(shutdown.clone());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("server received shutdown signal");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let router = Arc::clone(&self.router);
                            let token = shutdown.clone();
                            let span = info_span!("connection", %peer);
                            tokio::spawn(
                                async move {
                                    debug!("client connected");
                                    if let Err(e) = serve_connection(stream, router, token).await {
                                        warn!(error = %e, "connection ended with error");
                                    }
                                    debug!("client disconnected");
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    /// Periodically drop uploads that stopped receiving chunks.
    fn spawn_stale_upload_sweep(&self, shutdown: CancellationToken) {
        let uploads = self.router.uploads();
        tokio::spawn(async move {
            let interval = Duration::from_secs(STALE_UPLOAD_SWEEP_SECS);
            let max_idle = Duration::from_secs(STALE_UPLOAD_MAX_IDLE_SECS);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let dropped = uploads.drop_stale(max_idle);
                        if dropped > 0 {
                            info!(dropped, "dropped stale uploads");
                        }
                    }
                }
            }
        });
    }
}

/// Serve one client connection until it disconnects.
async fn serve_connection(
    stream: TcpStream,
    router: Arc<Router>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let mut conn = Connection::new(stream);

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = conn.read_line() => read?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let envelope = match Envelope::from_json(line.trim()) {
            Ok(envelope) => envelope,
            Err(e) => {
                // No sequence number could be recovered; sequence 0 marks
                // a connection-level error reply.
                warn!(error = %e, "malformed request line");
                let err = RouterError::InvalidRequest(format!("malformed request: {e}"));
                conn.send(&Envelope::new(0, Message::Error(err.to_error_message(None))))
                    .await?;
                continue;
            }
        };

        let sequence = envelope.sequence;

        if let Err(e) = envelope.check_version() {
            let err = RouterError::InvalidRequest(e.to_string());
            conn.send(&Envelope::new(sequence, Message::Error(err.to_error_message(None))))
                .await?;
            continue;
        }

        let operation = request_label(&envelope.payload);
        let reply = match router.handle(envelope.payload) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!(operation, error = %e, "operation failed");
                Message::Error(e.to_error_message(Some(operation.to_string())))
            }
        };

        conn.send(&Envelope::new(sequence, reply)).await?;
    }
}

/// Short operation label attached to error replies as context.
fn request_label(message: &Message) -> &'static str {
    match message {
        Message::ListRequest(_) => "list",
        Message::DownloadRequest(_) => "download",
        Message::UploadStart(_) | Message::UploadChunk(_) | Message::UploadFinish(_) => "upload",
        Message::DeleteRequest(_) => "delete",
        Message::MoveRequest(_) => "move",
        Message::CopyRequest(_) => "copy",
        Message::Ping(_) => "ping",
        _ => "request",
    }
}

/// One client connection, reading requests and writing replies as JSON
/// lines.
struct Connection {
    reader: BufReader<tokio::io::ReadHalf<TcpStream>>,
    writer: tokio::io::WriteHalf<TcpStream>,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Read the next request line. Returns `None` on disconnect.
    async fn read_line(&mut self) -> Result<Option<String>, ServerError> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Send one envelope as a JSON line.
    async fn send(&mut self, envelope: &Envelope) -> Result<(), ServerError> {
        let mut json = envelope.to_json()?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}
