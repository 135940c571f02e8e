//! Client for talking to a running daemon over TCP.
//!
//! Requests and responses travel as JSON-line envelopes in a strict
//! request-response pattern; the client matches every reply against the
//! sequence number it sent. Downloads and uploads move file content in
//! chunks, each chunk its own round trip.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use protocol::messages::{
    CopyRequest, DeleteRequest, DownloadRequest, Envelope, ErrorMessage, ListRequest, ListResponse,
    Message, MoveRequest, Ping, UploadChunk, UploadFinish, UploadStart, DEFAULT_CHUNK_SIZE,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Default timeout for client operations in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur on the client side of a connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A JSON serialization/deserialization error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The daemon answered with an error message.
    #[error("daemon error: {}", .0.message)]
    Daemon(ErrorMessage),

    /// The daemon answered with a message of the wrong type.
    #[error("unexpected response (expected {expected})")]
    UnexpectedResponse {
        /// Response type the request called for.
        expected: &'static str,
    },

    /// The reply's sequence number does not match the request's.
    #[error("response sequence {got} does not match request {expected}")]
    SequenceMismatch {
        /// Sequence number the client sent.
        expected: u64,
        /// Sequence number the reply carried.
        got: u64,
    },
}

/// A client connection to the daemon.
pub struct Client {
    reader: BufReader<tokio::io::ReadHalf<TcpStream>>,
    writer: tokio::io::WriteHalf<TcpStream>,
    timeout: Duration,
    sequence: u64,
}

impl Client {
    /// Connect to the daemon at the specified address.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    /// Connect with a custom timeout, applied to the connection attempt
    /// and to every later request.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ClientError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                ))
            })??;

        let mut client = Self::from_stream(stream);
        client.timeout = timeout;
        Ok(client)
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            sequence: 0,
        }
    }

    /// Set the timeout applied to each request.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send one request and wait for its reply.
    ///
    /// A chunked transfer makes one such round trip per chunk, so the
    /// timeout bounds each chunk rather than the whole file.
    pub async fn request(&mut self, message: Message) -> Result<Message, ClientError> {
        tokio::time::timeout(self.timeout, self.request_internal(message))
            .await
            .map_err(|_| {
                ClientError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "operation timed out",
                ))
            })?
    }

    async fn request_internal(&mut self, message: Message) -> Result<Message, ClientError> {
        self.sequence += 1;
        let envelope = Envelope::new(self.sequence, message);

        let mut json = envelope.to_json()?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "daemon closed connection",
            )));
        }

        let reply = Envelope::from_json(line.trim())?;
        if reply.sequence != self.sequence {
            return Err(ClientError::SequenceMismatch {
                expected: self.sequence,
                got: reply.sequence,
            });
        }
        Ok(reply.payload)
    }

    /// Check whether the daemon is responsive.
    pub async fn ping(&mut self) -> Result<bool, ClientError> {
        let reply = self
            .request(Message::Ping(Ping { timestamp: now_ms() }))
            .await?;
        Ok(matches!(reply, Message::Pong(_)))
    }

    /// List a directory, optionally filtered and recursive.
    pub async fn list(
        &mut self,
        path: &str,
        search: Option<String>,
        recursive: bool,
    ) -> Result<ListResponse, ClientError> {
        let reply = self
            .request(Message::ListRequest(ListRequest {
                path: path.to_string(),
                search,
                recursive,
            }))
            .await?;

        match reply {
            Message::ListResponse(resp) => Ok(resp),
            Message::Error(err) => Err(ClientError::Daemon(err)),
            _ => Err(ClientError::UnexpectedResponse {
                expected: "ListResponse",
            }),
        }
    }

    /// Download a remote file to a local destination.
    ///
    /// Returns the number of bytes written.
    pub async fn download(&mut self, path: &str, dest: &Path) -> Result<u64, ClientError> {
        let mut file = File::create(dest)?;
        let mut offset = 0u64;

        loop {
            let reply = self
                .request(Message::DownloadRequest(DownloadRequest {
                    path: path.to_string(),
                    offset,
                    chunk_size: DEFAULT_CHUNK_SIZE,
                }))
                .await?;

            let chunk = match reply {
                Message::DownloadChunk(chunk) => chunk,
                Message::Error(err) => return Err(ClientError::Daemon(err)),
                _ => {
                    return Err(ClientError::UnexpectedResponse {
                        expected: "DownloadChunk",
                    })
                }
            };

            file.write_all(&chunk.data)?;
            offset += chunk.data.len() as u64;

            if chunk.is_last {
                break;
            }
        }

        file.flush()?;
        Ok(offset)
    }

    /// Upload a local file into a remote directory.
    ///
    /// An empty `directory` targets the daemon's root. Returns the remote
    /// destination path and the byte count the daemon confirmed.
    pub async fn upload(&mut self, local: &Path, directory: &str) -> Result<(String, u64), ClientError> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                ClientError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "local path has no file name",
                ))
            })?;

        let mut file = File::open(local)?;
        let size = file.metadata()?.len();

        let reply = self
            .request(Message::UploadStart(UploadStart {
                directory: directory.to_string(),
                name,
                size,
            }))
            .await?;

        let dest = match reply {
            Message::UploadReady(ready) => ready.path,
            Message::Error(err) => return Err(ClientError::Daemon(err)),
            _ => {
                return Err(ClientError::UnexpectedResponse {
                    expected: "UploadReady",
                })
            }
        };

        let mut offset = 0u64;
        let mut buffer = vec![0u8; DEFAULT_CHUNK_SIZE as usize];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            let reply = self
                .request(Message::UploadChunk(UploadChunk {
                    path: dest.clone(),
                    offset,
                    data: buffer[..bytes_read].to_vec(),
                }))
                .await?;

            match reply {
                Message::UploadProgress(_) => {}
                Message::Error(err) => return Err(ClientError::Daemon(err)),
                _ => {
                    return Err(ClientError::UnexpectedResponse {
                        expected: "UploadProgress",
                    })
                }
            }

            offset += bytes_read as u64;
        }

        let reply = self
            .request(Message::UploadFinish(UploadFinish { path: dest.clone() }))
            .await?;

        match reply {
            Message::Uploaded(done) => Ok((done.path, done.size)),
            Message::Error(err) => Err(ClientError::Daemon(err)),
            _ => Err(ClientError::UnexpectedResponse {
                expected: "Uploaded",
            }),
        }
    }

    /// Delete a remote file or directory tree.
    pub async fn delete(&mut self, path: &str) -> Result<(), ClientError> {
        let reply = self
            .request(Message::DeleteRequest(DeleteRequest {
                path: path.to_string(),
            }))
            .await?;

        match reply {
            Message::Deleted(_) => Ok(()),
            Message::Error(err) => Err(ClientError::Daemon(err)),
            _ => Err(ClientError::UnexpectedResponse { expected: "Deleted" }),
        }
    }

    /// Move a remote file or directory. Returns the final destination.
    pub async fn move_entry(&mut self, source: &str, dest: &str) -> Result<String, ClientError> {
        let reply = self
            .request(Message::MoveRequest(MoveRequest {
                source: source.to_string(),
                dest: dest.to_string(),
            }))
            .await?;

        match reply {
            Message::Moved(moved) => Ok(moved.dest),
            Message::Error(err) => Err(ClientError::Daemon(err)),
            _ => Err(ClientError::UnexpectedResponse { expected: "Moved" }),
        }
    }

    /// Copy a remote file or directory tree. Returns the final destination.
    pub async fn copy_entry(&mut self, source: &str, dest: &str) -> Result<String, ClientError> {
        let reply = self
            .request(Message::CopyRequest(CopyRequest {
                source: source.to_string(),
                dest: dest.to_string(),
            }))
            .await?;

        match reply {
            Message::Copied(copied) => Ok(copied.dest),
            Message::Error(err) => Err(ClientError::Daemon(err)),
            _ => Err(ClientError::UnexpectedResponse { expected: "Copied" }),
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
