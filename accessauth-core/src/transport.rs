//! TLS-wrapped, newline-framed message transport.
//!
//! One protocol record per line. The listener separates the TCP accept
//! from the TLS handshake so a stalled peer cannot hold up the accept
//! loop; [`PendingHandshake::complete`] runs on the connection's own task.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

use accessauth_proto::Message;

/// Upper bound on one inbound record, including the delimiter.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("inbound record exceeds {} bytes", MAX_LINE_BYTES)]
    RecordTooLarge,
    #[error("invalid tls server name {0:?}")]
    InvalidServerName(String),
}

/// Listening socket with its TLS acceptor.
pub struct SecureListener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
}

impl SecureListener {
    pub async fn bind(addr: SocketAddr, config: Arc<ServerConfig>) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self {
            inner,
            acceptor: TlsAcceptor::from(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept one TCP connection without performing the TLS handshake.
    pub async fn accept(&self) -> io::Result<PendingHandshake> {
        let (stream, peer) = self.inner.accept().await?;
        Ok(PendingHandshake {
            stream,
            peer,
            acceptor: self.acceptor.clone(),
        })
    }
}

/// An accepted TCP connection whose TLS handshake has not run yet.
pub struct PendingHandshake {
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
}

impl PendingHandshake {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Run the TLS handshake. Callers should bound this with a timeout.
    pub async fn complete(self) -> io::Result<SecureConnection> {
        let tls = self.acceptor.accept(self.stream).await?;
        Ok(SecureConnection::new(TlsStream::Server(tls), self.peer))
    }
}

/// Connect to a server and complete the TLS handshake.
pub async fn connect(
    addr: SocketAddr,
    server_name: &str,
    config: Arc<ClientConfig>,
) -> Result<SecureConnection, TransportError> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|_| TransportError::InvalidServerName(server_name.to_string()))?;
    let stream = TcpStream::connect(addr).await?;
    let peer = stream.peer_addr()?;
    let tls = TlsConnector::from(config).connect(name, stream).await?;
    Ok(SecureConnection::new(TlsStream::Client(tls), peer))
}

/// One TLS session carrying newline-framed protocol records.
///
/// `send` and `next_message` are independently thread-safe; reader and
/// writer halves sit behind their own locks.
pub struct SecureConnection {
    reader: Mutex<BufReader<ReadHalf<TlsStream<TcpStream>>>>,
    writer: Mutex<WriteHalf<TlsStream<TcpStream>>>,
    peer: SocketAddr,
}

impl SecureConnection {
    fn new(stream: TlsStream<TcpStream>, peer: SocketAddr) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            peer,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Encode and write one record.
    pub async fn send(&self, msg: &Message) -> Result<(), TransportError> {
        let mut line = msg.encode();
        line.push('\n');
        self.send_raw(line.as_bytes()).await
    }

    /// Write one raw line. Exists for interop tests that need to put
    /// arbitrary bytes on the wire.
    pub async fn send_line(&self, line: &str) -> Result<(), TransportError> {
        let mut framed = line.to_string();
        framed.push('\n');
        self.send_raw(framed.as_bytes()).await
    }

    async fn send_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the next well-formed message.
    ///
    /// Malformed records are logged and skipped; the read continues.
    /// Returns `Ok(None)` once the peer closes the connection.
    pub async fn next_message(&self) -> Result<Option<Message>, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = Vec::new();
            let n = (&mut *reader)
                .take(MAX_LINE_BYTES as u64 + 1)
                .read_until(b'\n', &mut line)
                .await?;
            if n == 0 {
                return Ok(None);
            }
            if line.len() > MAX_LINE_BYTES {
                return Err(TransportError::RecordTooLarge);
            }

            let text = match std::str::from_utf8(&line) {
                Ok(t) => t.trim(),
                Err(_) => {
                    tracing::warn!(peer = %self.peer, "skipping non-utf8 record");
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }

            match Message::decode(text) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "skipping malformed record");
                    continue;
                }
            }
        }
    }

    /// Shut down the write side. Idempotent; errors from an already
    /// closed stream are ignored.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
