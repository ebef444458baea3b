//! The byte-stream collaborator (spec.md §6): framing is the codec's job,
//! not the transport's. `Transport` is deliberately narrow — `read`,
//! `write`, `close` — so a test fixture can stand in for a live socket.

use crate::error::{FixError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[async_trait]
pub trait Transport: Send {
    /// Reads whatever bytes are currently available. Returns `Ok(None)` on
    /// a clean EOF (peer closed).
    async fn read(&mut self) -> Result<Option<Bytes>>;
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// `tokio::net::TcpStream`-backed transport. Reads are unbuffered chunks;
/// the caller (the engine's decode loop) accumulates them across calls.
pub struct TcpTransport {
    stream: TcpStream,
    read_buf: BytesMut,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        stream.set_nodelay(true).ok();
        Self {
            stream,
            read_buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(FixError::Transport)?;
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read(&mut self) -> Result<Option<Bytes>> {
        self.read_buf.clear();
        self.read_buf.reserve(16 * 1024);
        let n = self
            .stream
            .read_buf(&mut self.read_buf)
            .await
            .map_err(FixError::Transport)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.read_buf.split().freeze()))
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await.map_err(FixError::Transport)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(FixError::Transport)
    }
}

/// In-memory transport for tests: a fixed inbound byte sequence plus a
/// record of everything written.
pub struct MockTransport {
    inbound: std::collections::VecDeque<Bytes>,
    pub written: Vec<Bytes>,
    closed: bool,
}

impl MockTransport {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            inbound: chunks.into(),
            written: Vec::new(),
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&mut self) -> Result<Option<Bytes>> {
        Ok(self.inbound.pop_front())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.written.push(Bytes::copy_from_slice(bytes));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
