//! Transport factories and message framing.
//!
//! [`ListenerFactory`] decides where a server binds and records an anonymous
//! bind's port back into the shared addressing. [`Connector`] runs at the
//! caller's site and always dials the configured client address instead of
//! the address the server nominally bound.

use crate::message::{decode_length, decode_message, encode_message, WireMessage};
use farcall_types::{ClientRoute, Endpoint, InvokeError, SharedAddressing};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("Unexpected message: {0}")]
    Unexpected(String),
}

impl From<WireError> for InvokeError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Io(_) | WireError::ConnectionClosed => {
                InvokeError::Connectivity(e.to_string())
            }
            WireError::Json(_) | WireError::MessageTooLarge { .. } | WireError::Unexpected(_) => {
                InvokeError::Format(e.to_string())
            }
        }
    }
}

/// Maximum single message size (16 MB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Server-side factory: binds the listener described by the shared addressing.
#[derive(Debug, Clone)]
pub struct ListenerFactory {
    addressing: SharedAddressing,
}

impl ListenerFactory {
    pub fn new(addressing: SharedAddressing) -> Self {
        Self { addressing }
    }

    /// Bind `server_host:server_port` (port 0 = any free port).
    ///
    /// After binding, the shared addressing is updated with
    /// [`Addressing::after_bind`](farcall_types::Addressing::after_bind).
    pub async fn bind(&self) -> Result<TcpListener, WireError> {
        let (host, port) = {
            let addressing = self.addressing.read().unwrap_or_else(|e| e.into_inner());
            (addressing.server_host.clone(), addressing.server_port)
        };
        let listener = TcpListener::bind((host.as_str(), port)).await?;
        let bound = listener.local_addr()?.port();

        let mut addressing = self.addressing.write().unwrap_or_else(|e| e.into_inner());
        *addressing = addressing.after_bind(bound);
        debug!(
            host = %host,
            requested = port,
            bound,
            client = %format!("{}:{}", addressing.client_host, addressing.client_port),
            "Listener bound"
        );
        Ok(listener)
    }
}

/// Caller-side factory: redirects every outbound connection to the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    route: ClientRoute,
}

impl Connector {
    pub fn new(route: ClientRoute) -> Self {
        Self { route }
    }

    pub fn route(&self) -> &ClientRoute {
        &self.route
    }

    /// Open a connection for a service nominally at `nominal`.
    pub async fn connect(&self, nominal: &Endpoint) -> Result<TcpStream, WireError> {
        let target = self.route.target(nominal);
        debug!(nominal = %nominal, target = %target, "Dialing");
        let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Write a framed message (4-byte length + JSON).
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg)?;
    if bytes.len() - 4 > MAX_MESSAGE_SIZE as usize {
        return Err(WireError::MessageTooLarge {
            size: (bytes.len() - 4) as u32,
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed message (4-byte length + JSON).
pub async fn read_message<R>(reader: &mut R) -> Result<WireMessage, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let msg = decode_message(&body)?;
    Ok(msg)
}
