//! Application-data transport for a single connection.
//!
//! The session loop only ever sees decrypted application data. Whatever
//! terminates TLS hands over a byte stream; [`StreamTransport`] cuts that
//! stream into whole FESL packets using the length word of each header:
//!
//! ```text
//! +--------------------------------+----------------------------+
//! | header (12 bytes)              |   rest of packet           |
//! | type | kind+id | total length  |   (total length - 12)      |
//! +--------------------------------+----------------------------+
//! ```

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::packet::{HEADER_LEN, declared_length};

/// Configuration for packet-sized reads.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum accepted packet size in bytes, header included. Default: 64 KB.
    pub max_packet_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 65_536,
        }
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The packet size exceeds the configured maximum.
    #[error("packet size {size} exceeds maximum {max}")]
    PacketTooLarge {
        /// Size declared in the header.
        size: u32,
        /// The configured maximum.
        max: u32,
    },

    /// The header declares fewer bytes than the header itself.
    #[error("packet declares impossible length {0}")]
    BadLength(u32),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source and sink of decrypted application data.
pub trait Transport: Send {
    /// Read the next unit of application data. An empty buffer means nothing
    /// is available yet; closure is reported as an error.
    fn read_application_data(
        &mut self,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Write one encoded packet.
    fn write_application_data(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// [`Transport`] over any async byte stream, one packet per read.
pub struct StreamTransport<S> {
    stream: S,
    config: FrameConfig,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: S, config: FrameConfig) -> Self {
        Self { stream, config }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_application_data(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut header = [0u8; HEADER_LEN];
        match self.stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(TransportError::ConnectionClosed);
            }
            Err(e) => return Err(TransportError::Io(e)),
        }

        let total = declared_length(&header);
        if total > self.config.max_packet_size {
            return Err(TransportError::PacketTooLarge {
                size: total,
                max: self.config.max_packet_size,
            });
        }
        if (total as usize) < HEADER_LEN {
            return Err(TransportError::BadLength(total));
        }

        let mut packet = vec![0u8; total as usize];
        packet[..HEADER_LEN].copy_from_slice(&header);
        if packet.len() > HEADER_LEN {
            self.stream
                .read_exact(&mut packet[HEADER_LEN..])
                .await
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        TransportError::ConnectionClosed
                    } else {
                        TransportError::Io(e)
                    }
                })?;
        }

        tracing::trace!("read {} bytes of application data", packet.len());
        Ok(packet)
    }

    async fn write_application_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        tracing::trace!("wrote {} bytes of application data", data.len());
        Ok(())
    }
}
