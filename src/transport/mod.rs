// Byte-stream transports that carry command packets to the robot
//
// Discovery and the radio unlock handshake happen before a Transport is
// handed to the runtime; `connect` only has to produce a writable link.
pub mod serial;
pub mod sim;

use std::future::Future;

pub use serial::{SerialLink, SerialTransport};
pub use sim::{SimLink, SimTransport};

/// Errors from opening or writing to a link
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link disconnected")]
    Disconnected,

    #[error("Transport task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Opens one session with the robot
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    fn connect(&self) -> impl Future<Output = Result<Self::Link>> + Send;
}

/// Write side of a connected session
pub trait Link: Send + Sync + 'static {
    /// Write one complete packet; resolves once the write has settled
    fn write_frame(&self, frame: &[u8]) -> impl Future<Output = Result<()>> + Send;
}
