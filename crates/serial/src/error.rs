use std::io;

use rover_telemetry::ChecksumError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out waiting for serial data")]
    TimedOut,
    #[error("serial port disconnected")]
    SerialPortDisconnected,
    #[error("serial port I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::TimedOut,
            io::ErrorKind::PermissionDenied
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof => TransportError::SerialPortDisconnected,
            _ => TransportError::Io(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("no frame marker in {skipped} bytes")]
    MarkerNotFound { skipped: usize },
    #[error("frame body truncated after {got} of {expected} bytes")]
    Truncated { got: usize, expected: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameReadError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

impl From<io::Error> for FrameReadError {
    fn from(error: io::Error) -> Self {
        Self::Transport(error.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("serial port {port} not found")]
    NotFound { port: String },
    #[error(transparent)]
    Serial(#[from] serialport::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("serial worker is no longer running")]
pub struct WorkerStopped;
