//! Direct-channel transfer frames and progress.

use serde::{Deserialize, Serialize};

/// One message on the direct channel. The variant is the transport-level
/// payload kind; receivers never sniff content to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Structured frame: JSON `ControlFrame`.
    Text(String),
    /// Raw data frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload length in bytes, as counted against the send backlog.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(t) => t.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Declared once by the sender before any data frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlFrame {
    FileMeta(TransferMetadata),
    /// Completion sentinel. `sha256` is the lowercase hex digest of the whole
    /// stream; peers that omit it are still accepted.
    FileEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
}

impl ControlFrame {
    pub fn to_frame(&self) -> Result<Frame, TransferError> {
        serde_json::to_string(self)
            .map(Frame::Text)
            .map_err(|e| TransferError::Malformed(e.to_string()))
    }

    pub fn parse(text: &str) -> Result<Self, TransferError> {
        serde_json::from_str(text).map_err(|e| TransferError::Malformed(e.to_string()))
    }
}

/// Bytes moved so far. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub bytes_moved: u64,
    pub total_bytes: u64,
    pub percent: u8,
}

impl Progress {
    /// `percent = floor(100 * moved / total)`, 0 for an empty total.
    pub fn new(bytes_moved: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0
        } else {
            (u128::from(bytes_moved) * 100 / u128::from(total_bytes)).min(100) as u8
        };
        Self {
            bytes_moved,
            total_bytes,
            percent,
        }
    }

    /// Progress once the sentinel has been handled.
    pub fn complete(total_bytes: u64) -> Self {
        Self {
            bytes_moved: total_bytes,
            total_bytes,
            percent: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
    #[error("received {received} bytes, expected {expected}")]
    LengthMismatch { expected: u64, received: u64 },
    #[error("integrity check failed")]
    IntegrityFailed,
    #[error("malformed control frame: {0}")]
    Malformed(String),
    #[error("transfer aborted: transport closed")]
    Aborted,
    #[error("transfer stalled waiting for backlog to drain")]
    Stalled,
    #[error("transfer already finished")]
    Finished,
    #[error("source is {actual} bytes but metadata declares {declared}")]
    InvalidSource { declared: u64, actual: u64 },
    #[error("frame size {requested} exceeds the maximum of {max}")]
    FrameSizeTooLarge { requested: usize, max: usize },
    #[error("reading source: {0}")]
    SourceRead(String),
}
