//! Chunk decoder: AwaitingMetadata -> Receiving -> Complete, with Failed
//! reachable from both non-terminal states. One decoder per transfer.

use tracing::{debug, warn};

use crate::frame::{ControlFrame, Frame, Progress, TransferError, TransferMetadata};
use crate::integrity::{self, StreamDigest};

/// Upper bound on buffer capacity reserved up front from the declared size.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingMetadata,
    Receiving,
    Complete,
    Failed,
}

/// The reconstructed stream, tagged with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub metadata: TransferMetadata,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// Metadata accepted; progress is now `{0, size, 0}`.
    Started(TransferMetadata),
    Progress(Progress),
    Complete {
        file: ReceivedFile,
        progress: Progress,
    },
}

pub struct ChunkDecoder {
    state: DecoderState,
    metadata: Option<TransferMetadata>,
    buffer: Vec<u8>,
    bytes_moved: u64,
    digest: StreamDigest,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::AwaitingMetadata,
            metadata: None,
            buffer: Vec::new(),
            bytes_moved: 0,
            digest: StreamDigest::new(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn metadata(&self) -> Option<&TransferMetadata> {
        self.metadata.as_ref()
    }

    pub fn progress(&self) -> Option<Progress> {
        let total = self.metadata.as_ref()?.size;
        Some(match self.state {
            DecoderState::Complete => Progress::complete(total),
            _ => Progress::new(self.bytes_moved, total),
        })
    }

    /// Feed one frame in arrival order.
    ///
    /// Any error moves the decoder to `Failed` and discards buffered bytes,
    /// except `Finished`, returned for frames after a terminal state. The
    /// frame completing the declared byte count yields no event; its progress
    /// arrives with `Complete`.
    pub fn push(&mut self, frame: Frame) -> Result<Option<DecodeEvent>, TransferError> {
        if matches!(self.state, DecoderState::Complete | DecoderState::Failed) {
            return Err(TransferError::Finished);
        }
        let result = self.step(frame);
        if let Err(e) = &result {
            warn!(event = "transfer_failed", error = %e, bytes = self.bytes_moved, "Transfer failed");
            self.state = DecoderState::Failed;
            self.buffer = Vec::new();
        }
        result
    }

    fn step(&mut self, frame: Frame) -> Result<Option<DecodeEvent>, TransferError> {
        match (self.state, frame) {
            (DecoderState::AwaitingMetadata, Frame::Binary(_)) => Err(
                TransferError::ProtocolViolation("data frame before metadata"),
            ),
            (DecoderState::AwaitingMetadata, Frame::Text(text)) => {
                match ControlFrame::parse(&text)? {
                    ControlFrame::FileMeta(metadata) => {
                        debug!(event = "transfer_started", name = %metadata.name, size = metadata.size, "Metadata accepted");
                        self.buffer = Vec::with_capacity(metadata.size.min(MAX_PREALLOC) as usize);
                        self.metadata = Some(metadata.clone());
                        self.state = DecoderState::Receiving;
                        Ok(Some(DecodeEvent::Started(metadata)))
                    }
                    ControlFrame::FileEnd { .. } => Err(TransferError::ProtocolViolation(
                        "completion before metadata",
                    )),
                }
            }
            (DecoderState::Receiving, Frame::Binary(bytes)) => self.on_data(&bytes),
            (DecoderState::Receiving, Frame::Text(text)) => match ControlFrame::parse(&text)? {
                ControlFrame::FileMeta(_) => Err(TransferError::ProtocolViolation(
                    "metadata after transfer start",
                )),
                ControlFrame::FileEnd { sha256 } => self.on_end(sha256.as_deref()),
            },
            (DecoderState::Complete | DecoderState::Failed, _) => Err(TransferError::Finished),
        }
    }

    fn total(&self) -> u64 {
        self.metadata.as_ref().map(|m| m.size).unwrap_or(0)
    }

    fn on_data(&mut self, bytes: &[u8]) -> Result<Option<DecodeEvent>, TransferError> {
        let total = self.total();
        let received = self.bytes_moved + bytes.len() as u64;
        if received > total {
            return Err(TransferError::LengthMismatch {
                expected: total,
                received,
            });
        }
        self.digest.update(bytes);
        self.buffer.extend_from_slice(bytes);
        self.bytes_moved = received;
        if received == total {
            Ok(None)
        } else {
            Ok(Some(DecodeEvent::Progress(Progress::new(received, total))))
        }
    }

    fn on_end(&mut self, expected_digest: Option<&str>) -> Result<Option<DecodeEvent>, TransferError> {
        let total = self.total();
        if self.bytes_moved != total {
            return Err(TransferError::LengthMismatch {
                expected: total,
                received: self.bytes_moved,
            });
        }
        let actual = std::mem::take(&mut self.digest).finish_hex();
        if let Some(expected) = expected_digest {
            if !integrity::verify_hex(expected, &actual) {
                return Err(TransferError::IntegrityFailed);
            }
        }
        let metadata = self
            .metadata
            .clone()
            .ok_or(TransferError::ProtocolViolation("completion before metadata"))?;
        self.state = DecoderState::Complete;
        Ok(Some(DecodeEvent::Complete {
            file: ReceivedFile {
                metadata,
                data: std::mem::take(&mut self.buffer),
            },
            progress: Progress::complete(total),
        }))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}
