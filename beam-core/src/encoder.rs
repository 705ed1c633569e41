//! Chunk encoder: metadata frame, bounded data frames in source order,
//! completion sentinel. `send_paced` drives it against a transport backlog.
//!
//! The source is read one frame at a time, so memory use is bounded by the
//! frame size no matter how large the declared length is.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::backlog::Backlog;
use crate::chunk::{self, ChunkRanges, MAX_FRAME_SIZE};
use crate::frame::{ControlFrame, Frame, Progress, TransferError, TransferMetadata};
use crate::integrity::StreamDigest;

/// Transport side of the direct channel. `send_frame` only queues; the
/// transport accounts queued bytes in its `Backlog`.
pub trait FrameSink {
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransferError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Metadata,
    Data,
    Sentinel,
    Done,
}

/// One frame ready to hand to the transport, with the progress to report
/// once it is handed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub frame: Frame,
    pub progress: Option<Progress>,
}

pub struct ChunkEncoder<R> {
    metadata: TransferMetadata,
    source: R,
    ranges: ChunkRanges,
    frame_count: usize,
    bytes_moved: u64,
    stage: Stage,
    digest: StreamDigest,
}

impl<R: AsyncRead + Unpin> ChunkEncoder<R> {
    /// `frame_size` 0 uses the default; above `MAX_FRAME_SIZE` is refused.
    /// `source` must yield at least `metadata.size` bytes. Nothing past the
    /// declared size is read; a short source fails at the frame where it ends.
    pub fn new(
        metadata: TransferMetadata,
        source: R,
        frame_size: usize,
    ) -> Result<Self, TransferError> {
        if frame_size > MAX_FRAME_SIZE {
            return Err(TransferError::FrameSizeTooLarge {
                requested: frame_size,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Self {
            ranges: chunk::chunk_ranges(metadata.size, frame_size),
            frame_count: chunk::chunk_count(metadata.size, frame_size),
            metadata,
            source,
            bytes_moved: 0,
            stage: Stage::Metadata,
            digest: StreamDigest::new(),
        })
    }

    pub fn metadata(&self) -> &TransferMetadata {
        &self.metadata
    }

    /// Number of data frames, `ceil(len / frame_size)`.
    pub fn data_frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn progress(&self) -> Progress {
        match self.stage {
            Stage::Done => Progress::complete(self.metadata.size),
            _ => Progress::new(self.bytes_moved, self.metadata.size),
        }
    }

    /// True once the sentinel has been produced or the source failed.
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Produce the next frame, or `None` after the sentinel.
    ///
    /// Progress comes with every data frame except the one that completes the
    /// byte count; that report is folded into the sentinel, so 100 is only
    /// reported together with completion.
    pub async fn next_frame(&mut self) -> Result<Option<Emitted>, TransferError> {
        let emitted = match self.stage {
            Stage::Metadata => {
                self.stage = if self.frame_count == 0 {
                    Stage::Sentinel
                } else {
                    Stage::Data
                };
                Emitted {
                    frame: ControlFrame::FileMeta(self.metadata.clone()).to_frame()?,
                    progress: None,
                }
            }
            Stage::Data => {
                let bytes = match self.read_next_chunk().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.stage = Stage::Done;
                        return Err(e);
                    }
                };
                self.digest.update(&bytes);
                self.bytes_moved += bytes.len() as u64;
                let progress = if self.bytes_moved == self.metadata.size {
                    self.stage = Stage::Sentinel;
                    None
                } else {
                    Some(Progress::new(self.bytes_moved, self.metadata.size))
                };
                Emitted {
                    frame: Frame::Binary(bytes),
                    progress,
                }
            }
            Stage::Sentinel => {
                let digest = std::mem::take(&mut self.digest).finish_hex();
                self.stage = Stage::Done;
                Emitted {
                    frame: ControlFrame::FileEnd {
                        sha256: Some(digest),
                    }
                    .to_frame()?,
                    progress: Some(Progress::complete(self.metadata.size)),
                }
            }
            Stage::Done => return Ok(None),
        };
        Ok(Some(emitted))
    }

    async fn read_next_chunk(&mut self) -> Result<Vec<u8>, TransferError> {
        let range = self
            .ranges
            .next()
            .ok_or(TransferError::ProtocolViolation("no data range left to send"))?;
        let mut bytes = vec![0u8; range.len() as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            match self.source.read(&mut bytes[filled..]).await {
                Ok(0) => {
                    return Err(TransferError::InvalidSource {
                        declared: self.metadata.size,
                        actual: range.start + filled as u64,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TransferError::SourceRead(e.to_string())),
            }
        }
        Ok(bytes)
    }
}

/// Emit every frame of `encoder` into `sink`, pausing whenever `backlog` is
/// over its ceiling until the transport drains it.
///
/// Progress is reported synchronously as each frame is handed over. Fails with
/// `Aborted` if the transport closes before the sentinel is sent, and with
/// `Stalled` if a single wait exceeds `stall_timeout`. No retry.
pub async fn send_paced<R, S, F>(
    mut encoder: ChunkEncoder<R>,
    sink: &mut S,
    backlog: &Backlog,
    stall_timeout: Option<Duration>,
    mut on_progress: F,
) -> Result<Progress, TransferError>
where
    R: AsyncRead + Unpin,
    S: FrameSink,
    F: FnMut(Progress),
{
    while let Some(emitted) = encoder.next_frame().await? {
        if backlog.is_over_ceiling() {
            debug!(
                event = "backlog_pause",
                pending = backlog.pending(),
                ceiling = backlog.ceiling(),
                "Pausing until backlog drains"
            );
        }
        backlog.wait_below_ceiling_for(stall_timeout).await?;
        sink.send_frame(emitted.frame)?;
        if let Some(progress) = emitted.progress {
            on_progress(progress);
        }
    }
    Ok(encoder.progress())
}
