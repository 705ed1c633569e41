//! In-memory direct channel: a queue of frames whose queued bytes are
//! tracked in a shared `Backlog`. The receiving half drains the backlog as
//! frames are taken; dropping it closes the backlog.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backlog::Backlog;
use crate::encoder::FrameSink;
use crate::frame::{Frame, TransferError};

pub fn frame_channel(ceiling: u64) -> (ChannelSink, ChannelStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let backlog = Arc::new(Backlog::new(ceiling));
    (
        ChannelSink {
            tx,
            backlog: backlog.clone(),
        },
        ChannelStream { rx, backlog },
    )
}

pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Frame>,
    backlog: Arc<Backlog>,
}

impl ChannelSink {
    pub fn backlog(&self) -> Arc<Backlog> {
        self.backlog.clone()
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransferError> {
        let len = frame.len() as u64;
        self.backlog.add(len);
        self.tx.send(frame).map_err(|_| {
            self.backlog.close();
            TransferError::Aborted
        })
    }
}

pub struct ChannelStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    backlog: Arc<Backlog>,
}

impl ChannelStream {
    /// Next frame, or `None` once the sink is dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<Frame> {
        let frame = self.rx.recv().await?;
        self.backlog.drain(frame.len() as u64);
        Some(frame)
    }

    pub fn backlog(&self) -> Arc<Backlog> {
        self.backlog.clone()
    }
}

impl Drop for ChannelStream {
    fn drop(&mut self) {
        self.backlog.close();
    }
}
