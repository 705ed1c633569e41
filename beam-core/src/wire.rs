//! Direct-channel frames on a byte stream.
//!
//! Layout: `u32` LE body length, then the body. The body's first byte is the
//! payload kind (`KIND_TEXT` or `KIND_BINARY`), the rest is the payload as-is.
//! The kind byte carries the `Frame` variant, so a stream transport keeps
//! the text/binary distinction a message transport gives for free.

use crate::frame::Frame;

const LEN_SIZE: usize = 4;
const KIND_TEXT: u8 = 1;
const KIND_BINARY: u8 = 2;

/// Largest body accepted on the wire: kind byte plus payload.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;
/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_BODY_LEN - 1;

#[derive(Debug, thiserror::Error)]
#[error("frame payload of {0} bytes exceeds {max}", max = MAX_PAYLOAD_LEN)]
pub struct FrameEncodeError(pub usize);

#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("declared frame body of {0} bytes exceeds {max}", max = MAX_BODY_LEN)]
    TooLarge(usize),
    #[error("empty frame body")]
    Empty,
    #[error("unknown payload kind {0:#04x}")]
    UnknownKind(u8),
    #[error("text frame is not UTF-8")]
    InvalidText(#[from] std::string::FromUtf8Error),
}

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameEncodeError> {
    let (kind, payload) = match frame {
        Frame::Text(t) => (KIND_TEXT, t.as_bytes()),
        Frame::Binary(b) => (KIND_BINARY, b.as_slice()),
    };
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameEncodeError(payload.len()));
    }
    let body_len = (payload.len() + 1) as u32;
    let mut out = Vec::with_capacity(LEN_SIZE + 1 + payload.len());
    out.extend_from_slice(&body_len.to_le_bytes());
    out.push(kind);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode the frame at the front of `bytes`.
///
/// `Ok(None)` means the frame is not complete yet. On success also returns
/// how many bytes it used.
pub fn decode_frame(bytes: &[u8]) -> Result<Option<(Frame, usize)>, FrameDecodeError> {
    let Some(header) = bytes.get(..LEN_SIZE) else {
        return Ok(None);
    };
    let body_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if body_len > MAX_BODY_LEN {
        return Err(FrameDecodeError::TooLarge(body_len));
    }
    let Some(body) = bytes.get(LEN_SIZE..LEN_SIZE + body_len) else {
        return Ok(None);
    };
    let (&kind, payload) = body.split_first().ok_or(FrameDecodeError::Empty)?;
    let frame = match kind {
        KIND_TEXT => Frame::Text(String::from_utf8(payload.to_vec())?),
        KIND_BINARY => Frame::Binary(payload.to_vec()),
        other => return Err(FrameDecodeError::UnknownKind(other)),
    };
    Ok(Some((frame, LEN_SIZE + body_len)))
}

/// Reassembles frames from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes just read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameDecodeError> {
        match decode_frame(&self.buf)? {
            Some((frame, used)) => {
                self.buf.drain(..used);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes held that do not yet form a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
