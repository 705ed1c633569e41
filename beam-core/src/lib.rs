//! PeerBeam core: rendezvous relay and chunked transfer protocol.
//! Host-driven: no socket I/O; host passes events and performs the returned actions.

pub mod code;
pub mod registry;
pub mod relay;
pub mod session;
pub mod signal;

pub mod backlog;
pub mod channel;
pub mod chunk;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod integrity;
pub mod wire;

pub use backlog::{Backlog, DEFAULT_BACKLOG_CEILING};
pub use channel::{frame_channel, ChannelSink, ChannelStream};
pub use chunk::{DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE};
pub use code::RoomCode;
pub use decoder::{ChunkDecoder, DecodeEvent, DecoderState, ReceivedFile};
pub use encoder::{send_paced, ChunkEncoder, FrameSink};
pub use frame::{ControlFrame, Frame, Progress, TransferError, TransferMetadata};
pub use registry::{Room, RoomError, RoomRegistry};
pub use relay::{Relay, RelayAction};
pub use session::{ConnectionId, Role, Session, SessionState};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError, FrameReader};
