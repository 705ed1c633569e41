//! Signaling relay: per-session state machine over the shared room registry.
//!
//! Host-driven like the rest of the crate. The host owns one `Session` per
//! transport connection, passes each inbound message and the close event to
//! `Relay`, and delivers the returned `RelayAction`s. Nothing here waits on
//! another connection.

use tracing::{debug, info, warn};

use crate::code::RoomCode;
use crate::registry::RoomRegistry;
use crate::session::{ConnectionId, Role, Session, SessionState};
use crate::signal::{self, ClientMessage, ServerMessage, SignalError};

const SESSION_ENDED_MESSAGE: &str = "Peer ended the session";

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Deliver this text to the connection, if it is still open. Dropped otherwise.
    Send(ConnectionId, String),
}

pub struct Relay {
    registry: RoomRegistry,
}

impl Relay {
    pub fn new(registry: RoomRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Handle one text message from `session`'s transport.
    pub fn on_message(&self, session: &mut Session, text: &str) -> Vec<RelayAction> {
        if session.is_closed() {
            return Vec::new();
        }
        match signal::parse_client_message(text) {
            Ok(Some(msg)) => self.dispatch(session, msg),
            Ok(None) => {
                debug!(event = "unknown_message_type", connection = %session.id(), "Ignoring message of unknown type");
                Vec::new()
            }
            Err(e) => {
                debug!(event = "malformed_message", connection = %session.id(), error = %e, "Rejecting malformed message");
                reply(session.id(), ServerMessage::error(e.to_string()))
            }
        }
    }

    /// Binary payloads are not part of the rendezvous protocol.
    pub fn on_binary(&self, session: &Session) -> Vec<RelayAction> {
        if session.is_closed() {
            return Vec::new();
        }
        reply(session.id(), ServerMessage::error(SignalError::Binary.to_string()))
    }

    /// Transport closed. The only path that deletes a room.
    pub fn on_close(&self, session: &mut Session) -> Vec<RelayAction> {
        let id = session.id();
        let Some((role, code)) = session.close() else {
            return Vec::new();
        };
        let Some(room) = self.registry.release(&code, id) else {
            debug!(event = "room_already_released", connection = %id, %code, "Room was already removed");
            return Vec::new();
        };
        info!(event = "room_closed", %code, vacated = %role, "Room removed after disconnect");
        match room.counterpart(id) {
            Some(peer) => reply(
                peer,
                ServerMessage::PeerDisconnected {
                    message: format!("Peer disconnected ({role})"),
                    role,
                },
            ),
            None => Vec::new(),
        }
    }

    fn dispatch(&self, session: &mut Session, msg: ClientMessage) -> Vec<RelayAction> {
        let kind = msg.kind();
        debug!(event = "message_received", connection = %session.id(), kind, "Handling message");
        match msg {
            ClientMessage::CreateRoom => self.create_room(session),
            ClientMessage::JoinRoom { code } => self.join_room(session, code),
            ClientMessage::Offer(offer) => self.forward(session, kind, ServerMessage::Offer { offer }),
            ClientMessage::Answer(answer) => {
                self.forward(session, kind, ServerMessage::Answer { answer })
            }
            ClientMessage::IceCandidate(candidate) => {
                self.forward(session, kind, ServerMessage::IceCandidate { candidate })
            }
            ClientMessage::FileMeta { advisory, raw } => {
                debug!(event = "file_advisory", connection = %session.id(), name = %advisory.file_name, size = advisory.file_size, "Relaying file advisory");
                self.forward_text(session, kind, raw)
            }
            ClientMessage::SessionEnded => self.forward(
                session,
                kind,
                ServerMessage::SessionEnded {
                    message: SESSION_ENDED_MESSAGE.to_owned(),
                },
            ),
        }
    }

    fn create_room(&self, session: &mut Session) -> Vec<RelayAction> {
        let id = session.id();
        if !session.is_unbound() {
            return reply(id, ServerMessage::error("Already in a room"));
        }
        match self.registry.create(id) {
            Ok(code) => {
                session.bind(Role::Initiator, code.clone());
                info!(event = "room_created", %code, connection = %id, open_rooms = self.registry.len(), "Room created");
                reply(id, ServerMessage::RoomCreated { code })
            }
            Err(e) => {
                warn!(event = "room_create_failed", connection = %id, error = %e, "Could not create room");
                reply(id, ServerMessage::error(e.to_string()))
            }
        }
    }

    fn join_room(&self, session: &mut Session, code: RoomCode) -> Vec<RelayAction> {
        let id = session.id();
        if !session.is_unbound() {
            return reply(id, ServerMessage::error("Already in a room"));
        }
        match self.registry.join(&code, id) {
            Ok(initiator) => {
                session.bind(Role::Responder, code.clone());
                info!(event = "room_joined", %code, connection = %id, "Peer joined room");
                let mut actions = reply(id, ServerMessage::RoomJoined { code });
                actions.extend(reply(initiator, ServerMessage::PeerJoined {}));
                actions
            }
            Err(e) => {
                debug!(event = "join_rejected", %code, connection = %id, error = %e, "Join rejected");
                reply(id, ServerMessage::error(e.to_string()))
            }
        }
    }

    fn forward(&self, session: &Session, kind: &str, msg: ServerMessage) -> Vec<RelayAction> {
        match msg.to_text() {
            Ok(text) => self.forward_text(session, kind, text),
            Err(e) => {
                warn!(event = "encode_failed", kind, error = %e, "Could not encode relayed message");
                Vec::new()
            }
        }
    }

    fn forward_text(&self, session: &Session, kind: &str, text: String) -> Vec<RelayAction> {
        let id = session.id();
        let code = match session.state() {
            SessionState::Bound { code, .. } => code,
            _ => return reply(id, ServerMessage::error("Not in a room")),
        };
        match self.registry.counterpart(code, id) {
            Some(peer) => vec![RelayAction::Send(peer, text)],
            None => {
                debug!(event = "counterpart_absent", kind, %code, connection = %id, "Dropping message, no counterpart");
                Vec::new()
            }
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RoomRegistry::new())
    }
}

fn reply(to: ConnectionId, msg: ServerMessage) -> Vec<RelayAction> {
    match msg.to_text() {
        Ok(text) => vec![RelayAction::Send(to, text)],
        Err(e) => {
            warn!(event = "encode_failed", error = %e, "Could not encode reply");
            Vec::new()
        }
    }
}
