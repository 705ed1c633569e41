//! Per-connection session: identity, role and the room it is bound to.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::code::RoomCode;

/// Identifies one rendezvous connection for the lifetime of its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slot a session occupies in its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }

    pub fn counterpart(&self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unbound -> Bound (as initiator or responder) -> Closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Bound { role: Role, code: RoomCode },
    Closed,
}

/// State of one rendezvous connection. Owned by the task serving that
/// connection; never shared.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(ConnectionId::new())
    }

    pub fn with_id(id: ConnectionId) -> Self {
        Self {
            id,
            state: SessionState::Unbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn role(&self) -> Option<Role> {
        match &self.state {
            SessionState::Bound { role, .. } => Some(*role),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&RoomCode> {
        match &self.state {
            SessionState::Bound { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_unbound(&self) -> bool {
        self.state == SessionState::Unbound
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Assign role and room. Only an unbound session can be bound.
    pub(crate) fn bind(&mut self, role: Role, code: RoomCode) -> bool {
        if !self.is_unbound() {
            return false;
        }
        self.state = SessionState::Bound { role, code };
        true
    }

    /// Move to `Closed`, returning the binding that was held, if any.
    pub(crate) fn close(&mut self) -> Option<(Role, RoomCode)> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Bound { role, code } => Some((role, code)),
            _ => None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_is_assigned_once() {
        let mut s = Session::new();
        assert!(s.is_unbound());
        assert!(s.bind(Role::Initiator, RoomCode::new("4821")));
        assert!(!s.bind(Role::Responder, RoomCode::new("1111")));
        assert_eq!(s.role(), Some(Role::Initiator));
        assert_eq!(s.code().map(RoomCode::as_str), Some("4821"));
    }

    #[test]
    fn close_returns_binding_once() {
        let mut s = Session::new();
        s.bind(Role::Responder, RoomCode::new("4821"));
        assert_eq!(s.close(), Some((Role::Responder, RoomCode::new("4821"))));
        assert!(s.is_closed());
        assert_eq!(s.close(), None);
        assert!(!s.bind(Role::Initiator, RoomCode::new("4821")));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Initiator).unwrap(),
            "\"initiator\""
        );
        assert_eq!(Role::Responder.counterpart(), Role::Initiator);
    }
}
