//! Room registry: code -> two-slot room. The only state shared between
//! connections; every operation runs under one lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::code::{self, CodeSource, RandomCodes, RoomCode, CODE_SPACE};
use crate::session::{ConnectionId, Role};

/// A matched pair (or half-pair) of connections sharing a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub code: RoomCode,
    pub initiator: ConnectionId,
    pub responder: Option<ConnectionId>,
}

impl Room {
    pub fn role_of(&self, id: ConnectionId) -> Option<Role> {
        if id == self.initiator {
            Some(Role::Initiator)
        } else if self.responder == Some(id) {
            Some(Role::Responder)
        } else {
            None
        }
    }

    /// The other member of the room, if `id` is a member and the other slot is filled.
    pub fn counterpart(&self, id: ConnectionId) -> Option<ConnectionId> {
        match self.role_of(id)? {
            Role::Initiator => self.responder,
            Role::Responder => Some(self.initiator),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,
    #[error("Room is full")]
    Full,
    #[error("No room codes available")]
    CapacityExhausted,
}

struct Inner {
    rooms: HashMap<RoomCode, Room>,
    codes: Box<dyn CodeSource>,
}

pub struct RoomRegistry {
    inner: Mutex<Inner>,
    max_rooms: usize,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_source(Box::new(RandomCodes::new()), CODE_SPACE)
    }

    /// Registry that refuses to hold more than `max_rooms` open rooms.
    pub fn with_max_rooms(max_rooms: usize) -> Self {
        Self::with_source(Box::new(RandomCodes::new()), max_rooms)
    }

    pub fn with_source(codes: Box<dyn CodeSource>, max_rooms: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rooms: HashMap::new(),
                codes,
            }),
            max_rooms: max_rooms.min(CODE_SPACE),
        }
    }

    // Every mutation is a single map operation, so a poisoned lock still
    // guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a room with `initiator` in the initiator slot. Returns its code.
    pub fn create(&self, initiator: ConnectionId) -> Result<RoomCode, RoomError> {
        let mut guard = self.lock();
        let Inner { rooms, codes } = &mut *guard;
        if rooms.len() >= self.max_rooms {
            return Err(RoomError::CapacityExhausted);
        }
        let code = code::unique_code(codes.as_mut(), |c| rooms.contains_key(c))
            .ok_or(RoomError::CapacityExhausted)?;
        rooms.insert(
            code.clone(),
            Room {
                code: code.clone(),
                initiator,
                responder: None,
            },
        );
        Ok(code)
    }

    /// Fill the responder slot. First join wins; returns the initiator to notify.
    pub fn join(&self, code: &RoomCode, responder: ConnectionId) -> Result<ConnectionId, RoomError> {
        let mut guard = self.lock();
        let room = guard.rooms.get_mut(code).ok_or(RoomError::NotFound)?;
        if room.responder.is_some() || room.initiator == responder {
            return Err(RoomError::Full);
        }
        room.responder = Some(responder);
        Ok(room.initiator)
    }

    /// Delete the room under `code`. No-op if already removed.
    pub fn remove(&self, code: &RoomCode) -> Option<Room> {
        self.lock().rooms.remove(code)
    }

    /// Delete the room under `code` only if `member` belongs to it. Codes are
    /// reused, so a stale session must not remove a newer room.
    pub fn release(&self, code: &RoomCode, member: ConnectionId) -> Option<Room> {
        let mut guard = self.lock();
        match guard.rooms.get(code) {
            Some(room) if room.role_of(member).is_some() => guard.rooms.remove(code),
            _ => None,
        }
    }

    pub fn get(&self, code: &RoomCode) -> Option<Room> {
        self.lock().rooms.get(code).cloned()
    }

    /// Counterpart of `member` in the room under `code`, if both are present.
    pub fn counterpart(&self, code: &RoomCode, member: ConnectionId) -> Option<ConnectionId> {
        self.lock().rooms.get(code)?.counterpart(member)
    }

    pub fn len(&self) -> usize {
        self.lock().rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_rooms(&self) -> usize {
        self.max_rooms
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
