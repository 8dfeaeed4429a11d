//! Identifier and role types.
//!
//! Two kinds of identity exist side by side:
//!
//! - [`ClientId`] is whatever string the client put in its control message.
//!   Two connections may present the same value, so it is only ever used as a
//!   lookup key into the waiting pool.
//! - [`ConnectionId`] is assigned by the server when a socket is accepted and
//!   is unique for the lifetime of the process.  Every table keys on it.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, client-supplied identifier.  Not guaranteed to be unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random (v4) connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first UUID group is plenty to tell connections apart in logs.
        let s = self.0.to_string();
        f.write_str(&s[..8])
    }
}

/// Role assigned to each side of a pairing at match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The requester that found a waiting peer; told to send the offer.
    Caller,
    /// The peer that was waiting in the pool.
    Callee,
}

impl Role {
    /// The role held by the other side of the association.
    pub fn opposite(self) -> Role {
        match self {
            Role::Caller => Role::Callee,
            Role::Callee => Role::Caller,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Caller => f.write_str("caller"),
            Role::Callee => f.write_str("callee"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_connection_id_display_is_short_prefix() {
        let id = ConnectionId::new();
        let shown = id.to_string();
        assert_eq!(shown.len(), 8);
        assert!(id.as_uuid().to_string().starts_with(&shown));
    }

    #[test]
    fn test_client_id_equality_is_by_value() {
        assert_eq!(ClientId::from("A"), ClientId::new("A".to_string()));
        assert_ne!(ClientId::from("A"), ClientId::from("a"));
    }

    #[test]
    fn test_client_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ClientId::from("device-1")).unwrap();
        assert_eq!(json, "\"device-1\"");
    }

    #[test]
    fn test_role_opposite() {
        assert_eq!(Role::Caller.opposite(), Role::Callee);
        assert_eq!(Role::Callee.opposite(), Role::Caller);
    }
}
