//! PairingTable: the symmetric caller ↔ callee relation used for relay.
//!
//! Every association is stored twice, once from each side, so finding the
//! peer of a connection is a single hash lookup.  [`PairingTable::link`] and
//! [`PairingTable::unlink`] always write or remove both halves together.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::{ConnectionId, Role};

/// Reasons a link request is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("connection {0} cannot be paired with itself")]
    SelfAssociation(ConnectionId),
    #[error("connection {0} is already paired")]
    AlreadyPaired(ConnectionId),
}

/// One side of an association, as seen from the connection that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairLink {
    /// The other connection.
    pub peer: ConnectionId,
    /// The role of the connection that owns this link.
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct PairingTable {
    links: HashMap<ConnectionId, PairLink>,
}

impl PairingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `caller` with `callee`.
    ///
    /// # Errors
    ///
    /// Refuses to pair a connection with itself or to touch a connection that
    /// is already part of an association.
    pub fn link(&mut self, caller: ConnectionId, callee: ConnectionId) -> Result<(), PairingError> {
        if caller == callee {
            return Err(PairingError::SelfAssociation(caller));
        }
        for conn in [caller, callee] {
            if self.links.contains_key(&conn) {
                return Err(PairingError::AlreadyPaired(conn));
            }
        }

        self.links.insert(
            caller,
            PairLink {
                peer: callee,
                role: Role::Caller,
            },
        );
        self.links.insert(
            callee,
            PairLink {
                peer: caller,
                role: Role::Callee,
            },
        );
        Ok(())
    }

    /// The link owned by `conn`, if it is paired.
    pub fn peer_of(&self, conn: ConnectionId) -> Option<PairLink> {
        self.links.get(&conn).copied()
    }

    pub fn is_paired(&self, conn: ConnectionId) -> bool {
        self.links.contains_key(&conn)
    }

    /// Removes the association `conn` takes part in, in either role.
    ///
    /// Returns the link `conn` held, so the caller knows which peer was
    /// released.
    pub fn unlink(&mut self, conn: ConnectionId) -> Option<PairLink> {
        let link = self.links.remove(&conn)?;
        // Only drop the reverse half if it still points back at us.
        if self
            .links
            .get(&link.peer)
            .is_some_and(|reverse| reverse.peer == conn)
        {
            self.links.remove(&link.peer);
        }
        Some(link)
    }

    /// Number of associations (not connections).
    pub fn len(&self) -> usize {
        self.links.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Snapshot of every link, both directions.
    pub fn links(&self) -> Vec<(ConnectionId, PairLink)> {
        self.links.iter().map(|(c, l)| (*c, *l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_is_symmetric() {
        let mut table = PairingTable::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        table.link(a, b).unwrap();

        assert_eq!(table.peer_of(a), Some(PairLink { peer: b, role: Role::Caller }));
        assert_eq!(table.peer_of(b), Some(PairLink { peer: a, role: Role::Callee }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_link_refuses_self() {
        let mut table = PairingTable::new();
        let a = ConnectionId::new();
        assert_eq!(table.link(a, a), Err(PairingError::SelfAssociation(a)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_link_refuses_already_paired() {
        let mut table = PairingTable::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        table.link(a, b).unwrap();

        assert_eq!(table.link(c, b), Err(PairingError::AlreadyPaired(b)));
        assert_eq!(table.link(a, c), Err(PairingError::AlreadyPaired(a)));
        assert!(!table.is_paired(c));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unlink_from_either_side_removes_both() {
        for from_caller in [true, false] {
            let mut table = PairingTable::new();
            let a = ConnectionId::new();
            let b = ConnectionId::new();
            table.link(a, b).unwrap();

            let (closing, survivor) = if from_caller { (a, b) } else { (b, a) };
            let released = table.unlink(closing).unwrap();

            assert_eq!(released.peer, survivor);
            assert!(!table.is_paired(a));
            assert!(!table.is_paired(b));
            assert!(table.is_empty());
        }
    }

    #[test]
    fn test_unlink_unknown_is_none() {
        let mut table = PairingTable::new();
        assert!(table.unlink(ConnectionId::new()).is_none());
    }

    #[test]
    fn test_relink_after_unlink() {
        let mut table = PairingTable::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        table.link(a, b).unwrap();
        table.unlink(a);

        table.link(c, b).unwrap();

        assert_eq!(table.peer_of(b).map(|l| l.peer), Some(c));
        assert_eq!(table.len(), 1);
    }
}
