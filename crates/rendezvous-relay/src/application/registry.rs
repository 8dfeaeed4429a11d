//! WaitingPool: clients that asked for a peer and are still unmatched.
//!
//! The pool maps the client-supplied [`ClientId`] to the server-assigned
//! [`ConnectionId`] of the socket that is waiting.  Keys are unique; there is
//! no ordering between entries.
//!
//! The pool itself is a plain data structure with no locking.  It lives inside
//! the `RendezvousService` state and is only touched while that state's lock is
//! held, which is what keeps [`WaitingPool::pick_random_waiting`] consistent
//! with concurrent removals.

use std::collections::HashMap;

use rand::seq::IteratorRandom;

use crate::domain::{ClientId, ConnectionId};

#[derive(Debug, Default)]
pub struct WaitingPool {
    entries: HashMap<ClientId, ConnectionId>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry for `id`.
    ///
    /// Returns the connection previously stored under `id`, if any.
    pub fn register(&mut self, id: ClientId, conn: ConnectionId) -> Option<ConnectionId> {
        self.entries.insert(id, conn)
    }

    /// Removes the entry stored under `id`.
    pub fn unregister_by_id(&mut self, id: &ClientId) -> Option<ConnectionId> {
        self.entries.remove(id)
    }

    /// Removes every entry that points at `conn`.
    ///
    /// This is a linear scan, used when the caller does not know which id the
    /// connection registered under.  Returns the ids that were removed.
    pub fn unregister_by_conn(&mut self, conn: ConnectionId) -> Vec<ClientId> {
        let ids: Vec<ClientId> = self
            .entries
            .iter()
            .filter(|(_, c)| **c == conn)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }

    /// Returns one entry chosen uniformly at random, or `None` if the pool is
    /// empty.
    pub fn pick_random_waiting(&self) -> Option<(ClientId, ConnectionId)> {
        self.entries
            .iter()
            .choose(&mut rand::thread_rng())
            .map(|(id, conn)| (id.clone(), *conn))
    }

    /// Like [`pick_random_waiting`](Self::pick_random_waiting) but never
    /// returns an entry belonging to `exclude`.
    pub fn pick_random_waiting_except(
        &self,
        exclude: ConnectionId,
    ) -> Option<(ClientId, ConnectionId)> {
        self.entries
            .iter()
            .filter(|(_, conn)| **conn != exclude)
            .choose(&mut rand::thread_rng())
            .map(|(id, conn)| (id.clone(), *conn))
    }

    pub fn get(&self, id: &ClientId) -> Option<ConnectionId> {
        self.entries.get(id).copied()
    }

    pub fn contains_conn(&self, conn: ConnectionId) -> bool {
        self.entries.values().any(|c| *c == conn)
    }

    /// The id `conn` is waiting under, if it is waiting.
    pub fn id_of(&self, conn: ConnectionId) -> Option<ClientId> {
        self.entries
            .iter()
            .find(|(_, c)| **c == conn)
            .map(|(id, _)| id.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries, in no particular order.
    pub fn entries(&self) -> Vec<(ClientId, ConnectionId)> {
        self.entries
            .iter()
            .map(|(id, conn)| (id.clone(), *conn))
            .collect()
    }
}
