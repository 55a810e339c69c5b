//! Shared "who is online" roster.
//!
//! Every mutation updates the roster first and then broadcasts the change to
//! all connected sessions, so a lookup made after the call already sees it.

use std::collections::HashMap;

use realm_shared::net::{Packet, TablistEntry};
use uuid::Uuid;

use crate::player::{PlayerRegistry, Session};

/// Roster keyed by identity; at most one entry per identity.
#[derive(Debug, Default)]
pub struct Tablist {
    entries: HashMap<Uuid, TablistEntry>,
}

impl Tablist {
    /// Stores `entry` and broadcasts an add notification carrying only it.
    pub fn add(&mut self, entry: TablistEntry, players: &PlayerRegistry) {
        self.entries.insert(entry.identity, entry.clone());
        players.broadcast_packet(&Packet::PlayerListAdd {
            entries: vec![entry],
        });
    }

    pub fn add_session(&mut self, session: &Session, players: &PlayerRegistry) {
        self.add(session.tablist_entry(), players);
    }

    /// Deletes the entry and broadcasts a remove notification carrying only
    /// the identity. Returns the removed entry, if any.
    pub fn remove(&mut self, identity: Uuid, players: &PlayerRegistry) -> Option<TablistEntry> {
        let removed = self.entries.remove(&identity);
        players.broadcast_packet(&Packet::PlayerListRemove {
            identities: vec![identity],
        });
        removed
    }

    pub fn get(&self, identity: Uuid) -> Option<&TablistEntry> {
        self.entries.get(&identity)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TablistEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full roster as a single add packet, sent to newcomers.
    pub fn roster_packet(&self) -> Packet {
        Packet::PlayerListAdd {
            entries: self.entries.values().cloned().collect(),
        }
    }
}
