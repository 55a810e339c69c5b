//! Connected sessions and the registry that owns them.
//!
//! Sessions are keyed by network endpoint. The registry is only ever touched
//! from the simulation context; the transport reaches it through tasks.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use realm_shared::{
    config::GameMode,
    math::Location,
    net::{DeviceInfo, Packet, Skin, TablistEntry},
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique entity id for a new session.
pub fn next_entity_id() -> u64 {
    NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Outbound half of a session's connection.
///
/// Packets are queued here and written by the transport's connection task.
#[derive(Debug, Clone)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<Packet>,
}

impl Connection {
    /// Creates a connection handle and the receiver the writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { outbound }, rx)
    }

    pub fn send(&self, packet: Packet) {
        if self.outbound.send(packet).is_err() {
            debug!("Dropped packet for closed connection");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Identity fields a client presents at login.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub identity: Uuid,
    pub name: String,
    pub xuid: String,
    pub device: DeviceInfo,
    pub skin: Skin,
}

/// Server-side representation of one connected client.
#[derive(Debug)]
pub struct Session {
    endpoint: SocketAddr,
    entity_id: u64,
    profile: Profile,
    location: Location,
    game_mode: GameMode,
    connection: Connection,
}

impl Session {
    pub fn new(
        endpoint: SocketAddr,
        profile: Profile,
        location: Location,
        game_mode: GameMode,
        connection: Connection,
    ) -> Self {
        Self {
            endpoint,
            entity_id: next_entity_id(),
            profile,
            location,
            game_mode,
            connection,
        }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn identity(&self) -> Uuid {
        self.profile.identity
    }

    pub fn entity_id(&self) -> u64 {
        self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    pub fn set_game_mode(&mut self, game_mode: GameMode) {
        self.game_mode = game_mode;
    }

    /// Places the session without notifying the client. Used before join completes.
    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    /// Whether the session is currently inside `world` (case-insensitive).
    pub fn is_in_world(&self, world: &str) -> bool {
        self.location.world.eq_ignore_ascii_case(world)
    }

    /// Roster row for this session.
    pub fn tablist_entry(&self) -> TablistEntry {
        TablistEntry {
            identity: self.profile.identity,
            entity_id: self.entity_id,
            name: self.profile.name.clone(),
            device: self.profile.device.clone(),
            xuid: self.profile.xuid.clone(),
            skin: self.profile.skin.clone(),
        }
    }

    pub fn send_packet(&self, packet: Packet) {
        self.connection.send(packet);
    }

    pub fn send_message(&self, message: impl Into<String>) {
        self.send_packet(Packet::Text {
            message: message.into(),
        });
    }

    /// Moves the session and tells the client.
    pub fn teleport(&mut self, location: Location) {
        self.location = location.clone();
        self.send_packet(Packet::MovePlayer { location });
    }

    /// Tells the client why it is being dropped. Registry removal is up to the caller.
    pub fn disconnect(&self, reason: &str) {
        info!(player = %self.profile.name, endpoint = %self.endpoint, reason, "Disconnecting player");
        self.send_packet(Packet::Disconnect {
            reason: reason.to_string(),
        });
    }
}

/// Connected sessions, keyed by endpoint.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    sessions: HashMap<SocketAddr, Session>,
}

impl PlayerRegistry {
    /// Registers a session. A session already bound to the endpoint wins and
    /// the new one is handed back.
    pub fn add(&mut self, session: Session) -> Result<(), Session> {
        if self.sessions.contains_key(&session.endpoint) {
            return Err(session);
        }
        self.sessions.insert(session.endpoint, session);
        Ok(())
    }

    pub fn remove(&mut self, endpoint: SocketAddr) -> Option<Session> {
        self.sessions.remove(&endpoint)
    }

    pub fn get(&self, endpoint: SocketAddr) -> Option<&Session> {
        self.sessions.get(&endpoint)
    }

    pub fn get_mut(&mut self, endpoint: SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(&endpoint)
    }

    /// Case-insensitive lookup by display name. Linear in the population.
    pub fn find_by_name(&self, name: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn find_by_identity(&self, identity: Uuid) -> Option<&Session> {
        self.sessions.values().find(|s| s.identity() == identity)
    }

    /// Endpoints of every session inside `world`.
    pub fn in_world(&self, world: &str) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|s| s.is_in_world(world))
            .map(Session::endpoint)
            .collect()
    }

    pub fn endpoints(&self) -> Vec<SocketAddr> {
        self.sessions.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sends a chat line to everyone and records it in the log.
    pub fn broadcast_message(&self, message: &str) {
        for session in self.sessions.values() {
            session.send_message(message);
        }
        info!(target: "chat", "{message}");
    }

    pub fn broadcast_packet(&self, packet: &Packet) {
        for session in self.sessions.values() {
            session.send_packet(packet.clone());
        }
    }

    /// Sends to the listed endpoints only; unknown endpoints are skipped.
    pub fn broadcast_packet_to(&self, endpoints: &[SocketAddr], packet: &Packet) {
        for endpoint in endpoints {
            if let Some(session) = self.sessions.get(endpoint) {
                session.send_packet(packet.clone());
            }
        }
    }
}
