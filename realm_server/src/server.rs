//! Server context.
//!
//! One `Server` exists per process. It owns every registry and is owned in
//! turn by the tick scheduler, so holding `&mut Server` means running on the
//! simulation context. Other threads reach it only through
//! [`TaskSender<Server>`](crate::task::TaskSender).

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use realm_shared::{
    config::ServerConfig,
    math::Location,
    net::{Packet, PlayStatus},
};
use tracing::{error, info, warn};

use crate::{
    console::ConsoleInput,
    perf::PerformanceTracker,
    player::{PlayerRegistry, Session},
    plugin::{PluginContext, PluginManager, WorldUnloadEvent},
    resource_pack::ResourcePackManager,
    tablist::Tablist,
    task::TaskSender,
    transport::Transport,
    world::{GeneratorRegistry, LoadOutcome, World, WorldGenerator, WorldRegistry},
};

/// True from startup until shutdown begins; flips exactly once.
#[derive(Debug, Clone)]
pub struct RunningFlag(Arc<AtomicBool>);

impl Default for RunningFlag {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl RunningFlag {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag. Only the first call returns true.
    pub(crate) fn stop(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// What happens to a session inside a world that is being unloaded.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerFate {
    Relocate(Location),
    Disconnect(String),
}

/// Result of [`Server::unload_world_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    /// A plugin cancelled the unload notification; nothing changed.
    Cancelled,
    NotFound,
}

/// Process-wide server state.
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) server_id: u64,
    pub(crate) running: RunningFlag,
    pub(crate) perf: PerformanceTracker,
    pub(crate) players: PlayerRegistry,
    pub(crate) tablist: Tablist,
    pub(crate) worlds: WorldRegistry,
    pub(crate) generators: GeneratorRegistry,
    pub(crate) overworld_generator: Arc<dyn WorldGenerator>,
    pub(crate) plugins: PluginManager,
    pub(crate) resource_packs: ResourcePackManager,
    pub(crate) tasks: TaskSender<Server>,
    pub(crate) transport: Option<Transport>,
    pub(crate) console: Option<ConsoleInput>,
}

impl Server {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn server_id(&self) -> u64 {
        self.server_id
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    pub fn running_flag(&self) -> RunningFlag {
        self.running.clone()
    }

    pub fn current_tick(&self) -> u64 {
        self.perf.current_tick()
    }

    pub fn current_tps(&self) -> f64 {
        self.perf.current_tps()
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut PlayerRegistry {
        &mut self.players
    }

    pub fn tablist(&self) -> &Tablist {
        &self.tablist
    }

    pub fn worlds(&self) -> &WorldRegistry {
        &self.worlds
    }

    pub fn worlds_mut(&mut self) -> &mut WorldRegistry {
        &mut self.worlds
    }

    pub fn generators(&self) -> &GeneratorRegistry {
        &self.generators
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn resource_packs(&self) -> &ResourcePackManager {
        &self.resource_packs
    }

    /// Producer handle for work that must run on the simulation context.
    pub fn tasks(&self) -> &TaskSender<Server> {
        &self.tasks
    }

    /// Address the transport is bound to, if it is up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(Transport::local_addr)
    }

    pub fn attach_transport(&mut self, transport: Transport) {
        self.transport = Some(transport);
    }

    pub fn attach_console(&mut self, console: ConsoleInput) {
        self.console = Some(console);
    }

    pub(crate) fn perf_mut(&mut self) -> &mut PerformanceTracker {
        &mut self.perf
    }

    pub(crate) fn enable_plugins(&mut self) {
        let ctx = PluginContext {
            tasks: self.tasks.clone(),
        };
        self.plugins.enable_all(&ctx);
    }

    // =========== Worlds ===========

    /// Loads a world with the configured overworld generator.
    pub fn load_or_create_world(&mut self, name: &str) -> LoadOutcome {
        let generator = self.overworld_generator.clone();
        self.worlds.load_or_create(name, generator)
    }

    /// Loads the configured default world and marks it as default.
    pub(crate) fn load_default_world(&mut self) {
        let name = self.config.default_world.clone();
        match self.load_or_create_world(&name) {
            LoadOutcome::Loaded | LoadOutcome::AlreadyLoaded => {
                self.worlds.set_default(&name);
            }
            LoadOutcome::Failed => {
                error!(world = %name, "Default world is unavailable; joins will be refused");
            }
        }
    }

    /// Unloads a world, moving its sessions to the default world's spawn.
    ///
    /// Sessions are disconnected instead when the world being unloaded is the
    /// default one or there is no default world.
    pub fn unload_world(&mut self, name: &str) -> UnloadOutcome {
        let fallback = self
            .worlds
            .default_world()
            .filter(|w| !w.name().eq_ignore_ascii_case(name))
            .map(World::spawn_location);
        self.unload_world_with(name, move |_| match &fallback {
            Some(spawn) => PlayerFate::Relocate(spawn.clone()),
            None => PlayerFate::Disconnect("World was unloaded".to_string()),
        })
    }

    /// Unloads a world, applying `policy` to every session inside it first.
    ///
    /// Plugins are notified before anything happens and may cancel.
    pub fn unload_world_with<P>(&mut self, name: &str, mut policy: P) -> UnloadOutcome
    where
        P: FnMut(&Session) -> PlayerFate,
    {
        let Some(world) = self.worlds.get(name) else {
            warn!(world = %name, "World was not found");
            return UnloadOutcome::NotFound;
        };
        let world_name = world.name().to_string();

        let mut event = WorldUnloadEvent::new(world_name.clone());
        self.plugins.call_world_unload(&mut event);
        if event.is_cancelled() {
            info!(world = %world_name, "World unload cancelled");
            return UnloadOutcome::Cancelled;
        }

        for endpoint in self.players.in_world(&world_name) {
            let Some(session) = self.players.get(endpoint) else {
                continue;
            };
            match policy(session) {
                PlayerFate::Relocate(location) => {
                    if let Some(session) = self.players.get_mut(endpoint) {
                        session.teleport(location);
                    }
                }
                PlayerFate::Disconnect(reason) => {
                    self.disconnect_player(endpoint, &reason);
                }
            }
        }

        self.worlds.unload(&world_name);
        UnloadOutcome::Unloaded
    }

    // =========== Players ===========

    /// Completes a login: registers the session, sends it the initial state
    /// and announces it on the tablist.
    pub fn join(&mut self, mut session: Session) {
        let endpoint = session.endpoint();
        if self.players.get(endpoint).is_some() {
            session.disconnect("Already connected from this address");
            return;
        }
        if self.players.len() >= self.config.max_players {
            session.send_packet(Packet::PlayStatus {
                status: PlayStatus::ServerFull,
            });
            session.disconnect("Server is full");
            return;
        }
        let Some(spawn) = self.worlds.default_world().map(World::spawn_location) else {
            session.disconnect("No default world is loaded");
            return;
        };
        if let Some(existing) = self.players.find_by_identity(session.identity()) {
            let previous = existing.endpoint();
            self.disconnect_player(previous, "Logged in from another location");
        }

        session.set_location(spawn.clone());
        session.set_game_mode(self.config.game_mode);

        session.send_packet(Packet::PlayStatus {
            status: PlayStatus::LoginSuccess,
        });
        session.send_packet(Packet::ResourcePacksInfo {
            forced: self.config.force_resource_packs,
            packs: self.resource_packs.entries(),
        });
        session.send_packet(Packet::StartGame {
            entity_id: session.entity_id(),
            game_mode: session.game_mode(),
            spawn,
        });
        if !self.tablist.is_empty() {
            session.send_packet(self.tablist.roster_packet());
        }

        let entry = session.tablist_entry();
        let name = session.name().to_string();
        if let Err(rejected) = self.players.add(session) {
            rejected.disconnect("Already connected from this address");
            return;
        }
        self.tablist.add(entry, &self.players);
        info!(player = %name, %endpoint, "Player joined");
    }

    /// Drops a session with a reason sent to its client. Returns false if no
    /// session is bound to `endpoint`.
    pub fn disconnect_player(&mut self, endpoint: SocketAddr, reason: &str) -> bool {
        let Some(session) = self.players.remove(endpoint) else {
            return false;
        };
        session.disconnect(reason);
        self.tablist.remove(session.identity(), &self.players);
        true
    }

    /// Forgets a session whose connection is already gone. Only the session
    /// with `entity_id` is removed; a different session bound to the same
    /// endpoint stays.
    pub fn remove_session(&mut self, endpoint: SocketAddr, entity_id: u64) -> bool {
        if self.players.get(endpoint).map(Session::entity_id) != Some(entity_id) {
            return false;
        }
        let Some(session) = self.players.remove(endpoint) else {
            return false;
        };
        self.tablist.remove(session.identity(), &self.players);
        info!(player = %session.name(), %endpoint, "Player left");
        true
    }

    /// Broadcasts chat text sent by a session.
    pub fn handle_chat(&mut self, endpoint: SocketAddr, message: &str) {
        let Some(session) = self.players.get(endpoint) else {
            return;
        };
        let line = format!("<{}> {}", session.name(), message.trim());
        self.players.broadcast_message(&line);
    }

    pub fn broadcast_message(&self, message: &str) {
        self.players.broadcast_message(message);
    }

    pub fn broadcast_packet(&self, packet: &Packet) {
        self.players.broadcast_packet(packet);
    }

    pub fn broadcast_packet_to(&self, endpoints: &[SocketAddr], packet: &Packet) {
        self.players.broadcast_packet_to(endpoints, packet);
    }

    // =========== Lifecycle ===========

    /// Stops the server. Only the first call does anything.
    ///
    /// Disconnects every session, unloads every world, disables plugins,
    /// stops console input and closes the transport, in that order. The tick
    /// loop exits at the end of the current iteration.
    pub fn shutdown(&mut self) {
        if !self.running.stop() {
            return;
        }
        info!("Shutting down server");

        for endpoint in self.players.endpoints() {
            self.disconnect_player(endpoint, "Server shutdown");
        }

        info!("Unloading all worlds");
        for name in self.worlds.names() {
            self.unload_world(&name);
        }

        info!("Disabling all plugins");
        self.plugins.disable_all();

        if let Some(console) = self.console.take() {
            console.stop();
        }
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        info!("Shutdown complete");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        lifecycle::Launcher,
        player::tests::{drain, test_session},
        plugin::Plugin,
        task::TaskQueue,
        world::StorageProvider,
    };
    use realm_shared::math::Vec3;
    use std::sync::atomic::AtomicUsize;

    pub(crate) fn test_server(plugins: Vec<Box<dyn Plugin>>) -> (Server, TaskQueue<Server>) {
        let root = std::env::temp_dir().join(format!("realm-server-{}", uuid::Uuid::new_v4()));
        let mut launcher = Launcher::new(root)
            .config(ServerConfig {
                max_players: 3,
                ..ServerConfig::default()
            })
            .storage(StorageProvider::Memory);
        for plugin in plugins {
            launcher = launcher.plugin(plugin);
        }
        launcher.build().unwrap()
    }

    struct Veto(&'static str);

    impl Plugin for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        fn on_world_unload(&mut self, event: &mut WorldUnloadEvent) {
            if event.world().eq_ignore_ascii_case(self.0) {
                event.cancel();
            }
        }
    }

    struct CountDisables(Arc<AtomicUsize>);

    impl Plugin for CountDisables {
        fn name(&self) -> &str {
            "count-disables"
        }

        fn on_disable(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn place(
        server: &mut Server,
        port: u16,
        name: &str,
        world: &str,
    ) -> (SocketAddr, tokio::sync::mpsc::UnboundedReceiver<Packet>) {
        let (session, rx) = test_session(port, name, world);
        let endpoint = session.endpoint();
        server.players.add(session).unwrap();
        (endpoint, rx)
    }

    #[test]
    fn build_loads_the_default_world() {
        let (server, _queue) = test_server(Vec::new());
        assert_eq!(server.worlds().default_world().unwrap().name(), "world");
        assert!(server.is_running());
    }

    #[test]
    fn unloading_unknown_world_is_a_no_op() {
        let (mut server, _queue) = test_server(Vec::new());
        assert_eq!(server.unload_world("atlantis"), UnloadOutcome::NotFound);
        assert_eq!(server.worlds().len(), 1);
    }

    #[test]
    fn unloading_the_default_world_disconnects_its_players() {
        let (mut server, _queue) = test_server(Vec::new());
        let (a, mut rx_a) = place(&mut server, 6000, "A", "world");
        let (b, mut rx_b) = place(&mut server, 6001, "B", "World");

        assert_eq!(server.unload_world("WORLD"), UnloadOutcome::Unloaded);

        assert!(server.players().get(a).is_none());
        assert!(server.players().get(b).is_none());
        for rx in [&mut rx_a, &mut rx_b] {
            let packets = drain(rx);
            assert!(packets.contains(&Packet::Disconnect {
                reason: "World was unloaded".into()
            }));
            assert!(!packets.iter().any(|p| matches!(p, Packet::MovePlayer { .. })));
        }
        assert!(server.worlds().default_world().is_none());
    }

    #[test]
    fn unloading_another_world_relocates_to_default_spawn() {
        let (mut server, _queue) = test_server(Vec::new());
        assert!(server.load_or_create_world("nether").is_loaded());
        let (a, mut rx_a) = place(&mut server, 6002, "A", "nether");
        let (b, mut rx_b) = place(&mut server, 6003, "B", "NETHER");
        let (c, mut rx_c) = place(&mut server, 6004, "C", "world");
        let spawn = server.worlds().default_world().unwrap().spawn_location();

        assert_eq!(server.unload_world("nether"), UnloadOutcome::Unloaded);

        for (endpoint, rx) in [(a, &mut rx_a), (b, &mut rx_b)] {
            let session = server.players().get(endpoint).unwrap();
            assert_eq!(session.location(), &spawn);
            assert_eq!(
                drain(rx),
                vec![Packet::MovePlayer {
                    location: spawn.clone()
                }]
            );
        }
        assert!(server.players().get(c).is_some());
        assert!(drain(&mut rx_c).is_empty());
        assert!(server.worlds().get("nether").is_none());
    }

    #[test]
    fn cancelled_unload_changes_nothing() {
        let (mut server, _queue) = test_server(vec![Box::new(Veto("world"))]);
        let (a, mut rx_a) = place(&mut server, 6005, "A", "world");

        assert_eq!(server.unload_world("world"), UnloadOutcome::Cancelled);

        let world = server.worlds().get("world").unwrap();
        assert!(world.is_open());
        assert!(world.chunk_count() > 0);
        assert_eq!(server.players().in_world("world"), vec![a]);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn custom_policy_runs_before_close() {
        let (mut server, _queue) = test_server(Vec::new());
        assert!(server.load_or_create_world("arena").is_loaded());
        place(&mut server, 6006, "A", "arena");

        let mut seen = Vec::new();
        let target = Location::new("world", Vec3::new(10.0, 4.0, 10.0));
        let outcome = server.unload_world_with("arena", |session| {
            seen.push(session.name().to_string());
            PlayerFate::Relocate(target.clone())
        });

        assert_eq!(outcome, UnloadOutcome::Unloaded);
        assert_eq!(seen, vec!["A"]);
    }

    #[test]
    fn join_sends_initial_state_and_announces_newcomer() {
        let (mut server, _queue) = test_server(Vec::new());
        let (first, mut first_rx) = test_session(6010, "First", "");
        let (second, mut second_rx) = test_session(6011, "Second", "");
        let first_entry_identity = first.identity();
        server.join(first);
        drain(&mut first_rx);

        server.join(second);

        let packets = drain(&mut second_rx);
        assert!(matches!(packets[0], Packet::PlayStatus { status: PlayStatus::LoginSuccess }));
        assert!(matches!(packets[1], Packet::ResourcePacksInfo { .. }));
        assert!(matches!(packets[2], Packet::StartGame { .. }));
        match &packets[3] {
            Packet::PlayerListAdd { entries } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].identity, first_entry_identity);
            }
            other => panic!("expected roster, got {other:?}"),
        }
        assert!(matches!(&packets[4], Packet::PlayerListAdd { entries } if entries[0].name == "Second"));

        let seen_by_first = drain(&mut first_rx);
        assert!(matches!(&seen_by_first[..], [Packet::PlayerListAdd { entries }] if entries[0].name == "Second"));
        assert_eq!(server.tablist().len(), 2);
        assert!(server.players().iter().all(|s| s.is_in_world("world")));
    }

    #[test]
    fn join_is_refused_when_full() {
        let (mut server, _queue) = test_server(Vec::new());
        for port in 6020..6023 {
            let (s, _rx) = test_session(port, &format!("P{port}"), "");
            server.join(s);
        }
        let (late, mut late_rx) = test_session(6023, "Late", "");
        server.join(late);

        assert_eq!(server.players().len(), 3);
        let packets = drain(&mut late_rx);
        assert!(packets.contains(&Packet::Disconnect {
            reason: "Server is full".into()
        }));
    }

    #[test]
    fn disconnect_removes_from_registry_and_tablist() {
        let (mut server, _queue) = test_server(Vec::new());
        let (a, mut rx_a) = test_session(6030, "A", "");
        let (b, mut rx_b) = test_session(6031, "B", "");
        let (a_addr, a_id) = (a.endpoint(), a.identity());
        server.join(a);
        server.join(b);
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert!(server.disconnect_player(a_addr, "bye"));
        assert!(!server.disconnect_player(a_addr, "bye"));

        assert!(server.tablist().get(a_id).is_none());
        assert_eq!(
            drain(&mut rx_a),
            vec![Packet::Disconnect {
                reason: "bye".into()
            }]
        );
        assert_eq!(
            drain(&mut rx_b),
            vec![Packet::PlayerListRemove {
                identities: vec![a_id]
            }]
        );
    }

    #[test]
    fn closing_a_rejected_connection_keeps_the_bound_session() {
        let (mut server, _queue) = test_server(Vec::new());
        let (first, mut first_rx) = test_session(6035, "First", "");
        let (second, mut second_rx) = test_session(6035, "Second", "");
        let endpoint = first.endpoint();
        let (first_entity, second_entity) = (first.entity_id(), second.entity_id());
        let first_identity = first.identity();
        server.join(first);
        server.join(second);
        drain(&mut first_rx);
        assert!(drain(&mut second_rx).contains(&Packet::Disconnect {
            reason: "Already connected from this address".into()
        }));

        assert!(!server.remove_session(endpoint, second_entity));
        assert_eq!(server.players().get(endpoint).map(|s| s.name()), Some("First"));
        assert!(server.tablist().get(first_identity).is_some());
        assert!(drain(&mut first_rx).is_empty());

        assert!(server.remove_session(endpoint, first_entity));
        assert!(server.players().is_empty());
        assert!(server.tablist().get(first_identity).is_none());
    }

    #[test]
    fn shutdown_runs_once() {
        let disables = Arc::new(AtomicUsize::new(0));
        let (mut server, _queue) = test_server(vec![Box::new(CountDisables(disables.clone()))]);
        let (s, mut rx) = test_session(6040, "A", "");
        server.join(s);
        drain(&mut rx);

        server.shutdown();
        server.shutdown();

        assert!(!server.is_running());
        assert_eq!(disables.load(Ordering::SeqCst), 1);
        assert!(server.players().is_empty());
        assert!(server.worlds().is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![Packet::Disconnect {
                reason: "Server shutdown".into()
            }]
        );
    }

    #[test]
    fn chat_is_prefixed_with_sender_name() {
        let (mut server, _queue) = test_server(Vec::new());
        let (a, mut rx_a) = test_session(6050, "Alex", "");
        let a_addr = a.endpoint();
        server.join(a);
        drain(&mut rx_a);

        server.handle_chat(a_addr, " hello ");

        assert_eq!(
            drain(&mut rx_a),
            vec![Packet::Text {
                message: "<Alex> hello".into()
            }]
        );
    }
}
