//! Fixed-rate tick loop.
//!
//! Each iteration advances the tick counter, drains deferred tasks, records
//! the frame time and updates every loaded world in registry order. After an
//! iteration the loop sleeps for whatever is left of [`TICK_PERIOD`]; an
//! overrunning tick starts the next one immediately without catching up.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

use crate::{
    perf::TICK_PERIOD,
    server::Server,
    task::{panic_message, TaskQueue, TaskSender},
};

pub struct TickScheduler {
    server: Server,
    tasks: TaskQueue<Server>,
    last_start: Option<Instant>,
    last_duration: Duration,
}

impl TickScheduler {
    pub fn new(server: Server, tasks: TaskQueue<Server>) -> Self {
        Self {
            server,
            tasks,
            last_start: None,
            last_duration: Duration::ZERO,
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    pub fn sender(&self) -> TaskSender<Server> {
        self.server.tasks().clone()
    }

    /// Gives the server back once the loop is done with it.
    pub fn into_server(self) -> Server {
        self.server
    }

    /// Executes one tick and returns its number.
    pub fn step(&mut self) -> u64 {
        let start = Instant::now();
        let frame = self
            .last_start
            .map_or(TICK_PERIOD, |previous| start.duration_since(previous));
        self.last_start = Some(start);

        let tick = self.server.perf_mut().begin_tick();
        self.tasks.drain_and_run_all(&mut self.server);
        self.server.perf_mut().record_frame(frame);
        update_worlds(&mut self.server, tick);

        self.last_duration = start.elapsed();
        tick
    }

    /// Ticks until the server stops running.
    pub async fn run(&mut self) {
        info!(period_ms = TICK_PERIOD.as_millis() as u64, "Tick loop started");
        while self.server.is_running() {
            self.pause().await;
            self.step();
        }
        info!(tick = self.server.current_tick(), "Tick loop stopped");
    }

    /// Runs at most `ticks` ticks, returning early if the server stops.
    pub async fn run_for_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            if !self.server.is_running() {
                break;
            }
            self.pause().await;
            self.step();
        }
    }

    async fn pause(&mut self) {
        if let Some(remaining) = self.remaining_pause() {
            tokio::time::sleep(remaining).await;
        }
    }

    /// Time left in the current period, if any, after the last tick's work.
    fn remaining_pause(&self) -> Option<Duration> {
        self.last_start?;
        let remaining = TICK_PERIOD.saturating_sub(self.last_duration);
        (!remaining.is_zero()).then_some(remaining)
    }
}

/// Updates every world; a failing or panicking world only loses this tick.
fn update_worlds(server: &mut Server, tick: u64) {
    for world in server.worlds_mut().iter_mut() {
        match panic::catch_unwind(AssertUnwindSafe(|| world.update(tick))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(world = %world.name(), tick, error = %format!("{e:#}"), "World update failed");
            }
            Err(payload) => {
                error!(
                    world = %world.name(),
                    tick,
                    panic = %panic_message(payload.as_ref()),
                    "World update panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::test_server;
    use crate::world::WorldSystem;
    use realm_shared::ecs::EntityStore;
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    struct Panics;

    impl WorldSystem for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn update(&mut self, _tick: u64, _entities: &mut EntityStore) -> anyhow::Result<()> {
            panic!("boom");
        }
    }

    struct Fails;

    impl WorldSystem for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        fn update(&mut self, tick: u64, _entities: &mut EntityStore) -> anyhow::Result<()> {
            anyhow::bail!("nope at {tick}")
        }
    }

    /// Records the tick it last saw.
    struct Seen(Arc<AtomicU64>);

    impl WorldSystem for Seen {
        fn name(&self) -> &str {
            "seen"
        }

        fn update(&mut self, tick: u64, _entities: &mut EntityStore) -> anyhow::Result<()> {
            self.0.store(tick, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler() -> TickScheduler {
        let (server, queue) = test_server(Vec::new());
        TickScheduler::new(server, queue)
    }

    #[test]
    fn broken_worlds_do_not_stop_the_others() {
        let mut scheduler = scheduler();
        let seen = Arc::new(AtomicU64::new(0));
        {
            let server = scheduler.server_mut();
            server.load_or_create_world("a");
            server.load_or_create_world("b");
            let worlds = server.worlds_mut();
            worlds.get_mut("world").unwrap().add_system(Box::new(Panics));
            worlds.get_mut("a").unwrap().add_system(Box::new(Fails));
            worlds.get_mut("b").unwrap().add_system(Box::new(Seen(seen.clone())));
        }

        assert_eq!(scheduler.step(), 1);
        assert_eq!(scheduler.step(), 2);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.server().worlds().len(), 3);
        assert_eq!(scheduler.server().current_tick(), 2);
    }

    #[test]
    fn tasks_run_before_world_updates() {
        let mut scheduler = scheduler();
        let sender = scheduler.sender();
        sender.submit(|server: &mut Server| {
            server.load_or_create_world("late");
        });

        scheduler.step();

        let late = scheduler.server().worlds().get("late").unwrap();
        assert_eq!(late.time(), 1);
    }

    #[test]
    fn panicking_task_does_not_stop_the_tick() {
        let mut scheduler = scheduler();
        let sender = scheduler.sender();
        sender.submit(|_: &mut Server| panic!("bad task"));
        sender.submit(|server: &mut Server| {
            server.load_or_create_world("after");
        });

        scheduler.step();

        assert!(scheduler.server().worlds().contains("after"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_after_shutdown_task() {
        let mut scheduler = scheduler();
        let sender = scheduler.sender();
        scheduler.run_for_ticks(3).await;
        assert_eq!(scheduler.server().current_tick(), 3);

        sender.submit(|server: &mut Server| server.shutdown());
        scheduler.run().await;

        assert!(!scheduler.server().is_running());
        assert_eq!(scheduler.server().current_tick(), 4);
        assert!(scheduler.server().worlds().is_empty());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test(start_paused = true)]
    async fn run_can_be_spawned_onto_the_runtime() {
        let mut scheduler = scheduler();
        assert_send(&scheduler.run_for_ticks(1));
        let sender = scheduler.sender();
        let handle = tokio::spawn(async move {
            scheduler.run().await;
            scheduler
        });

        sender.submit(|server: &mut Server| server.shutdown());
        let scheduler = handle.await.unwrap();
        assert!(!scheduler.server().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn steady_ticks_report_nominal_tps() {
        let mut scheduler = scheduler();
        scheduler.run_for_ticks(40).await;
        let tps = scheduler.server().current_tps();
        assert!((tps - 20.0).abs() < 0.5, "tps was {tps}");
    }
}
