//! `realm_server`
//!
//! Server core:
//! - Fixed-rate tick loop with a ticks-per-second estimate
//! - Deferred task queue for work submitted from other threads
//! - Player, tablist and world registries
//! - Startup and idempotent shutdown
//!
//! Networking model:
//! - TCP, length-prefixed JSON packets (see `realm_shared::net`)
//! - Connection tasks never touch server state; they submit tasks

pub mod console;
pub mod lifecycle;
pub mod perf;
pub mod player;
pub mod plugin;
pub mod resource_pack;
pub mod scheduler;
pub mod server;
pub mod tablist;
pub mod task;
pub mod transport;
pub mod world;

pub use lifecycle::{install_signal_handler, Launcher};
pub use scheduler::TickScheduler;
pub use server::{PlayerFate, RunningFlag, Server, UnloadOutcome};
pub use task::{TaskQueue, TaskSender};
