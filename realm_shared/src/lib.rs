//! `realm_shared`
//!
//! Libraries shared by the server core, its transport, and the test harness.
//!
//! Design goals:
//! - Plain data types with explicit serde formats.
//! - Clear separation of concerns (config, net, math, game data).
//! - No `unsafe`.

pub mod config;
pub mod ecs;
pub mod math;
pub mod net;
pub mod palette;
