//! Plugin hooks.
//!
//! Plugins are registered programmatically; how they are discovered is up to
//! the embedding binary. The server calls into them at three points: enable
//! at startup, the cancellable world-unload notification, and disable at
//! shutdown.

use std::panic::{self, AssertUnwindSafe};

use tracing::{error, info};

use crate::{
    server::Server,
    task::{panic_message, TaskSender},
};

/// Raised before a world is unloaded. Cancelling it aborts the unload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldUnloadEvent {
    world: String,
    cancelled: bool,
}

impl WorldUnloadEvent {
    pub fn new(world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            cancelled: false,
        }
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Handed to plugins when they are enabled.
#[derive(Clone)]
pub struct PluginContext {
    /// Work that touches server state must go through here.
    pub tasks: TaskSender<Server>,
}

pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn on_enable(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_disable(&mut self) {}

    fn on_world_unload(&mut self, _event: &mut WorldUnloadEvent) {}
}

struct Slot {
    plugin: Box<dyn Plugin>,
    enabled: bool,
}

/// Registered plugins, in registration order.
#[derive(Default)]
pub struct PluginManager {
    slots: Vec<Slot>,
}

impl PluginManager {
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.slots.push(Slot {
            plugin,
            enabled: false,
        });
    }

    /// Enables every disabled plugin. A plugin whose `on_enable` fails stays disabled.
    pub fn enable_all(&mut self, ctx: &PluginContext) {
        for slot in self.slots.iter_mut().filter(|s| !s.enabled) {
            let name = slot.plugin.name().to_string();
            match slot.plugin.on_enable(ctx) {
                Ok(()) => {
                    slot.enabled = true;
                    info!(plugin = %name, "Plugin enabled");
                }
                Err(e) => error!(plugin = %name, error = %format!("{e:#}"), "Failed to enable plugin"),
            }
        }
    }

    /// Disables every enabled plugin.
    pub fn disable_all(&mut self) {
        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            slot.enabled = false;
            let plugin = &mut slot.plugin;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| plugin.on_disable())) {
                error!(
                    plugin = %plugin.name(),
                    panic = %panic_message(payload.as_ref()),
                    "Plugin panicked while disabling"
                );
            } else {
                info!(plugin = %plugin.name(), "Plugin disabled");
            }
        }
    }

    /// Delivers the event to every enabled plugin; any of them may cancel it.
    pub fn call_world_unload(&mut self, event: &mut WorldUnloadEvent) {
        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            slot.plugin.on_world_unload(event);
        }
    }

    pub fn enabled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.enabled).count()
    }

    pub fn names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| s.plugin.name().to_string())
            .collect()
    }
}
