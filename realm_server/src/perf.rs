//! Tick counter and ticks-per-second estimate.
//!
//! The estimate is refreshed every [`TPS_WINDOW`] ticks from the mean frame
//! time of that window, then held until the next refresh.

use std::time::Duration;

/// Nominal duration of one tick.
pub const TICK_PERIOD: Duration = Duration::from_millis(50);

/// Nominal ticks per second; the estimate never exceeds it.
pub const NOMINAL_TPS: f64 = 20.0;

/// Ticks between two recomputations of the estimate.
pub const TPS_WINDOW: u64 = 20;

const MIN_FRAME_MS: f64 = 0.001;

/// Tracks the tick counter and the smoothed TPS estimate.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    tick: u64,
    tps: f64,
    window_total: Duration,
    window_frames: u32,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self {
            tick: 0,
            tps: NOMINAL_TPS,
            window_total: Duration::ZERO,
            window_frames: 0,
        }
    }
}

impl PerformanceTracker {
    /// Advances the tick counter and returns the new tick number.
    pub fn begin_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Records the wall-clock length of the current tick's frame.
    ///
    /// On every [`TPS_WINDOW`]th tick the estimate is recomputed from the
    /// window mean and the window restarts.
    pub fn record_frame(&mut self, frame: Duration) {
        self.window_total += frame;
        self.window_frames += 1;

        if self.tick % TPS_WINDOW == 0 {
            let mean_ms = self.window_total.as_secs_f64() * 1000.0 / self.window_frames as f64;
            self.tps = (1000.0 / mean_ms.max(MIN_FRAME_MS)).min(NOMINAL_TPS);
            self.window_total = Duration::ZERO;
            self.window_frames = 0;
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn current_tps(&self) -> f64 {
        self.tps
    }
}
