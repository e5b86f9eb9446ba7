//! The tick driver: what moves [`crate::clock::VirtualClock`] forward when
//! the engine isn't busy processing a message.
//!
//! Grounded on the original's `correllate_timer_tick`/`iv_timer_register`
//! one-shot rearming timer: each tick fires roughly once a second, runs
//! `_correllate_timer_tick`, then reschedules itself for "now plus one
//! second" rather than on a fixed-rate interval — so a slow tick never
//! causes a pile-up of queued callbacks.
//!
//! The correlation engine's design notes call for exposing this as an
//! injected trait rather than hardwiring a background thread, so the core
//! is testable by driving ticks manually with a mock clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Something that periodically asks the engine to advance its virtual
/// clock, independent of incoming messages.
///
/// A host that already runs its own event loop (the usual case for a log
/// processing pipeline) can implement this directly on top of its own
/// timer facility instead of spawning [`ThreadTicker`]'s background thread.
pub trait TickSource {
    /// Runs `on_tick` approximately once a second until the source is
    /// stopped. Implementations are free to call more or less often; the
    /// virtual clock only ever advances by whole elapsed seconds regardless
    /// (spec.md §4.1), so jitter in the tick's own period doesn't affect
    /// correctness.
    fn run<F: FnMut() + Send + 'static>(&self, on_tick: F);
}

/// The default [`TickSource`]: a single background thread sleeping for
/// one second between ticks.
#[derive(Debug, Clone)]
pub struct ThreadTicker {
    period: Duration,
    running: Arc<AtomicBool>,
}

impl ThreadTicker {
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(1))
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stops the ticker after its currently-sleeping period elapses. A
    /// stopped ticker can't be restarted; create a new one instead.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for ThreadTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for ThreadTicker {
    fn run<F: FnMut() + Send + 'static>(&self, mut on_tick: F) {
        let period = self.period;
        let running = Arc::clone(&self.running);
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(period);
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                on_tick();
            }
        });
    }
}

/// A [`TickSource`] that never fires on its own; the test or host drives
/// [`call`](Self::call) directly. Grounded on the same "inject a mock clock
/// and drive it by hand" testability requirement the virtual clock's
/// `MockClock` serves.
#[derive(Debug, Default)]
pub struct ManualTicker;

impl ManualTicker {
    pub fn new() -> Self {
        Self
    }
}

impl TickSource for ManualTicker {
    fn run<F: FnMut() + Send + 'static>(&self, _on_tick: F) {}
}
