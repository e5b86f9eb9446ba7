//! The virtual clock (spec.md §4.1) and the wall-clock source it advances
//! against.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of "now", as fractional seconds since the Unix epoch.
///
/// Sub-second precision matters here even though the virtual clock itself
/// only ever reports whole seconds: [`VirtualClock::advance_from_tick`]
/// must carry the sub-second remainder of an elapsed interval forward
/// (spec.md §4.1), which needs more than second granularity from the
/// underlying source.
///
/// [`SystemClock`] is the default, real implementation. Tests use
/// [`MockClock`] instead so that wall-clock advancement (and, crucially,
/// step-backs) are deterministic — mirroring the `Now`/`SystemNow` split in
/// `correlate-timer`'s upstream inspiration, where the doc comment notes
/// this "is especially useful in tests and any environment where
/// determinism is necessary".
pub trait WallClock: Send + Sync {
    fn wall_now_s(&self) -> f64;
}

/// Reads the OS wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn wall_now_s(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A programmable wall clock for tests: starts at a given epoch second and
/// only moves when told to, including backwards.
#[derive(Debug)]
pub struct MockClock {
    now_s: Mutex<f64>,
}

impl MockClock {
    pub fn new(start_s: f64) -> Self {
        Self {
            now_s: Mutex::new(start_s),
        }
    }

    pub fn set(&self, now_s: f64) {
        *self.now_s.lock().unwrap() = now_s;
    }

    pub fn advance(&self, delta_s: f64) {
        *self.now_s.lock().unwrap() += delta_s;
    }
}

impl WallClock for MockClock {
    fn wall_now_s(&self) -> f64 {
        *self.now_s.lock().unwrap()
    }
}

impl<T: WallClock + ?Sized> WallClock for Arc<T> {
    fn wall_now_s(&self) -> f64 {
        (**self).wall_now_s()
    }
}

/// The engine's monotonic notion of "now", in whole seconds.
///
/// Implements spec.md §4.1 verbatim:
/// - [`advance_from_message`](Self::advance_from_message) clamps below by
///   the message's own timestamp (never move backwards) and above by real
///   time (never let a future-dated message run expiries far ahead).
/// - [`advance_from_tick`](Self::advance_from_tick) advances by whole
///   elapsed real seconds, carrying the sub-second remainder forward, and
///   refuses to move backwards if the wall clock itself stepped back.
///
/// `now_s` is non-decreasing for the lifetime of the clock; this is the
/// monotonicity invariant the rest of the engine (in particular the timer
/// wheel, which would panic on a backwards `set_time`) depends on.
#[derive(Debug, Clone, Copy)]
pub struct VirtualClock {
    now_s: i64,
    /// Wall-clock value (fractional seconds) as of the last
    /// `advance_from_tick`/`advance_from_message` call.
    last_tick_s: f64,
}

impl VirtualClock {
    /// Starts the clock at `wall_now_s`, matching the original's
    /// `cached_g_current_time(&self->last_tick)` at construction time.
    pub fn new(wall_now_s: f64) -> Self {
        Self {
            now_s: wall_now_s.floor() as i64,
            last_tick_s: wall_now_s,
        }
    }

    pub fn now(&self) -> i64 {
        self.now_s
    }

    /// Advances the clock from an incoming message's timestamp.
    ///
    /// `ts_event < now_s` leaves the clock untouched (a late message never
    /// rewinds virtual time). Otherwise the clock jumps to
    /// `min(ts_event, floor(wall_now_s))`: a message timestamped in the
    /// future is clamped to real time rather than letting the engine run
    /// expiries arbitrarily far ahead of an untrustworthy clock.
    pub fn advance_from_message(&mut self, ts_event: i64, wall_now_s: f64) {
        self.last_tick_s = wall_now_s;
        if ts_event < self.now_s {
            return;
        }
        self.now_s = ts_event.min(wall_now_s.floor() as i64);
    }

    /// Advances the clock based on elapsed real time since the last tick or
    /// message.
    ///
    /// If real time has moved forward by more than a second, `now_s` is
    /// bumped by the whole-second part of the elapsed delta and the
    /// sub-second remainder is carried into `last_tick_s` so it isn't lost
    /// on the next call. If real time moved backwards (the host clock was
    /// stepped), `now_s` is left untouched; only `last_tick_s` is updated,
    /// so the next forward tick measures elapsed time from the new
    /// baseline rather than computing a huge bogus delta.
    pub fn advance_from_tick(&mut self, wall_now_s: f64) {
        let delta = wall_now_s - self.last_tick_s;
        if delta > 1.0 {
            let whole = delta.floor();
            self.now_s += whole as i64;
            self.last_tick_s = wall_now_s - (delta - whole);
        } else if delta < 0.0 {
            self.last_tick_s = wall_now_s;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn message_clamped_below_by_itself() {
        let mut clock = VirtualClock::new(100.0);
        clock.advance_from_message(50, 100.0);
        assert_eq!(clock.now(), 100, "must not move backwards for a late message");
    }

    #[test]
    fn message_clamped_above_by_wall_time() {
        let mut clock = VirtualClock::new(0.0);
        clock.advance_from_message(10_000, 0.0);
        assert_eq!(clock.now(), 0, "a future-dated message must not run time ahead");
    }

    #[test]
    fn message_advances_to_its_own_timestamp_within_wall_time() {
        let mut clock = VirtualClock::new(0.0);
        clock.advance_from_message(5, 10.0);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn tick_carries_subsecond_remainder() {
        let mut clock = VirtualClock::new(0.0);
        // 2.4s elapsed: advance by 2 whole seconds, keep 0.4s for next time.
        clock.advance_from_tick(2.4);
        assert_eq!(clock.now(), 2);

        // Another 0.7s of real time: 0.4 + 0.7 = 1.1s > 1s, so now advances
        // by one more second, carrying 0.1s forward again.
        clock.advance_from_tick(3.1);
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn tick_ignores_small_deltas() {
        let mut clock = VirtualClock::new(0.0);
        clock.advance_from_tick(1.0);
        assert_eq!(clock.now(), 0, "a <=1s delta does not move the clock yet");
    }

    #[test]
    fn wall_clock_step_back_does_not_regress_virtual_time() {
        let mut clock = VirtualClock::new(0.0);
        clock.advance_from_tick(100.0);
        assert_eq!(clock.now(), 100);

        // Wall clock jumps backwards to 50: vnow must hold at 100, only the
        // tick baseline moves.
        clock.advance_from_tick(50.0);
        assert_eq!(clock.now(), 100, "a step back must not move vnow backwards");

        // The next forward tick measures elapsed time from the new (50)
        // baseline and advances vnow normally from there.
        clock.advance_from_tick(60.0);
        assert_eq!(clock.now(), 110);
    }

    #[test]
    fn monotone_across_interleaved_messages_and_ticks() {
        let mut clock = VirtualClock::new(0.0);
        clock.advance_from_message(5, 5.0);
        assert_eq!(clock.now(), 5);
        clock.advance_from_tick(20.0);
        assert_eq!(clock.now(), 20);
        clock.advance_from_message(1, 25.0);
        assert_eq!(clock.now(), 20, "a past message never regresses now");
    }

    #[test]
    fn monotone_under_a_long_random_sequence() {
        use rand::Rng;
        use rand_core::SeedableRng;
        use rand_isaac::Isaac64Rng;

        let mut rng: Isaac64Rng = SeedableRng::seed_from_u64(123_490_814_327);
        let mut clock = VirtualClock::new(0.0);
        let mut wall_now: f64 = 0.0;
        let mut last_now = clock.now();

        for _ in 0..10_000 {
            // Real time only ever moves forward; the event stream mixes in
            // arbitrarily-skewed message timestamps, including ones far in
            // the past or future relative to wall time.
            wall_now += rng.gen_range(0.0, 3.0);
            let ts_event: i64 = wall_now as i64 + rng.gen_range(-10_000, 10_000);

            if rng.gen_bool(0.5) {
                clock.advance_from_message(ts_event, wall_now);
            } else {
                clock.advance_from_tick(wall_now);
            }

            let now = clock.now();
            assert!(now >= last_now, "virtual clock regressed: {} -> {}", last_now, now);
            last_now = now;
        }
    }
}
