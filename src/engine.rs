//! Engine - realtime and offline tick drivers
//!
//! The engine owns the tick queue and fires ticks into it.
//! - Realtime: one tick per `tick_interval_ms`, paced with spin_sleep
//! - Offline: stepping API for faster-than-realtime execution and tests

use crate::config::KeypadConfig;
use crate::hid::SharedActuator;
use crate::keys::{new_key_chain, KeyChain};
use crate::scheduler::TickQueue;
use spin_sleep::SpinSleeper;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tick driver execution mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerMode {
    Realtime,
    Offline,
}

/// The tick driver.
pub struct Engine {
    pub mode: SchedulerMode,
    queue: TickQueue,
    sleeper: SpinSleeper,
    config: KeypadConfig,
}

impl Engine {
    pub fn new(mode: SchedulerMode, config: KeypadConfig) -> Self {
        Self {
            mode,
            queue: TickQueue::new(),
            sleeper: SpinSleeper::default(),
            config,
        }
    }

    /// The queue this engine drives. Clones share state.
    pub fn queue(&self) -> &TickQueue {
        &self.queue
    }

    /// Start a new chain targeting this engine's queue.
    pub fn chain(&self, hid: &SharedActuator) -> KeyChain {
        new_key_chain(&self.queue, hid)
    }

    /// Fire exactly one tick. Returns the number of jobs advanced.
    pub fn step(&mut self) -> usize {
        self.queue.tick()
    }

    /// Fire `n` ticks.
    pub fn step_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.queue.tick();
        }
    }

    /// Tick until nothing is pending or running. Returns ticks fired.
    pub fn run_until_idle(&mut self) -> u64 {
        let limit = self.config.max_ticks_per_run;
        let mut fired = 0;
        while !self.queue.is_idle() {
            self.queue.tick();
            fired += 1;
            if fired > limit {
                panic!(
                    "run_until_idle exceeded {} ticks - likely a runaway chain",
                    limit
                );
            }
        }
        debug!(fired, now = self.queue.now(), "queue idle");
        fired
    }

    /// Fire ticks until `is_done` returns true.
    ///
    /// In realtime mode each tick is due at a fixed offset from the start,
    /// so a late tick shortens the next sleep instead of shifting every
    /// later tick.
    pub fn run_until<F>(&mut self, is_done: F)
    where
        F: Fn() -> bool,
    {
        let interval_ms = self.config.tick_interval_ms;
        let anchor = Instant::now();
        let mut fired: u64 = 0;

        while !is_done() {
            if self.mode == SchedulerMode::Realtime {
                let due = anchor + Duration::from_millis(interval_ms.saturating_mul(fired + 1));
                let now = Instant::now();
                if due > now {
                    self.sleeper.sleep(due - now);
                } else if now - due > Duration::from_millis(interval_ms) {
                    let late_ms = (now - due).as_millis() as u64;
                    warn!(tick = fired + 1, late_ms, "tick late");
                }
            } else if fired >= self.config.max_ticks_per_run {
                panic!(
                    "run_until exceeded {} ticks - likely a runaway chain",
                    self.config.max_ticks_per_run
                );
            }

            self.queue.tick();
            fired += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::{HidEvent, Key, RecordingActuator};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn offline() -> Engine {
        Engine::new(SchedulerMode::Offline, KeypadConfig::default())
    }

    #[test]
    fn test_offline_step() {
        let mut engine = offline();
        let rec = Rc::new(RefCell::new(RecordingActuator::new()));
        let hid: SharedActuator = rec.clone();

        engine.chain(&hid).tap('a');

        // Initially nothing has run
        assert!(rec.borrow().events().is_empty());

        assert_eq!(engine.step(), 1);
        assert_eq!(rec.borrow().events(), vec![HidEvent::KeyDown(Key::Char('a'))]);

        engine.step();
        assert_eq!(rec.borrow().events().len(), 2);
        assert!(engine.queue().is_idle());
    }

    #[test]
    fn test_run_until_idle_counts_ticks() {
        let mut engine = offline();
        let rec = Rc::new(RefCell::new(RecordingActuator::new()));
        let hid: SharedActuator = rec.clone();

        // 3 idle ticks, then down/up for each of two keys.
        engine.chain(&hid).after(3).tap("ok");
        assert_eq!(engine.run_until_idle(), 7);
        assert_eq!(engine.run_until_idle(), 0);
    }

    #[test]
    #[should_panic(expected = "runaway")]
    fn test_run_until_idle_guard() {
        let mut engine = Engine::new(
            SchedulerMode::Offline,
            KeypadConfig {
                max_ticks_per_run: 10,
                ..Default::default()
            },
        );
        let rec = Rc::new(RefCell::new(RecordingActuator::new()));
        let hid: SharedActuator = rec.clone();
        engine.chain(&hid).times(100).tap('z').fin();
        engine.run_until_idle();
    }

    #[test]
    fn test_offline_run_until() {
        let mut engine = offline();
        let queue = engine.queue().clone();
        engine.run_until(|| queue.now() >= 12);
        assert_eq!(engine.queue().now(), 12);
    }

    #[test]
    fn test_realtime_paces_ticks() {
        let mut engine = Engine::new(
            SchedulerMode::Realtime,
            KeypadConfig {
                tick_interval_ms: 2,
                ..Default::default()
            },
        );
        let queue = engine.queue().clone();

        let start = Instant::now();
        engine.run_until(|| queue.now() >= 5);
        assert_eq!(queue.now(), 5);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
