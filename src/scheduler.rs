//! Tick Queue
//!
//! Holds jobs waiting out their start delay and the set of jobs currently
//! running. One call to [`TickQueue::tick`] activates everything that came
//! due and advances every active job exactly once.

use crate::job::BoxedJob;
use crate::pq::PriorityQueue;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::trace;

struct TickQueueInner {
    /// Deterministic sequence counter for FIFO tie-breaks.
    seq: u64,

    /// Jobs keyed by (due tick, seq).
    pending: PriorityQueue<(u64, u64), BoxedJob>,

    /// Jobs being advanced each tick, in activation order.
    active: Vec<BoxedJob>,

    /// Bumped by every `clear`, so a tick in flight can tell its jobs
    /// were discarded.
    epoch: u64,
}

/// Shared handle to the scheduler.
///
/// Clones refer to the same queue. The queue is not borrowed while jobs
/// run, so a job's side effects may schedule further work; such work is
/// never advanced in the tick it was added.
#[derive(Clone)]
pub struct TickQueue {
    inner: Rc<RefCell<TickQueueInner>>,
    now: Rc<Cell<u64>>,
}

impl Default for TickQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TickQueue {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TickQueueInner {
                seq: 0,
                pending: PriorityQueue::new(),
                active: Vec::new(),
                epoch: 0,
            })),
            now: Rc::new(Cell::new(0)),
        }
    }

    /// Ticks elapsed since the queue was created.
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    /// Live view of the tick counter, for collaborators that timestamp
    /// their side effects.
    pub fn clock(&self) -> Rc<Cell<u64>> {
        self.now.clone()
    }

    /// Schedule `job` to start after `delay` more ticks (0 = next tick).
    pub fn add(&self, job: BoxedJob, delay: u32) {
        let due = self.now.get() + 1 + u64::from(delay);
        let mut inner = self.inner.borrow_mut();
        let seq = inner.seq;
        inner.seq += 1;
        inner.pending.add((due, seq), job);
        trace!(due, seq, delay, "job scheduled");
    }

    /// Advance one tick. Returns the number of jobs advanced.
    pub fn tick(&self) -> usize {
        let now = self.now.get() + 1;
        self.now.set(now);

        let (epoch, mut active) = {
            let mut inner = self.inner.borrow_mut();
            let mut activated = 0usize;
            loop {
                match inner.pending.peek() {
                    Some((&(due, _), _)) if due <= now => {}
                    _ => break,
                }
                if let Some((_, job)) = inner.pending.remove() {
                    inner.active.push(job);
                    activated += 1;
                }
            }
            if activated > 0 {
                trace!(tick = now, activated, "jobs activated");
            }
            (inner.epoch, std::mem::take(&mut inner.active))
        };

        // A job that clears the queue also discards the rest of this batch.
        let mut advanced = 0usize;
        let mut finished = 0usize;
        active.retain_mut(|job| {
            if self.inner.borrow().epoch != epoch {
                return false;
            }
            advanced += 1;
            let done = job.advance().is_finished();
            finished += usize::from(done);
            !done
        });
        if finished > 0 {
            trace!(tick = now, finished, "jobs finished");
        }

        let mut inner = self.inner.borrow_mut();
        if inner.epoch != epoch {
            drop(inner);
            trace!(tick = now, discarded = active.len(), "queue cleared mid-tick");
            return advanced;
        }
        // A nested tick() may have activated jobs meanwhile; they go last.
        active.append(&mut inner.active);
        inner.active = active;
        advanced
    }

    /// Number of jobs still waiting out their delay.
    pub fn pending_len(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Number of jobs currently running.
    pub fn active_len(&self) -> usize {
        self.inner.borrow().active.len()
    }

    /// True when nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.borrow();
        inner.pending.is_empty() && inner.active.is_empty()
    }

    /// Remaining delay of every pending job, in activation order.
    pub fn pending_delays(&self) -> Vec<u64> {
        let now = self.now.get();
        let mut keys: Vec<(u64, u64)> =
            self.inner.borrow().pending.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        keys.into_iter()
            .map(|(due, _)| due.saturating_sub(now + 1))
            .collect()
    }

    /// Drop every pending and active job, including the jobs of a tick
    /// that is in progress.
    ///
    /// The jobs are dropped after the queue is released, so a job whose
    /// `Drop` schedules more work lands in the emptied queue.
    pub fn clear(&self) {
        let (pending, active) = {
            let mut inner = self.inner.borrow_mut();
            inner.epoch += 1;
            (
                std::mem::take(&mut inner.pending),
                std::mem::take(&mut inner.active),
            )
        };
        trace!(pending = pending.len(), active = active.len(), "queue cleared");
        drop(pending);
        drop(active);
    }
}
