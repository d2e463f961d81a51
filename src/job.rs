//! Tick jobs
//!
//! Resumable units of work advanced exactly once per tick. Leaf work is a
//! [`Mapper`]; [`Sequencer`], [`Encloser`] and [`Repeater`] compose other
//! jobs and own them exclusively. Every step does a bounded amount of work
//! so a single tick never blocks the rest of the queue.

/// Outcome of advancing a job by one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Running,
    Finished,
}

impl Step {
    pub fn is_finished(self) -> bool {
        self == Step::Finished
    }
}

/// The one capability the scheduler knows about.
pub trait TickJob {
    /// Do one tick's worth of work.
    fn advance(&mut self) -> Step;

    /// Rewind to the state the job was constructed in.
    fn reset(&mut self);
}

pub type BoxedJob = Box<dyn TickJob>;

/// Side effect applied to one payload value.
pub type Action<T> = Box<dyn FnMut(&T)>;

/// A container job that is still open for receiving children while a
/// chain is being built.
pub trait Block: TickJob {
    /// Append a child; children run in attachment order.
    fn attach(&mut self, child: BoxedJob);

    /// Idle ticks between rounds. Only meaningful for repeating blocks.
    fn set_pause(&mut self, _ticks: u32) {}

    fn into_job(self: Box<Self>) -> BoxedJob;
}

// --- Mapper ---

/// Alternates `enter(v)` / `exit(v)` over a sequence of values, one call per
/// tick. A tap of "ab" therefore takes four ticks.
pub struct Mapper<T> {
    values: Vec<T>,
    enter: Action<T>,
    exit: Action<T>,
    cursor: usize,
    entered: bool,
}

impl<T> Mapper<T> {
    pub fn new(values: Vec<T>, enter: Action<T>, exit: Action<T>) -> Self {
        Self {
            values,
            enter,
            exit,
            cursor: 0,
            entered: false,
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T> TickJob for Mapper<T> {
    fn advance(&mut self) -> Step {
        let Some(value) = self.values.get(self.cursor) else {
            return Step::Finished;
        };

        if !self.entered {
            (self.enter)(value);
            self.entered = true;
            return Step::Running;
        }

        (self.exit)(value);
        self.entered = false;
        self.cursor += 1;
        if self.cursor >= self.values.len() {
            Step::Finished
        } else {
            Step::Running
        }
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.entered = false;
    }
}

// --- Sequencer ---

/// Runs children one after another. A child's first step happens on the
/// tick after its predecessor reported finished.
#[derive(Default)]
pub struct Sequencer {
    children: Vec<BoxedJob>,
    cursor: usize,
}

impl Sequencer {
    pub fn new(children: Vec<BoxedJob>) -> Self {
        Self {
            children,
            cursor: 0,
        }
    }

    pub fn push(&mut self, child: BoxedJob) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl TickJob for Sequencer {
    fn advance(&mut self) -> Step {
        let Some(child) = self.children.get_mut(self.cursor) else {
            return Step::Finished;
        };

        if child.advance().is_finished() {
            self.cursor += 1;
            if self.cursor >= self.children.len() {
                return Step::Finished;
            }
        }
        Step::Running
    }

    fn reset(&mut self) {
        self.cursor = 0;
        for child in &mut self.children {
            child.reset();
        }
    }
}

// --- Encloser ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Enter,
    Body,
    Exit,
}

/// Brackets its children with `enter` over every subject on the first tick
/// and `exit` over every subject (same order) on the last tick.
///
/// An encloser that never received children is a no-op.
pub struct Encloser<T> {
    subjects: Vec<T>,
    enter: Action<T>,
    exit: Action<T>,
    body: Sequencer,
    phase: Phase,
}

impl<T> Encloser<T> {
    pub fn new(subjects: Vec<T>, enter: Action<T>, exit: Action<T>) -> Self {
        Self {
            subjects,
            enter,
            exit,
            body: Sequencer::default(),
            phase: Phase::Enter,
        }
    }

    pub fn subjects(&self) -> &[T] {
        &self.subjects
    }

    pub fn child_count(&self) -> usize {
        self.body.len()
    }
}

impl<T> TickJob for Encloser<T> {
    fn advance(&mut self) -> Step {
        if self.body.is_empty() {
            return Step::Finished;
        }

        match self.phase {
            Phase::Enter => {
                for s in &self.subjects {
                    (self.enter)(s);
                }
                self.phase = Phase::Body;
                Step::Running
            }
            Phase::Body => {
                if self.body.advance().is_finished() {
                    self.phase = Phase::Exit;
                }
                Step::Running
            }
            Phase::Exit => {
                for s in &self.subjects {
                    (self.exit)(s);
                }
                Step::Finished
            }
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Enter;
        self.body.reset();
    }
}

impl<T: 'static> Block for Encloser<T> {
    fn attach(&mut self, child: BoxedJob) {
        self.body.push(child);
    }

    fn into_job(self: Box<Self>) -> BoxedJob {
        self
    }
}

// --- Repeater ---

/// Runs its children `rounds` times with `pause` idle ticks between rounds
/// (never before the first or after the last).
pub struct Repeater {
    rounds: u32,
    remaining: u32,
    pause: u32,
    pause_left: u32,
    body: Sequencer,
}

impl Repeater {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds,
            remaining: rounds,
            pause: 0,
            pause_left: 0,
            body: Sequencer::default(),
        }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn pause(&self) -> u32 {
        self.pause
    }
}

impl TickJob for Repeater {
    fn advance(&mut self) -> Step {
        if self.remaining == 0 || self.body.is_empty() {
            return Step::Finished;
        }

        if self.pause_left > 0 {
            self.pause_left -= 1;
            return Step::Running;
        }

        if !self.body.advance().is_finished() {
            return Step::Running;
        }

        self.remaining -= 1;
        if self.remaining == 0 {
            return Step::Finished;
        }
        self.body.reset();
        self.pause_left = self.pause;
        Step::Running
    }

    fn reset(&mut self) {
        self.remaining = self.rounds;
        self.pause_left = 0;
        self.body.reset();
    }
}

impl Block for Repeater {
    fn attach(&mut self, child: BoxedJob) {
        self.body.push(child);
    }

    fn set_pause(&mut self, ticks: u32) {
        self.pause = ticks;
    }

    fn into_job(self: Box<Self>) -> BoxedJob {
        self
    }
}

// --- Delayed ---

/// Holds a job idle for a frozen number of ticks before its first step.
/// The delay is re-armed on reset, so a delayed child of a repeater waits
/// again every round.
pub struct Delayed {
    job: BoxedJob,
    after: u32,
    left: u32,
}

impl Delayed {
    pub fn new(job: BoxedJob, after: u32) -> Self {
        Self {
            job,
            after,
            left: after,
        }
    }

    pub fn after(&self) -> u32 {
        self.after
    }
}

impl TickJob for Delayed {
    fn advance(&mut self) -> Step {
        if self.left > 0 {
            self.left -= 1;
            return Step::Running;
        }
        self.job.advance()
    }

    fn reset(&mut self) {
        self.left = self.after;
        self.job.reset();
    }
}
