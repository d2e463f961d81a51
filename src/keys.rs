//! Key chains
//!
//! A fluent builder that turns a script of key operations into a tree of
//! tick jobs. Operations either run immediately against the innermost open
//! block (or the queue when none is open), or open a new block that
//! collects everything up to the matching `fin`.
//!
//! Two surfaces are offered over the same state machine:
//! - typed methods (`chain.after(10).tap("hi").ctrl().tap('c').fin()`)
//! - a name registry for script hosts (`select("tap")` then `invoke(&[...])`)
//!
//! Delays are measured in ticks.

use crate::error::{KeypadError, Result};
use crate::hid::{Key, KeyCode, SharedActuator};
use crate::job::{Action, Block, BoxedJob, Delayed, Encloser, Mapper, Repeater};
use crate::scheduler::TickQueue;
use std::fmt;
use tracing::debug;

/// Every operation a chain understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    After,
    Tap,
    Mod,
    Shift,
    Ctrl,
    Alt,
    Meta,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Times,
    Space,
    Fin,
}

impl Op {
    pub const ALL: [Op; 16] = [
        Op::After,
        Op::Tap,
        Op::Mod,
        Op::Shift,
        Op::Ctrl,
        Op::Alt,
        Op::Meta,
        Op::Left,
        Op::Right,
        Op::Up,
        Op::Down,
        Op::Home,
        Op::End,
        Op::Times,
        Op::Space,
        Op::Fin,
    ];

    /// Resolve a script-facing name, including aliases.
    pub fn from_name(name: &str) -> Option<Op> {
        let op = match name {
            "after" | "wait" => Op::After,
            "tap" => Op::Tap,
            "mod" => Op::Mod,
            "shift" => Op::Shift,
            "ctrl" => Op::Ctrl,
            "alt" => Op::Alt,
            "meta" => Op::Meta,
            "left" => Op::Left,
            "right" => Op::Right,
            "up" => Op::Up,
            "down" => Op::Down,
            "home" => Op::Home,
            "end" => Op::End,
            "times" => Op::Times,
            "space" | "apart" => Op::Space,
            "fin" | "done" => Op::Fin,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::After => "after",
            Op::Tap => "tap",
            Op::Mod => "mod",
            Op::Shift => "shift",
            Op::Ctrl => "ctrl",
            Op::Alt => "alt",
            Op::Meta => "meta",
            Op::Left => "left",
            Op::Right => "right",
            Op::Up => "up",
            Op::Down => "down",
            Op::Home => "home",
            Op::End => "end",
            Op::Times => "times",
            Op::Space => "space",
            Op::Fin => "fin",
        }
    }

    /// Operations that are complete without arguments. A pending one is run
    /// implicitly when the next operation is selected.
    pub fn takes_no_args(self) -> bool {
        !matches!(self, Op::After | Op::Tap | Op::Mod | Op::Times | Op::Space)
    }
}

/// Untyped argument passed through [`KeyChain::invoke`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Text(String),
    Key(Key),
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Int(n)
    }
}

impl From<u32> for Arg {
    fn from(n: u32) -> Self {
        Arg::Int(i64::from(n))
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<char> for Arg {
    fn from(c: char) -> Self {
        Arg::Key(Key::Char(c))
    }
}

impl From<KeyCode> for Arg {
    fn from(code: KeyCode) -> Self {
        Arg::Key(Key::Code(code))
    }
}

/// Keys to tap, in order. Strings expand to one tap per character.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Taps(pub Vec<Key>);

impl From<&str> for Taps {
    fn from(s: &str) -> Self {
        Taps(s.chars().map(Key::Char).collect())
    }
}

impl From<String> for Taps {
    fn from(s: String) -> Self {
        Taps::from(s.as_str())
    }
}

impl From<char> for Taps {
    fn from(c: char) -> Self {
        Taps(vec![Key::Char(c)])
    }
}

impl From<KeyCode> for Taps {
    fn from(code: KeyCode) -> Self {
        Taps(vec![Key::Code(code)])
    }
}

impl From<Key> for Taps {
    fn from(key: Key) -> Self {
        Taps(vec![key])
    }
}

fn ticks_arg(op: Op, args: &[Arg]) -> Result<u32> {
    match args.first() {
        Some(Arg::Int(n)) => u32::try_from(*n).map_err(|_| KeypadError::BadArgument {
            op: op.name(),
            expected: "a non-negative count",
        }),
        _ => Err(KeypadError::BadArgument {
            op: op.name(),
            expected: "a count",
        }),
    }
}

fn taps_arg(args: &[Arg]) -> Result<Taps> {
    match args.first() {
        Some(Arg::Text(s)) => Ok(Taps::from(s.as_str())),
        Some(Arg::Key(k)) => Ok(Taps::from(*k)),
        _ => Err(KeypadError::BadArgument {
            op: "tap",
            expected: "a string or a key",
        }),
    }
}

fn modifier_arg(arg: &Arg) -> Result<KeyCode> {
    let bad = || KeypadError::BadArgument {
        op: "mod",
        expected: "modifier key codes",
    };
    match arg {
        Arg::Key(Key::Code(code)) => Ok(*code),
        Arg::Int(n) => u8::try_from(*n).map(KeyCode).map_err(|_| bad()),
        _ => Err(bad()),
    }
}

/// A block opened by `mod`/`times` and not yet closed.
struct OpenBlock {
    block: Box<dyn Block>,
    /// Delay frozen when the block was opened.
    after: u32,
}

/// Builder state for one chain.
///
/// Blocks are handed to their parent (or the queue) when closed. Blocks
/// still open when the chain is dropped are closed then, innermost first.
pub struct KeyChain {
    queue: TickQueue,
    hid: SharedActuator,
    /// Operation selected by name and awaiting `invoke`.
    op: Option<Op>,
    /// Accumulated delay not yet frozen into a job.
    delay: u32,
    /// Open blocks, innermost last.
    jobs: Vec<OpenBlock>,
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("op", &self.op)
            .field("delay", &self.delay)
            .field("depth", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

/// Start a fresh chain targeting `queue`.
pub fn new_key_chain(queue: &TickQueue, hid: &SharedActuator) -> KeyChain {
    KeyChain::new(queue.clone(), hid.clone())
}

impl KeyChain {
    pub fn new(queue: TickQueue, hid: SharedActuator) -> Self {
        Self {
            queue,
            hid,
            op: None,
            delay: 0,
            jobs: Vec::new(),
        }
    }

    /// Operation currently waiting for `invoke`.
    pub fn pending_op(&self) -> Option<Op> {
        self.op
    }

    /// Delay that the next emitted job will receive.
    pub fn accumulated_delay(&self) -> u32 {
        self.delay
    }

    /// Number of open blocks.
    pub fn depth(&self) -> usize {
        self.jobs.len()
    }

    // --- Registry surface ---

    /// Select an operation by name.
    ///
    /// A previously selected operation that needs no arguments is run first;
    /// one that needed arguments is dropped. Unknown names leave the chain
    /// untouched.
    pub fn select(&mut self, name: &str) -> Result<&mut Self> {
        let Some(op) = Op::from_name(name) else {
            debug!(name, "unrecognized chain operation");
            return Err(KeypadError::UnknownOperation {
                name: name.to_string(),
            });
        };
        self.settle();
        debug!(op = op.name(), "selected");
        self.op = Some(op);
        Ok(self)
    }

    /// Run the selected operation with `args`. Without a selection this does
    /// nothing.
    pub fn invoke(&mut self, args: &[Arg]) -> Result<&mut Self> {
        let Some(op) = self.op.take() else {
            debug!("invoke with no pending operation");
            return Ok(self);
        };
        debug!(op = op.name(), argc = args.len(), "invoke");
        self.apply(op, args)?;
        Ok(self)
    }

    fn apply(&mut self, op: Op, args: &[Arg]) -> Result<()> {
        match op {
            Op::After => {
                let ticks = ticks_arg(op, args)?;
                self.accumulate(ticks);
            }
            Op::Tap => {
                let taps = taps_arg(args)?;
                self.emit_taps(taps);
            }
            Op::Mod => {
                let codes = args.iter().map(modifier_arg).collect::<Result<Vec<_>>>()?;
                self.open_enclosure(codes);
            }
            Op::Times => {
                let rounds = ticks_arg(op, args)?;
                self.open_repeat(rounds);
            }
            Op::Space => {
                let ticks = ticks_arg(op, args)?;
                self.set_pause(ticks);
            }
            bare => self.apply_bare(bare),
        }
        Ok(())
    }

    fn apply_bare(&mut self, op: Op) {
        match op {
            Op::Shift => self.open_enclosure(vec![KeyCode::LEFT_SHIFT]),
            Op::Ctrl => self.open_enclosure(vec![KeyCode::LEFT_CONTROL]),
            Op::Alt => self.open_enclosure(vec![KeyCode::LEFT_ALT]),
            Op::Meta => self.open_enclosure(vec![KeyCode::LEFT_GUI]),
            Op::Left => self.emit_taps(KeyCode::LEFT_ARROW.into()),
            Op::Right => self.emit_taps(KeyCode::RIGHT_ARROW.into()),
            Op::Up => self.emit_taps(KeyCode::UP_ARROW.into()),
            Op::Down => self.emit_taps(KeyCode::DOWN_ARROW.into()),
            Op::Home => self.emit_taps(KeyCode::HOME.into()),
            Op::End => self.emit_taps(KeyCode::END.into()),
            Op::Fin => self.close_block(),
            other => debug!(op = other.name(), "pending operation dropped without arguments"),
        }
    }

    /// Resolve whatever was selected but never invoked.
    fn settle(&mut self) {
        if let Some(prev) = self.op.take() {
            self.apply_bare(prev);
        }
    }

    // --- Typed surface ---

    /// Delay the next job by `ticks`. Repeated calls add up.
    pub fn after(&mut self, ticks: u32) -> &mut Self {
        self.settle();
        self.accumulate(ticks);
        self
    }

    pub fn wait(&mut self, ticks: u32) -> &mut Self {
        self.after(ticks)
    }

    /// Press and release each key in turn.
    pub fn tap(&mut self, keys: impl Into<Taps>) -> &mut Self {
        self.settle();
        self.emit_taps(keys.into());
        self
    }

    /// Hold `codes` around everything up to the matching `fin`.
    pub fn mods(&mut self, codes: &[KeyCode]) -> &mut Self {
        self.settle();
        self.open_enclosure(codes.to_vec());
        self
    }

    pub fn shift(&mut self) -> &mut Self {
        self.bare(Op::Shift)
    }

    pub fn ctrl(&mut self) -> &mut Self {
        self.bare(Op::Ctrl)
    }

    pub fn alt(&mut self) -> &mut Self {
        self.bare(Op::Alt)
    }

    pub fn meta(&mut self) -> &mut Self {
        self.bare(Op::Meta)
    }

    pub fn left(&mut self) -> &mut Self {
        self.bare(Op::Left)
    }

    pub fn right(&mut self) -> &mut Self {
        self.bare(Op::Right)
    }

    pub fn up(&mut self) -> &mut Self {
        self.bare(Op::Up)
    }

    pub fn down(&mut self) -> &mut Self {
        self.bare(Op::Down)
    }

    pub fn home(&mut self) -> &mut Self {
        self.bare(Op::Home)
    }

    pub fn end(&mut self) -> &mut Self {
        self.bare(Op::End)
    }

    /// Repeat everything up to the matching `fin` `rounds` times.
    pub fn times(&mut self, rounds: u32) -> &mut Self {
        self.settle();
        self.open_repeat(rounds);
        self
    }

    /// Idle ticks between rounds of the innermost open block.
    pub fn space(&mut self, ticks: u32) -> &mut Self {
        self.settle();
        self.set_pause(ticks);
        self
    }

    pub fn apart(&mut self, ticks: u32) -> &mut Self {
        self.space(ticks)
    }

    /// Close the innermost open block. Ignored when none is open.
    pub fn fin(&mut self) -> &mut Self {
        self.bare(Op::Fin)
    }

    pub fn done(&mut self) -> &mut Self {
        self.fin()
    }

    fn bare(&mut self, op: Op) -> &mut Self {
        self.settle();
        self.apply_bare(op);
        self
    }

    // --- Job emission ---

    fn accumulate(&mut self, ticks: u32) {
        self.delay = self.delay.saturating_add(ticks);
    }

    /// Freeze the accumulated delay and start accumulating afresh.
    fn take_delay(&mut self) -> u32 {
        std::mem::take(&mut self.delay)
    }

    fn emit_taps(&mut self, taps: Taps) {
        let down = self.hid.clone();
        let up = self.hid.clone();
        let enter: Action<Key> = Box::new(move |k: &Key| down.borrow_mut().key_down(*k));
        let exit: Action<Key> = Box::new(move |k: &Key| up.borrow_mut().key_up(*k));
        let after = self.take_delay();
        self.add_tick_job(Box::new(Mapper::new(taps.0, enter, exit)), after);
    }

    fn open_enclosure(&mut self, codes: Vec<KeyCode>) {
        let down = self.hid.clone();
        let up = self.hid.clone();
        let enter: Action<KeyCode> =
            Box::new(move |c: &KeyCode| down.borrow_mut().modifier_down(*c));
        let exit: Action<KeyCode> =
            Box::new(move |c: &KeyCode| up.borrow_mut().modifier_up(*c));
        self.open_block(Box::new(Encloser::new(codes, enter, exit)));
    }

    fn open_repeat(&mut self, rounds: u32) {
        self.open_block(Box::new(Repeater::new(rounds)));
    }

    fn open_block(&mut self, block: Box<dyn Block>) {
        let after = self.take_delay();
        self.jobs.push(OpenBlock { block, after });
        debug!(depth = self.jobs.len(), after, "block opened");
    }

    fn set_pause(&mut self, ticks: u32) {
        match self.jobs.last_mut() {
            Some(open) => open.block.set_pause(ticks),
            None => debug!(ticks, "space with no open block"),
        }
    }

    fn close_block(&mut self) {
        let Some(OpenBlock { block, after }) = self.jobs.pop() else {
            debug!("fin with no open block");
            return;
        };
        debug!(depth = self.jobs.len(), "block closed");
        self.add_tick_job(block.into_job(), after);
    }

    /// Route a built job: into the innermost open block, or straight to
    /// the queue with its frozen delay.
    fn add_tick_job(&mut self, job: BoxedJob, after: u32) {
        match self.jobs.last_mut() {
            Some(open) => {
                let job: BoxedJob = if after > 0 {
                    Box::new(Delayed::new(job, after))
                } else {
                    job
                };
                open.block.attach(job);
            }
            None => self.queue.add(job, after),
        }
    }
}

impl Drop for KeyChain {
    fn drop(&mut self) {
        self.settle();
        while !self.jobs.is_empty() {
            self.close_block();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::{HidEvent, RecordingActuator};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (TickQueue, Rc<RefCell<RecordingActuator>>, SharedActuator) {
        let queue = TickQueue::new();
        let rec = Rc::new(RefCell::new(RecordingActuator::with_clock(queue.clock())));
        let hid: SharedActuator = rec.clone();
        (queue, rec, hid)
    }

    fn drain(queue: &TickQueue) {
        for _ in 0..1000 {
            if queue.is_idle() {
                return;
            }
            queue.tick();
        }
        panic!("queue did not drain");
    }

    #[test]
    fn test_registry_round_trips_names() {
        for op in Op::ALL {
            assert_eq!(Op::from_name(op.name()), Some(op));
        }
        assert_eq!(Op::from_name("wait"), Some(Op::After));
        assert_eq!(Op::from_name("apart"), Some(Op::Space));
        assert_eq!(Op::from_name("done"), Some(Op::Fin));
        assert_eq!(Op::from_name("jump"), None);
    }

    #[test]
    fn test_unknown_name_is_reported_and_harmless() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain.select("after").unwrap();

        let err = chain.select("jump").unwrap_err();
        assert_eq!(
            err,
            KeypadError::UnknownOperation {
                name: "jump".to_string()
            }
        );
        assert_eq!(chain.pending_op(), Some(Op::After));
    }

    #[test]
    fn test_debug_shows_builder_state() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain.after(4).shift().select("tap").unwrap();

        let shown = format!("{:?}", chain);
        assert!(shown.starts_with("KeyChain"));
        assert!(shown.contains("op: Some(Tap)"));
        assert!(shown.contains("delay: 0"));
        assert!(shown.contains("depth: 1"));
    }

    #[test]
    fn test_invoke_without_selection_is_noop() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain.invoke(&[Arg::from(5u32)]).unwrap();
        assert_eq!(chain.accumulated_delay(), 0);
        assert!(queue.is_idle());
    }

    #[test]
    fn test_zero_arg_op_auto_invoked_on_next_select() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain.select("shift").unwrap().select("tap").unwrap();
        assert_eq!(chain.depth(), 1);
        assert_eq!(chain.pending_op(), Some(Op::Tap));
    }

    #[test]
    fn test_op_needing_args_is_dropped_on_next_select() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain.select("times").unwrap().select("tap").unwrap();
        assert_eq!(chain.depth(), 0);
    }

    #[test]
    fn test_bad_arguments_propagate() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);

        let err = chain.select("after").unwrap().invoke(&["soon".into()]).unwrap_err();
        assert!(matches!(err, KeypadError::BadArgument { op: "after", .. }));

        let err = chain.select("after").unwrap().invoke(&[Arg::Int(-3)]).unwrap_err();
        assert!(matches!(err, KeypadError::BadArgument { op: "after", .. }));

        let err = chain.select("tap").unwrap().invoke(&[Arg::Int(4)]).unwrap_err();
        assert!(matches!(err, KeypadError::BadArgument { op: "tap", .. }));

        let err = chain.select("mod").unwrap().invoke(&['x'.into()]).unwrap_err();
        assert!(matches!(err, KeypadError::BadArgument { op: "mod", .. }));
        assert_eq!(chain.depth(), 0);
    }

    #[test]
    fn test_delay_accumulates_and_resets() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);

        chain.after(10).after(15).tap('a');
        assert_eq!(queue.pending_delays(), vec![25]);
        assert_eq!(chain.accumulated_delay(), 0);

        chain.after(5).tap('b');
        assert_eq!(queue.pending_delays(), vec![5, 25]);
    }

    #[test]
    fn test_registry_delay_matches_typed() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain
            .select("wait")
            .and_then(|c| c.invoke(&[Arg::from(7u32)]))
            .and_then(|c| c.select("tap"))
            .and_then(|c| c.invoke(&["x".into()]))
            .unwrap();
        assert_eq!(queue.pending_delays(), vec![7]);
    }

    #[test]
    fn test_block_reaches_queue_on_fin() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);

        chain.ctrl().tap('c');
        assert!(queue.is_idle());
        assert_eq!(chain.depth(), 1);

        chain.fin().tap('x');
        assert_eq!(chain.depth(), 0);
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_drop_closes_open_blocks() {
        let (queue, rec, hid) = setup();
        {
            let mut chain = new_key_chain(&queue, &hid);
            chain.times(2).shift().tap('q');
        }
        assert_eq!(queue.pending_len(), 1);

        drain(&queue);
        let downs = rec
            .borrow()
            .events()
            .into_iter()
            .filter(|e| *e == HidEvent::KeyDown(Key::Char('q')))
            .count();
        assert_eq!(downs, 2);
    }

    #[test]
    fn test_drop_runs_pending_bare_op() {
        let (queue, _rec, hid) = setup();
        {
            let mut chain = new_key_chain(&queue, &hid);
            chain.select("shift").unwrap().invoke(&[]).unwrap();
            chain.select("tap").unwrap().invoke(&['a'.into()]).unwrap();
            chain.select("fin").unwrap();
            assert_eq!(chain.depth(), 1);
        }
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_excess_fin_is_ignored() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain.alt().tap('f').fin().fin().done().fin();
        assert_eq!(chain.depth(), 0);

        chain.tap('x');
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_space_without_block_is_ignored() {
        let (queue, _rec, hid) = setup();
        let mut chain = new_key_chain(&queue, &hid);
        chain.space(3).apart(2).tap('k');
        assert_eq!(queue.pending_delays(), vec![0]);
    }

    #[test]
    fn test_mod_accepts_codes_and_ints() {
        let (queue, rec, hid) = setup();
        {
            let mut chain = new_key_chain(&queue, &hid);
            chain
                .select("mod")
                .and_then(|c| c.invoke(&[KeyCode::LEFT_CONTROL.into(), Arg::Int(0xE1)]))
                .and_then(|c| c.select("tap"))
                .and_then(|c| c.invoke(&['t'.into()]))
                .unwrap();
        }
        drain(&queue);
        assert_eq!(
            rec.borrow().events(),
            vec![
                HidEvent::ModifierDown(KeyCode::LEFT_CONTROL),
                HidEvent::ModifierDown(KeyCode::LEFT_SHIFT),
                HidEvent::KeyDown(Key::Char('t')),
                HidEvent::KeyUp(Key::Char('t')),
                HidEvent::ModifierUp(KeyCode::LEFT_CONTROL),
                HidEvent::ModifierUp(KeyCode::LEFT_SHIFT),
            ]
        );
    }

    #[test]
    fn test_shortcut_taps() {
        let (queue, rec, hid) = setup();
        {
            let mut chain = new_key_chain(&queue, &hid);
            chain.meta().left().right().up().down().home().end();
        }
        drain(&queue);
        let downs: Vec<_> = rec
            .borrow()
            .events()
            .into_iter()
            .filter_map(|e| match e {
                HidEvent::KeyDown(Key::Code(c)) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(
            downs,
            vec![
                KeyCode::LEFT_ARROW,
                KeyCode::RIGHT_ARROW,
                KeyCode::UP_ARROW,
                KeyCode::DOWN_ARROW,
                KeyCode::HOME,
                KeyCode::END,
            ]
        );
    }
}
