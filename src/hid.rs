//! HID actuator boundary
//!
//! The core never talks to USB hardware itself. Leaf jobs call into a
//! [`HidActuator`] supplied by the host; everything here is the vocabulary
//! shared across that boundary.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// A HID keyboard usage code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u8);

impl KeyCode {
    pub const RIGHT_ARROW: KeyCode = KeyCode(0x4F);
    pub const LEFT_ARROW: KeyCode = KeyCode(0x50);
    pub const DOWN_ARROW: KeyCode = KeyCode(0x51);
    pub const UP_ARROW: KeyCode = KeyCode(0x52);
    pub const HOME: KeyCode = KeyCode(0x4A);
    pub const END: KeyCode = KeyCode(0x4D);

    pub const LEFT_CONTROL: KeyCode = KeyCode(0xE0);
    pub const LEFT_SHIFT: KeyCode = KeyCode(0xE1);
    pub const LEFT_ALT: KeyCode = KeyCode(0xE2);
    pub const LEFT_GUI: KeyCode = KeyCode(0xE3);
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Payload of a tap: either a raw usage code or a character that the
/// actuator's keyboard layout resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Code(KeyCode),
    Char(char),
}

impl From<KeyCode> for Key {
    fn from(code: KeyCode) -> Self {
        Key::Code(code)
    }
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        Key::Char(c)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Code(code) => write!(f, "{code}"),
            Key::Char(c) => write!(f, "{c:?}"),
        }
    }
}

/// Press/release primitives provided by the host.
///
/// Calls are fire-and-forget: implementations must not block, and nothing
/// they return is consumed.
pub trait HidActuator {
    fn key_down(&mut self, key: Key);
    fn key_up(&mut self, key: Key);
    fn modifier_down(&mut self, code: KeyCode);
    fn modifier_up(&mut self, code: KeyCode);
}

/// Actuator shared between every job emitted by a chain.
pub type SharedActuator = Rc<RefCell<dyn HidActuator>>;

/// A single actuation, as seen by [`RecordingActuator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HidEvent {
    KeyDown(Key),
    KeyUp(Key),
    ModifierDown(KeyCode),
    ModifierUp(KeyCode),
}

/// Actuator that records every call together with the tick it happened on.
///
/// The tick is read from an external counter so the recorder can be shared
/// with a [`crate::scheduler::TickQueue`] without borrowing it.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    clock: Option<Rc<Cell<u64>>>,
    events: Vec<(u64, HidEvent)>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp events with the value of `clock` at the time of the call.
    pub fn with_clock(clock: Rc<Cell<u64>>) -> Self {
        Self {
            clock: Some(clock),
            events: Vec::new(),
        }
    }

    fn record(&mut self, event: HidEvent) {
        let t = self.clock.as_ref().map(|c| c.get()).unwrap_or(0);
        tracing::trace!(tick = t, ?event, "hid");
        self.events.push((t, event));
    }

    /// Events in the order they were actuated.
    pub fn events(&self) -> Vec<HidEvent> {
        self.events.iter().map(|(_, e)| *e).collect()
    }

    /// Events paired with the tick on which they fired.
    pub fn timed_events(&self) -> &[(u64, HidEvent)] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl HidActuator for RecordingActuator {
    fn key_down(&mut self, key: Key) {
        self.record(HidEvent::KeyDown(key));
    }

    fn key_up(&mut self, key: Key) {
        self.record(HidEvent::KeyUp(key));
    }

    fn modifier_down(&mut self, code: KeyCode) {
        self.record(HidEvent::ModifierDown(code));
    }

    fn modifier_up(&mut self, code: KeyCode) {
        self.record(HidEvent::ModifierUp(code));
    }
}
