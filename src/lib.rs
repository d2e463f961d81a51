//! Keypad Timing
//!
//! The scheduling and action-composition core of a macro-keypad runtime:
//! - A binary min-heap priority queue with arbitrary-entry deletion
//! - Tick jobs (mapper, sequencer, encloser, repeater) advanced one step per tick
//! - A tick queue that activates delayed jobs in FIFO order and drives them
//! - Key chains: a fluent DSL that builds job trees (`after`, `tap`, `mod`, `times`, `fin`, ...)
//! - Realtime (spin_sleep) and offline (stepping API) tick drivers

pub mod config;
pub mod engine;
pub mod error;
pub mod hid;
pub mod job;
pub mod keys;
pub mod pq;
pub mod scheduler;


pub use config::KeypadConfig;
pub use engine::{Engine, SchedulerMode};
pub use error::{KeypadError, Result};
pub use hid::{HidActuator, HidEvent, Key, KeyCode, RecordingActuator, SharedActuator};
pub use job::{Block, BoxedJob, Delayed, Encloser, Mapper, Repeater, Sequencer, Step, TickJob};
pub use keys::{new_key_chain, Arg, KeyChain, Op, Taps};
pub use pq::PriorityQueue;
pub use scheduler::TickQueue;
