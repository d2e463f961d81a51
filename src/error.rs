use thiserror::Error;

/// Errors surfaced by the keypad core.
///
/// Degenerate but well-formed usage (empty queues, excess `fin`, invoking a
/// chain with nothing pending) is never an error; these variants cover
/// malformed input only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeypadError {
    /// A chain was asked to select an operation it does not know.
    #[error("unrecognized operation: {name}")]
    UnknownOperation { name: String },

    /// An operation was invoked with arguments of the wrong shape.
    #[error("bad argument for `{op}`: expected {expected}")]
    BadArgument { op: &'static str, expected: &'static str },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KeypadError>;
