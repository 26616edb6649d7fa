use thiserror::Error;

/// Everything that can go wrong between reading a source file and leaving a
/// value on the VM stack. Compile-time, codec, and runtime failures share one
/// enum so that the CLIs can report any of them uniformly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("unknown constructor '{0}'")]
    UnknownConstructor(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("constructor '{0}' is already defined")]
    DuplicateConstructor(String),

    #[error("constructor '{name}' expects {expected} arguments, got {got}")]
    ConstructorArity {
        name: String,
        expected: u16,
        got: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed image: {0}")]
    Decode(String),

    #[error("unknown constant type '{0}'")]
    UnknownConstantType(String),

    #[error("opcode {0} undefined")]
    UnknownOpcode(u8),

    #[error("type error: expected {expected}, got {got}")]
    Type {
        expected: &'static str,
        got: &'static str,
    },

    #[error("no rule matched the arguments")]
    MatchFailure,

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("variable slot {0} read before it was bound")]
    UnboundVariable(u16),
}

pub type Result<T> = std::result::Result<T, Error>;
