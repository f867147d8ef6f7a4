pub mod cli;
pub mod config;
pub mod error;
pub mod esolangs;
pub mod host;
pub mod types;

// Re-export main types
pub use types::*;

pub use error::{HostError, Result};
pub use esolangs::{Interpreter, InterpreterError, Registry};
pub use host::{Host, HostHandle};
