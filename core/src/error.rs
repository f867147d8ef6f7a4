use thiserror::Error;

use crate::esolangs::InterpreterError;

pub type Result<T> = std::result::Result<T, HostError>;

/// Failures surfaced to the host environment as `Error` events.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Error whilst creating interpreter for '{0}': unknown language")]
    UnsupportedLanguage(String),

    #[error("Error whilst creating interpreter for '{lang}': {detail}")]
    InvalidOptions { lang: String, detail: String },

    #[error("Error whilst loading {lang} code:\n{source}")]
    CodeLoad {
        lang: String,
        #[source]
        source: InterpreterError,
    },

    #[error("{lang} interpreter is already busy ({action} in flight)")]
    Busy { lang: String, action: &'static str },

    #[error("{lang} interpreter provides no {capability} functionality")]
    CapabilityMissing {
        lang: String,
        capability: &'static str,
    },

    #[error("Command 'unblock': no active block to unblock")]
    NoActiveBlock,

    #[error("Command 'unblock': {0}")]
    InvalidInput(String),

    #[error("{lang} interpreter failed: {source}")]
    InterpreterFailure {
        lang: String,
        #[source]
        source: InterpreterError,
    },

    #[error("No interpreter loaded: send setLanguage before '{0}'")]
    NoInterpreter(&'static str),

    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostError {
    /// Caller-side misuse; reported without touching supervisor state.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            HostError::Busy { .. }
                | HostError::NoActiveBlock
                | HostError::InvalidInput(_)
                | HostError::NoInterpreter(_)
                | HostError::MalformedCommand(_)
        )
    }
}
