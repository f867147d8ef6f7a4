//! # Pluggable Interpreters
//!
//! Every esolang plugged into the host implements [`Interpreter`]. Variants are
//! resumable state machines rather than blocking loops:
//!
//! 1. **Single-step execution**: `step()` executes exactly one instruction
//! 2. **Explicit suspension**: an instruction that needs outside data returns
//!    [`Outcome::Suspended`] instead of blocking
//! 3. **Resume completes the instruction**: `resume()` receives the typed input
//!    and finishes whatever instruction suspended
//! 4. **No I/O of their own**: output and instrumentation go through [`Io`]
//!
//! Parsing and instruction semantics are owned by each variant.

pub mod befunge;
pub mod brainfuck;
pub mod element;
pub mod factory;
pub mod length;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::host::Outbox;
use crate::types::{Event, Input, InputKind, Instrumentation};

pub use factory::{InterpreterHandle, Registry};

/* ===================== Errors ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpreterError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("stack underflow at {0}")]
    StackUnderflow(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("interpreter is not awaiting input")]
    NotSuspended,
}

/* ===================== Step Result ===================== */

/// Result of driving an interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// One instruction executed; more may follow
    Progressed,
    /// Program finished; nothing was executed
    Halted,
    /// Waiting for outside data before the current instruction can finish
    Suspended(InputKind),
}

/// Instruction allowance for one run, carried across suspensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepBudget {
    limit: Option<u64>,
    used: u64,
}

impl StepBudget {
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, used: 0 }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Account for one executed instruction.
    pub fn charge(&mut self) -> Result<(), InterpreterError> {
        self.used += 1;
        match self.limit {
            Some(limit) if self.used > limit => Err(InterpreterError::StepLimit(limit)),
            _ => Ok(()),
        }
    }
}

/* ===================== Capabilities ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_input: bool,
    pub supports_step: bool,
    pub supports_minify: bool,
    pub supports_text_to_code: bool,
}

/* ===================== Notifications ===================== */

/// Machine-state changes reported by a variant.
///
/// The factory decides per variant how (and whether) these become
/// `InstrumentationUpdate` events.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    InstructionPointer(usize),
    DataPointer(usize),
    Cell { index: usize, value: i64 },
    Memory(Vec<i64>),
    Push {
        stack: Option<&'static str>,
        value: JsonValue,
    },
    Pop {
        stack: Option<&'static str>,
        value: JsonValue,
    },
    Cleared {
        stack: Option<&'static str>,
    },
    Variable {
        symbol: String,
        value: JsonValue,
    },
    Position {
        key: &'static str,
        value: usize,
    },
    Line(usize),
}

/// Variant-specific mapping from notifications to wire updates.
pub type Translator = fn(Notification) -> Vec<Instrumentation>;

/* ===================== I/O Capability ===================== */

/// Output and instrumentation sink handed to a variant for one call.
pub struct Io<'a> {
    outbox: &'a mut Outbox,
    translate: Option<Translator>,
}

impl<'a> Io<'a> {
    pub fn new(outbox: &'a mut Outbox, translate: Option<Translator>) -> Self {
        Self { outbox, translate }
    }

    /// Any text a program emits becomes a `Print` event.
    pub fn print(&mut self, text: impl Into<String>) {
        self.outbox.emit(Event::print(text));
    }

    pub fn visualizing(&self) -> bool {
        self.translate.is_some()
    }

    /// Report a state change. `make` only runs when instrumentation is wired.
    pub fn notify(&mut self, make: impl FnOnce() -> Notification) {
        if let Some(translate) = self.translate {
            for update in translate(make()) {
                self.outbox.emit(Event::InstrumentationUpdate { update });
            }
        }
    }
}

/* ===================== Interpreter Contract ===================== */

pub trait Interpreter: Send {
    /// Language tag this variant is registered under
    fn lang(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Parse and install a program. Machine state is left alone; call `reset`.
    fn set_code(&mut self, source: &str) -> Result<(), InterpreterError>;

    /// Return the machine to its initial state, keeping the program.
    fn reset(&mut self, io: &mut Io<'_>);

    /// Execute exactly one instruction.
    fn step(&mut self, io: &mut Io<'_>) -> Result<Outcome, InterpreterError>;

    /// Finish the suspended instruction with the supplied input.
    fn resume(&mut self, input: Input, io: &mut Io<'_>) -> Result<(), InterpreterError>;

    /// Run until the program halts or suspends.
    fn run(&mut self, io: &mut Io<'_>, budget: &mut StepBudget) -> Result<Outcome, InterpreterError> {
        loop {
            match self.step(io)? {
                Outcome::Progressed => budget.charge()?,
                other => return Ok(other),
            }
        }
    }

    fn minify_code(&self, _source: &str) -> Option<String> {
        None
    }

    fn text_to_code(&self, _text: &str) -> Option<String> {
        None
    }

    /// Flat numeric memory, for variants backed by one.
    fn memory(&self) -> Option<Vec<i64>> {
        None
    }
}

/* ===================== Shared Helpers ===================== */

/// Render a numeric cell as a character, falling back to U+FFFD.
pub(crate) fn char_from_code(code: i64) -> char {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Drive a variant to completion, answering input requests from `inputs`.
    pub fn run_with_inputs(interp: &mut dyn Interpreter, inputs: &[Input]) -> (String, Outbox) {
        let mut outbox = Outbox::new();
        let mut inputs = inputs.iter().cloned();
        {
            let mut io = Io::new(&mut outbox, None);
            interp.reset(&mut io);
            let mut budget = StepBudget::new(Some(100_000));
            loop {
                match interp.run(&mut io, &mut budget).expect("run failed") {
                    Outcome::Halted => break,
                    Outcome::Suspended(_) => {
                        let input = inputs.next().expect("ran out of test input");
                        interp.resume(input, &mut io).expect("resume failed");
                    }
                    Outcome::Progressed => unreachable!("run never yields Progressed"),
                }
            }
        }
        let printed = outbox.printed();
        (printed, outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_budget() {
        let mut budget = StepBudget::new(Some(2));
        assert!(budget.charge().is_ok());
        assert!(budget.charge().is_ok());
        assert_eq!(budget.charge(), Err(InterpreterError::StepLimit(2)));
        assert_eq!(budget.used(), 3);

        let mut budget = StepBudget::unlimited();
        for _ in 0..10_000 {
            budget.charge().unwrap();
        }
    }

    #[test]
    fn test_io_drops_notifications_without_translator() {
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        io.notify(|| panic!("notification built without instrumentation"));
        io.print("hi");
        assert!(!io.visualizing());
        assert_eq!(outbox.drain(), vec![Event::print("hi")]);
    }

    #[test]
    fn test_char_from_code() {
        assert_eq!(char_from_code(65), 'A');
        assert_eq!(char_from_code(-1), char::REPLACEMENT_CHARACTER);
    }
}
