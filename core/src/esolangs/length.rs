//! Length
//!
//! Each line's character count selects an instruction; the machine is a
//! single integer stack plus a line counter.
//!
//! | Length | Instruction |
//! |---|---|
//! | 9  | `inp`: read one character, push its code |
//! | 10 | `add` |
//! | 11 | `sub` |
//! | 12 | `dup` |
//! | 13 | `cond`: pop; skip the next instruction if zero |
//! | 14 | `gotou`: pop a line number and jump there |
//! | 15 | `outn`: pop, print as number |
//! | 16 | `outa`: pop, print as character |
//! | 17 | `rol`: move the bottom element to the top |
//! | 18 | `swap` |
//! | 20 | `mul` |
//! | 21 | `div` |
//! | 23 | `pop` |
//! | 24 | `gotos`: pop an offset and jump that many lines relative |
//! | 25 | `push`: the next line's length is pushed |
//! | 27 | `ror`: move the top element to the bottom |
//!
//! Any other length is a no-op.

use serde_json::json;

use super::{
    char_from_code, Capabilities, Interpreter, InterpreterError, Io, Notification, Outcome,
};
use crate::types::{Input, InputKind, LangOptions};

pub const LANG: &str = "length";

const FILLER: char = 'x';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Instruction {
    Inp,
    Add,
    Sub,
    Dup,
    Cond,
    Gotou,
    Outn,
    Outa,
    Rol,
    Swap,
    Mul,
    Div,
    Pop,
    Gotos,
    Push,
    Ror,
    Nop,
}

impl Instruction {
    fn from_length(len: usize) -> Self {
        match len {
            9 => Instruction::Inp,
            10 => Instruction::Add,
            11 => Instruction::Sub,
            12 => Instruction::Dup,
            13 => Instruction::Cond,
            14 => Instruction::Gotou,
            15 => Instruction::Outn,
            16 => Instruction::Outa,
            17 => Instruction::Rol,
            18 => Instruction::Swap,
            20 => Instruction::Mul,
            21 => Instruction::Div,
            23 => Instruction::Pop,
            24 => Instruction::Gotos,
            25 => Instruction::Push,
            27 => Instruction::Ror,
            _ => Instruction::Nop,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Instruction::Inp => "inp",
            Instruction::Add => "add",
            Instruction::Sub => "sub",
            Instruction::Dup => "dup",
            Instruction::Cond => "cond",
            Instruction::Gotou => "gotou",
            Instruction::Outn => "outn",
            Instruction::Outa => "outa",
            Instruction::Rol => "rol",
            Instruction::Swap => "swap",
            Instruction::Mul => "mul",
            Instruction::Div => "div",
            Instruction::Pop => "pop",
            Instruction::Gotos => "gotos",
            Instruction::Push => "push",
            Instruction::Ror => "ror",
            Instruction::Nop => "nop",
        }
    }
}

pub struct Length {
    comments: bool,
    debug: bool,
    /// Length of every line, after comment stripping
    lines: Vec<usize>,
    stack: Vec<i64>,
    line: usize,
    awaiting_input: bool,
}

impl Length {
    pub fn new(comments: bool, debug: bool) -> Self {
        Self {
            comments,
            debug,
            lines: Vec::new(),
            stack: Vec::new(),
            line: 0,
            awaiting_input: false,
        }
    }

    /// Recognised options: `comments`, `debug`.
    pub fn from_options(options: &LangOptions) -> Result<Self, String> {
        Ok(Self::new(options.flag("comments"), options.flag("debug")))
    }

    fn measure(&self, line: &str) -> usize {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let line = if self.comments {
            line.split('#').next().unwrap_or("")
        } else {
            line
        };
        line.chars().count()
    }

    fn push(&mut self, value: i64, io: &mut Io<'_>) {
        self.stack.push(value);
        io.notify(|| Notification::Push {
            stack: None,
            value: json!(value),
        });
    }

    fn pop(&mut self, io: &mut Io<'_>) -> Result<i64, InterpreterError> {
        let value = self
            .stack
            .pop()
            .ok_or_else(|| InterpreterError::StackUnderflow(format!("line {}", self.line + 1)))?;
        io.notify(|| Notification::Pop {
            stack: None,
            value: json!(value),
        });
        Ok(value)
    }

    fn jump(&mut self, target: i64, io: &mut Io<'_>) -> Result<(), InterpreterError> {
        let target = usize::try_from(target).map_err(|_| {
            InterpreterError::Runtime(format!(
                "jump to negative line {} from line {}",
                target,
                self.line + 1
            ))
        })?;
        self.goto(target, io);
        Ok(())
    }

    fn goto(&mut self, line: usize, io: &mut Io<'_>) {
        self.line = line;
        io.notify(|| Notification::Line(line));
    }

    fn binary(
        &mut self,
        io: &mut Io<'_>,
        op: impl FnOnce(i64, i64) -> Result<i64, InterpreterError>,
    ) -> Result<(), InterpreterError> {
        let a = self.pop(io)?;
        let b = self.pop(io)?;
        let result = op(b, a)?;
        self.push(result, io);
        Ok(())
    }
}

impl Interpreter for Length {
    fn lang(&self) -> &'static str {
        LANG
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_input: true,
            supports_step: true,
            supports_minify: false,
            supports_text_to_code: true,
        }
    }

    fn set_code(&mut self, source: &str) -> Result<(), InterpreterError> {
        self.lines = if source.is_empty() {
            Vec::new()
        } else {
            source.split('\n').map(|line| self.measure(line)).collect()
        };
        Ok(())
    }

    fn reset(&mut self, io: &mut Io<'_>) {
        self.stack.clear();
        self.awaiting_input = false;
        io.notify(|| Notification::Cleared { stack: None });
        self.goto(0, io);
    }

    fn step(&mut self, io: &mut Io<'_>) -> Result<Outcome, InterpreterError> {
        if self.awaiting_input {
            return Ok(Outcome::Suspended(InputKind::Byte));
        }
        let Some(&len) = self.lines.get(self.line) else {
            return Ok(Outcome::Halted);
        };
        let instruction = Instruction::from_length(len);
        if self.debug {
            io.print(format!("[line {}] {}\n", self.line + 1, instruction.name()));
        }

        let mut next = self.line + 1;
        match instruction {
            Instruction::Inp => {
                self.awaiting_input = true;
                return Ok(Outcome::Suspended(InputKind::Byte));
            }
            Instruction::Add => self.binary(io, |b, a| Ok(b.wrapping_add(a)))?,
            Instruction::Sub => self.binary(io, |b, a| Ok(b.wrapping_sub(a)))?,
            Instruction::Mul => self.binary(io, |b, a| Ok(b.wrapping_mul(a)))?,
            Instruction::Div => {
                let line = self.line + 1;
                self.binary(io, |b, a| {
                    b.checked_div(a).ok_or_else(|| {
                        InterpreterError::Runtime(format!("division by zero on line {}", line))
                    })
                })?
            }
            Instruction::Dup => {
                let value = self.pop(io)?;
                self.push(value, io);
                self.push(value, io);
            }
            Instruction::Cond => {
                if self.pop(io)? == 0 {
                    next += 1;
                }
            }
            Instruction::Gotou => {
                let target = self.pop(io)?;
                return self.jump(target, io).map(|_| Outcome::Progressed);
            }
            Instruction::Gotos => {
                let offset = self.pop(io)?;
                let target = (self.line as i64).checked_add(offset).ok_or_else(|| {
                    InterpreterError::Runtime(format!(
                        "relative jump by {} from line {} overflows",
                        offset,
                        self.line + 1
                    ))
                })?;
                return self.jump(target, io).map(|_| Outcome::Progressed);
            }
            Instruction::Outn => {
                let value = self.pop(io)?;
                io.print(value.to_string());
            }
            Instruction::Outa => {
                let value = self.pop(io)?;
                io.print(char_from_code(value).to_string());
            }
            Instruction::Rol => {
                if !self.stack.is_empty() {
                    let bottom = self.stack.remove(0);
                    self.stack.push(bottom);
                }
            }
            Instruction::Ror => {
                if let Some(top) = self.stack.pop() {
                    self.stack.insert(0, top);
                }
            }
            Instruction::Swap => {
                let a = self.pop(io)?;
                let b = self.pop(io)?;
                self.push(a, io);
                self.push(b, io);
            }
            Instruction::Pop => {
                self.pop(io)?;
            }
            Instruction::Push => {
                let value = self.lines.get(self.line + 1).copied().ok_or_else(|| {
                    InterpreterError::Runtime(format!(
                        "push on line {} has no value line after it",
                        self.line + 1
                    ))
                })?;
                self.push(value as i64, io);
                next += 1;
            }
            Instruction::Nop => {}
        }

        self.goto(next, io);
        Ok(Outcome::Progressed)
    }

    fn resume(&mut self, input: Input, io: &mut Io<'_>) -> Result<(), InterpreterError> {
        if !self.awaiting_input {
            return Err(InterpreterError::NotSuspended);
        }
        let value = match input {
            Input::Byte(b) => b,
            Input::Line(line) => line.chars().next().map_or(0, |c| i64::from(u32::from(c))),
        };
        self.awaiting_input = false;
        self.push(value, io);
        let next = self.line + 1;
        self.goto(next, io);
        Ok(())
    }

    /// One `push` + value line + `outa` per character.
    fn text_to_code(&self, text: &str) -> Option<String> {
        let line = |len: usize| FILLER.to_string().repeat(len);
        let lines: Vec<String> = text
            .chars()
            .flat_map(|c| [line(25), line(u32::from(c) as usize), line(16)])
            .collect();
        Some(lines.join("\n"))
    }
}
