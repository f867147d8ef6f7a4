//! Brainfuck
//!
//! A tape of integer cells and a data pointer. Cell width is configurable
//! (`numType`), and all cell arithmetic wraps within that width. Moving the
//! data pointer off either end of the reel is a runtime error.

use super::{
    char_from_code, Capabilities, Interpreter, InterpreterError, Io, Notification, Outcome,
};
use crate::types::{Input, InputKind, LangOptions};

pub const LANG: &str = "brainfuck";

const DEFAULT_REEL_LENGTH: usize = 30_000;
const MAX_REEL_LENGTH: usize = 1 << 24;
const COMMANDS: &[char] = &['>', '<', '+', '-', '.', ',', '[', ']'];

/* ===================== Cell Types ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
}

impl NumType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "uint8" | "u8" => Some(NumType::Uint8),
            "int8" | "i8" => Some(NumType::Int8),
            "uint16" | "u16" => Some(NumType::Uint16),
            "int16" | "i16" => Some(NumType::Int16),
            "uint32" | "u32" => Some(NumType::Uint32),
            "int32" | "i32" => Some(NumType::Int32),
            _ => None,
        }
    }

    fn bits(self) -> u32 {
        match self {
            NumType::Uint8 | NumType::Int8 => 8,
            NumType::Uint16 | NumType::Int16 => 16,
            NumType::Uint32 | NumType::Int32 => 32,
        }
    }

    fn signed(self) -> bool {
        matches!(self, NumType::Int8 | NumType::Int16 | NumType::Int32)
    }

    /// Wrap an arbitrary value into this type's range.
    pub fn wrap(self, value: i64) -> i64 {
        let modulus = 1i64 << self.bits();
        let v = value.rem_euclid(modulus);
        if self.signed() && v >= modulus / 2 {
            v - modulus
        } else {
            v
        }
    }
}

/* ===================== Program ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Right,
    Left,
    Inc,
    Dec,
    Out,
    In,
    /// Index of the matching `]`
    Open(usize),
    /// Index of the matching `[`
    Close(usize),
}

#[derive(Debug, Clone, Copy)]
struct Instr {
    /// Character offset in the source
    pos: usize,
    op: Op,
}

fn parse(source: &str) -> Result<Vec<Instr>, InterpreterError> {
    let mut program: Vec<Instr> = Vec::new();
    let mut open = Vec::new();

    for (pos, c) in source.chars().enumerate() {
        let op = match c {
            '>' => Op::Right,
            '<' => Op::Left,
            '+' => Op::Inc,
            '-' => Op::Dec,
            '.' => Op::Out,
            ',' => Op::In,
            '[' => {
                open.push((program.len(), pos));
                Op::Open(usize::MAX)
            }
            ']' => {
                let (start, _) = open.pop().ok_or_else(|| {
                    InterpreterError::Syntax(format!("unmatched ']' at position {}", pos))
                })?;
                program[start] = Instr {
                    pos: program[start].pos,
                    op: Op::Open(program.len()),
                };
                Op::Close(start)
            }
            _ => continue,
        };
        program.push(Instr { pos, op });
    }

    if let Some((_, pos)) = open.pop() {
        return Err(InterpreterError::Syntax(format!(
            "unmatched '[' at position {}",
            pos
        )));
    }

    Ok(program)
}

/* ===================== Interpreter ===================== */

pub struct Brainfuck {
    num_type: NumType,
    reel_length: usize,
    source_len: usize,
    program: Vec<Instr>,
    data: Vec<i64>,
    ptr: usize,
    ip: usize,
    awaiting_input: bool,
}

impl Brainfuck {
    pub fn new(num_type: NumType, reel_length: usize) -> Self {
        Self {
            num_type,
            reel_length,
            source_len: 0,
            program: Vec::new(),
            data: vec![0; reel_length],
            ptr: 0,
            ip: 0,
            awaiting_input: false,
        }
    }

    /// Recognised options: `numType`, `reelLength`.
    pub fn from_options(options: &LangOptions) -> Result<Self, String> {
        let num_type = match options.string("numType") {
            Some(name) => {
                NumType::parse(name).ok_or_else(|| format!("unknown numType '{}'", name))?
            }
            None => NumType::Uint8,
        };
        let reel_length = match options.number("reelLength") {
            Some(n) if (1..=MAX_REEL_LENGTH as i64).contains(&n) => n as usize,
            Some(n) => {
                return Err(format!(
                    "reelLength must be between 1 and {}, got {}",
                    MAX_REEL_LENGTH, n
                ))
            }
            None => DEFAULT_REEL_LENGTH,
        };
        Ok(Self::new(num_type, reel_length))
    }

    /// Source offset of the next instruction, or the source length once halted.
    fn source_pos(&self) -> usize {
        self.program
            .get(self.ip)
            .map_or(self.source_len, |instr| instr.pos)
    }

    fn set_cell(&mut self, value: i64, io: &mut Io<'_>) {
        let value = self.num_type.wrap(value);
        self.data[self.ptr] = value;
        let index = self.ptr;
        io.notify(|| Notification::Cell { index, value });
    }

    fn advance(&mut self, io: &mut Io<'_>) {
        self.ip += 1;
        let pos = self.source_pos();
        io.notify(|| Notification::InstructionPointer(pos));
    }
}

impl Interpreter for Brainfuck {
    fn lang(&self) -> &'static str {
        LANG
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_input: true,
            supports_step: true,
            supports_minify: true,
            supports_text_to_code: true,
        }
    }

    fn set_code(&mut self, source: &str) -> Result<(), InterpreterError> {
        self.program = parse(source)?;
        self.source_len = source.chars().count();
        Ok(())
    }

    fn reset(&mut self, io: &mut Io<'_>) {
        self.data = vec![0; self.reel_length];
        self.ptr = 0;
        self.ip = 0;
        self.awaiting_input = false;

        if io.visualizing() {
            let data = self.data.clone();
            let pos = self.source_pos();
            io.notify(|| Notification::Memory(data));
            io.notify(|| Notification::DataPointer(0));
            io.notify(|| Notification::InstructionPointer(pos));
        }
    }

    fn step(&mut self, io: &mut Io<'_>) -> Result<Outcome, InterpreterError> {
        if self.awaiting_input {
            return Ok(Outcome::Suspended(InputKind::Byte));
        }
        let Some(instr) = self.program.get(self.ip).copied() else {
            return Ok(Outcome::Halted);
        };

        match instr.op {
            Op::Right => {
                if self.ptr + 1 >= self.reel_length {
                    return Err(InterpreterError::Runtime(format!(
                        "data pointer moved past the end of the reel (length {}) at position {}",
                        self.reel_length, instr.pos
                    )));
                }
                self.ptr += 1;
                let ptr = self.ptr;
                io.notify(|| Notification::DataPointer(ptr));
            }
            Op::Left => {
                if self.ptr == 0 {
                    return Err(InterpreterError::Runtime(format!(
                        "data pointer moved before the start of the reel at position {}",
                        instr.pos
                    )));
                }
                self.ptr -= 1;
                let ptr = self.ptr;
                io.notify(|| Notification::DataPointer(ptr));
            }
            Op::Inc => self.set_cell(self.data[self.ptr] + 1, io),
            Op::Dec => self.set_cell(self.data[self.ptr] - 1, io),
            Op::Out => io.print(char_from_code(self.data[self.ptr]).to_string()),
            Op::In => {
                self.awaiting_input = true;
                return Ok(Outcome::Suspended(InputKind::Byte));
            }
            Op::Open(close) => {
                if self.data[self.ptr] == 0 {
                    self.ip = close;
                }
            }
            Op::Close(open) => {
                if self.data[self.ptr] != 0 {
                    self.ip = open;
                }
            }
        }

        self.advance(io);
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
        self.set_cell(value, io);
        self.advance(io);
        Ok(())
    }

    fn minify_code(&self, source: &str) -> Option<String> {
        Some(source.chars().filter(|c| COMMANDS.contains(c)).collect())
    }

    fn text_to_code(&self, text: &str) -> Option<String> {
        let mut code = String::new();
        let mut current = 0i64;
        for c in text.chars() {
            let target = i64::from(u32::from(c));
            let delta = target - current;
            let (symbol, count) = if delta >= 0 {
                ('+', delta)
            } else {
                ('-', -delta)
            };
            code.extend(std::iter::repeat(symbol).take(count as usize));
            code.push('.');
            current = target;
        }
        Some(code)
    }

    fn memory(&self) -> Option<Vec<i64>> {
        Some(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esolangs::test_support::run_with_inputs;
    use crate::esolangs::StepBudget;
    use crate::host::Outbox;

    fn load(source: &str) -> Brainfuck {
        let mut bf = Brainfuck::new(NumType::Uint8, 100);
        bf.set_code(source).unwrap();
        bf
    }

    #[test]
    fn test_hello_world() {
        let mut bf = load(
            "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.",
        );
        let (printed, _) = run_with_inputs(&mut bf, &[]);
        assert_eq!(printed, "Hello World!\n");
    }

    #[test]
    fn test_input_suspends_until_resumed() {
        let mut bf = load(",.");
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        bf.reset(&mut io);

        let mut budget = StepBudget::unlimited();
        let outcome = bf.run(&mut io, &mut budget).unwrap();
        assert_eq!(outcome, Outcome::Suspended(InputKind::Byte));

        // Still waiting until resumed
        assert_eq!(
            bf.step(&mut io).unwrap(),
            Outcome::Suspended(InputKind::Byte)
        );

        bf.resume(Input::Byte(65), &mut io).unwrap();
        assert_eq!(bf.run(&mut io, &mut budget).unwrap(), Outcome::Halted);
        assert_eq!(outbox.printed(), "A");
    }

    #[test]
    fn test_resume_when_not_suspended() {
        let mut bf = load("+");
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        assert_eq!(
            bf.resume(Input::Byte(1), &mut io),
            Err(InterpreterError::NotSuspended)
        );
    }

    #[test]
    fn test_unmatched_brackets_rejected() {
        let mut bf = Brainfuck::new(NumType::Uint8, 10);
        assert!(matches!(
            bf.set_code("[[]"),
            Err(InterpreterError::Syntax(_))
        ));
        assert!(matches!(bf.set_code("]"), Err(InterpreterError::Syntax(_))));
    }

    #[test]
    fn test_pointer_bounds() {
        let mut bf = load("<");
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        bf.reset(&mut io);
        let err = bf.run(&mut io, &mut StepBudget::unlimited()).unwrap_err();
        assert!(matches!(err, InterpreterError::Runtime(_)));
    }

    #[test]
    fn test_cell_wrapping() {
        assert_eq!(NumType::Uint8.wrap(-1), 255);
        assert_eq!(NumType::Uint8.wrap(256), 0);
        assert_eq!(NumType::Int8.wrap(128), -128);
        assert_eq!(NumType::Int8.wrap(-1), -1);
        assert_eq!(NumType::Uint16.wrap(65_536), 0);

        let mut bf = load("-");
        run_with_inputs(&mut bf, &[]);
        assert_eq!(bf.memory().unwrap()[0], 255);
    }

    #[test]
    fn test_step_reports_progress_then_halt() {
        let mut bf = load("+>");
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        bf.reset(&mut io);
        assert_eq!(bf.step(&mut io).unwrap(), Outcome::Progressed);
        assert_eq!(bf.step(&mut io).unwrap(), Outcome::Progressed);
        assert_eq!(bf.step(&mut io).unwrap(), Outcome::Halted);
    }

    #[test]
    fn test_minify_and_text_to_code() {
        let bf = Brainfuck::new(NumType::Uint8, 10);
        assert_eq!(
            bf.minify_code("+ add one\n[-] clear").unwrap(),
            "+[-]"
        );

        let code = bf.text_to_code("Hi!").unwrap();
        let mut generated = load(&code);
        let (printed, _) = run_with_inputs(&mut generated, &[]);
        assert_eq!(printed, "Hi!");
    }

    #[test]
    fn test_options() {
        let opts = LangOptions::new()
            .with("numType", "int16")
            .with("reelLength", 8);
        let bf = Brainfuck::from_options(&opts).unwrap();
        assert_eq!(bf.num_type, NumType::Int16);
        assert_eq!(bf.memory().unwrap().len(), 8);

        let bad = LangOptions::new().with("numType", "float");
        assert!(Brainfuck::from_options(&bad).is_err());
        let bad = LangOptions::new().with("reelLength", 0);
        assert!(Brainfuck::from_options(&bad).is_err());
    }

    #[test]
    fn test_oversized_reel_rejected() {
        let opts = LangOptions::new().with("reelLength", 10_000_000_000_000i64);
        let err = Brainfuck::from_options(&opts).err().unwrap();
        assert!(err.contains("reelLength must be between 1 and 16777216"), "{}", err);
    }
}
