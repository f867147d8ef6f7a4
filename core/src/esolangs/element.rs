//! Element
//!
//! A main stack of values, a control stack of truth values, and a variable
//! table. Runs of non-command characters are literals and are pushed onto
//! the main stack; whitespace only separates literals.

use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;

use super::{Capabilities, Interpreter, InterpreterError, Io, Notification, Outcome};
use crate::types::{Input, InputKind, LangOptions};

pub const LANG: &str = "element";

const COMMANDS: &str = "`_;~+-*/%^<>=!&|\"'?:#$().,@[]{}";
const MAIN: &str = "main";
const CONTROL: &str = "control";

/* ===================== Values ===================== */

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    Str(String),
}

impl Value {
    fn literal(text: &str) -> Self {
        match text.parse::<f64>() {
            Ok(n) => Value::Num(n),
            Err(_) => Value::Str(text.to_string()),
        }
    }

    fn bool(b: bool) -> Self {
        Value::Num(if b { 1.0 } else { 0.0 })
    }

    fn number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Str(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    fn truthy(&self) -> bool {
        self.number() != 0.0
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Value::Num(n) => json!(n),
            Value::Str(s) => json!(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Num(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/* ===================== Program ===================== */

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Literal(String),
    Command(char),
    /// `[`, index of the matching `]`
    ForStart(usize),
    /// `]`, index of the matching `[`
    ForEnd(usize),
    WhileStart,
    /// `}`, index of the matching `{`
    WhileEnd(usize),
}

#[derive(Debug, Clone)]
struct Token {
    pos: usize,
    op: Op,
}

fn tokenize(source: &str) -> Result<Vec<Token>, InterpreterError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut open: Vec<(usize, char, usize)> = Vec::new();
    let mut literal: Option<(usize, String)> = None;

    for (pos, c) in source.chars().enumerate() {
        if !c.is_whitespace() && !COMMANDS.contains(c) {
            literal.get_or_insert_with(|| (pos, String::new())).1.push(c);
            continue;
        }
        if let Some((start, text)) = literal.take() {
            tokens.push(Token {
                pos: start,
                op: Op::Literal(text),
            });
        }
        if c.is_whitespace() {
            continue;
        }

        let index = tokens.len();
        let op = match c {
            '[' | '{' => {
                open.push((index, c, pos));
                if c == '[' {
                    Op::ForStart(usize::MAX)
                } else {
                    Op::WhileStart
                }
            }
            ']' | '}' => {
                let expected = if c == ']' { '[' } else { '{' };
                match open.pop() {
                    Some((start, opener, _)) if opener == expected => {
                        if c == ']' {
                            tokens[start].op = Op::ForStart(index);
                            Op::ForEnd(start)
                        } else {
                            Op::WhileEnd(start)
                        }
                    }
                    _ => {
                        return Err(InterpreterError::Syntax(format!(
                            "unmatched '{}' at position {}",
                            c, pos
                        )))
                    }
                }
            }
            _ => Op::Command(c),
        };
        tokens.push(Token { pos, op });
    }

    if let Some((start, text)) = literal.take() {
        tokens.push(Token {
            pos: start,
            op: Op::Literal(text),
        });
    }
    if let Some((_, c, pos)) = open.pop() {
        return Err(InterpreterError::Syntax(format!(
            "unmatched '{}' at position {}",
            c, pos
        )));
    }
    Ok(tokens)
}

/* ===================== Interpreter ===================== */

#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    start: usize,
    remaining: i64,
}

pub struct Element {
    autovivification: bool,
    program: Vec<Token>,
    pc: usize,
    main: Vec<Value>,
    control: Vec<Value>,
    vars: HashMap<String, Value>,
    loops: Vec<LoopFrame>,
    awaiting_input: bool,
}

impl Element {
    pub fn new(autovivification: bool) -> Self {
        Self {
            autovivification,
            program: Vec::new(),
            pc: 0,
            main: Vec::new(),
            control: Vec::new(),
            vars: HashMap::new(),
            loops: Vec::new(),
            awaiting_input: false,
        }
    }

    /// Recognised options: `autovivification`.
    pub fn from_options(options: &LangOptions) -> Result<Self, String> {
        Ok(Self::new(options.flag("autovivification")))
    }

    fn here(&self) -> String {
        self.program
            .get(self.pc)
            .map_or_else(|| "end of program".to_string(), |t| format!("position {}", t.pos))
    }

    fn push_to(&mut self, stack: &'static str, value: Value, io: &mut Io<'_>) {
        io.notify(|| Notification::Push {
            stack: Some(stack),
            value: value.to_json(),
        });
        if stack == CONTROL {
            self.control.push(value);
        } else {
            self.main.push(value);
        }
    }

    fn pop_from(&mut self, stack: &'static str, io: &mut Io<'_>) -> Result<Value, InterpreterError> {
        let popped = if stack == CONTROL {
            self.control.pop()
        } else {
            self.main.pop()
        };
        let value = popped.ok_or_else(|| {
            InterpreterError::StackUnderflow(format!("{} ({} stack)", self.here(), stack))
        })?;
        io.notify(|| Notification::Pop {
            stack: Some(stack),
            value: value.to_json(),
        });
        Ok(value)
    }

    fn push(&mut self, value: Value, io: &mut Io<'_>) {
        self.push_to(MAIN, value, io);
    }

    fn pop(&mut self, io: &mut Io<'_>) -> Result<Value, InterpreterError> {
        self.pop_from(MAIN, io)
    }

    fn goto(&mut self, pc: usize, io: &mut Io<'_>) {
        self.pc = pc;
        let pos = self.program.get(pc).map_or_else(
            || self.program.last().map_or(0, |t| t.pos + 1),
            |t| t.pos,
        );
        io.notify(|| Notification::Position {
            key: "ip",
            value: pos,
        });
    }

    fn command(&mut self, c: char, io: &mut Io<'_>) -> Result<(), InterpreterError> {
        match c {
            '`' => {
                let value = self.pop(io)?;
                io.print(value.to_string());
            }
            ';' => {
                let name = self.pop(io)?.to_string();
                let value = self.pop(io)?;
                io.notify(|| Notification::Variable {
                    symbol: name.clone(),
                    value: value.to_json(),
                });
                self.vars.insert(name, value);
            }
            '~' => {
                let name = self.pop(io)?.to_string();
                let value = match self.vars.get(&name) {
                    Some(value) => value.clone(),
                    None if self.autovivification => Value::Str(String::new()),
                    None => {
                        return Err(InterpreterError::Runtime(format!(
                            "undefined variable '{}' at {}",
                            name,
                            self.here()
                        )))
                    }
                };
                self.push(value, io);
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                let a = self.pop(io)?.number();
                let b = self.pop(io)?.number();
                let result = match c {
                    '+' => b + a,
                    '-' => b - a,
                    '*' => b * a,
                    '^' => b.powf(a),
                    _ if a == 0.0 => {
                        return Err(InterpreterError::Runtime(format!(
                            "division by zero at {}",
                            self.here()
                        )))
                    }
                    '/' => b / a,
                    _ => b % a,
                };
                self.push(Value::Num(result), io);
            }
            '<' | '>' | '=' => {
                let a = self.pop(io)?;
                let b = self.pop(io)?;
                let result = match c {
                    '<' => b.number() < a.number(),
                    '>' => b.number() > a.number(),
                    _ => b.to_string() == a.to_string(),
                };
                self.push_to(CONTROL, Value::bool(result), io);
            }
            '!' => {
                let a = self.pop_from(CONTROL, io)?;
                self.push_to(CONTROL, Value::bool(!a.truthy()), io);
            }
            '&' | '|' => {
                let a = self.pop_from(CONTROL, io)?.truthy();
                let b = self.pop_from(CONTROL, io)?.truthy();
                let result = if c == '&' { a && b } else { a || b };
                self.push_to(CONTROL, Value::bool(result), io);
            }
            '"' => {
                let value = self.pop(io)?;
                self.push_to(CONTROL, value, io);
            }
            '\'' => {
                let value = self.pop_from(CONTROL, io)?;
                self.push(value, io);
            }
            '?' => {
                let value = self.pop(io)?;
                self.push_to(CONTROL, Value::bool(value.truthy()), io);
            }
            ':' => {
                let count = self.pop(io)?.number();
                let value = self.pop(io)?;
                for _ in 0..count.max(0.0) as usize {
                    self.push(value.clone(), io);
                }
            }
            '#' => {
                let value = self.pop(io)?;
                self.push(Value::Num(value.number()), io);
            }
            '$' => {
                let value = self.pop(io)?;
                self.push(Value::Num(value.to_string().chars().count() as f64), io);
            }
            '(' | ')' => {
                let text = self.pop(io)?.to_string();
                let mut chars: Vec<char> = text.chars().collect();
                let taken = if c == '(' {
                    (!chars.is_empty()).then(|| chars.remove(0))
                } else {
                    chars.pop()
                };
                self.push(Value::Str(chars.into_iter().collect()), io);
                self.push(Value::Str(taken.map(String::from).unwrap_or_default()), io);
            }
            '.' => {
                let a = self.pop(io)?;
                let b = self.pop(io)?;
                self.push(Value::Str(format!("{}{}", b, a)), io);
            }
            ',' => {
                let value = match self.pop(io)? {
                    Value::Num(n) => Value::Str(super::char_from_code(n as i64).to_string()),
                    Value::Str(s) => Value::Num(s.chars().next().map_or(0.0, |c| f64::from(u32::from(c)))),
                };
                self.push(value, io);
            }
            '@' => {
                let depth = self.pop(io)?.number().max(0.0) as usize;
                if depth >= self.main.len() {
                    return Err(InterpreterError::StackUnderflow(format!(
                        "{} (main stack, depth {})",
                        self.here(),
                        depth
                    )));
                }
                let index = self.main.len() - 1 - depth;
                let value = self.main.remove(index);
                self.main.push(value);
            }
            other => {
                return Err(InterpreterError::Runtime(format!(
                    "unknown command '{}' at {}",
                    other,
                    self.here()
                )))
            }
        }
        Ok(())
    }
}

impl Interpreter for Element {
    fn lang(&self) -> &'static str {
        LANG
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_input: true,
            supports_step: true,
            supports_minify: false,
            supports_text_to_code: false,
        }
    }

    fn set_code(&mut self, source: &str) -> Result<(), InterpreterError> {
        self.program = tokenize(source)?;
        Ok(())
    }

    fn reset(&mut self, io: &mut Io<'_>) {
        self.main.clear();
        self.control.clear();
        self.loops.clear();
        self.awaiting_input = false;
        let names: Vec<String> = self.vars.drain().map(|(name, _)| name).collect();
        for symbol in names {
            io.notify(|| Notification::Variable {
                symbol,
                value: JsonValue::Null,
            });
        }
        io.notify(|| Notification::Cleared { stack: Some(MAIN) });
        io.notify(|| Notification::Cleared {
            stack: Some(CONTROL),
        });
        self.goto(0, io);
    }

    fn step(&mut self, io: &mut Io<'_>) -> Result<Outcome, InterpreterError> {
        if self.awaiting_input {
            return Ok(Outcome::Suspended(InputKind::Line));
        }
        let Some(token) = self.program.get(self.pc).cloned() else {
            return Ok(Outcome::Halted);
        };

        let mut next = self.pc + 1;
        match token.op {
            Op::Literal(text) => self.push(Value::literal(&text), io),
            Op::Command('_') => {
                self.awaiting_input = true;
                return Ok(Outcome::Suspended(InputKind::Line));
            }
            Op::Command(c) => self.command(c, io)?,
            Op::ForStart(end) => {
                let count = self.pop(io)?.number() as i64;
                if count > 0 {
                    self.loops.push(LoopFrame {
                        start: self.pc,
                        remaining: count,
                    });
                } else {
                    next = end + 1;
                }
            }
            Op::ForEnd(start) => {
                let frame = self.loops.last_mut().ok_or_else(|| {
                    InterpreterError::Runtime(format!("']' without a running loop at {}", token.pos))
                })?;
                frame.remaining -= 1;
                if frame.remaining > 0 {
                    next = start + 1;
                } else {
                    self.loops.pop();
                }
            }
            Op::WhileStart => {}
            Op::WhileEnd(start) => {
                if self.pop_from(CONTROL, io)?.truthy() {
                    next = start + 1;
                }
            }
        }

        self.goto(next, io);
        Ok(Outcome::Progressed)
    }

    fn resume(&mut self, input: Input, io: &mut Io<'_>) -> Result<(), InterpreterError> {
        if !self.awaiting_input {
            return Err(InterpreterError::NotSuspended);
        }
        self.awaiting_input = false;
        let line = match input {
            Input::Line(line) => line,
            Input::Byte(b) => super::char_from_code(b).to_string(),
        };
        self.push(Value::Str(line), io);
        let next = self.pc + 1;
        self.goto(next, io);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esolangs::test_support::run_with_inputs;
    use crate::esolangs::StepBudget;
    use crate::host::Outbox;

    fn run(source: &str, inputs: &[Input]) -> String {
        let mut element = Element::new(false);
        element.set_code(source).unwrap();
        run_with_inputs(&mut element, inputs).0
    }

    fn run_err(element: &mut Element) -> InterpreterError {
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        element.reset(&mut io);
        element
            .run(&mut io, &mut StepBudget::unlimited())
            .unwrap_err()
    }

    #[test]
    fn test_literal_output() {
        assert_eq!(run("Hello`", &[]), "Hello");
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("3 4+`", &[]), "7");
        assert_eq!(run("7 2/`", &[]), "3.5");
        assert_eq!(run("2 10^`", &[]), "1024");
    }

    #[test]
    fn test_line_input() {
        assert_eq!(run("_`", &[Input::Line("abc".to_string())]), "abc");
    }

    #[test]
    fn test_variables() {
        assert_eq!(run("5 x; x~ 2*`", &[]), "10");
    }

    #[test]
    fn test_for_loop() {
        assert_eq!(run("3[a`]", &[]), "aaa");
        assert_eq!(run("0[a`]b`", &[]), "b");
    }

    #[test]
    fn test_while_loop() {
        assert_eq!(run("3 n;{n~` n~1- n; n~?}", &[]), "321");
    }

    #[test]
    fn test_string_ops() {
        assert_eq!(run("abc(``", &[]), "abc");
        assert_eq!(run("abc$`", &[]), "3");
        assert_eq!(run("foo bar.`", &[]), "foobar");
    }

    #[test]
    fn test_autovivification() {
        let mut element = Element::new(true);
        element.set_code("y~`").unwrap();
        assert_eq!(run_with_inputs(&mut element, &[]).0, "");

        let mut element = Element::new(false);
        element.set_code("y~`").unwrap();
        assert!(matches!(run_err(&mut element), InterpreterError::Runtime(_)));
    }

    #[test]
    fn test_unmatched_brackets() {
        let mut element = Element::new(false);
        assert!(matches!(
            element.set_code("3[a`"),
            Err(InterpreterError::Syntax(_))
        ));
        assert!(matches!(
            element.set_code("{]"),
            Err(InterpreterError::Syntax(_))
        ));
    }

    #[test]
    fn test_stack_underflow() {
        let mut element = Element::new(false);
        element.set_code("+").unwrap();
        assert!(matches!(
            run_err(&mut element),
            InterpreterError::StackUnderflow(_)
        ));
    }
}
