//! Befunge-93
//!
//! A toroidal grid of characters walked by a directional instruction
//! pointer, operating on one integer stack. Popping an empty stack yields 0.
//! The grid is sized to the source (widest line by number of lines).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use super::{
    char_from_code, Capabilities, Interpreter, InterpreterError, Io, Notification, Outcome,
};
use crate::types::{Input, InputKind, LangOptions};

pub const LANG: &str = "befunge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Right,
    Left,
    Up,
    Down,
}

pub struct Befunge {
    debug: bool,
    wrap_limit: Option<u64>,
    self_modification: bool,
    source: Vec<Vec<char>>,
    grid: Vec<Vec<char>>,
    /// Non-space cells in `source` and in `grid`
    source_filled: usize,
    filled: usize,
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    dir: Direction,
    stack: Vec<i64>,
    string_mode: bool,
    halted: bool,
    wraps: u64,
    pending: Option<InputKind>,
    rng: StdRng,
}

impl Befunge {
    pub fn new(debug: bool, wrap_limit: Option<u64>, self_modification: bool) -> Self {
        Self {
            debug,
            wrap_limit,
            self_modification,
            source: Vec::new(),
            grid: Vec::new(),
            source_filled: 0,
            filled: 0,
            width: 0,
            height: 0,
            x: 0,
            y: 0,
            dir: Direction::Right,
            stack: Vec::new(),
            string_mode: false,
            halted: false,
            wraps: 0,
            pending: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Recognised options: `debug`, `wrapLimit`, `selfModification`.
    pub fn from_options(options: &LangOptions) -> Result<Self, String> {
        let wrap_limit = match options.number("wrapLimit") {
            Some(n) if n < 0 => return Err(format!("wrapLimit must not be negative, got {}", n)),
            Some(0) | None => None,
            Some(n) => Some(n as u64),
        };
        Ok(Self::new(
            options.flag("debug"),
            wrap_limit,
            options.flag("selfModification"),
        ))
    }

    fn push(&mut self, value: i64, io: &mut Io<'_>) {
        self.stack.push(value);
        io.notify(|| Notification::Push {
            stack: None,
            value: json!(value),
        });
    }

    fn pop(&mut self, io: &mut Io<'_>) -> i64 {
        match self.stack.pop() {
            Some(value) => {
                io.notify(|| Notification::Pop {
                    stack: None,
                    value: json!(value),
                });
                value
            }
            None => 0,
        }
    }

    fn cell(&self, x: i64, y: i64) -> Option<char> {
        let x = usize::try_from(x).ok()?;
        let y = usize::try_from(y).ok()?;
        self.grid.get(y)?.get(x).copied()
    }

    /// Move one cell in the current direction, wrapping at the edges.
    fn advance(&mut self, io: &mut Io<'_>) -> Result<(), InterpreterError> {
        let wrapped = match self.dir {
            Direction::Right => {
                self.x = (self.x + 1) % self.width;
                self.x == 0
            }
            Direction::Left => {
                let wrapped = self.x == 0;
                self.x = if wrapped { self.width - 1 } else { self.x - 1 };
                wrapped
            }
            Direction::Down => {
                self.y = (self.y + 1) % self.height;
                self.y == 0
            }
            Direction::Up => {
                let wrapped = self.y == 0;
                self.y = if wrapped { self.height - 1 } else { self.y - 1 };
                wrapped
            }
        };

        if wrapped {
            self.wraps += 1;
            if let Some(limit) = self.wrap_limit {
                if self.wraps > limit {
                    return Err(InterpreterError::Runtime(format!(
                        "wrap limit of {} exceeded",
                        limit
                    )));
                }
            }
        }

        let (x, y) = (self.x, self.y);
        io.notify(|| Notification::Position { key: "x", value: x });
        io.notify(|| Notification::Position { key: "y", value: y });
        Ok(())
    }

    fn arithmetic(&mut self, op: char, io: &mut Io<'_>) -> Result<(), InterpreterError> {
        let a = self.pop(io);
        let b = self.pop(io);
        let result = match op {
            '+' => b.wrapping_add(a),
            '-' => b.wrapping_sub(a),
            '*' => b.wrapping_mul(a),
            '/' | '%' if a == 0 => {
                return Err(InterpreterError::Runtime(format!(
                    "division by zero at ({}, {})",
                    self.x, self.y
                )))
            }
            '/' => b.wrapping_div(a),
            '%' => b.wrapping_rem(a),
            '`' => i64::from(b > a),
            _ => unreachable!("not an arithmetic instruction: {op}"),
        };
        self.push(result, io);
        Ok(())
    }
}

impl Interpreter for Befunge {
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
        let rows: Vec<Vec<char>> = source
            .lines()
            .map(|line| line.trim_end_matches('\r').chars().collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let height = rows.len().max(1);

        let mut grid = vec![vec![' '; width]; height];
        for (y, row) in rows.into_iter().enumerate() {
            grid[y][..row.len()].copy_from_slice(&row);
        }

        self.source_filled = grid.iter().flatten().filter(|c| **c != ' ').count();
        self.source = grid;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn reset(&mut self, io: &mut Io<'_>) {
        self.grid = self.source.clone();
        self.filled = self.source_filled;
        self.x = 0;
        self.y = 0;
        self.dir = Direction::Right;
        self.stack.clear();
        self.string_mode = false;
        self.halted = false;
        self.wraps = 0;
        self.pending = None;
        io.notify(|| Notification::Cleared { stack: None });
        io.notify(|| Notification::Position { key: "x", value: 0 });
        io.notify(|| Notification::Position { key: "y", value: 0 });
    }

    fn step(&mut self, io: &mut Io<'_>) -> Result<Outcome, InterpreterError> {
        if let Some(kind) = self.pending {
            return Ok(Outcome::Suspended(kind));
        }
        if self.halted || self.filled == 0 {
            return Ok(Outcome::Halted);
        }

        let c = self.grid[self.y][self.x];
        if self.debug && c != ' ' {
            io.print(format!("({}, {}) {}\n", self.x, self.y, c));
        }

        if self.string_mode {
            if c == '"' {
                self.string_mode = false;
            } else {
                self.push(i64::from(u32::from(c)), io);
            }
            self.advance(io)?;
            return Ok(Outcome::Progressed);
        }

        match c {
            '0'..='9' => self.push(i64::from(c as u8 - b'0'), io),
            '+' | '-' | '*' | '/' | '%' | '`' => self.arithmetic(c, io)?,
            '!' => {
                let a = self.pop(io);
                self.push(i64::from(a == 0), io);
            }
            '>' => self.dir = Direction::Right,
            '<' => self.dir = Direction::Left,
            '^' => self.dir = Direction::Up,
            'v' => self.dir = Direction::Down,
            '?' => {
                self.dir = match self.rng.gen_range(0..4) {
                    0 => Direction::Right,
                    1 => Direction::Left,
                    2 => Direction::Up,
                    _ => Direction::Down,
                }
            }
            '_' => {
                self.dir = if self.pop(io) == 0 {
                    Direction::Right
                } else {
                    Direction::Left
                }
            }
            '|' => {
                self.dir = if self.pop(io) == 0 {
                    Direction::Down
                } else {
                    Direction::Up
                }
            }
            '"' => self.string_mode = true,
            ':' => {
                let a = self.pop(io);
                self.push(a, io);
                self.push(a, io);
            }
            '\\' => {
                let a = self.pop(io);
                let b = self.pop(io);
                self.push(a, io);
                self.push(b, io);
            }
            '$' => {
                self.pop(io);
            }
            '.' => {
                let a = self.pop(io);
                io.print(format!("{} ", a));
            }
            ',' => {
                let a = self.pop(io);
                io.print(char_from_code(a).to_string());
            }
            '#' => self.advance(io)?,
            'p' => {
                let y = self.pop(io);
                let x = self.pop(io);
                let v = self.pop(io);
                if !self.self_modification {
                    return Err(InterpreterError::Runtime(format!(
                        "self-modification is disabled ('p' at ({}, {}))",
                        self.x, self.y
                    )));
                }
                if self.cell(x, y).is_none() {
                    return Err(InterpreterError::Runtime(format!(
                        "'p' target ({}, {}) is outside the grid",
                        x, y
                    )));
                }
                let cell = &mut self.grid[y as usize][x as usize];
                let written = char_from_code(v);
                match (*cell == ' ', written == ' ') {
                    (true, false) => self.filled += 1,
                    (false, true) => self.filled -= 1,
                    _ => {}
                }
                *cell = written;
            }
            'g' => {
                let y = self.pop(io);
                let x = self.pop(io);
                let value = self.cell(x, y).map_or(0, |c| i64::from(u32::from(c)));
                self.push(value, io);
            }
            '&' => {
                self.pending = Some(InputKind::Line);
                return Ok(Outcome::Suspended(InputKind::Line));
            }
            '~' => {
                self.pending = Some(InputKind::Byte);
                return Ok(Outcome::Suspended(InputKind::Byte));
            }
            '@' => {
                self.halted = true;
                return Ok(Outcome::Progressed);
            }
            _ => {}
        }

        self.advance(io)?;
        Ok(Outcome::Progressed)
    }

    fn resume(&mut self, input: Input, io: &mut Io<'_>) -> Result<(), InterpreterError> {
        let kind = self.pending.take().ok_or(InterpreterError::NotSuspended)?;
        let value = match (kind, input) {
            (InputKind::Byte, Input::Byte(b)) => b,
            (InputKind::Byte, Input::Line(line)) => {
                line.chars().next().map_or(-1, |c| i64::from(u32::from(c)))
            }
            (InputKind::Line, Input::Line(line)) => line.trim().parse().map_err(|_| {
                InterpreterError::InvalidInput(format!("expected an integer, got '{}'", line))
            })?,
            (InputKind::Line, Input::Byte(b)) => b,
        };
        self.push(value, io);
        self.advance(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esolangs::test_support::run_with_inputs;
    use crate::esolangs::StepBudget;
    use crate::host::Outbox;

    fn load(source: &str) -> Befunge {
        let mut befunge = Befunge::new(false, None, false);
        befunge.set_code(source).unwrap();
        befunge
    }

    fn run_err(befunge: &mut Befunge) -> InterpreterError {
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        befunge.reset(&mut io);
        befunge
            .run(&mut io, &mut StepBudget::new(Some(10_000)))
            .unwrap_err()
    }

    #[test]
    fn test_hello_world() {
        let mut befunge = load(r#""!dlroW ,olleH">:#,_@"#);
        let (printed, _) = run_with_inputs(&mut befunge, &[]);
        assert_eq!(printed, "Hello, World!");
    }

    #[test]
    fn test_multiline_arithmetic() {
        let mut befunge = load("v\n>34*.@");
        let (printed, _) = run_with_inputs(&mut befunge, &[]);
        assert_eq!(printed, "12 ");
    }

    #[test]
    fn test_byte_and_line_input() {
        let mut befunge = load("~,&.@");
        let (printed, _) = run_with_inputs(
            &mut befunge,
            &[Input::Byte(66), Input::Line(" 42 ".to_string())],
        );
        assert_eq!(printed, "B42 ");
    }

    #[test]
    fn test_line_input_must_be_numeric() {
        let mut befunge = load("&@");
        let mut outbox = Outbox::new();
        let mut io = Io::new(&mut outbox, None);
        befunge.reset(&mut io);
        assert_eq!(
            befunge.step(&mut io).unwrap(),
            Outcome::Suspended(InputKind::Line)
        );
        let err = befunge
            .resume(Input::Line("many".to_string()), &mut io)
            .unwrap_err();
        assert!(matches!(err, InterpreterError::InvalidInput(_)));
    }

    #[test]
    fn test_wrap_limit() {
        let mut befunge = Befunge::new(false, Some(5), false);
        befunge.set_code("1").unwrap();
        assert!(matches!(run_err(&mut befunge), InterpreterError::Runtime(_)));
    }

    #[test]
    fn test_self_modification_toggle() {
        let source = r#""A"00p00g,@"#;

        let mut befunge = Befunge::new(false, None, true);
        befunge.set_code(source).unwrap();
        let (printed, _) = run_with_inputs(&mut befunge, &[]);
        assert_eq!(printed, "A");

        let mut befunge = load(source);
        assert!(matches!(run_err(&mut befunge), InterpreterError::Runtime(_)));
    }

    #[test]
    fn test_filled_cells_follow_self_modification() {
        let mut befunge = Befunge::new(false, None, true);
        befunge.set_code("\"A\"70p@ ").unwrap();
        run_with_inputs(&mut befunge, &[]);
        assert_eq!(befunge.filled, 8);

        befunge.set_code("48*70p@X").unwrap();
        run_with_inputs(&mut befunge, &[]);
        assert_eq!(befunge.filled, 7);
        assert_eq!(befunge.grid[0][7], ' ');

        let mut outbox = Outbox::new();
        befunge.reset(&mut Io::new(&mut outbox, None));
        assert_eq!(befunge.filled, 8);
    }

    #[test]
    fn test_empty_program_halts() {
        for source in ["", "   \n  "] {
            let mut befunge = load(source);
            let mut outbox = Outbox::new();
            let mut io = Io::new(&mut outbox, None);
            befunge.reset(&mut io);
            assert_eq!(befunge.step(&mut io).unwrap(), Outcome::Halted);
        }
    }

    #[test]
    fn test_options() {
        let opts = LangOptions::new()
            .with("wrapLimit", 3)
            .with("selfModification", true);
        let befunge = Befunge::from_options(&opts).unwrap();
        assert_eq!(befunge.wrap_limit, Some(3));
        assert!(befunge.self_modification);

        let befunge = Befunge::from_options(&LangOptions::new().with("wrapLimit", 0)).unwrap();
        assert_eq!(befunge.wrap_limit, None);
    }
}
