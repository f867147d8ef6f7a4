//! Nested activity labels reported to the host.

use super::Outbox;
use crate::types::Event;

/// Reported when nothing is on the stack.
pub const IDLE_LABEL: &str = "-";

#[derive(Debug, Default)]
pub struct StatusStack {
    labels: Vec<String>,
}

impl StatusStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.labels.len()
    }

    pub fn top(&self) -> &str {
        self.labels.last().map(String::as_str).unwrap_or(IDLE_LABEL)
    }

    pub fn push(&mut self, label: impl Into<String>, outbox: &mut Outbox) {
        self.labels.push(label.into());
        self.report(outbox);
    }

    /// Remove the newest label. Popping an empty stack still reports.
    pub fn pop(&mut self, outbox: &mut Outbox) {
        self.labels.pop();
        self.report(outbox);
    }

    /// Pop until the stack is back to `depth` entries.
    pub fn unwind_to(&mut self, depth: usize, outbox: &mut Outbox) {
        while self.labels.len() > depth {
            self.pop(outbox);
        }
    }

    fn report(&self, outbox: &mut Outbox) {
        outbox.emit(Event::StatusChanged {
            label: self.top().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(outbox: &mut Outbox) -> Vec<String> {
        outbox
            .drain()
            .into_iter()
            .map(|event| match event {
                Event::StatusChanged { label } => label,
                other => panic!("Expected StatusChanged, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_push_pop_reports_top() {
        let mut outbox = Outbox::new();
        let mut status = StatusStack::new();

        status.push("Interpreting brainfuck", &mut outbox);
        status.push("Requesting GETCH", &mut outbox);
        status.pop(&mut outbox);
        status.pop(&mut outbox);

        assert_eq!(
            labels(&mut outbox),
            vec![
                "Interpreting brainfuck",
                "Requesting GETCH",
                "Interpreting brainfuck",
                "-",
            ]
        );
        assert_eq!(status.depth(), 0);
    }

    #[test]
    fn test_pop_on_empty_still_reports() {
        let mut outbox = Outbox::new();
        let mut status = StatusStack::new();

        status.pop(&mut outbox);

        assert_eq!(status.depth(), 0);
        assert_eq!(labels(&mut outbox), vec!["-"]);
    }

    #[test]
    fn test_unwind_to() {
        let mut outbox = Outbox::new();
        let mut status = StatusStack::new();
        status.push("a", &mut outbox);
        status.push("b", &mut outbox);
        status.push("c", &mut outbox);
        outbox.drain();

        status.unwind_to(1, &mut outbox);
        assert_eq!(status.top(), "a");
        assert_eq!(labels(&mut outbox), vec!["b", "a"]);

        status.unwind_to(3, &mut outbox);
        assert!(outbox.is_empty());
    }
}
