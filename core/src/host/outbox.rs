//! Event outbox
//!
//! Handlers never send events directly. They append to the outbox, and the
//! protocol layer drains it once the command has been fully handled, which
//! keeps events in generation order and never mixes two commands' events.

use crate::types::Event;

#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<Event>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn print(&mut self, text: impl Into<String>) {
        self.emit(Event::print(text));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take everything emitted so far, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Concatenated text of all pending `Print` events.
    pub fn printed(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Print { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
