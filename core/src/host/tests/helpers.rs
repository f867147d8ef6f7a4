//! Test helpers for host tests
//!
//! Command builders plus filters that pull one kind of event out of a batch.

use serde_json::Value as JsonValue;

use crate::esolangs::Registry;
use crate::host::Host;
use crate::types::{ButtonAction, ButtonArgs, Command, Event, LangOptions};

pub const COMPLETION_PREFIX: &str = "\n... Execution terminated with exit code ";

/// Host over the built-in esolangs with a generous step limit.
pub fn host() -> Host {
    Host::new(Registry::builtin(), Some(100_000))
}

/// Host with `lang` created and `source` loaded; creation events discarded.
pub fn host_with(lang: &str, source: &str) -> Host {
    let mut host = host();
    let events = host.handle(set_language(lang));
    assert!(errors(&events).is_empty(), "setLanguage failed: {:?}", events);
    let events = host.handle(load(source));
    assert!(errors(&events).is_empty(), "loadCode failed: {:?}", events);
    host
}

pub fn set_language(lang: &str) -> Command {
    set_language_with(lang, LangOptions::new())
}

pub fn set_language_with(lang: &str, options: LangOptions) -> Command {
    Command::SetLanguage {
        lang: lang.to_string(),
        options,
    }
}

pub fn load(source: &str) -> Command {
    Command::LoadCode {
        source: source.to_string(),
    }
}

pub fn press(action: ButtonAction) -> Command {
    Command::ButtonPress {
        action,
        args: ButtonArgs::default(),
    }
}

pub fn interpret() -> Command {
    press(ButtonAction::Interpret)
}

pub fn interpret_code(code: &str) -> Command {
    Command::ButtonPress {
        action: ButtonAction::Interpret,
        args: ButtonArgs {
            code: Some(code.to_string()),
            text: None,
        },
    }
}

pub fn unblock(value: impl Into<JsonValue>) -> Command {
    Command::Unblock {
        value: value.into(),
        pop_status: true,
    }
}

/// Concatenated program output, excluding the host's own echo and
/// completion lines.
pub fn output(events: &[Event]) -> String {
    prints(events)
        .into_iter()
        .filter(|text| {
            !text.trim_start_matches('\n').starts_with("> ") && !text.starts_with(COMPLETION_PREFIX)
        })
        .collect()
}

pub fn prints(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Print { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

pub fn errors(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn statuses(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StatusChanged { label } => Some(label.clone()),
            _ => None,
        })
        .collect()
}

/// Every completion line in the batch.
pub fn completions(events: &[Event]) -> Vec<String> {
    prints(events)
        .into_iter()
        .filter(|text| text.starts_with(COMPLETION_PREFIX))
        .collect()
}

/// Exit code of the single completion line in the batch.
pub fn exit_code(events: &[Event]) -> i32 {
    let completions = completions(events);
    assert_eq!(completions.len(), 1, "expected one completion in {:?}", events);
    completions[0][COMPLETION_PREFIX.len()..]
        .split_whitespace()
        .next()
        .and_then(|code| code.parse().ok())
        .expect("completion line carries an exit code")
}

pub fn position(events: &[Event], wanted: impl Fn(&Event) -> bool) -> usize {
    events
        .iter()
        .position(wanted)
        .unwrap_or_else(|| panic!("event not found in {:?}", events))
}
