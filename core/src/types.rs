use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/* ===================== Commands ===================== */

/// Inbound message from the host environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Command {
    SetLanguage {
        lang: String,
        #[serde(default)]
        options: LangOptions,
    },
    LoadCode {
        source: String,
    },
    ButtonPress {
        action: ButtonAction,
        #[serde(default)]
        args: ButtonArgs,
    },
    #[serde(rename_all = "camelCase")]
    Unblock {
        value: JsonValue,
        #[serde(default = "default_pop_status")]
        pop_status: bool,
    },
}

fn default_pop_status() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ButtonAction {
    Reset,
    Minify,
    Interpret,
    Step,
    TextToCode,
}

impl ButtonAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonAction::Reset => "reset",
            ButtonAction::Minify => "minify",
            ButtonAction::Interpret => "interpret",
            ButtonAction::Step => "step",
            ButtonAction::TextToCode => "textToCode",
        }
    }
}

/// Arguments attached to a button press. Which field is read depends on the action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/* ===================== Options ===================== */

/// Variant-specific configuration, kept as a loose map.
///
/// Each esolang reads only the keys it understands; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LangOptions(pub HashMap<String, JsonValue>);

impl LangOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Strict boolean toggle: only a literal `true` enables it.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(JsonValue::Bool(true)))
    }

    /// Numeric option, accepting numbers or numeric strings.
    pub fn number(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Whether instrumentation callbacks should be wired.
    pub fn visualize(&self) -> bool {
        self.flag("updateVisuals")
    }
}

impl From<HashMap<String, JsonValue>> for LangOptions {
    fn from(map: HashMap<String, JsonValue>) -> Self {
        Self(map)
    }
}

/* ===================== Events ===================== */

/// Outbound message to the host environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    StatusChanged {
        label: String,
    },
    #[serde(rename_all = "camelCase")]
    Created {
        lang: String,
        visualize: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_memory: Option<Vec<i64>>,
    },
    InstrumentationUpdate {
        update: Instrumentation,
    },
    RequestByteInput,
    RequestLineInput,
    Print {
        text: String,
    },
    MinifiedCode {
        code: String,
    },
    TextToCode {
        lang: String,
        code: String,
    },
    Error {
        message: String,
    },
}

impl Event {
    pub fn print(text: impl Into<String>) -> Self {
        Event::Print { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }
}

/// Visualization payloads. Which ones a variant produces depends on how it
/// models its machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Instrumentation {
    InstructionPointer {
        value: usize,
    },
    DataPointer {
        value: usize,
    },
    Data {
        index: usize,
        value: i64,
    },
    AllData {
        values: Vec<i64>,
    },
    Stack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        action: StackAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<JsonValue>,
    },
    Object {
        name: String,
        key: String,
        action: ObjectAction,
        value: JsonValue,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackAction {
    Push,
    Pop,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectAction {
    Set,
    Delete,
}

/* ===================== Input ===================== */

/// What a suspended interpreter is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// A single character, delivered as its code point.
    Byte,
    /// An arbitrary line of text.
    Line,
}

impl InputKind {
    pub fn status_label(&self) -> &'static str {
        match self {
            InputKind::Byte => "Requesting GETCH",
            InputKind::Line => "Requesting Input",
        }
    }

    pub fn request_event(&self) -> Event {
        match self {
            InputKind::Byte => Event::RequestByteInput,
            InputKind::Line => Event::RequestLineInput,
        }
    }
}

/// Typed value handed back to a suspended interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Byte(i64),
    Line(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_decoding() {
        let cmd: Command =
            serde_json::from_value(json!({"cmd": "setLanguage", "lang": "brainfuck"})).unwrap();
        assert_eq!(
            cmd,
            Command::SetLanguage {
                lang: "brainfuck".to_string(),
                options: LangOptions::default(),
            }
        );

        let cmd: Command = serde_json::from_value(
            json!({"cmd": "buttonPress", "action": "textToCode", "args": {"text": "hi"}}),
        )
        .unwrap();
        let Command::ButtonPress { action, args } = cmd else {
            panic!("Expected ButtonPress, got {:?}", cmd);
        };
        assert_eq!(action, ButtonAction::TextToCode);
        assert_eq!(args.text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_unblock_pop_status_defaults_to_true() {
        let cmd: Command = serde_json::from_value(json!({"cmd": "unblock", "value": 65})).unwrap();
        assert_eq!(
            cmd,
            Command::Unblock {
                value: json!(65),
                pop_status: true,
            }
        );

        let cmd: Command =
            serde_json::from_value(json!({"cmd": "unblock", "value": "x", "popStatus": false}))
                .unwrap();
        assert!(matches!(cmd, Command::Unblock { pop_status: false, .. }));
    }

    #[test]
    fn test_unknown_command_tag_is_rejected() {
        let result = serde_json::from_value::<Command>(json!({"cmd": "explode"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_event_encoding() {
        let value = serde_json::to_value(Event::Created {
            lang: "brainfuck".to_string(),
            visualize: false,
            initial_memory: None,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"event": "created", "lang": "brainfuck", "visualize": false})
        );

        let value = serde_json::to_value(Event::RequestByteInput).unwrap();
        assert_eq!(value, json!({"event": "requestByteInput"}));
    }

    #[test]
    fn test_lang_options_accessors() {
        let opts = LangOptions::new()
            .with("debug", true)
            .with("comments", "yes")
            .with("wrapLimit", "12")
            .with("reelLength", 300);

        assert!(opts.flag("debug"));
        assert!(!opts.flag("comments"));
        assert!(!opts.flag("missing"));
        assert_eq!(opts.number("wrapLimit"), Some(12));
        assert_eq!(opts.number("reelLength"), Some(300));
        assert!(!opts.visualize());
    }
}
