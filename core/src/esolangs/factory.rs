//! Interpreter factory
//!
//! A registry of variant constructors keyed by language tag. Creating a
//! variant also decides whether its notifications are translated into
//! `InstrumentationUpdate` events, and how: each esolang models its machine
//! differently, so each registers its own translator.

use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::befunge::{self, Befunge};
use super::brainfuck::{self, Brainfuck};
use super::element::{self, Element};
use super::length::{self, Length};
use super::{Capabilities, Interpreter, Io, Notification, Translator};
use crate::error::{HostError, Result};
use crate::host::Outbox;
use crate::types::{Event, Instrumentation, LangOptions, ObjectAction, StackAction};

pub type Constructor = fn(&LangOptions) -> std::result::Result<Box<dyn Interpreter>, String>;

#[derive(Clone, Copy)]
struct Variant {
    construct: Constructor,
    translate: Translator,
}

/* ===================== Registry ===================== */

pub struct Registry {
    variants: BTreeMap<&'static str, Variant>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            variants: BTreeMap::new(),
        }
    }

    /// Registry with every built-in esolang.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(brainfuck::LANG, build_brainfuck, brainfuck_updates);
        registry.register(length::LANG, build_length, length_updates);
        registry.register(befunge::LANG, build_befunge, befunge_updates);
        registry.register(element::LANG, build_element, element_updates);
        registry
    }

    pub fn register(&mut self, tag: &'static str, construct: Constructor, translate: Translator) {
        self.variants.insert(
            tag,
            Variant {
                construct,
                translate,
            },
        );
    }

    pub fn contains(&self, lang: &str) -> bool {
        self.variants.contains_key(lang)
    }

    /// Registered tags, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.variants.keys().copied()
    }

    /// Build a configured interpreter for `lang`.
    pub fn create(&self, lang: &str, options: &LangOptions) -> Result<InterpreterHandle> {
        let variant = self
            .variants
            .get(lang)
            .ok_or_else(|| HostError::UnsupportedLanguage(lang.to_string()))?;

        let interpreter = (variant.construct)(options).map_err(|detail| HostError::InvalidOptions {
            lang: lang.to_string(),
            detail,
        })?;

        let visualize = options.visualize();
        info!(lang, visualize, "Created interpreter");

        Ok(InterpreterHandle {
            lang: interpreter.lang(),
            options: options.clone(),
            capabilities: interpreter.capabilities(),
            translate: visualize.then_some(variant.translate),
            interpreter,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn build_brainfuck(options: &LangOptions) -> std::result::Result<Box<dyn Interpreter>, String> {
    Ok(Box::new(Brainfuck::from_options(options)?))
}

fn build_length(options: &LangOptions) -> std::result::Result<Box<dyn Interpreter>, String> {
    Ok(Box::new(Length::from_options(options)?))
}

fn build_befunge(options: &LangOptions) -> std::result::Result<Box<dyn Interpreter>, String> {
    Ok(Box::new(Befunge::from_options(options)?))
}

fn build_element(options: &LangOptions) -> std::result::Result<Box<dyn Interpreter>, String> {
    Ok(Box::new(Element::from_options(options)?))
}

/* ===================== Handle ===================== */

/// The one live interpreter, with the configuration it was built from.
pub struct InterpreterHandle {
    lang: &'static str,
    options: LangOptions,
    capabilities: Capabilities,
    translate: Option<Translator>,
    interpreter: Box<dyn Interpreter>,
}

impl InterpreterHandle {
    pub fn lang(&self) -> &'static str {
        self.lang
    }

    pub fn options(&self) -> &LangOptions {
        &self.options
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn visualize(&self) -> bool {
        self.translate.is_some()
    }

    pub fn interpreter(&self) -> &dyn Interpreter {
        self.interpreter.as_ref()
    }

    /// Call into the interpreter with output and instrumentation wired to `outbox`.
    pub fn with_io<R>(
        &mut self,
        outbox: &mut Outbox,
        f: impl FnOnce(&mut dyn Interpreter, &mut Io<'_>) -> R,
    ) -> R {
        let mut io = Io::new(outbox, self.translate);
        f(self.interpreter.as_mut(), &mut io)
    }

    pub fn created_event(&self) -> Event {
        let initial_memory = if self.visualize() {
            self.interpreter.memory()
        } else {
            None
        };
        debug!(
            lang = self.lang,
            has_memory = initial_memory.is_some(),
            "Reporting creation"
        );
        Event::Created {
            lang: self.lang.to_string(),
            visualize: self.visualize(),
            initial_memory,
        }
    }
}

/* ===================== Translators ===================== */

fn pointer(key: &str, value: usize) -> Instrumentation {
    Instrumentation::Object {
        name: "pointers".to_string(),
        key: key.to_string(),
        action: ObjectAction::Set,
        value: json!(value),
    }
}

fn stack_update(notification: Notification) -> Option<Instrumentation> {
    let (stack, action, value) = match notification {
        Notification::Push { stack, value } => (stack, StackAction::Push, Some(value)),
        Notification::Pop { stack, value } => (stack, StackAction::Pop, Some(value)),
        Notification::Cleared { stack } => (stack, StackAction::Empty, None),
        _ => return None,
    };
    Some(Instrumentation::Stack {
        stack: stack.map(str::to_string),
        action,
        value,
    })
}

/// Tape machine: pointers are reported twice, as a dedicated update and as
/// an entry in the `pointers` object.
pub fn brainfuck_updates(notification: Notification) -> Vec<Instrumentation> {
    match notification {
        Notification::InstructionPointer(value) => vec![
            Instrumentation::InstructionPointer { value },
            pointer("ip", value),
        ],
        Notification::DataPointer(value) => {
            vec![Instrumentation::DataPointer { value }, pointer("data", value)]
        }
        Notification::Cell { index, value } => vec![Instrumentation::Data { index, value }],
        Notification::Memory(values) => vec![Instrumentation::AllData { values }],
        _ => Vec::new(),
    }
}

/// Stack plus line counter.
pub fn length_updates(notification: Notification) -> Vec<Instrumentation> {
    match notification {
        Notification::Line(line) => vec![pointer("ip", line)],
        other => stack_update(other).into_iter().collect(),
    }
}

/// Stack plus a two-dimensional pointer.
pub fn befunge_updates(notification: Notification) -> Vec<Instrumentation> {
    match notification {
        Notification::Position { key, value } => vec![pointer(key, value)],
        other => stack_update(other).into_iter().collect(),
    }
}

/// Two named stacks plus a symbol table.
pub fn element_updates(notification: Notification) -> Vec<Instrumentation> {
    match notification {
        Notification::Position { key, value } => vec![pointer(key, value)],
        Notification::Variable { symbol, value } => {
            let action = if value == JsonValue::Null {
                ObjectAction::Delete
            } else {
                ObjectAction::Set
            };
            vec![Instrumentation::Object {
                name: "vars".to_string(),
                key: symbol,
                action,
                value,
            }]
        }
        other => stack_update(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn test_builtin_languages() {
        let registry = Registry::builtin();
        let langs: Vec<_> = registry.languages().collect();
        assert_eq!(langs, vec!["befunge", "brainfuck", "element", "length"]);

        for lang in langs {
            let handle = registry.create(lang, &LangOptions::default()).unwrap();
            assert_eq!(handle.lang(), lang);
            assert!(handle.capabilities().supports_input);
            assert!(handle.capabilities().supports_step);
            assert!(!handle.visualize());
        }
    }

    #[test]
    fn test_unsupported_language() {
        let registry = Registry::builtin();
        let err = registry
            .create("cow", &LangOptions::default())
            .err()
            .expect("cow is not registered");
        assert!(matches!(err, HostError::UnsupportedLanguage(ref lang) if lang == "cow"));
    }

    #[test]
    fn test_invalid_options() {
        let registry = Registry::builtin();
        let options = LangOptions::from(hashmap! {
            "numType".to_string() => json!("decimal"),
        });
        let err = registry.create("brainfuck", &options).err().unwrap();
        assert!(matches!(err, HostError::InvalidOptions { .. }));
    }

    #[test]
    fn test_capability_sets() {
        let registry = Registry::builtin();
        let caps = |lang| {
            registry
                .create(lang, &LangOptions::default())
                .unwrap()
                .capabilities()
        };
        assert!(caps("brainfuck").supports_minify);
        assert!(caps("brainfuck").supports_text_to_code);
        assert!(caps("length").supports_text_to_code);
        assert!(!caps("length").supports_minify);
        assert!(!caps("befunge").supports_minify);
        assert!(!caps("element").supports_text_to_code);
    }

    #[test]
    fn test_created_event_memory_only_when_visualizing() {
        let registry = Registry::builtin();
        let options = LangOptions::from(hashmap! {
            "updateVisuals".to_string() => json!(true),
            "reelLength".to_string() => json!(4),
        });

        let handle = registry.create("brainfuck", &options).unwrap();
        assert_eq!(
            handle.created_event(),
            Event::Created {
                lang: "brainfuck".to_string(),
                visualize: true,
                initial_memory: Some(vec![0; 4]),
            }
        );

        let handle = registry.create("length", &options).unwrap();
        assert_eq!(
            handle.created_event(),
            Event::Created {
                lang: "length".to_string(),
                visualize: true,
                initial_memory: None,
            }
        );

        let handle = registry
            .create("brainfuck", &LangOptions::default())
            .unwrap();
        assert!(matches!(
            handle.created_event(),
            Event::Created {
                initial_memory: None,
                ..
            }
        ));
    }

    #[test]
    fn test_instrumentation_wiring() {
        let registry = Registry::builtin();
        let options = LangOptions::new().with("updateVisuals", true);
        let mut handle = registry.create("brainfuck", &options).unwrap();
        let mut outbox = Outbox::new();

        handle.with_io(&mut outbox, |interp, io| {
            interp.set_code(">").unwrap();
            interp.step(io).unwrap();
        });

        let updates: Vec<_> = outbox
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                Event::InstrumentationUpdate { update } => Some(update),
                _ => None,
            })
            .collect();
        assert!(updates.contains(&Instrumentation::DataPointer { value: 1 }));
        assert!(updates.contains(&pointer("data", 1)));
    }

    #[test]
    fn test_translators_are_variant_specific() {
        assert_eq!(
            brainfuck_updates(Notification::InstructionPointer(3)),
            vec![
                Instrumentation::InstructionPointer { value: 3 },
                pointer("ip", 3)
            ]
        );
        assert_eq!(length_updates(Notification::Line(7)), vec![pointer("ip", 7)]);
        assert!(brainfuck_updates(Notification::Line(7)).is_empty());
        assert_eq!(
            element_updates(Notification::Variable {
                symbol: "x".to_string(),
                value: JsonValue::Null,
            }),
            vec![Instrumentation::Object {
                name: "vars".to_string(),
                key: "x".to_string(),
                action: ObjectAction::Delete,
                value: JsonValue::Null,
            }]
        );
        assert_eq!(
            befunge_updates(Notification::Push {
                stack: None,
                value: json!(1),
            }),
            vec![Instrumentation::Stack {
                stack: None,
                action: StackAction::Push,
                value: Some(json!(1)),
            }]
        );
    }
}
