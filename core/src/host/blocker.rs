//! Blocking I/O bridge
//!
//! Holds at most one outstanding input request. A [`Blocker`] is consumed
//! when it resolves, so it cannot be answered twice.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{HostError, Result};
use crate::types::{Input, InputKind};

/// One suspended request for outside data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocker {
    pub id: Uuid,
    pub kind: InputKind,
}

impl Blocker {
    fn new(kind: InputKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }

    /// Convert a wire value to the typed input this request expects.
    pub fn convert(&self, value: &JsonValue) -> Result<Input> {
        match self.kind {
            InputKind::Byte => byte_input(value).map(Input::Byte),
            InputKind::Line => line_input(value).map(Input::Line),
        }
    }
}

fn byte_input(value: &JsonValue) -> Result<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| HostError::InvalidInput(format!("expected an integer byte, got {}", n))),
        // First character's code point; empty means end of input.
        JsonValue::String(s) => Ok(s.chars().next().map_or(0, |c| i64::from(u32::from(c)))),
        JsonValue::Null => Ok(0),
        other => Err(HostError::InvalidInput(format!(
            "expected a byte or character, got {}",
            other
        ))),
    }
}

fn line_input(value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        JsonValue::Null => Ok(String::new()),
        other => Err(HostError::InvalidInput(format!(
            "expected a line of text, got {}",
            other
        ))),
    }
}

#[derive(Debug, Default)]
pub struct BlockingBridge {
    active: Option<Blocker>,
}

impl BlockingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Blocker> {
        self.active.as_ref()
    }

    /// Open a new request. Only one may be outstanding.
    pub fn create(&mut self, kind: InputKind) -> Result<&Blocker> {
        if let Some(existing) = &self.active {
            return Err(HostError::Internal(format!(
                "input request {} opened while {} is still outstanding",
                kind_name(kind),
                existing.id
            )));
        }
        Ok(&*self.active.insert(Blocker::new(kind)))
    }

    /// Resolve the outstanding request with `value`.
    ///
    /// The value is validated first; on error the request stays outstanding.
    pub fn unblock(&mut self, value: &JsonValue) -> Result<(Blocker, Input)> {
        let blocker = self.active.as_ref().ok_or(HostError::NoActiveBlock)?;
        let input = blocker.convert(value)?;
        let blocker = self.active.take().ok_or(HostError::NoActiveBlock)?;
        Ok((blocker, input))
    }

    /// Drop the outstanding request without resolving it.
    pub fn abandon(&mut self) -> Option<Blocker> {
        self.active.take()
    }
}

pub(crate) fn kind_name(kind: InputKind) -> &'static str {
    match kind {
        InputKind::Byte => "byte",
        InputKind::Line => "line",
    }
}
