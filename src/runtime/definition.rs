use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SlotKey;

/// Scripted response of one recorded call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockDefinition {
    params: Vec<Value>,
    result: Option<Value>,
    exception: Option<String>,
    output: Option<String>,
    #[serde(skip)]
    index: Option<SlotKey>,
}

impl MockDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments a call must carry to hit this definition in named mode
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn returning(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Raise `exception` (a class name) instead of returning
    pub fn throwing(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Emit `output` before returning or raising
    pub fn printing(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref().filter(|e| !e.is_empty())
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref().filter(|o| !o.is_empty())
    }

    /// Slot the definition was filed under by the last reset
    pub fn index(&self) -> Option<&SlotKey> {
        self.index.as_ref()
    }

    pub(super) fn set_index(&mut self, index: SlotKey) {
        self.index = Some(index);
    }
}
