//! Call-recording state machine behind every generated double.
//!
//! [`CallRecorder`] is the Rust model of the bundled PHP `MockTools` trait:
//! each method name owns a call counter, a table of scripted
//! [`MockDefinition`]s and a log of the arguments and callers seen so far.
//! In ordered mode a call is filed under its call number; in named mode
//! under a SHA-256 digest of its arguments, after omitted trailing arguments
//! are filled with their declared defaults.

mod definition;
pub mod support;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

pub use definition::MockDefinition;

/// Where a call or a definition is filed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotKey {
    Position(usize),
    Digest(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub key: SlotKey,
    pub params: Vec<Value>,
    pub caller: Option<Value>,
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("{method} raised {exception}")]
    Raised { exception: String, method: String },

    #[error("Failed to emit scripted output: {0}")]
    Output(#[from] io::Error),

    #[error("Failed to digest call arguments: {0}")]
    Digest(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct MethodState {
    counter: usize,
    named: bool,
    definitions: HashMap<SlotKey, MockDefinition>,
    default: Option<MockDefinition>,
    calls: BTreeMap<SlotKey, RecordedCall>,
}

/// Records calls to instrumented methods and replays scripted behaviour
pub struct CallRecorder<W: Write = io::Stdout> {
    methods: HashMap<String, MethodState>,
    declared_defaults: HashMap<String, Vec<Value>>,
    auto_registered: HashSet<String>,
    output: W,
}

impl CallRecorder<io::Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for CallRecorder<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> CallRecorder<W> {
    /// Recorder whose scripted output goes to `output`
    pub fn with_output(output: W) -> Self {
        Self {
            methods: HashMap::new(),
            declared_defaults: HashMap::new(),
            auto_registered: HashSet::new(),
            output,
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Default values of `method`'s parameters, in declaration order
    ///
    /// `Value::Null` stands for a parameter without a default.
    pub fn declare_defaults(&mut self, method: &str, defaults: Vec<Value>) {
        self.declared_defaults.insert(method.to_string(), defaults);
    }

    /// Clear the call log of `method` and script its next calls
    pub fn reset(
        &mut self,
        method: &str,
        definitions: Vec<MockDefinition>,
        default: Option<MockDefinition>,
        named: bool,
    ) -> Result<(), CallError> {
        let mut indexed = HashMap::with_capacity(definitions.len());
        for (position, mut definition) in definitions.into_iter().enumerate() {
            let key = if named {
                self.digest_key(method, definition.params())?
            } else {
                SlotKey::Position(position)
            };
            definition.set_index(key.clone());
            indexed.insert(key, definition);
        }

        self.methods.insert(
            method.to_string(),
            MethodState {
                counter: 0,
                named,
                definitions: indexed,
                default,
                calls: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Record one call and play back its scripted behaviour
    ///
    /// Output is written first, then a scripted exception is raised as
    /// [`CallError::Raised`]; otherwise the scripted result is returned.
    /// `Ok(None)` means the call produces no value.
    pub fn execute_mocked(
        &mut self,
        method: &str,
        params: Vec<Value>,
        caller: Option<Value>,
    ) -> Result<Option<Value>, CallError> {
        if !self.methods.contains_key(method) {
            debug!("Auto-registering {}", method);
            self.auto_registered.insert(method.to_string());
            self.reset(method, Vec::new(), None, false)?;
        }

        let named = self.methods.get(method).map_or(false, |state| state.named);
        let digest = if named {
            Some(self.digest_key(method, &params)?)
        } else {
            None
        };

        let Some(state) = self.methods.get_mut(method) else {
            return Ok(None);
        };
        let key = digest.unwrap_or(SlotKey::Position(state.counter));
        state.counter += 1;
        state.calls.insert(
            key.clone(),
            RecordedCall {
                key: key.clone(),
                params,
                caller,
            },
        );

        let Some(definition) = state.definitions.get(&key).or(state.default.as_ref()) else {
            return Ok(None);
        };

        if let Some(output) = definition.output() {
            self.output.write_all(output.as_bytes())?;
        }
        if let Some(exception) = definition.exception() {
            return Err(CallError::Raised {
                exception: exception.to_string(),
                method: method.to_string(),
            });
        }
        Ok(definition.result().cloned())
    }

    /// Arguments of the call filed under `key`
    pub fn mocked_params(&self, method: &str, key: &SlotKey) -> Option<&[Value]> {
        self.methods
            .get(method)
            .and_then(|state| state.calls.get(key))
            .map(|call| call.params.as_slice())
    }

    pub fn mocked_params_all(&self, method: &str) -> Vec<&RecordedCall> {
        self.methods
            .get(method)
            .map(|state| state.calls.values().collect())
            .unwrap_or_default()
    }

    pub fn mocked_counter(&self, method: &str) -> usize {
        self.methods.get(method).map_or(0, |state| state.counter)
    }

    /// Instance the call filed under `key` was made on
    pub fn mocked_caller_instance(&self, method: &str, key: &SlotKey) -> Option<&Value> {
        self.methods
            .get(method)
            .and_then(|state| state.calls.get(key))
            .and_then(|call| call.caller.as_ref())
    }

    /// Whether `method` was first seen through a call rather than a reset
    pub fn is_auto_registered(&self, method: &str) -> bool {
        self.auto_registered.contains(method)
    }

    /// Named-mode slot of a call to `method` with `params`
    pub fn digest_key(&self, method: &str, params: &[Value]) -> Result<SlotKey, CallError> {
        let mut filled = params.to_vec();
        if let Some(defaults) = self.declared_defaults.get(method) {
            if let Some(missing) = defaults.get(filled.len()..) {
                filled.extend(missing.iter().cloned());
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&filled)?);
        Ok(SlotKey::Digest(format!("{:x}", hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> CallRecorder<Vec<u8>> {
        CallRecorder::with_output(Vec::new())
    }

    #[test]
    fn test_ordered_mode_without_definitions() {
        let mut recorder = recorder();
        for value in ["a", "b", "c"] {
            let result = recorder.execute_mocked("send", vec![json!(value)], None).unwrap();
            assert_eq!(result, None);
        }

        assert_eq!(recorder.mocked_counter("send"), 3);
        assert_eq!(
            recorder.mocked_params("send", &SlotKey::Position(1)),
            Some(&[json!("b")][..])
        );
        assert_eq!(recorder.mocked_params_all("send").len(), 3);
        assert!(recorder.is_auto_registered("send"));
        assert_eq!(recorder.mocked_counter("other"), 0);
    }

    #[test]
    fn test_ordered_mode_replays_by_position() {
        let mut recorder = recorder();
        recorder
            .reset(
                "next",
                vec![
                    MockDefinition::new().returning(json!(1)),
                    MockDefinition::new().returning(json!(2)),
                ],
                Some(MockDefinition::new().returning(json!(0))),
                false,
            )
            .unwrap();

        let results: Vec<_> = (0..3)
            .map(|_| recorder.execute_mocked("next", vec![], Some(json!({"id": 7}))).unwrap())
            .collect();
        assert_eq!(results, vec![Some(json!(1)), Some(json!(2)), Some(json!(0))]);
        assert_eq!(
            recorder.mocked_caller_instance("next", &SlotKey::Position(2)),
            Some(&json!({"id": 7}))
        );
        assert!(!recorder.is_auto_registered("next"));
    }

    #[test]
    fn test_named_mode_matches_on_arguments() {
        let mut recorder = recorder();
        recorder.declare_defaults("find", vec![Value::Null, json!(false)]);
        recorder
            .reset(
                "find",
                vec![MockDefinition::new()
                    .with_params(vec![json!(5), json!(false)])
                    .returning(json!("five"))],
                None,
                true,
            )
            .unwrap();

        // the omitted second argument is filled with its default
        let first = recorder.execute_mocked("find", vec![json!(5)], None).unwrap();
        let second = recorder.execute_mocked("find", vec![json!(5), json!(false)], None).unwrap();
        let other = recorder.execute_mocked("find", vec![json!(6)], None).unwrap();

        assert_eq!(first, Some(json!("five")));
        assert_eq!(second, Some(json!("five")));
        assert_eq!(other, None);
        assert_eq!(recorder.mocked_counter("find"), 3);
        // both matching calls share one slot
        assert_eq!(recorder.mocked_params_all("find").len(), 2);

        let key = recorder.digest_key("find", &[json!(5)]).unwrap();
        assert_eq!(recorder.mocked_params("find", &key), Some(&[json!(5), json!(false)][..]));
    }

    #[test]
    fn test_digest_is_type_sensitive() {
        let recorder = recorder();
        let int = recorder.digest_key("m", &[json!(1)]).unwrap();
        let string = recorder.digest_key("m", &[json!("1")]).unwrap();
        let swapped = recorder.digest_key("m", &[json!(2), json!(1)]).unwrap();
        let ordered = recorder.digest_key("m", &[json!(1), json!(2)]).unwrap();
        assert_ne!(int, string);
        assert_ne!(swapped, ordered);
    }

    #[test]
    fn test_output_precedes_exception() {
        let mut recorder = recorder();
        recorder
            .reset(
                "save",
                vec![MockDefinition::new()
                    .with_params(vec![json!("x")])
                    .returning(json!(true))
                    .printing("saving x")
                    .throwing("RuntimeException")],
                None,
                true,
            )
            .unwrap();

        match recorder.execute_mocked("save", vec![json!("x")], None) {
            Err(CallError::Raised { exception, method }) => {
                assert_eq!(exception, "RuntimeException");
                assert_eq!(method, "save");
            }
            other => panic!("expected a raised exception, got {:?}", other),
        }
        assert_eq!(recorder.mocked_counter("save"), 1);
        assert_eq!(String::from_utf8(recorder.into_output()).unwrap(), "saving x");
    }

    #[test]
    fn test_reset_clears_log_and_indexes_definitions() {
        let mut recorder = recorder();
        recorder.execute_mocked("ping", vec![json!(1)], None).unwrap();
        recorder
            .reset("ping", vec![MockDefinition::new().returning(json!("pong"))], None, false)
            .unwrap();

        assert_eq!(recorder.mocked_counter("ping"), 0);
        assert!(recorder.mocked_params_all("ping").is_empty());
        assert_eq!(recorder.execute_mocked("ping", vec![], None).unwrap(), Some(json!("pong")));
    }
}
