//! Pipeline document model
//!
//! Parses the pipeline documents produced by `buildkite-agent pipeline upload`
//! and normalizes their lax shapes into one canonical form:
//!
//! - `command` / `commands`: string or sequence, merged into one list
//! - `plugins`: mapping or sequence of names / single-key mappings
//! - `env`: mapping (sorted by key) or sequence of `KEY=VALUE` strings
//! - scalar values: booleans and numbers coerced to their textual form
//!
//! Both YAML and JSON documents are accepted. Serializing a document yields
//! its canonical JSON form, which parses back to an equal document.

mod parse;
mod shapes;

pub use parse::ParseError;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A parsed pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineDocument {
    /// Pipeline-wide environment, inherited by every step
    pub env: BTreeMap<String, String>,

    /// Steps in source order
    pub steps: Vec<Step>,
}

impl PipelineDocument {
    /// Parses a YAML or JSON pipeline document
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let value = parse::decode(bytes)?;
        parse::document_from_value(&value, "")
    }

    /// Builds a document from an already decoded value
    pub fn from_value(value: &Value) -> Result<Self, ParseError> {
        parse::document_from_value(value, "")
    }

    /// The canonical JSON form of this document
    pub fn normalize(&self) -> Value {
        // Every field serializes to plain JSON; this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Pipeline env as `KEY=VALUE` strings, sorted by key
    pub fn env_vars(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}

impl<'de> Deserialize<'de> for PipelineDocument {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(d)?;
        parse::document_from_value(&value, "").map_err(serde::de::Error::custom)
    }
}

/// A pipeline step
///
/// The variant is chosen by key presence: `wait`, `block` or `trigger`;
/// anything else is a command step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Command(CommandStep),
    Wait(WaitStep),
    Block(BlockStep),
    Trigger(TriggerStep),
}

impl Step {
    /// Short name of the step type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Command(_) => "command",
            Step::Wait(_) => "wait",
            Step::Block(_) => "block",
            Step::Trigger(_) => "trigger",
        }
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Step::Command(step) => step.serialize(s),
            Step::Wait(step) => {
                let mut map = s.serialize_map(Some(2))?;
                map.serialize_entry("wait", &Value::Null)?;
                map.serialize_entry("continue_on_failure", &step.continue_on_failure)?;
                map.end()
            }
            Step::Block(step) => {
                let mut map = s.serialize_map(None)?;
                map.serialize_entry("block", &step.label)?;
                if let Some(prompt) = &step.prompt {
                    map.serialize_entry("prompt", prompt)?;
                }
                if let Some(key) = &step.key {
                    map.serialize_entry("key", key)?;
                }
                map.end()
            }
            Step::Trigger(step) => {
                let mut map = s.serialize_map(None)?;
                map.serialize_entry("trigger", &step.pipeline)?;
                if let Some(label) = &step.label {
                    map.serialize_entry("label", label)?;
                }
                map.serialize_entry("async", &step.is_async)?;
                map.end()
            }
        }
    }
}

/// A step that runs commands on an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// `command` values followed by `commands` values
    pub commands: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,

    /// `KEY=VALUE` strings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifact_paths: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_in_minutes: Option<u64>,
}

impl CommandStep {
    /// Commands joined into one script
    pub fn script(&self) -> String {
        self.commands.join("\n")
    }

    /// The label, or the script when the step has none
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.script(),
        }
    }
}

/// A plugin reference with its parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plugin {
    pub name: String,
    pub params: Map<String, Value>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }
}

impl Serialize for Plugin {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.params)?;
        map.end()
    }
}

/// Waits for every preceding step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitStep {
    pub continue_on_failure: bool,
}

/// Pauses the build until someone unblocks it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStep {
    pub label: String,
    pub prompt: Option<String>,
    pub key: Option<String>,
}

/// Starts a build of another pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerStep {
    /// Slug of the pipeline to trigger
    pub pipeline: String,
    pub label: Option<String>,
    pub is_async: bool,
}

/// A pipeline sent to `/jobs/{id}/pipelines`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineUpload {
    pub pipeline: PipelineDocument,

    /// Discard pending steps before inserting these
    pub replace: bool,
}

impl PipelineUpload {
    /// Parses an upload request body
    ///
    /// The `pipeline` field may be a document or a string holding one.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        parse::upload_from_slice(bytes)
    }
}
