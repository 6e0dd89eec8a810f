//! Document walker
//!
//! Decodes YAML or JSON into a value tree, then walks it step by step so that
//! every error names the field it came from (`steps[2].plugins`).

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::shapes::{EnvList, EnvMap, PluginList, Scalar, StringList};
use super::{
    BlockStep, CommandStep, PipelineDocument, PipelineUpload, Step, TriggerStep, WaitStep,
};

/// Keys that select a non-command step type
const STEP_TYPE_KEYS: [&str; 4] = ["wait", "waiter", "block", "trigger"];

/// A pipeline that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct ParseError {
    /// Location of the offending field, e.g. `steps[0].env`
    pub path: String,
    pub reason: String,
}

impl ParseError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() {
                "(root)".to_string()
            } else {
                path.to_string()
            },
            reason: reason.into(),
        }
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Decodes JSON, falling back to YAML
pub(super) fn decode(bytes: &[u8]) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Ok(value);
    }
    serde_yaml::from_slice::<Value>(bytes).map_err(|e| ParseError::new("", e.to_string()))
}

pub(super) fn upload_from_slice(bytes: &[u8]) -> Result<PipelineUpload, ParseError> {
    let body: Value = serde_json::from_slice(bytes)
        .map_err(|e| ParseError::new("", format!("malformed JSON: {}", e)))?;
    let Value::Object(body) = body else {
        return Err(ParseError::new("", "expected a JSON object"));
    };

    let pipeline = match body.get("pipeline") {
        None | Some(Value::Null) => return Err(ParseError::new("pipeline", "missing field")),
        Some(Value::String(source)) => {
            let value = decode(source.as_bytes())
                .map_err(|e| ParseError::new("pipeline", e.reason))?;
            document_from_value(&value, "pipeline")?
        }
        Some(value) => document_from_value(value, "pipeline")?,
    };
    let replace = flag(&body, "replace", "")?;

    Ok(PipelineUpload { pipeline, replace })
}

pub(super) fn document_from_value(
    value: &Value,
    path: &str,
) -> Result<PipelineDocument, ParseError> {
    match value {
        Value::Array(steps) => Ok(PipelineDocument {
            env: Default::default(),
            steps: steps_from_values(steps, path)?,
        }),
        Value::Object(map) => {
            let env = field::<EnvMap>(map, "env", path)?.unwrap_or_default().0;
            let steps_path = join(path, "steps");
            let steps = match map.get("steps") {
                None => return Err(ParseError::new(&steps_path, "missing field")),
                Some(Value::Null) => Vec::new(),
                Some(Value::Array(steps)) => steps_from_values(steps, path)?,
                Some(_) => {
                    return Err(ParseError::new(&steps_path, "expected a sequence of steps"));
                }
            };
            Ok(PipelineDocument { env, steps })
        }
        _ => Err(ParseError::new(
            path,
            "expected a mapping with `steps` or a sequence of steps",
        )),
    }
}

fn steps_from_values(values: &[Value], path: &str) -> Result<Vec<Step>, ParseError> {
    let steps_path = join(path, "steps");
    values
        .iter()
        .enumerate()
        .map(|(i, value)| step_from_value(value, &format!("{}[{}]", steps_path, i)))
        .collect()
}

fn step_from_value(value: &Value, path: &str) -> Result<Step, ParseError> {
    let map = match value {
        Value::String(s) if s == "wait" || s == "waiter" => {
            return Ok(Step::Wait(WaitStep::default()));
        }
        Value::String(s) => {
            return Err(ParseError::new(path, format!("unknown step `{}`", s)));
        }
        Value::Object(map) => map,
        _ => return Err(ParseError::new(path, "expected a mapping")),
    };

    let kinds: Vec<&str> = STEP_TYPE_KEYS
        .iter()
        .copied()
        .filter(|key| map.contains_key(*key))
        .collect();

    match kinds.as_slice() {
        [] => command_step(map, path).map(Step::Command),
        ["wait"] | ["waiter"] => Ok(Step::Wait(WaitStep {
            continue_on_failure: flag(map, "continue_on_failure", path)?,
        })),
        ["block"] => {
            let label = match scalar(map, "block", path)? {
                Some(label) => label,
                None => scalar(map, "label", path)?.unwrap_or_default(),
            };
            Ok(Step::Block(BlockStep {
                label,
                prompt: scalar(map, "prompt", path)?,
                key: scalar(map, "key", path)?,
            }))
        }
        ["trigger"] => {
            let pipeline = scalar(map, "trigger", path)?.ok_or_else(|| {
                ParseError::new(&join(path, "trigger"), "expected a pipeline slug")
            })?;
            Ok(Step::Trigger(TriggerStep {
                pipeline,
                label: scalar(map, "label", path)?,
                is_async: flag(map, "async", path)?,
            }))
        }
        several => Err(ParseError::new(
            path,
            format!("step has more than one type: {}", several.join(", ")),
        )),
    }
}

fn command_step(map: &Map<String, Value>, path: &str) -> Result<CommandStep, ParseError> {
    let mut commands = field::<StringList>(map, "command", path)?
        .unwrap_or_default()
        .0;
    commands.extend(
        field::<StringList>(map, "commands", path)?
            .unwrap_or_default()
            .0,
    );
    let plugins = field::<PluginList>(map, "plugins", path)?
        .unwrap_or_default()
        .0;

    let has_command_key = map.contains_key("command") || map.contains_key("commands");
    if commands.is_empty() && plugins.is_empty() && !has_command_key {
        return Err(ParseError::new(
            path,
            "step has no command, plugins or recognised type",
        ));
    }

    let label = match scalar(map, "label", path)? {
        Some(label) => Some(label),
        None => scalar(map, "name", path)?,
    };

    let timeout_in_minutes = match scalar(map, "timeout_in_minutes", path)? {
        None => None,
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            ParseError::new(
                &join(path, "timeout_in_minutes"),
                format!("expected a whole number of minutes, found `{}`", raw),
            )
        })?),
    };

    Ok(CommandStep {
        label,
        key: scalar(map, "key", path)?,
        commands,
        plugins,
        env: field::<EnvList>(map, "env", path)?.unwrap_or_default().0,
        artifact_paths: field::<StringList>(map, "artifact_paths", path)?
            .unwrap_or_default()
            .0,
        timeout_in_minutes,
    })
}

/// Deserializes `map[key]` with one of the lax shapes; null counts as absent
fn field<'a, T: Deserialize<'a>>(
    map: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<T>, ParseError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| ParseError::new(&join(path, key), e.to_string())),
    }
}

fn scalar(map: &Map<String, Value>, key: &str, path: &str) -> Result<Option<String>, ParseError> {
    Ok(field::<Scalar>(map, key, path)?.map(|Scalar(value)| value))
}

fn flag(map: &Map<String, Value>, key: &str, path: &str) -> Result<bool, ParseError> {
    match scalar(map, key, path)?.as_deref() {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(ParseError::new(
            &join(path, key),
            format!("expected true or false, found `{}`", other),
        )),
    }
}
