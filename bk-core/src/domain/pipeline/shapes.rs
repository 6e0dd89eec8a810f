//! Lax field shapes
//!
//! Uploaded pipelines are written by hand, so several fields accept more than
//! one shape. Each type here tries the shapes it knows in turn and commits to
//! the first one that matches the token it is handed.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::Plugin;

/// A string, number or boolean in its textual form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar(pub String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(ScalarVisitor).map(Scalar)
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }
}

/// A single scalar or a sequence of scalars
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList(pub Vec<String>);

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(StringListVisitor).map(StringList)
    }
}

struct StringListVisitor;

impl<'de> Visitor<'de> for StringListVisitor {
    type Value = Vec<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or a sequence of strings")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Vec<String>, E> {
        Ok(Vec::new())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<String>, E> {
        Ok(vec![v.to_string()])
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Vec<String>, E> {
        Ok(vec![v.to_string()])
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Vec<String>, E> {
        Ok(vec![v.to_string()])
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Vec<String>, E> {
        Ok(vec![v.to_string()])
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Vec<String>, E> {
        Ok(vec![v.to_string()])
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<String>, A::Error> {
        let mut items = Vec::new();
        while let Some(Scalar(item)) = seq.next_element::<Scalar>()? {
            items.push(item);
        }
        Ok(items)
    }
}

/// Plugins as `{name: params}` or as a sequence of names and single-key maps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginList(pub Vec<Plugin>);

impl<'de> Deserialize<'de> for PluginList {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(PluginListVisitor).map(PluginList)
    }
}

struct PluginListVisitor;

impl<'de> Visitor<'de> for PluginListVisitor {
    type Value = Vec<Plugin>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of plugins or a sequence of plugins")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Vec<Plugin>, E> {
        Ok(Vec::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Vec<Plugin>, A::Error> {
        let mut plugins = Vec::new();
        while let Some((name, PluginParams(params))) = map.next_entry::<String, PluginParams>()? {
            plugins.push(Plugin { name, params });
        }
        Ok(plugins)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<Plugin>, A::Error> {
        let mut plugins = Vec::new();
        while let Some(PluginEntry(plugin)) = seq.next_element::<PluginEntry>()? {
            plugins.push(plugin);
        }
        Ok(plugins)
    }
}

/// One element of a plugin sequence: `name` or `{name: params}`
struct PluginEntry(Plugin);

impl<'de> Deserialize<'de> for PluginEntry {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(PluginEntryVisitor).map(PluginEntry)
    }
}

struct PluginEntryVisitor;

impl<'de> Visitor<'de> for PluginEntryVisitor {
    type Value = Plugin;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a plugin name or a single-key mapping of name to parameters")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Plugin, E> {
        Ok(Plugin::new(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Plugin, A::Error> {
        let Some((name, PluginParams(params))) = map.next_entry::<String, PluginParams>()? else {
            return Err(de::Error::custom("plugin mapping is empty"));
        };
        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "plugin `{}` must be a single-key mapping, found extra key `{}`",
                name, extra
            )));
        }
        Ok(Plugin { name, params })
    }
}

/// Plugin parameters: a mapping, or null for none
struct PluginParams(Map<String, Value>);

impl<'de> Deserialize<'de> for PluginParams {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(PluginParamsVisitor).map(PluginParams)
    }
}

struct PluginParamsVisitor;

impl<'de> Visitor<'de> for PluginParamsVisitor {
    type Value = Map<String, Value>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of plugin parameters")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Map::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut params = Map::new();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            params.insert(key, value);
        }
        Ok(params)
    }
}

/// Step environment as a mapping or a sequence of `KEY=VALUE` strings
///
/// Normalizes to `KEY=VALUE` strings; a mapping is sorted by key, a sequence
/// keeps its order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvList(pub Vec<String>);

impl<'de> Deserialize<'de> for EnvList {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let pairs = d.deserialize_any(EnvVisitor)?;
        Ok(EnvList(
            pairs
                .into_iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect(),
        ))
    }
}

/// Pipeline environment as a mapping or a sequence of `KEY=VALUE` strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap(pub BTreeMap<String, String>);

impl<'de> Deserialize<'de> for EnvMap {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let pairs = d.deserialize_any(EnvVisitor)?;
        Ok(EnvMap(pairs.into_iter().collect()))
    }
}

struct EnvVisitor;

impl<'de> Visitor<'de> for EnvVisitor {
    type Value = Vec<(String, String)>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of variables or a sequence of KEY=VALUE strings")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut pairs = Vec::new();
        while let Some((key, Scalar(value))) = map.next_entry::<String, Scalar>()? {
            pairs.push((key, value));
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut pairs = Vec::new();
        while let Some(Scalar(entry)) = seq.next_element::<Scalar>()? {
            let Some((key, value)) = entry.split_once('=') else {
                return Err(de::Error::custom(format!(
                    "expected KEY=VALUE, found `{}`",
                    entry
                )));
            };
            if key.is_empty() {
                return Err(de::Error::custom(format!(
                    "variable name is empty in `{}`",
                    entry
                )));
            }
            pairs.push((key.to_string(), value.to_string()));
        }
        Ok(pairs)
    }
}
