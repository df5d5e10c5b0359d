//! Config assembly.
//!
//! Entity and action property bags arrive as arbitrary JSON. They are
//! converted into `PropertyValue` trees and then merged, together with the
//! invocation context, into a flat `ConfigSet` of string values that the
//! provisioning engine can store as stack configuration.

use serde::Serialize;
use std::collections::BTreeMap;

/// The config key that is additionally broadcast to every regional provider
/// namespace (`aws:region`, `civo:region`, ...).
pub const REGION_KEY: &str = "region";

pub const ENTITY_IDENTIFIER_KEY: &str = "entity_identifier";
pub const BLUEPRINT_KEY: &str = "blueprint";
pub const RUN_ID_KEY: &str = "run_id";

// ---------------------------------------------------------------------------
// PropertyValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Scalar(String),
    Map(BTreeMap<String, PropertyValue>),
}

pub type PropertyBag = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// Render the value as a single config string.
    ///
    /// Maps become `key=value` pairs joined by `,` in key order. A map nested
    /// inside a map contributes dotted keys (`outer.inner=value`).
    ///
    /// Separators are not escaped: a key or value that itself contains `,` or
    /// `=` makes the result ambiguous to split. Programs needing such values
    /// should take them as a scalar (for example JSON text) instead.
    pub fn flatten(&self) -> String {
        match self {
            PropertyValue::Scalar(s) => s.clone(),
            PropertyValue::Map(entries) => {
                let mut pairs = Vec::new();
                flatten_into(&mut pairs, "", entries);
                pairs.join(",")
            }
        }
    }
}

fn flatten_into(pairs: &mut Vec<String>, prefix: &str, entries: &BTreeMap<String, PropertyValue>) {
    for (key, value) in entries {
        match value {
            PropertyValue::Scalar(s) => pairs.push(format!("{prefix}{key}={s}")),
            PropertyValue::Map(inner) => flatten_into(pairs, &format!("{prefix}{key}."), inner),
        }
    }
}

impl From<&serde_json::Value> for PropertyValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(s) => PropertyValue::Scalar(s.clone()),
            Value::Null => PropertyValue::Scalar(String::new()),
            Value::Bool(_) | Value::Number(_) | Value::Array(_) => {
                PropertyValue::Scalar(value.to_string())
            }
            Value::Object(map) => PropertyValue::Map(bag_from_json(map)),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(value.to_string())
    }
}

pub fn bag_from_json(map: &serde_json::Map<String, serde_json::Value>) -> PropertyBag {
    map.iter()
        .map(|(k, v)| (k.clone(), PropertyValue::from(v)))
        .collect()
}

// ---------------------------------------------------------------------------
// ConfigSet
// ---------------------------------------------------------------------------

/// Flat stack configuration, ordered by key so that two assemblies of the
/// same inputs are identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSet(BTreeMap<String, String>);

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of `key`, or `None` when absent or empty.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn region(&self) -> Option<&str> {
        self.non_empty(REGION_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// assemble
// ---------------------------------------------------------------------------

/// Values injected after all property bags.
#[derive(Debug, Clone)]
pub struct AssemblyContext {
    pub entity_key: String,
    pub blueprint: String,
    pub run_id: String,
}

/// Merge property bags into a `ConfigSet`. Later sources win on collision:
/// entity properties, then action properties (omitted for teardown), then the
/// context keys.
pub fn assemble(
    entity_properties: &PropertyBag,
    action_properties: Option<&PropertyBag>,
    ctx: &AssemblyContext,
) -> ConfigSet {
    let mut config = ConfigSet::new();
    let bags = std::iter::once(entity_properties).chain(action_properties);
    for bag in bags {
        for (key, value) in bag {
            config.insert(key.clone(), value.flatten());
        }
    }
    config.insert(ENTITY_IDENTIFIER_KEY, ctx.entity_key.clone());
    config.insert(BLUEPRINT_KEY, ctx.blueprint.clone());
    config.insert(RUN_ID_KEY, ctx.run_id.clone());
    config
}
