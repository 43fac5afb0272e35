//! Option merging between the global ("meta") and project-local option sets.
//!
//! Local values always win over global ones for the same key. List-valued
//! options are merged as sets (global entries survive, local entries are
//! added, nothing is duplicated); mapping-valued options are merged per key.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// An option set: option name to JSON value.
pub type OptionSet = Map<String, Value>;

/// Option holding the generator flags mapping.
pub const GENERATOR_OPTIONS_KEY: &str = "autorest_options";
/// Globs (relative to the destination tree) of hand-written files to preserve.
pub const WRAPPER_KEY: &str = "wrapper_filesOrDirs";
/// Globs (relative to the generated root) of generated entries to discard.
pub const DELETE_KEY: &str = "delete_filesOrDirs";
/// Glob selecting the real generated root inside the generator output.
pub const BASE_DIRECTORY_KEY: &str = "generated_relative_base_directory";
/// Meta option overriding the namespace of the default `CodeGenerator` flag.
pub const NAMESPACE_KEY: &str = "generator_namespace";
pub const DEFAULT_NAMESPACE: &str = "Azure";

const CODE_GENERATOR_FLAG: &str = "CodeGenerator";

/// Merge `key` from both option sets, local taking precedence.
///
/// Returns `None` only when neither side carries the key.
pub fn merge_options(global: &OptionSet, local: &OptionSet, key: &str) -> Option<Value> {
    let global_value = global.get(key).filter(|v| !v.is_null());
    let local_value = local.get(key).filter(|v| !v.is_null());

    match (global_value, local_value) {
        (None, None) => None,
        (Some(value), None) | (None, Some(value)) => Some(value.clone()),
        (Some(global_value), Some(local_value)) => Some(merge_values(global_value, local_value)),
    }
}

fn merge_values(global: &Value, local: &Value) -> Value {
    match (global, local) {
        (Value::Array(global_items), Value::Array(local_items)) => {
            let mut merged: Vec<Value> = Vec::with_capacity(global_items.len() + local_items.len());
            for item in global_items.iter().chain(local_items) {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Value::Array(merged)
        }
        // A mapping folded into a list set contributes its keys.
        (Value::Array(global_items), Value::Object(local_map)) => {
            let mut merged = global_items.clone();
            for key in local_map.keys() {
                let item = Value::String(key.clone());
                if !merged.contains(&item) {
                    merged.push(item);
                }
            }
            Value::Array(merged)
        }
        (Value::Object(global_map), Value::Object(local_map)) => {
            let mut merged = global_map.clone();
            for (key, value) in local_map {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (_, local) => local.clone(),
    }
}

/// Merge a list-valued option into plain strings, skipping non-string entries.
pub fn merge_string_list(global: &OptionSet, local: &OptionSet, key: &str) -> Vec<String> {
    match merge_options(global, local, key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                other => {
                    tracing::warn!(key, entry = %other, "Ignoring non-string entry in list option");
                    None
                }
            })
            .collect(),
        Some(Value::String(single)) => vec![single],
        Some(other) => {
            tracing::warn!(key, value = %other, "Expected a list option, ignoring it");
            Vec::new()
        }
        None => Vec::new(),
    }
}

/// Plain local-over-global lookup of a string option, without merging.
pub fn local_or_global_str<'a>(global: &'a OptionSet, local: &'a OptionSet, key: &str) -> Option<&'a str> {
    local
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| global.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

/// Generator command-line flags, held sorted by flag name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratorOptions {
    flags: BTreeMap<String, String>,
}

impl GeneratorOptions {
    pub fn get(&self, flag: &str) -> Option<&str> {
        self.flags.get(flag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flags as process arguments: `-Key`, `value`, ... in sorted key order.
    pub fn to_args(&self) -> Vec<String> {
        self.flags
            .iter()
            .flat_map(|(key, value)| [format!("-{key}"), value.clone()])
            .collect()
    }

    /// Flags rendered as a single command-line fragment, `-Key value -Key2 value2`.
    pub fn render(&self) -> String {
        self.flags
            .iter()
            .map(|(key, value)| format!("-{key} {value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for GeneratorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Build the generator flags for one project.
///
/// The `autorest_options` mappings are merged and `CodeGenerator` defaults to
/// `<namespace>.<language>` when neither side sets it.
pub fn build_generator_options(language: &str, global: &OptionSet, local: &OptionSet) -> GeneratorOptions {
    let mut flags = BTreeMap::new();
    match merge_options(global, local, GENERATOR_OPTIONS_KEY) {
        Some(Value::Object(merged)) => {
            for (key, value) in merged {
                flags.insert(key, render_scalar(&value));
            }
        }
        Some(other) => {
            tracing::warn!(value = %other, "'{}' must be a mapping, ignoring it", GENERATOR_OPTIONS_KEY);
        }
        None => {}
    }

    if !flags.contains_key(CODE_GENERATOR_FLAG) {
        let namespace = global
            .get(NAMESPACE_KEY)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_NAMESPACE);
        flags.insert(CODE_GENERATOR_FLAG.to_string(), format!("{namespace}.{language}"));
    }

    GeneratorOptions { flags }
}

/// Booleans are spelled `True`/`False`, the form existing configurations
/// were written against.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
