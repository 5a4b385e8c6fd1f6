//! Built-in provisioner kinds.
//!
//! - `shell`: run an inline script or a script file inside the guest
//! - `file`: upload a file or directory into the guest

mod file;
mod shell;

pub use file::FileConfig;
pub use shell::ShellConfig;

use serde_json::Value;
use std::collections::BTreeMap;

use crate::registry::KindRegistry;

impl KindRegistry {
    /// Registry with the built-in `shell` and `file` kinds.
    pub fn builtin() -> Self {
        Self::builder()
            .provisioner::<ShellConfig>("shell")
            .provisioner::<FileConfig>("file")
            .build()
    }
}

// Option value coercion shared by the built-in payloads. Errors are plain
// messages; payloads collect them and report them from `validate`.

fn string_value(key: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("`{}` must be a string, got {}", key, other)),
    }
}

fn string_list_value(key: &str, value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items.iter().map(|item| string_value(key, item)).collect(),
        Value::Null => Ok(Vec::new()),
        other => string_value(key, other).map(|s| vec![s]),
    }
}

fn bool_value(key: &str, value: &Value) -> Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("`{}` must be a boolean, got {}", key, value))
}

fn string_map_value(key: &str, value: &Value) -> Result<BTreeMap<String, String>, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| string_value(&format!("{}.{}", key, k), v).map(|v| (k.clone(), v)))
            .collect(),
        other => Err(format!("`{}` must be a map, got {}", key, other)),
    }
}
