use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use super::{bool_value, string_list_value, string_map_value, string_value};
use crate::Result;
use crate::payload::{ConfigPayload, Options, merge_typed};

const DEFAULT_UPLOAD_PATH: &str = "/tmp/vmprov-shell";

/// Configuration for the `shell` provisioner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellConfig {
    /// Script body to run.
    pub inline: Option<String>,
    /// Path of a script file on the host.
    pub path: Option<String>,
    /// Arguments passed to the script.
    pub args: Option<Vec<String>>,
    /// Environment variables exported before the script runs.
    pub env: BTreeMap<String, String>,
    /// Run with elevated privileges. Defaults to true on finalize.
    pub privileged: Option<bool>,
    /// Where the script is uploaded in the guest.
    pub upload_path: Option<String>,
    unknown: BTreeSet<String>,
    /// Latest coercion outcome per option key; `Some` holds the error.
    problems: BTreeMap<String, Option<String>>,
}

impl ShellConfig {
    fn record<T>(&mut self, key: &str, result: std::result::Result<T, String>) -> Option<T> {
        let (value, problem) = match result {
            Ok(value) => (Some(value), None),
            Err(message) => (None, Some(message)),
        };
        self.problems.insert(key.to_string(), problem);
        value
    }
}

impl ConfigPayload for ShellConfig {
    fn set_options(&mut self, options: &Options) {
        for (key, value) in options {
            match key.as_str() {
                "inline" => self.inline = self.record("inline", string_value(key, value)),
                "path" => self.path = self.record("path", string_value(key, value)),
                "args" => self.args = self.record("args", string_list_value(key, value)),
                "env" => {
                    if let Some(env) = self.record("env", string_map_value(key, value)) {
                        self.env.extend(env);
                    }
                }
                "privileged" => {
                    self.privileged = self.record("privileged", bool_value(key, value))
                }
                "upload_path" | "upload-path" => {
                    self.upload_path = self.record("upload_path", string_value(key, value))
                }
                _ => {
                    self.unknown.insert(key.clone());
                }
            }
        }
    }

    fn merge(&self, other: &dyn ConfigPayload) -> Box<dyn ConfigPayload> {
        merge_typed(self, other, |base, other| {
            let mut env = base.env.clone();
            env.extend(other.env.clone());
            let mut problems = base.problems.clone();
            problems.extend(other.problems.clone());
            ShellConfig {
                inline: other.inline.clone().or_else(|| base.inline.clone()),
                path: other.path.clone().or_else(|| base.path.clone()),
                args: other.args.clone().or_else(|| base.args.clone()),
                env,
                privileged: other.privileged.or(base.privileged),
                upload_path: other.upload_path.clone().or_else(|| base.upload_path.clone()),
                unknown: base.unknown.union(&other.unknown).cloned().collect(),
                problems,
            }
        })
    }

    fn finalize(&mut self) -> Result<()> {
        self.privileged.get_or_insert(true);
        self.upload_path
            .get_or_insert_with(|| DEFAULT_UPLOAD_PATH.to_string());
        Ok(())
    }

    fn validate(&self) -> Vec<String> {
        let mut errors: Vec<String> = self.problems.values().flatten().cloned().collect();

        if !self.unknown.is_empty() {
            let keys: Vec<&str> = self.unknown.iter().map(String::as_str).collect();
            errors.push(format!(
                "shell: the following settings shouldn't exist: {}",
                keys.join(", ")
            ));
        }

        match (&self.inline, &self.path) {
            (None, None) => errors.push("shell: one of `inline` or `path` must be set".to_string()),
            (Some(_), Some(_)) => {
                errors.push("shell: `inline` and `path` are mutually exclusive".to_string())
            }
            _ => {}
        }

        errors
    }

    fn clone_box(&self) -> Box<dyn ConfigPayload> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
