use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::string_value;
use crate::payload::{ConfigPayload, Options, merge_typed};
use crate::{Error, Result};

/// Configuration for the `file` provisioner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Host path to upload.
    pub source: Option<String>,
    /// Guest path. Defaults to the file name of `source` on finalize.
    pub destination: Option<String>,
    unknown: BTreeSet<String>,
    /// Latest coercion outcome per option key; `Some` holds the error.
    problems: BTreeMap<String, Option<String>>,
}

impl ConfigPayload for FileConfig {
    fn set_options(&mut self, options: &Options) {
        for (key, value) in options {
            let slot = match key.as_str() {
                "source" => &mut self.source,
                "destination" => &mut self.destination,
                _ => {
                    self.unknown.insert(key.clone());
                    continue;
                }
            };
            let problem = match string_value(key, value) {
                Ok(s) => {
                    *slot = Some(s);
                    None
                }
                Err(message) => Some(message),
            };
            self.problems.insert(key.clone(), problem);
        }
    }

    fn merge(&self, other: &dyn ConfigPayload) -> Box<dyn ConfigPayload> {
        merge_typed(self, other, |base, other| {
            let mut problems = base.problems.clone();
            problems.extend(other.problems.clone());
            FileConfig {
                source: other.source.clone().or_else(|| base.source.clone()),
                destination: other.destination.clone().or_else(|| base.destination.clone()),
                unknown: base.unknown.union(&other.unknown).cloned().collect(),
                problems,
            }
        })
    }

    fn finalize(&mut self) -> Result<()> {
        if self.destination.is_some() {
            return Ok(());
        }
        let Some(source) = self.source.as_deref() else {
            return Ok(());
        };

        let file_name = Path::new(source)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Finalize {
                kind: "file".to_string(),
                message: format!("cannot derive a destination from source '{}'", source),
            })?;
        self.destination = Some(file_name.to_string());
        Ok(())
    }

    fn validate(&self) -> Vec<String> {
        let mut errors: Vec<String> = self.problems.values().flatten().cloned().collect();
        if !self.unknown.is_empty() {
            let keys: Vec<&str> = self.unknown.iter().map(String::as_str).collect();
            errors.push(format!(
                "file: the following settings shouldn't exist: {}",
                keys.join(", ")
            ));
        }
        if self.source.is_none() {
            errors.push("file: `source` is required".to_string());
        }
        if self.destination.is_none() {
            errors.push("file: `destination` is required".to_string());
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
