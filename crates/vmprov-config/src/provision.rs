//! Provisioner configuration parsing.
//!
//! ```kdl
//! provision "shell" inline="echo base"
//!
//! provision "bootstrap" type="shell" run="always" {
//!     path "scripts/bootstrap.sh"
//!     args "--fast" "--quiet"
//!     env { LANG "C.UTF-8"; }
//! }
//!
//! machine "web" {
//!     provision "bootstrap" type="shell" preserve-order=#true {
//!         inline "echo web"
//!     }
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use vmprov_core::{Options, ProvisionSettings, ProvisionerSet, RunPolicy, TypeRegistry};

/// Properties on a `provision` node that configure the declaration itself
/// rather than its payload.
const RESERVED_PROPS: &[&str] = &[
    "type",
    "run",
    "preserve-order",
    "preserve_order",
    "before",
    "after",
];

/// Provisioners loaded from one configuration file.
#[derive(Debug, Clone, Default)]
pub struct ProvisionerConfig {
    base: ProvisionerSet,
    machines: BTreeMap<String, ProvisionerSet>,
}

impl ProvisionerConfig {
    /// Provisioners declared outside any `machine` block.
    pub fn base(&self) -> &ProvisionerSet {
        &self.base
    }

    /// Names of machines with their own provisioner scope, sorted.
    pub fn machines(&self) -> impl Iterator<Item = &str> {
        self.machines.keys().map(String::as_str)
    }

    pub fn has_machine(&self, name: &str) -> bool {
        self.machines.contains_key(name)
    }

    /// Effective provisioners for `machine`: the base scope with the
    /// machine's scope layered over it.
    pub fn for_machine(&self, machine: &str) -> ProvisionerSet {
        match self.machines.get(machine) {
            Some(scope) => self.base.merge(scope),
            None => self.base.clone(),
        }
    }
}

/// Read and parse a provisioner configuration file.
pub fn load_provisioners(
    path: impl AsRef<Path>,
    registry: &dyn TypeRegistry,
) -> ConfigResult<ProvisionerConfig> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_provisioners(&content, registry)
}

/// Parse a provisioner configuration from KDL text.
pub fn parse_provisioners(
    kdl: &str,
    registry: &dyn TypeRegistry,
) -> ConfigResult<ProvisionerConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut base = ProvisionerSet::new();
    let mut machines = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "provision" => {
                parse_provision(node, &mut base, registry)?;
            }
            "machine" => {
                let name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("machine name".to_string()))?;
                if machines.contains_key(&name) {
                    return Err(ConfigError::Duplicate(format!("machine '{}'", name)));
                }
                let scope = parse_machine(node, registry)?;
                debug!(machine = %name, provisioners = scope.len(), "Parsed machine scope");
                machines.insert(name, scope);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    debug!(provisioners = base.len(), machines = machines.len(), "Parsed provisioner config");
    Ok(ProvisionerConfig { base, machines })
}

fn parse_machine(node: &KdlNode, registry: &dyn TypeRegistry) -> ConfigResult<ProvisionerSet> {
    let mut scope = ProvisionerSet::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "provision" {
                parse_provision(child, &mut scope, registry)?;
            }
        }
    }
    Ok(scope)
}

/// Parse one `provision` node into `scope`.
///
/// The positional argument is the provisioner name when `type` is given,
/// otherwise it is the kind and the declaration is unnamed.
fn parse_provision(
    node: &KdlNode,
    scope: &mut ProvisionerSet,
    registry: &dyn TypeRegistry,
) -> ConfigResult<()> {
    let args = positional_args(node);
    let first = match args.as_slice() {
        [one] => one
            .value()
            .as_string()
            .map(str::to_string)
            .ok_or_else(|| invalid("provision", "name or type must be a string"))?,
        [] => return Err(ConfigError::MissingField("provision name or type".to_string())),
        _ => return Err(invalid("provision", "expected a single name or type argument")),
    };

    let (name, kind) = match get_string_prop(node, "type")? {
        Some(kind) => (Some(first), kind),
        None => (None, first),
    };

    let settings = ProvisionSettings {
        run: get_string_prop(node, "run")?
            .map(|run| run.parse::<RunPolicy>())
            .transpose()?,
        preserve_order: match get_bool_prop(node, "preserve-order")? {
            Some(b) => Some(b),
            None => get_bool_prop(node, "preserve_order")?,
        },
        before: get_string_prop(node, "before")?,
        after: get_string_prop(node, "after")?,
    };

    let mut options = Options::new();
    for entry in node.entries() {
        if let Some(key) = entry.name() {
            if !RESERVED_PROPS.contains(&key.value()) {
                options.insert(key.value().to_string(), kdl_to_json(key.value(), entry.value())?);
            }
        }
    }
    if let Some(children) = node.children() {
        for child in children.nodes() {
            options.insert(child.name().value().to_string(), node_to_json(child)?);
        }
    }

    let decl = scope.provision(name.as_deref(), kind, registry, settings, &options);
    debug!(id = %decl.id(), kind = %decl.kind(), invalid = decl.is_invalid(), "Parsed provisioner");
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn positional_args(node: &KdlNode) -> Vec<&KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none()).collect()
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<String>> {
    match node.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| invalid(name, format!("expected a string, got {}", value))),
    }
}

fn get_bool_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<bool>> {
    match node.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| invalid(name, format!("expected a boolean, got {}", value))),
    }
}

/// Convert an option node to a JSON value.
///
/// - a child block becomes an object (properties are folded into it)
/// - properties alone become an object
/// - a single argument becomes a scalar, several become an array
fn node_to_json(node: &KdlNode) -> ConfigResult<Value> {
    let key = node.name().value();
    let args = positional_args(node);
    let props: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_some()).collect();

    if node.children().is_some() || !props.is_empty() {
        if !args.is_empty() {
            return Err(invalid(
                key,
                "cannot mix arguments with properties or a child block",
            ));
        }
        let mut map = Map::new();
        for entry in props {
            if let Some(name) = entry.name() {
                map.insert(name.value().to_string(), kdl_to_json(key, entry.value())?);
            }
        }
        if let Some(children) = node.children() {
            for child in children.nodes() {
                map.insert(child.name().value().to_string(), node_to_json(child)?);
            }
        }
        return Ok(Value::Object(map));
    }

    match args.as_slice() {
        [] => Ok(Value::Null),
        [one] => kdl_to_json(key, one.value()),
        many => many
            .iter()
            .map(|e| kdl_to_json(key, e.value()))
            .collect::<ConfigResult<Vec<_>>>()
            .map(Value::Array),
    }
}

fn kdl_to_json(key: &str, value: &KdlValue) -> ConfigResult<Value> {
    match value {
        KdlValue::String(s) => Ok(Value::String(s.clone())),
        KdlValue::Integer(i) => i64::try_from(*i)
            .map(|i| Value::Number(Number::from(i)))
            .map_err(|_| invalid(key, format!("integer {} is out of range", i))),
        KdlValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| invalid(key, format!("float {} is not representable", f))),
        KdlValue::Bool(b) => Ok(Value::Bool(*b)),
        KdlValue::Null => Ok(Value::Null),
    }
}
