//! CLI command implementations.

use anyhow::{Context, Result, bail};
use tracing::info;
use vmprov_config::{ProvisionerConfig, load_provisioners};
use vmprov_core::{KindRegistry, ProvisionerDeclaration, ProvisionerSet};

pub fn validate(path: &str, machine: Option<&str>) -> Result<()> {
    let set = load(path, machine)?;
    let errors = set.validate();

    if errors.is_empty() {
        println!("Configuration is valid ({} provisioners)", set.len());
        return Ok(());
    }

    for error in &errors {
        println!("  ✗ {}", error);
    }
    bail!("{} problem(s) found in {}", errors.len(), path);
}

pub fn show(path: &str, machine: Option<&str>) -> Result<()> {
    let set = load(path, machine)?;
    if set.is_empty() {
        println!("No provisioners defined");
        return Ok(());
    }
    for decl in &set {
        println!("{}", describe(decl));
    }
    Ok(())
}

pub fn kinds() {
    let registry = KindRegistry::builtin();
    for kind in registry.kinds() {
        println!("{}", kind);
    }
}

/// Load, scope and finalize the provisioners in `path`.
fn load(path: &str, machine: Option<&str>) -> Result<ProvisionerSet> {
    let registry = KindRegistry::builtin();
    let config = load_provisioners(path, &registry)
        .with_context(|| format!("Failed to load provisioner config: {}", path))?;

    let mut set = effective(&config, machine)?;
    set.finalize()
        .with_context(|| format!("Failed to finalize provisioners in {}", path))?;
    info!(path, provisioners = set.len(), "Loaded provisioners");
    Ok(set)
}

fn effective(config: &ProvisionerConfig, machine: Option<&str>) -> Result<ProvisionerSet> {
    match machine {
        Some(name) if !config.has_machine(name) => {
            bail!("Unknown machine '{}'", name)
        }
        Some(name) => Ok(config.for_machine(name)),
        None => Ok(config.base().clone()),
    }
}

fn describe(decl: &ProvisionerDeclaration) -> String {
    let mut line = format!("{} ({})", decl.id(), decl.kind());
    if decl.is_invalid() {
        line.push_str(" [not found]");
    }
    if let Some(run) = decl.run() {
        line.push_str(&format!(" run={}", run));
    }
    if decl.preserve_order() {
        line.push_str(" preserve-order");
    }
    if let Some(before) = decl.before() {
        line.push_str(&format!(" before={}", before));
    }
    if let Some(after) = decl.after() {
        line.push_str(&format!(" after={}", after));
    }
    if let Some(config) = decl.config() {
        line.push_str(&format!("\n    {:?}", config));
    }
    line
}
