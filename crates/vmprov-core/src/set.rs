//! Ordered provisioner declarations for one configuration scope.
//!
//! A scope is the base configuration or a machine-specific override block.
//! Child scopes are layered over their parent with [`ProvisionerSet::merge`].

use thiserror::Error;
use tracing::debug;

use crate::declaration::{ProvisionerDeclaration, RunPolicy};
use crate::id::ProvisionerKind;
use crate::payload::Options;
use crate::registry::TypeRegistry;
use crate::Result;

/// Declaration-level settings applied by [`ProvisionerSet::provision`].
/// `None` leaves the existing value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub run: Option<RunPolicy>,
    pub preserve_order: Option<bool>,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// A problem found by [`ProvisionerSet::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("provisioner '{id}': kind '{kind}' could not be found")]
    UnknownKind { id: String, kind: String },

    #[error("provisioner '{id}': {message}")]
    Payload { id: String, message: String },

    #[error("provisioner '{id}': {field} references unknown provisioner '{target}'")]
    DanglingReference {
        id: String,
        field: &'static str,
        target: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionerSet {
    declarations: Vec<ProvisionerDeclaration>,
}

impl ProvisionerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a provisioner, or add to an existing one of the same name.
    ///
    /// Unnamed declarations are always new. A repeated name reuses the
    /// existing declaration and its kind; `kind` is only used on creation.
    pub fn provision(
        &mut self,
        name: Option<&str>,
        kind: impl Into<ProvisionerKind>,
        registry: &dyn TypeRegistry,
        settings: ProvisionSettings,
        options: &Options,
    ) -> &mut ProvisionerDeclaration {
        let existing = name.filter(|n| !n.is_empty()).and_then(|n| {
            self.declarations
                .iter()
                .position(|d| d.name() == Some(n))
        });

        let index = match existing {
            Some(index) => {
                debug!(name = ?name, "Adding config to existing provisioner");
                index
            }
            None => {
                self.declarations
                    .push(ProvisionerDeclaration::new(name, kind, registry));
                self.declarations.len() - 1
            }
        };

        let decl = &mut self.declarations[index];
        if let Some(run) = settings.run {
            decl.set_run(Some(run));
        }
        if let Some(preserve_order) = settings.preserve_order {
            decl.set_preserve_order(preserve_order);
        }
        if settings.before.is_some() {
            decl.set_before(settings.before);
        }
        if settings.after.is_some() {
            decl.set_after(settings.after);
        }
        decl.add_config(options);
        decl
    }

    /// Append an already constructed declaration.
    pub fn push(&mut self, declaration: ProvisionerDeclaration) {
        self.declarations.push(declaration);
    }

    /// Layer `overrides` (a child scope) over `self` (the parent scope).
    ///
    /// An override with the same id as a parent entry inherits the parent's
    /// config and run policy. With `preserve_order` it takes the parent's
    /// position; otherwise it stays in its own position after all parent
    /// entries. Overrides without a parent are appended in order.
    pub fn merge(&self, overrides: &ProvisionerSet) -> ProvisionerSet {
        let mut remaining: Vec<ProvisionerDeclaration> = overrides.declarations.clone();
        let mut merged = Vec::with_capacity(self.len() + remaining.len());

        for parent in &self.declarations {
            let Some(pos) = remaining.iter().position(|o| o.id() == parent.id()) else {
                merged.push(parent.clone());
                continue;
            };

            remaining[pos].inherit_from(parent);
            if remaining[pos].preserve_order() {
                merged.push(remaining.remove(pos));
            }
        }

        merged.extend(remaining);
        ProvisionerSet {
            declarations: merged,
        }
    }

    /// Finalize every declaration in order, stopping at the first error.
    pub fn finalize(&mut self) -> Result<()> {
        for decl in &mut self.declarations {
            decl.finalize()?;
        }
        Ok(())
    }

    /// Collect problems across all declarations. Ordering constraints are
    /// only checked for existence of the referenced provisioner.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for decl in &self.declarations {
            let id = decl.id().to_string();

            if decl.is_invalid() {
                errors.push(ValidationError::UnknownKind {
                    id: id.clone(),
                    kind: decl.kind().to_string(),
                });
            } else if let Some(config) = decl.config() {
                errors.extend(config.validate().into_iter().map(|message| {
                    ValidationError::Payload {
                        id: id.clone(),
                        message,
                    }
                }));
            }

            for (field, target) in [("before", decl.before()), ("after", decl.after())] {
                if let Some(target) = target {
                    if self.get(target).is_none() {
                        errors.push(ValidationError::DanglingReference {
                            id: id.clone(),
                            field,
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        errors
    }

    /// Look up a declaration by name or id.
    pub fn get(&self, name_or_id: &str) -> Option<&ProvisionerDeclaration> {
        self.declarations
            .iter()
            .find(|d| d.name() == Some(name_or_id) || d.id().as_str() == name_or_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProvisionerDeclaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl<'a> IntoIterator for &'a ProvisionerSet {
    type Item = &'a ProvisionerDeclaration;
    type IntoIter = std::slice::Iter<'a, ProvisionerDeclaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
