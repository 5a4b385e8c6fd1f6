//! Provisioner declarations for VM configuration.
//!
//! This crate contains:
//! - Provisioner ids and kind tags
//! - The declaration entity with config accumulation, finalize and clone
//! - Config payload and schema factory traits
//! - The type registry trait and an in-memory registry
//! - Built-in `shell` and `file` provisioner configs
//! - Scope aggregation and parent/child merging

pub mod builtin;
pub mod declaration;
pub mod error;
pub mod id;
pub mod payload;
pub mod registry;
pub mod set;

pub use declaration::{ProvisionerDeclaration, RunPolicy};
pub use error::{Error, Result};
pub use id::{ProvisionerId, ProvisionerKind};
pub use payload::{ConfigPayload, DummyConfig, DummySchema, Options, SchemaFactory};
pub use registry::{KindRegistry, KindRegistryBuilder, TypeRegistry};
pub use set::{ProvisionSettings, ProvisionerSet, ValidationError};
