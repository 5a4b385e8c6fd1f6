//! KDL configuration loading for vmprov.
//!
//! This crate handles parsing of:
//! - Top-level `provision` nodes (the base scope)
//! - `machine` blocks whose provisioners override the base scope

pub mod error;
pub mod provision;

pub use error::{ConfigError, ConfigResult};
pub use provision::{ProvisionerConfig, load_provisioners, parse_provisioners};
