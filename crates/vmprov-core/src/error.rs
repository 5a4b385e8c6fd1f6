//! Error types for vmprov.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to finalize '{kind}' config: {message}")]
    Finalize { kind: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
