//! Error types for jirest
//!
//! Only unrecoverable conditions are errors. Expected failures (missing
//! fields, transport problems, rejected preconditions) are reported as
//! values, see [`crate::SaveOutcome`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A persistent issue was built from data carrying neither `id` nor `key`.
    #[error("Issue data does not provide any key or id: {0}")]
    MissingIdentity(String),

    /// The server accepted a create but did not return an identifier.
    ///
    /// Saving again would create a duplicate record, so the local object
    /// must be discarded.
    #[error("The {0} was created but this object could not be linked to it")]
    OrphanedWrite(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with JSON of an unexpected shape.
    #[error("Unexpected response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
