//! Crate-wide error type.
//!
//! `Lock` is an ambient error kind for the process-lock boundary, alongside
//! the engine's own domain errors. `Reconciliation`/`Unreconciliation` are
//! fatal (they indicate a caller ordering bug or a corrupt log, respectively)
//! and must never be silently swallowed or retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(
        "RECONCILIATION ERROR: {endpoint} sequence {endpoint_sequence} >= next sequence {next_sequence}"
    )]
    Reconciliation {
        endpoint: &'static str,
        endpoint_sequence: u64,
        next_sequence: u64,
    },

    #[error(
        "UNRECONCILIATION ERROR: endpoint sequence {endpoint_sequence} > movement sequence {movement_sequence}"
    )]
    Unreconciliation {
        endpoint_sequence: u64,
        movement_sequence: u64,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<bitcoincore_rpc::Error> for Error {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        Error::Rpc(err.to_string())
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Lock(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Decode(format!("config: {}", err))
    }
}
