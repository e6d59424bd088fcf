use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store {path}: {message}")]
    Open { path: String, message: String },

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("record {0} not found")]
    NotFound(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed record storage for one record type.
pub trait Store<T>: Send + Sync {
    fn put(&self, key: &str, value: &T) -> StoreResult<()>;

    /// Fails with [`StoreError::NotFound`] when `key` is absent.
    fn get(&self, key: &str) -> StoreResult<T>;

    fn list(&self) -> StoreResult<Vec<T>>;

    fn count(&self) -> StoreResult<usize>;
}

/// Which backend a component keeps its records in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Persistent,
}
