//! Learning store trait abstraction.

use agentune_core::AgentuneError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key cannot be mapped to a storage location
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<StoreError> for AgentuneError {
    fn from(err: StoreError) -> Self {
        AgentuneError::Storage(err.to_string())
    }
}

/// Opaque key-value persistence for learned parameters.
///
/// Keys are `/`-separated paths such as `qlearning/qtable`. Implementations
/// serialize writers internally, so a store can be shared behind an `Arc`.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Load the value stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// All stored keys, sorted.
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// Load and deserialize the value under `key`.
pub async fn load_typed<T: DeserializeOwned>(store: &dyn LearningStore, key: &str) -> Result<Option<T>> {
    match store.load(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and store `value` under `key`.
pub async fn save_typed<T: Serialize + ?Sized>(store: &dyn LearningStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.save(key, &value).await
}

/// Check that a key is a relative path of plain segments.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid_segment = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };

    if key.split('/').all(valid_segment) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
