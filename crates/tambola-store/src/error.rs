//! Error types for the store layer.

/// Errors that can occur during store operations.
///
/// [`Conflict`](StoreError::Conflict) and
/// [`Contention`](StoreError::Contention) are retryable — they mean
/// another transaction won the race, not that the request was wrong.
/// Callers must keep them distinct from business-rule rejections.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A document (or scanned collection) changed between read and
    /// commit. The transaction applied nothing.
    #[error("write conflict on {collection}/{key}")]
    Conflict { collection: String, key: String },

    /// The retry budget ran out while the transaction kept losing
    /// commit races.
    #[error("transaction gave up after {attempts} contended attempts")]
    Contention { attempts: u32 },

    /// A document body failed to serialize or deserialize.
    #[error("codec failure on {collection}/{key}: {source}")]
    Codec {
        collection: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Contention { .. })
    }
}
