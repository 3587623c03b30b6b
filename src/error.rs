//! Error types for the ingestion and rollup engine.
//!
//! Validation failures are values, not panics: the HTTP and ingest
//! boundaries map each variant to a client-visible outcome.

use thiserror::Error;

/// Payload rejection reasons. A decode error never reaches storage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Wrong field count or an unparseable token.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A parsed value outside its valid envelope. One bad field rejects
    /// the whole reading.
    #[error("{field} out of range: {value} (valid {min} to {max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Aggregate maintenance failure. The raw measurement stays persisted.
#[derive(Debug, Error)]
pub enum RollupError {
    #[error("aggregate scan/upsert failed: {0}")]
    Query(#[from] diesel::result::Error),
}

/// Store-level outcomes surfaced to the ingest caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The raw append itself failed; nothing was persisted.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] diesel::result::Error),

    /// The raw row is durable but its buckets are stale. Re-running the
    /// refresh for the affected buckets repairs this.
    #[error("measurement stored but aggregate refresh failed: {0}")]
    PartialWrite(#[from] RollupError),
}
