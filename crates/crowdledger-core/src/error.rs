use thiserror::Error;

/// Canonical error type for parsing and decoding the core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Hex text that does not decode, or decodes to the wrong length.
    #[error("invalid hex for {what}: {reason}")]
    InvalidHex { what: &'static str, reason: String },

    /// Key material rejected by ed25519.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// A decimal amount that cannot be represented in base units.
    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: &'static str },

    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
