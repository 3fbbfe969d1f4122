use thiserror::Error;

/// Errors reported by the hashing and secp256k1 capability.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}
