use crypto_utils::CryptoError;
use thiserror::Error;

/// Bitcoin transaction engine errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BtcError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid key or address: {0}")]
    InvalidKeyOrAddress(String),

    #[error("insufficient funds: balance {available} is less than {required} (including fee), short by {shortfall}")]
    InsufficientFunds {
        available: u64,
        required: u64,
        shortfall: u64,
    },

    #[error("unsupported sighash type: {0:#04x}")]
    UnsupportedSighash(u32),

    #[error("script limit exceeded: {0}")]
    ScriptLimitExceeded(String),

    #[error("already signed: {0}")]
    AlreadySigned(String),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),
}

impl BtcError {
    /// Build an `InsufficientFunds` error from what is available and what is needed.
    pub fn insufficient(available: u64, required: u64) -> Self {
        BtcError::InsufficientFunds {
            available,
            required,
            shortfall: required.saturating_sub(available),
        }
    }
}

impl From<CryptoError> for BtcError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPrivateKey(msg) => BtcError::InvalidKeyOrAddress(msg),
            CryptoError::SigningFailed(msg) => BtcError::SigningError(msg),
        }
    }
}
