use chain_btc::error::BtcError;
use crypto_utils::error::CryptoError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("bitcoin: {0}")]
    Btc(#[from] BtcError),

    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),

    #[error("exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("chain source unavailable: {0}")]
    ChainUnavailable(String),
}
