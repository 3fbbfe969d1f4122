//! # wallet-core
//!
//! Key objects on top of the `chain-btc` engine: single-key and multisig
//! wallets, currency conversion, offline signing, and the seams to a
//! blockchain backend and an exchange-rate feed.

pub mod chain;
pub mod error;
pub mod key;
pub mod multisig;
pub mod rates;
pub mod types;
pub mod wallet;

pub use chain::{ChainSource, FallbackChain, MemoryChain};
pub use error::WalletError;
pub use key::PrivateKey;
pub use multisig::MultiSig;
pub use rates::{fiat_to_satoshi, Clock, RateCache, RateSource, StaticRates, SystemClock};
pub use types::{Currency, OutputSpec, SignedTransaction};
pub use wallet::Wallet;

pub use chain_btc::{BuildOptions, Network, TxData, Unspent, UnspentType};
