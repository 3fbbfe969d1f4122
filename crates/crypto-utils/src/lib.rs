//! # crypto-utils
//!
//! Hashing, secp256k1 signing and verification, and zeroizing secret-key
//! storage for the Bitcoin transaction engine.

pub mod ecdsa;
pub mod error;
pub mod hash;
pub mod secret;

pub use ecdsa::{Crypto, Secp256k1};
pub use error::CryptoError;
pub use secret::SecretKey;
