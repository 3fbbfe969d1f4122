use std::fmt;

use k256::ecdsa::SigningKey;
use rand::RngCore;
use rand_core::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// A secp256k1 private scalar that is zeroed when dropped.
///
/// Construction validates that the scalar lies in `[1, n-1]`, so every
/// `SecretKey` in circulation can sign.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Wrap 32 raw bytes, rejecting zero and values at or above the curve order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        SigningKey::from_bytes((&array).into())
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("scalar out of range: {e}")))?;
        Ok(Self(array))
    }

    /// Parse a 64-character hex scalar.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(hex_str.trim())
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("invalid hex: {e}")))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Generate a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        loop {
            let mut candidate = [0u8; 32];
            OsRng.fill_bytes(&mut candidate);
            let key = Self::from_bytes(&candidate);
            candidate.zeroize();
            if let Ok(key) = key {
                return key;
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub(crate) fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        SigningKey::from_bytes((&self.0).into())
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("scalar out of range: {e}")))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}
