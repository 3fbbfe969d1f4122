use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::CryptoError;
use crate::secret::SecretKey;

/// Elliptic-curve operations the transaction signer depends on.
///
/// Digests are always 32 bytes and already hashed; implementations must not
/// hash them again.
pub trait Crypto {
    /// SEC1 public key for `secret`, 33 bytes when `compressed`, otherwise 65.
    fn public_key(&self, secret: &SecretKey, compressed: bool) -> Result<Vec<u8>, CryptoError>;

    /// Deterministic (RFC6979) low-S ECDSA signature over `digest`, DER encoded.
    fn sign_digest(&self, secret: &SecretKey, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError>;

    /// Check a DER signature over `digest` against a SEC1 public key.
    fn verify_digest(&self, public_key: &[u8], signature_der: &[u8], digest: &[u8; 32]) -> bool;
}

/// The `k256`-backed secp256k1 implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1;

impl Crypto for Secp256k1 {
    fn public_key(&self, secret: &SecretKey, compressed: bool) -> Result<Vec<u8>, CryptoError> {
        let signing_key = secret.signing_key()?;
        let point = signing_key.verifying_key().to_encoded_point(compressed);
        Ok(point.as_bytes().to_vec())
    }

    fn sign_digest(&self, secret: &SecretKey, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
        let signing_key = secret.signing_key()?;
        let signature: Signature = signing_key
            .sign_prehash(digest)
            .map_err(|e| CryptoError::SigningFailed(format!("ECDSA signing failed: {e}")))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify_digest(&self, public_key: &[u8], signature_der: &[u8], digest: &[u8; 32]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(signature_der) else {
            return false;
        };
        verifying_key.verify_prehash(digest, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn key(n: u8) -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        SecretKey::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn compressed_public_key_of_one() {
        let pubkey = Secp256k1.public_key(&key(1), true).unwrap();
        assert_eq!(
            hex::encode(pubkey),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
    }

    #[test]
    fn uncompressed_public_key_of_one() {
        let pubkey = Secp256k1.public_key(&key(1), false).unwrap();
        assert_eq!(pubkey.len(), 65);
        assert_eq!(pubkey[0], 0x04);
        assert_eq!(
            hex::encode(&pubkey[33..]),
            "483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
        );
    }

    /// Widely published RFC6979 vector: key 1, sha256("Satoshi Nakamoto").
    #[test]
    fn deterministic_signature_vector() {
        let digest = sha256(b"Satoshi Nakamoto");
        let der = Secp256k1.sign_digest(&key(1), &digest).unwrap();
        assert_eq!(
            hex::encode(der),
            "3045022100934b1ea10a4b3c1757e2b0c017d0b6143ce3c9a7e6a4a49860d7a6ab210ee3d8\
             02202442ce9d2b916064108014783e923ec36b49743e2ffa1c4496f01a512aafd9e5"
        );
    }

    #[test]
    fn signatures_are_low_s() {
        let half_order =
            hex::decode("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0")
                .unwrap();
        for n in 1..=20u8 {
            let digest = sha256(&[n]);
            let der = Secp256k1.sign_digest(&key(n), &digest).unwrap();
            let sig = Signature::from_der(&der).unwrap();
            let s_bytes = sig.s().to_bytes();
            assert!(s_bytes.as_slice() <= half_order.as_slice());
        }
    }

    #[test]
    fn sign_then_verify() {
        let secret = key(7);
        let pubkey = Secp256k1.public_key(&secret, true).unwrap();
        let digest = sha256(b"spend");
        let der = Secp256k1.sign_digest(&secret, &digest).unwrap();
        assert!(Secp256k1.verify_digest(&pubkey, &der, &digest));
    }

    #[test]
    fn verify_rejects_other_digest() {
        let secret = key(7);
        let pubkey = Secp256k1.public_key(&secret, true).unwrap();
        let der = Secp256k1.sign_digest(&secret, &sha256(b"a")).unwrap();
        assert!(!Secp256k1.verify_digest(&pubkey, &der, &sha256(b"b")));
    }

    #[test]
    fn verify_rejects_other_key() {
        let digest = sha256(b"spend");
        let der = Secp256k1.sign_digest(&key(7), &digest).unwrap();
        let other = Secp256k1.public_key(&key(8), true).unwrap();
        assert!(!Secp256k1.verify_digest(&other, &der, &digest));
    }

    #[test]
    fn verify_rejects_garbage() {
        let digest = sha256(b"spend");
        let pubkey = Secp256k1.public_key(&key(7), true).unwrap();
        assert!(!Secp256k1.verify_digest(&pubkey, &[0x30, 0x00], &digest));
        assert!(!Secp256k1.verify_digest(&[0x02; 33], &[0x30, 0x00], &digest));
    }

    #[test]
    fn uncompressed_key_verifies_too() {
        let secret = key(9);
        let pubkey = Secp256k1.public_key(&secret, false).unwrap();
        let digest = sha256(b"legacy");
        let der = Secp256k1.sign_digest(&secret, &digest).unwrap();
        assert!(Secp256k1.verify_digest(&pubkey, &der, &digest));
    }
}
