use chain_btc::address::{
    bytes_to_wif, public_key_to_address, public_key_to_native_segwit_address,
    public_key_to_segwit_address, wif_to_bytes,
};
use chain_btc::curve::{public_key_to_coords, Point, COMPRESSED_PUBKEY_LEN};
use chain_btc::{Network, Signer, UnspentType};
use crypto_utils::hash::sha256;
use crypto_utils::{Crypto, Secp256k1, SecretKey};
use zeroize::Zeroizing;

use crate::error::WalletError;
use crate::wallet::Wallet;

/// A single private key with its public key and addresses.
///
/// Uncompressed keys have only a P2PKH address; segwit addresses require
/// the compressed encoding.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    secret: SecretKey,
    public_key: Vec<u8>,
    network: Network,
    address: String,
    segwit_address: Option<String>,
    native_segwit_address: Option<String>,
}

impl PrivateKey {
    /// A fresh compressed key from the OS RNG.
    pub fn generate(network: Network) -> Result<Self, WalletError> {
        Self::from_secret(SecretKey::generate(), network, true)
    }

    /// Import a WIF key; network and compression come from the encoding.
    pub fn from_wif(wif: &str) -> Result<Self, WalletError> {
        let decoded = wif_to_bytes(wif)?;
        Self::from_secret(decoded.secret, decoded.network, decoded.compressed)
    }

    pub fn from_bytes(bytes: &[u8], network: Network, compressed: bool) -> Result<Self, WalletError> {
        Self::from_secret(SecretKey::from_bytes(bytes)?, network, compressed)
    }

    pub fn from_hex(hex: &str, network: Network, compressed: bool) -> Result<Self, WalletError> {
        Self::from_secret(SecretKey::from_hex(hex)?, network, compressed)
    }

    fn from_secret(secret: SecretKey, network: Network, compressed: bool) -> Result<Self, WalletError> {
        let public_key = Secp256k1.public_key(&secret, compressed)?;
        let address = public_key_to_address(&public_key, network)?;
        let (segwit_address, native_segwit_address) = if compressed {
            (
                Some(public_key_to_segwit_address(&public_key, network)?),
                Some(public_key_to_native_segwit_address(&public_key, network)?),
            )
        } else {
            (None, None)
        };
        log::debug!("loaded {network} key for {address}");
        Ok(Self {
            secret,
            public_key,
            network,
            address,
            segwit_address,
            native_segwit_address,
        })
    }

    pub fn to_wif(&self) -> Zeroizing<String> {
        Zeroizing::new(bytes_to_wif(&self.secret, self.network, self.is_compressed()))
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(self.secret.to_hex())
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.secret.as_bytes())
    }

    pub fn is_compressed(&self) -> bool {
        self.public_key.len() == COMPRESSED_PUBKEY_LEN
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn public_point(&self) -> Result<Point, WalletError> {
        Ok(public_key_to_coords(&self.public_key)?)
    }

    /// P2PKH address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// P2WPKH nested in P2SH.
    pub fn segwit_address(&self) -> Option<&str> {
        self.segwit_address.as_deref()
    }

    /// Bech32 P2WPKH.
    pub fn native_segwit_address(&self) -> Option<&str> {
        self.native_segwit_address.as_deref()
    }

    /// DER signature over the SHA-256 of `data`.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, WalletError> {
        Ok(Secp256k1.sign_digest(&self.secret, &sha256(data))?)
    }

    pub fn verify(&self, signature: &[u8], data: &[u8]) -> bool {
        Secp256k1.verify_digest(&self.public_key, signature, &sha256(data))
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl Wallet for PrivateKey {
    fn network(&self) -> Network {
        self.network
    }

    fn default_address(&self) -> &str {
        &self.address
    }

    fn spendable_addresses(&self) -> Vec<(&str, UnspentType)> {
        let legacy = if self.is_compressed() {
            UnspentType::P2pkh
        } else {
            UnspentType::P2pkhUncompressed
        };
        let mut addresses = vec![(self.address.as_str(), legacy)];
        if let Some(address) = self.segwit_address() {
            addresses.push((address, UnspentType::Np2wkh));
        }
        if let Some(address) = self.native_segwit_address() {
            addresses.push((address, UnspentType::P2wkh));
        }
        addresses
    }

    fn signer(&self) -> Signer<'_> {
        Signer::SingleKey {
            secret: &self.secret,
            public_key: self.public_key.clone(),
        }
    }
}
