use std::collections::BTreeSet;

use chain_btc::address::{
    multisig_to_address, multisig_to_native_segwit_address, multisig_to_segwit_address,
};
use chain_btc::{Network, RedeemScript, Signer, UnspentType};
use crypto_utils::Secp256k1;

use crate::error::WalletError;
use crate::key::PrivateKey;
use crate::wallet::Wallet;

/// One co-signer's view of an m-of-n multisig wallet.
///
/// The key must be one of the script's public keys, in either encoding.
#[derive(Debug, Clone)]
pub struct MultiSig {
    key: PrivateKey,
    public_key: Vec<u8>,
    redeem_script: RedeemScript,
    address: String,
    segwit_address: Option<String>,
    native_segwit_address: Option<String>,
}

impl MultiSig {
    /// Keys appear in the script in the order given.
    pub fn new(key: PrivateKey, public_keys: Vec<Vec<u8>>, required: usize) -> Result<Self, WalletError> {
        let redeem_script = RedeemScript::new(public_keys, required)?;
        Self::from_redeem_script(key, redeem_script)
    }

    /// Keys are sorted lexicographically, so every co-signer derives the
    /// same script regardless of the order they learned the keys in.
    pub fn from_key_set(
        key: PrivateKey,
        public_keys: &BTreeSet<Vec<u8>>,
        required: usize,
    ) -> Result<Self, WalletError> {
        let redeem_script = RedeemScript::from_key_set(public_keys, required)?;
        Self::from_redeem_script(key, redeem_script)
    }

    pub fn from_redeem_script(key: PrivateKey, redeem_script: RedeemScript) -> Result<Self, WalletError> {
        let public_key = Signer::multisig(&Secp256k1, key.secret(), &redeem_script)?
            .public_key()
            .to_vec();
        let network = key.network();
        let address = multisig_to_address(&redeem_script, network);
        // Segwit v0 forbids uncompressed keys; such scripts are P2SH only.
        let (segwit_address, native_segwit_address) = if redeem_script.is_witness_compatible() {
            (
                Some(multisig_to_segwit_address(&redeem_script, network)?),
                Some(multisig_to_native_segwit_address(&redeem_script, network)?),
            )
        } else {
            (None, None)
        };
        log::debug!(
            "{}-of-{} multisig at {address}",
            redeem_script.required(),
            redeem_script.public_keys().len()
        );
        Ok(Self {
            key,
            public_key,
            redeem_script,
            address,
            segwit_address,
            native_segwit_address,
        })
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    pub fn redeem_script(&self) -> &RedeemScript {
        &self.redeem_script
    }

    pub fn public_keys(&self) -> &[Vec<u8>] {
        self.redeem_script.public_keys()
    }

    pub fn required(&self) -> usize {
        self.redeem_script.required()
    }

    /// P2SH address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// P2WSH nested in P2SH, absent when the script holds an uncompressed key.
    pub fn segwit_address(&self) -> Option<&str> {
        self.segwit_address.as_deref()
    }

    /// Bech32 P2WSH, absent when the script holds an uncompressed key.
    pub fn native_segwit_address(&self) -> Option<&str> {
        self.native_segwit_address.as_deref()
    }
}

impl Wallet for MultiSig {
    fn network(&self) -> Network {
        self.key.network()
    }

    fn default_address(&self) -> &str {
        &self.address
    }

    fn spendable_addresses(&self) -> Vec<(&str, UnspentType)> {
        let mut addresses = vec![(self.address.as_str(), UnspentType::P2sh)];
        if let Some(address) = self.segwit_address() {
            addresses.push((address, UnspentType::Np2wsh));
        }
        if let Some(address) = self.native_segwit_address() {
            addresses.push((address, UnspentType::P2wsh));
        }
        addresses
    }

    fn signer(&self) -> Signer<'_> {
        Signer::MultiSig {
            secret: self.key.secret(),
            public_key: self.public_key.clone(),
            redeem_script: &self.redeem_script,
        }
    }
}
