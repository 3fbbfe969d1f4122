//! Transaction operations shared by single-key and multisig wallets.
//!
//! A key type supplies its network, its addresses and a [`Signer`]; the
//! default methods of [`Wallet`] do the rest: fetching unspents, preparing
//! the offline interchange object, signing and broadcasting.

use chain_btc::{
    build_unsigned, prepare_tx_data, sign_tx, BuildOptions, Network, Signer, Transaction, TxData,
    Unspent, UnspentType,
};
use crypto_utils::Secp256k1;

use crate::chain::ChainSource;
use crate::error::WalletError;
use crate::rates::RateSource;
use crate::types::{OutputSpec, SignedTransaction};

pub trait Wallet {
    fn network(&self) -> Network;

    /// Where change goes when [`BuildOptions::leftover`] is unset.
    fn default_address(&self) -> &str;

    /// Every address this wallet can spend from, with the type its outputs
    /// are tagged with.
    fn spendable_addresses(&self) -> Vec<(&str, UnspentType)>;

    fn signer(&self) -> Signer<'_>;

    /// Unspent outputs across all of this wallet's addresses.
    ///
    /// Outputs the source left untagged get the type implied by the address
    /// they were found at.
    fn get_unspents(&self, chain: &dyn ChainSource) -> Result<Vec<Unspent>, WalletError> {
        let mut unspents = Vec::new();
        for (address, kind) in self.spendable_addresses() {
            for mut unspent in chain.get_unspents(address)? {
                if unspent.kind() == UnspentType::Unknown {
                    unspent.set_type(kind);
                }
                unspents.push(unspent);
            }
        }
        Ok(unspents)
    }

    fn get_balance(&self, chain: &dyn ChainSource) -> Result<u64, WalletError> {
        let mut balance = 0u64;
        for (address, _) in self.spendable_addresses() {
            balance = balance.saturating_add(chain.get_balance(address)?);
        }
        Ok(balance)
    }

    /// Select coins and lay out outputs without signing, returning the
    /// offline-signing JSON.
    fn prepare_transaction(
        &self,
        outputs: &[OutputSpec],
        unspents: &[Unspent],
        options: &BuildOptions,
        rates: Option<&dyn RateSource>,
    ) -> Result<String, WalletError> {
        Ok(prepare(self, outputs, unspents, options, rates)?.to_json()?)
    }

    /// Build and sign a payment from `unspents`.
    ///
    /// Multisig wallets return a partially signed transaction until enough
    /// co-signers have signed it.
    fn create_transaction(
        &self,
        outputs: &[OutputSpec],
        unspents: &[Unspent],
        options: &BuildOptions,
        rates: Option<&dyn RateSource>,
    ) -> Result<SignedTransaction, WalletError> {
        let tx_data = prepare(self, outputs, unspents, options, rates)?;
        let mut tx = build_unsigned(&tx_data, options.version, options.lock_time)?;
        sign_owned(self, &mut tx, &tx_data.unspents)?;
        Ok(SignedTransaction::from(&tx))
    }

    /// Sign either offline-signing JSON or a raw, possibly partially signed
    /// transaction. Raw hex needs the `unspents` its inputs spend; JSON
    /// carries its own.
    ///
    /// JSON is built with the default version and a zero locktime.
    fn sign_transaction(
        &self,
        data: &str,
        unspents: Option<&[Unspent]>,
    ) -> Result<SignedTransaction, WalletError> {
        let data = data.trim();
        let (mut tx, unspents) = if data.starts_with('{') {
            let tx_data = TxData::from_json(data)?;
            let defaults = BuildOptions::default();
            let tx = build_unsigned(&tx_data, defaults.version, defaults.lock_time)?;
            (tx, tx_data.unspents)
        } else {
            let unspents = unspents.ok_or_else(|| {
                WalletError::InvalidTxData("a raw transaction needs the unspents it spends".into())
            })?;
            (Transaction::from_hex(data)?, unspents.to_vec())
        };
        sign_owned(self, &mut tx, &unspents)?;
        Ok(SignedTransaction::from(&tx))
    }

    /// Fetch unspents, build, sign and broadcast in one step.
    fn send(
        &self,
        chain: &dyn ChainSource,
        outputs: &[OutputSpec],
        options: &BuildOptions,
        rates: Option<&dyn RateSource>,
    ) -> Result<SignedTransaction, WalletError> {
        let unspents = self.get_unspents(chain)?;
        let signed = self.create_transaction(outputs, &unspents, options, rates)?;
        let txid = chain.broadcast(&signed.hex)?;
        if !txid.eq_ignore_ascii_case(&signed.txid) {
            log::warn!("chain source reported txid {txid}, computed {}", signed.txid);
        }
        log::info!("broadcast transaction {}", signed.txid);
        Ok(signed)
    }
}

fn prepare<W: Wallet + ?Sized>(
    wallet: &W,
    outputs: &[OutputSpec],
    unspents: &[Unspent],
    options: &BuildOptions,
    rates: Option<&dyn RateSource>,
) -> Result<TxData, WalletError> {
    let entries = outputs
        .iter()
        .map(|output| output.to_entry(rates))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(prepare_tx_data(
        wallet.network(),
        unspents,
        &entries,
        options,
        wallet.default_address(),
    )?)
}

fn sign_owned<W: Wallet + ?Sized>(
    wallet: &W,
    tx: &mut Transaction,
    unspents: &[Unspent],
) -> Result<(), WalletError> {
    let outcome = sign_tx(&Secp256k1, &wallet.signer(), tx, unspents)?;
    if outcome.signed.is_empty() {
        return Err(WalletError::InvalidTxData(
            "no input spends an output of this wallet".into(),
        ));
    }
    Ok(())
}
