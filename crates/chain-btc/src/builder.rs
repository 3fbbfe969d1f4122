//! Turning payment intents into an unsigned transaction.
//!
//! [`prepare_tx_data`] does everything that needs policy (network checks,
//! coin selection, change) and yields a [`TxData`], the offline-signing
//! interchange object. [`build_unsigned`] is then a pure conversion that an
//! offline signer can repeat from the JSON alone.

use serde::{Deserialize, Serialize};

use crate::address::decode_address;
use crate::codec::{hex_to_bytes, txid_to_wire};
use crate::error::BtcError;
use crate::fee::output_size;
use crate::network::Network;
use crate::script::{message_chunks, op_return_script};
use crate::transaction::{Transaction, TxIn, TxOut};
use crate::utxo::{select_coins, SelectionMode, SelectionTarget, Unspent};

/// Per-transaction build settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Satoshis per vbyte.
    pub fee_rate: u64,
    /// Change address; the wallet's own address when absent.
    pub leftover: Option<String>,
    /// Spend every unspent output instead of a minimal subset.
    pub combine: bool,
    /// Data to embed in OP_RETURN outputs.
    pub message: Option<String>,
    /// Treat `message` as hex instead of UTF-8 text.
    pub message_is_hex: bool,
    pub replace_by_fee: bool,
    pub version: u32,
    pub lock_time: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            fee_rate: 1,
            leftover: None,
            combine: true,
            message: None,
            message_is_hex: false,
            replace_by_fee: false,
            version: 1,
            lock_time: 0,
        }
    }
}

impl BuildOptions {
    pub fn selection_mode(&self) -> SelectionMode {
        if self.combine {
            SelectionMode::Combine
        } else {
            SelectionMode::Select
        }
    }

    fn validate(&self) -> Result<(), BtcError> {
        if !matches!(self.version, 1 | 2) {
            return Err(BtcError::TransactionBuildError(format!(
                "transaction version must be 1 or 2, got {}",
                self.version
            )));
        }
        Ok(())
    }

    fn message_bytes(&self) -> Result<Vec<u8>, BtcError> {
        match &self.message {
            None => Ok(Vec::new()),
            Some(message) if self.message_is_hex => hex_to_bytes(message),
            Some(message) => Ok(message.as_bytes().to_vec()),
        }
    }
}

/// One output as `[destination-or-hex-data, amount]`.
///
/// The first element is an address, or for zero-amount outputs the hex of an
/// OP_RETURN payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry(pub String, pub u64);

impl OutputEntry {
    pub fn destination(&self) -> &str {
        &self.0
    }

    pub fn amount(&self) -> u64 {
        self.1
    }

    /// The locking script this entry pays to.
    pub fn script_pubkey(&self) -> Result<Vec<u8>, BtcError> {
        let address_err = match decode_address(&self.0) {
            Ok(decoded) => return Ok(decoded.script_pubkey()),
            Err(e) => e,
        };
        let data = match hex::decode(&self.0) {
            Ok(data) => data,
            Err(_) => return Err(address_err),
        };
        if self.1 != 0 {
            return Err(BtcError::TransactionBuildError(format!(
                "data output must carry amount 0, got {}",
                self.1
            )));
        }
        op_return_script(&data)
    }
}

/// The offline-signing interchange object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub unspents: Vec<Unspent>,
    pub outputs: Vec<OutputEntry>,
}

impl TxData {
    pub fn to_json(&self) -> Result<String, BtcError> {
        serde_json::to_string(self)
            .map_err(|e| BtcError::InvalidEncoding(format!("failed to encode tx data: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, BtcError> {
        serde_json::from_str(json)
            .map_err(|e| BtcError::InvalidEncoding(format!("invalid tx data: {e}")))
    }
}

fn check_destination(address: &str, network: Network) -> Result<Vec<u8>, BtcError> {
    let decoded = decode_address(address)?;
    if !network.accepts(decoded.network) {
        return Err(BtcError::InvalidKeyOrAddress(format!(
            "cannot send to {} address {address} when on {network}",
            decoded.network
        )));
    }
    Ok(decoded.script_pubkey())
}

/// Validate outputs, add message outputs, select coins and add change.
///
/// `outputs` are `(address, satoshis)` payments. Change goes to
/// `options.leftover`, or `default_leftover` when unset.
pub fn prepare_tx_data(
    network: Network,
    unspents: &[Unspent],
    outputs: &[OutputEntry],
    options: &BuildOptions,
    default_leftover: &str,
) -> Result<TxData, BtcError> {
    options.validate()?;

    let mut entries = Vec::with_capacity(outputs.len() + 1);
    let mut amount: u64 = 0;
    let mut size = 0usize;
    for entry in outputs {
        let script = check_destination(entry.destination(), network)?;
        amount = amount.checked_add(entry.amount()).ok_or_else(|| {
            BtcError::TransactionBuildError("output amounts overflow".into())
        })?;
        size += output_size(script.len());
        entries.push(entry.clone());
    }

    let message = options.message_bytes()?;
    for chunk in message_chunks(&message) {
        size += output_size(op_return_script(chunk)?.len());
        entries.push(OutputEntry(hex::encode(chunk), 0));
    }

    let leftover = options.leftover.as_deref().unwrap_or(default_leftover);
    let change_script = check_destination(leftover, network)?;

    let mut candidates = unspents.to_vec();
    if options.replace_by_fee {
        candidates.iter_mut().for_each(Unspent::opt_in_for_rbf);
    }

    let target = SelectionTarget {
        amount,
        output_size: size,
        output_count: entries.len(),
        change_size: output_size(change_script.len()),
        fee_rate: options.fee_rate,
    };
    let selection = select_coins(&candidates, &target, options.selection_mode())?;

    if selection.change > 0 {
        entries.push(OutputEntry(leftover.to_string(), selection.change));
    }

    log::info!(
        "prepared transaction: {} inputs, {} outputs, fee {} sat",
        selection.selected.len(),
        entries.len(),
        selection.fee
    );

    Ok(TxData {
        unspents: selection.selected,
        outputs: entries,
    })
}

/// Build the unsigned transaction described by `tx_data`.
pub fn build_unsigned(tx_data: &TxData, version: u32, lock_time: u32) -> Result<Transaction, BtcError> {
    if tx_data.unspents.is_empty() {
        return Err(BtcError::TransactionBuildError(
            "transaction needs at least one input".into(),
        ));
    }
    if tx_data.outputs.is_empty() {
        return Err(BtcError::TransactionBuildError(
            "transaction needs at least one output".into(),
        ));
    }

    let inputs = tx_data
        .unspents
        .iter()
        .map(|unspent| {
            let mut input = TxIn::new(txid_to_wire(&unspent.txid)?, unspent.txindex);
            input.sequence = unspent.sequence;
            Ok(input)
        })
        .collect::<Result<Vec<_>, BtcError>>()?;

    let outputs = tx_data
        .outputs
        .iter()
        .map(|entry| Ok(TxOut::new(entry.amount(), entry.script_pubkey()?)))
        .collect::<Result<Vec<_>, BtcError>>()?;

    Ok(Transaction::new(version, inputs, outputs, lock_time))
}
