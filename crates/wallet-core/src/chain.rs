//! The blockchain backend seam: fetching unspent outputs and broadcasting.
//!
//! Network clients live outside this crate and implement [`ChainSource`].
//! [`FallbackChain`] tries several backends in order; [`MemoryChain`]
//! serves a fixed snapshot for offline use and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chain_btc::{Transaction, Unspent};

use crate::error::WalletError;

/// A backend that knows the UTXO set and relays transactions.
pub trait ChainSource {
    /// Unspent outputs locked to `address`.
    fn get_unspents(&self, address: &str) -> Result<Vec<Unspent>, WalletError>;

    /// Relay a signed transaction; returns its txid.
    fn broadcast(&self, tx_hex: &str) -> Result<String, WalletError>;

    /// Confirmed plus unconfirmed balance of `address` in satoshis.
    fn get_balance(&self, address: &str) -> Result<u64, WalletError> {
        Ok(self
            .get_unspents(address)?
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.amount)))
    }
}

/// Tries each source in order until one succeeds.
#[derive(Default)]
pub struct FallbackChain {
    sources: Vec<Box<dyn ChainSource>>,
}

impl FallbackChain {
    pub fn new(sources: Vec<Box<dyn ChainSource>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Box<dyn ChainSource>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn first_success<T>(
        &self,
        action: &str,
        call: impl Fn(&dyn ChainSource) -> Result<T, WalletError>,
    ) -> Result<T, WalletError> {
        let mut last_error = None;
        for (i, source) in self.sources.iter().enumerate() {
            match call(source.as_ref()) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!("chain source {i} failed to {action}: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(WalletError::ChainUnavailable(match last_error {
            Some(e) => format!("every source failed to {action}; last error: {e}"),
            None => "no chain sources configured".into(),
        }))
    }
}

impl ChainSource for FallbackChain {
    fn get_unspents(&self, address: &str) -> Result<Vec<Unspent>, WalletError> {
        self.first_success("fetch unspents", |s| s.get_unspents(address))
    }

    fn broadcast(&self, tx_hex: &str) -> Result<String, WalletError> {
        self.first_success("broadcast", |s| s.broadcast(tx_hex))
    }
}

/// An in-memory UTXO snapshot that records what it is asked to broadcast.
///
/// Broadcasting a transaction removes the outputs it spends.
#[derive(Default)]
pub struct MemoryChain {
    unspents: Mutex<HashMap<String, Vec<Unspent>>>,
    broadcasts: Mutex<Vec<String>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unspents(mut self, address: impl Into<String>, unspents: Vec<Unspent>) -> Self {
        if let Ok(map) = self.unspents.get_mut() {
            map.entry(address.into()).or_default().extend(unspents);
        }
        self
    }

    /// Hex of every transaction broadcast so far, oldest first.
    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }
}

fn poisoned() -> WalletError {
    WalletError::ChainUnavailable("memory chain lock poisoned".into())
}

impl ChainSource for MemoryChain {
    fn get_unspents(&self, address: &str) -> Result<Vec<Unspent>, WalletError> {
        let map = self.unspents.lock().map_err(|_| poisoned())?;
        Ok(map.get(address).cloned().unwrap_or_default())
    }

    fn broadcast(&self, tx_hex: &str) -> Result<String, WalletError> {
        let tx = Transaction::from_hex(tx_hex)?;
        let mut map = self.unspents.lock().map_err(|_| poisoned())?;
        for input in &tx.inputs {
            let txid = input.txid_hex();
            for unspents in map.values_mut() {
                unspents.retain(|u| !u.spends(&txid, input.vout));
            }
        }
        self.broadcasts
            .lock()
            .map_err(|_| poisoned())?
            .push(tx_hex.to_ascii_lowercase());
        Ok(tx.txid())
    }
}
