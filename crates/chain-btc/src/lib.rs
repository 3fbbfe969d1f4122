//! Bitcoin transaction construction, encoding and signing.
//!
//! Covers legacy P2PKH, P2SH multisig and segwit v0 (native and nested)
//! spends: address and WIF codecs, script templates, wire serialization,
//! legacy and BIP143 signature hashes, coin selection with fee estimation,
//! and a signer that assembles scriptSigs and witnesses.

pub mod address;
pub mod builder;
pub mod codec;
pub mod curve;
pub mod error;
pub mod fee;
pub mod network;
pub mod script;
pub mod sighash;
pub mod signer;
pub mod transaction;
pub mod utxo;

pub use address::{AddressKind, DecodedAddress};
pub use builder::{build_unsigned, prepare_tx_data, BuildOptions, OutputEntry, TxData};
pub use error::BtcError;
pub use network::Network;
pub use script::RedeemScript;
pub use signer::{sign_tx, SignOutcome, Signer};
pub use transaction::{Transaction, TxIn, TxOut};
pub use utxo::{select_coins, CoinSelection, SelectionMode, SelectionTarget, Unspent, UnspentType};
