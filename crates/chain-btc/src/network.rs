use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Base58 version byte for mainnet P2PKH addresses.
pub const MAIN_PUBKEY_HASH: u8 = 0x00;

/// Base58 version byte for mainnet P2SH addresses.
pub const MAIN_SCRIPT_HASH: u8 = 0x05;

/// Base58 version byte for mainnet WIF private keys.
pub const MAIN_PRIVATE_KEY: u8 = 0x80;

/// Base58 version byte for testnet (and regtest) P2PKH addresses.
pub const TEST_PUBKEY_HASH: u8 = 0x6f;

/// Base58 version byte for testnet (and regtest) P2SH addresses.
pub const TEST_SCRIPT_HASH: u8 = 0xc4;

/// Base58 version byte for testnet (and regtest) WIF private keys.
pub const TEST_PRIVATE_KEY: u8 = 0xef;

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn pubkey_hash_version(self) -> u8 {
        match self {
            Network::Mainnet => MAIN_PUBKEY_HASH,
            Network::Testnet | Network::Regtest => TEST_PUBKEY_HASH,
        }
    }

    pub fn script_hash_version(self) -> u8 {
        match self {
            Network::Mainnet => MAIN_SCRIPT_HASH,
            Network::Testnet | Network::Regtest => TEST_SCRIPT_HASH,
        }
    }

    pub fn wif_version(self) -> u8 {
        match self {
            Network::Mainnet => MAIN_PRIVATE_KEY,
            Network::Testnet | Network::Regtest => TEST_PRIVATE_KEY,
        }
    }

    /// Bech32 human-readable part.
    pub fn hrp(self) -> bech32::Hrp {
        match self {
            Network::Mainnet => bech32::hrp::BC,
            Network::Testnet => bech32::hrp::TB,
            Network::Regtest => bech32::hrp::BCRT,
        }
    }

    pub fn is_test(self) -> bool {
        !matches!(self, Network::Mainnet)
    }

    /// Whether an address decoded as `other` may be used on this network.
    ///
    /// Base58 versions cannot tell testnet from regtest, so those two accept
    /// each other's legacy addresses.
    pub fn accepts(self, other: Network) -> bool {
        self == other || (self.is_test() && other.is_test())
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

impl FromStr for Network {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(BtcError::InvalidKeyOrAddress(format!(
                "unknown network: {other}"
            ))),
        }
    }
}
