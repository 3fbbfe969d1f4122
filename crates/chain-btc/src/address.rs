//! Address and WIF encoding.
//!
//! Base58Check addresses carry a one-byte version that fixes both the
//! network and whether the hash is of a public key or a script. Bech32
//! addresses carry the network in their human-readable part and the kind in
//! the witness program length.

use bech32::{segwit, Hrp};
use crypto_utils::hash::{hash160, sha256};
use crypto_utils::SecretKey;
use zeroize::Zeroizing;

use crate::codec::{b58decode_check, b58encode_check};
use crate::curve::{check_public_key_len, COMPRESSED_PUBKEY_LEN};
use crate::error::BtcError;
use crate::network::{
    Network, MAIN_PRIVATE_KEY, MAIN_PUBKEY_HASH, MAIN_SCRIPT_HASH, TEST_PRIVATE_KEY,
    TEST_PUBKEY_HASH, TEST_SCRIPT_HASH,
};
use crate::script::{p2pkh_script, p2sh_script, p2wpkh_script, p2wsh_script, RedeemScript};

/// Suffix byte marking a WIF key whose public key is compressed.
const WIF_COMPRESSED_FLAG: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
}

/// An address split into what it commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub network: Network,
    pub kind: AddressKind,
    /// 20 bytes, or 32 for P2WSH.
    pub hash: Vec<u8>,
}

impl DecodedAddress {
    /// The locking script an output paying this address carries.
    pub fn script_pubkey(&self) -> Vec<u8> {
        match self.kind {
            AddressKind::P2pkh => p2pkh_script(&to_hash20(&self.hash)),
            AddressKind::P2sh => p2sh_script(&to_hash20(&self.hash)),
            AddressKind::P2wpkh => p2wpkh_script(&to_hash20(&self.hash)),
            AddressKind::P2wsh => {
                let mut program = [0u8; 32];
                program.copy_from_slice(&self.hash);
                p2wsh_script(&program)
            }
        }
    }
}

fn to_hash20(hash: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(hash);
    out
}

fn is_bech32_candidate(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    ["bc1", "tb1", "bcrt1"].iter().any(|p| lower.starts_with(p))
}

/// Decode a Base58Check or Bech32 (witness v0) address.
pub fn decode_address(address: &str) -> Result<DecodedAddress, BtcError> {
    if is_bech32_candidate(address) {
        return decode_segwit(address);
    }

    let payload = b58decode_check(address)?;
    if payload.len() != 21 {
        return Err(BtcError::InvalidKeyOrAddress(format!(
            "address payload must be 21 bytes, got {}",
            payload.len()
        )));
    }
    let (network, kind) = match payload[0] {
        MAIN_PUBKEY_HASH => (Network::Mainnet, AddressKind::P2pkh),
        MAIN_SCRIPT_HASH => (Network::Mainnet, AddressKind::P2sh),
        TEST_PUBKEY_HASH => (Network::Testnet, AddressKind::P2pkh),
        TEST_SCRIPT_HASH => (Network::Testnet, AddressKind::P2sh),
        other => {
            return Err(BtcError::InvalidKeyOrAddress(format!(
                "{address} has unknown version byte {other:#04x}"
            )))
        }
    };
    Ok(DecodedAddress {
        network,
        kind,
        hash: payload[1..].to_vec(),
    })
}

fn decode_segwit(address: &str) -> Result<DecodedAddress, BtcError> {
    let (hrp, version, program) = segwit::decode(address)
        .map_err(|e| BtcError::InvalidEncoding(format!("invalid bech32 address: {e}")))?;

    let network = if hrp == bech32::hrp::BC {
        Network::Mainnet
    } else if hrp == bech32::hrp::TB {
        Network::Testnet
    } else if hrp == bech32::hrp::BCRT {
        Network::Regtest
    } else {
        return Err(BtcError::InvalidKeyOrAddress(format!(
            "unknown bech32 prefix {hrp}"
        )));
    };

    if version.to_u8() != 0 {
        return Err(BtcError::InvalidKeyOrAddress(format!(
            "witness version {} is not supported",
            version.to_u8()
        )));
    }
    let kind = match program.len() {
        20 => AddressKind::P2wpkh,
        32 => AddressKind::P2wsh,
        other => {
            return Err(BtcError::InvalidKeyOrAddress(format!(
                "witness v0 program must be 20 or 32 bytes, got {other}"
            )))
        }
    };
    Ok(DecodedAddress {
        network,
        kind,
        hash: program,
    })
}

/// The network an address belongs to.
pub fn get_version(address: &str) -> Result<Network, BtcError> {
    Ok(decode_address(address)?.network)
}

/// The 20-byte hash inside a P2PKH, P2SH or P2WPKH address.
pub fn address_to_public_key_hash(address: &str) -> Result<[u8; 20], BtcError> {
    let decoded = decode_address(address)?;
    if decoded.hash.len() != 20 {
        return Err(BtcError::InvalidKeyOrAddress(format!(
            "{address} does not carry a 20-byte hash"
        )));
    }
    Ok(to_hash20(&decoded.hash))
}

pub fn address_to_scriptpubkey(address: &str) -> Result<Vec<u8>, BtcError> {
    Ok(decode_address(address)?.script_pubkey())
}

/// Base58Check P2PKH address of a 33- or 65-byte public key.
pub fn public_key_to_address(public_key: &[u8], network: Network) -> Result<String, BtcError> {
    check_public_key_len(public_key)?;
    Ok(hash_to_base58(network.pubkey_hash_version(), &hash160(public_key)))
}

fn hash_to_base58(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    b58encode_check(&payload)
}

fn require_compressed(public_key: &[u8]) -> Result<(), BtcError> {
    check_public_key_len(public_key)?;
    if public_key.len() != COMPRESSED_PUBKEY_LEN {
        return Err(BtcError::InvalidKeyOrAddress(
            "segwit addresses require a compressed public key".into(),
        ));
    }
    Ok(())
}

/// P2SH-wrapped P2WKH address (`3...` / `2...`).
pub fn public_key_to_segwit_address(
    public_key: &[u8],
    network: Network,
) -> Result<String, BtcError> {
    require_compressed(public_key)?;
    let redeem_program = p2wpkh_script(&hash160(public_key));
    Ok(hash_to_base58(
        network.script_hash_version(),
        &hash160(&redeem_program),
    ))
}

/// Native P2WKH bech32 address (`bc1q...`).
pub fn public_key_to_native_segwit_address(
    public_key: &[u8],
    network: Network,
) -> Result<String, BtcError> {
    require_compressed(public_key)?;
    encode_segwit_v0(network, &hash160(public_key))
}

fn encode_segwit_v0(network: Network, program: &[u8]) -> Result<String, BtcError> {
    let hrp: Hrp = network.hrp();
    segwit::encode_v0(hrp, program)
        .map_err(|e| BtcError::InvalidEncoding(format!("bech32 encoding failed: {e}")))
}

/// P2SH address of a multisig redeem script.
pub fn multisig_to_address(redeem: &RedeemScript, network: Network) -> String {
    hash_to_base58(network.script_hash_version(), &redeem.script_hash())
}

/// P2SH-wrapped P2WSH address of a multisig redeem script.
pub fn multisig_to_segwit_address(
    redeem: &RedeemScript,
    network: Network,
) -> Result<String, BtcError> {
    require_witness_script(redeem)?;
    Ok(hash_to_base58(
        network.script_hash_version(),
        &hash160(&redeem.p2wsh_script_pubkey()),
    ))
}

/// Native P2WSH bech32 address of a multisig redeem script.
pub fn multisig_to_native_segwit_address(
    redeem: &RedeemScript,
    network: Network,
) -> Result<String, BtcError> {
    require_witness_script(redeem)?;
    encode_segwit_v0(network, &sha256(redeem.as_bytes()))
}

fn require_witness_script(redeem: &RedeemScript) -> Result<(), BtcError> {
    if !redeem.is_witness_compatible() {
        return Err(BtcError::InvalidKeyOrAddress(
            "segwit addresses require every multisig key to be compressed".into(),
        ));
    }
    Ok(())
}

/// A private key recovered from WIF together with its metadata.
#[derive(Debug, Clone)]
pub struct DecodedWif {
    pub secret: SecretKey,
    pub compressed: bool,
    pub network: Network,
}

/// Encode a private key as WIF.
pub fn bytes_to_wif(secret: &SecretKey, network: Network, compressed: bool) -> String {
    let mut payload = Zeroizing::new(Vec::with_capacity(34));
    payload.push(network.wif_version());
    payload.extend_from_slice(secret.as_bytes());
    if compressed {
        payload.push(WIF_COMPRESSED_FLAG);
    }
    b58encode_check(&payload)
}

/// Decode a WIF key. 33-byte payloads are uncompressed (51 characters);
/// 34-byte payloads ending in 0x01 are compressed (52 characters).
pub fn wif_to_bytes(wif: &str) -> Result<DecodedWif, BtcError> {
    let payload = Zeroizing::new(b58decode_check(wif)?);
    let network = match payload.first() {
        Some(&MAIN_PRIVATE_KEY) => Network::Mainnet,
        Some(&TEST_PRIVATE_KEY) => Network::Testnet,
        Some(other) => {
            return Err(BtcError::InvalidKeyOrAddress(format!(
                "unknown WIF version byte {other:#04x}"
            )))
        }
        None => return Err(BtcError::InvalidKeyOrAddress("empty WIF payload".into())),
    };
    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == WIF_COMPRESSED_FLAG => true,
        34 => {
            return Err(BtcError::InvalidKeyOrAddress(format!(
                "WIF compression flag must be 0x01, got {:#04x}",
                payload[33]
            )))
        }
        other => {
            return Err(BtcError::InvalidKeyOrAddress(format!(
                "WIF payload must be 33 or 34 bytes, got {other}"
            )))
        }
    };
    let secret = SecretKey::from_bytes(&payload[1..33])?;
    Ok(DecodedWif {
        secret,
        compressed,
        network,
    })
}

/// Whether `wif` is Base58Check with a matching checksum and a WIF version.
pub fn wif_checksum_check(wif: &str) -> bool {
    match b58decode_check(wif) {
        Ok(payload) => {
            let payload = Zeroizing::new(payload);
            matches!(payload.first(), Some(&MAIN_PRIVATE_KEY) | Some(&TEST_PRIVATE_KEY))
        }
        Err(_) => false,
    }
}
