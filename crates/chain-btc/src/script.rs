//! Locking scripts, OP_RETURN payloads and multisig redeem scripts.

use std::collections::BTreeSet;

use crypto_utils::hash::{hash160, sha256};

use crate::codec::{push_data, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4};
use crate::curve::{check_public_key_len, COMPRESSED_PUBKEY_LEN};
use crate::error::BtcError;

pub const OP_0: u8 = 0x00;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Maximum payload of a single OP_RETURN output.
pub const MESSAGE_LIMIT: usize = 80;

/// Consensus cap on a P2SH redeem script.
pub const MAX_REDEEM_SCRIPT_SIZE: usize = 520;

/// Largest key count a standard CHECKMULTISIG redeem script may carry.
pub const MAX_MULTISIG_KEYS: usize = 16;

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `OP_HASH160 <hash> OP_EQUAL`
pub fn p2sh_script(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, 20]);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// `<version> <push program>` for a witness program of any version.
pub fn segwit_script(version: u8, program: &[u8]) -> Result<Vec<u8>, BtcError> {
    let version_op = match version {
        0 => OP_0,
        1..=16 => OP_1 + version - 1,
        other => {
            return Err(BtcError::InvalidKeyOrAddress(format!(
                "witness version {other} is out of range"
            )))
        }
    };
    if !(2..=40).contains(&program.len()) {
        return Err(BtcError::InvalidKeyOrAddress(format!(
            "witness program of {} bytes is out of range",
            program.len()
        )));
    }
    let mut script = Vec::with_capacity(program.len() + 2);
    script.push(version_op);
    script.extend_from_slice(&push_data(program));
    Ok(script)
}

/// `OP_0 <20-byte hash>`; also the redeem program of nested P2WKH.
pub fn p2wpkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.extend_from_slice(&[OP_0, 20]);
    script.extend_from_slice(pubkey_hash);
    script
}

/// `OP_0 <32-byte hash>`; also the redeem program of nested P2WSH.
pub fn p2wsh_script(script_hash: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.extend_from_slice(&[OP_0, 32]);
    script.extend_from_slice(script_hash);
    script
}

/// `OP_RETURN <push data>`; a single chunk of at most `MESSAGE_LIMIT` bytes.
pub fn op_return_script(data: &[u8]) -> Result<Vec<u8>, BtcError> {
    if data.len() > MESSAGE_LIMIT {
        return Err(BtcError::ScriptLimitExceeded(format!(
            "OP_RETURN data is {} bytes, limit is {MESSAGE_LIMIT}",
            data.len()
        )));
    }
    let mut script = Vec::with_capacity(data.len() + 3);
    script.push(OP_RETURN);
    script.extend_from_slice(&push_data(data));
    Ok(script)
}

/// Split a message into OP_RETURN-sized pieces. An empty message yields none.
pub fn message_chunks(message: &[u8]) -> Vec<&[u8]> {
    message.chunks(MESSAGE_LIMIT).collect()
}

/// One element of a parsed script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptElement<'a> {
    Op(u8),
    Push(&'a [u8]),
}

/// Split a script into opcodes and data pushes.
///
/// `OP_0` is reported as an empty push, the way the interpreter treats it.
pub fn parse_script(script: &[u8]) -> Result<Vec<ScriptElement<'_>>, BtcError> {
    let mut elements = Vec::new();
    let mut pos = 0;
    while pos < script.len() {
        let op = script[pos];
        pos += 1;
        let len = match op {
            OP_0 => {
                elements.push(ScriptElement::Push(&[]));
                continue;
            }
            0x01..=0x4b => op as usize,
            OP_PUSHDATA1 => read_len(script, &mut pos, 1)?,
            OP_PUSHDATA2 => read_len(script, &mut pos, 2)?,
            OP_PUSHDATA4 => read_len(script, &mut pos, 4)?,
            _ => {
                elements.push(ScriptElement::Op(op));
                continue;
            }
        };
        let end = pos
            .checked_add(len)
            .filter(|end| *end <= script.len())
            .ok_or_else(|| {
                BtcError::MalformedTransaction(format!(
                    "script push of {len} bytes at offset {pos} runs past the end"
                ))
            })?;
        elements.push(ScriptElement::Push(&script[pos..end]));
        pos = end;
    }
    Ok(elements)
}

fn read_len(script: &[u8], pos: &mut usize, width: usize) -> Result<usize, BtcError> {
    let bytes = script.get(*pos..*pos + width).ok_or_else(|| {
        BtcError::MalformedTransaction("truncated OP_PUSHDATA length".into())
    })?;
    *pos += width;
    let mut le = [0u8; 4];
    le[..width].copy_from_slice(bytes);
    Ok(u32::from_le_bytes(le) as usize)
}

/// An m-of-n CHECKMULTISIG redeem script.
///
/// Key order is significant: it fixes the script bytes, hence the address,
/// and the order signatures must appear in when spending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemScript {
    public_keys: Vec<Vec<u8>>,
    required: usize,
    script: Vec<u8>,
}

impl RedeemScript {
    /// Build from keys in caller order.
    pub fn new(public_keys: Vec<Vec<u8>>, required: usize) -> Result<Self, BtcError> {
        let total = public_keys.len();
        if total == 0 || total > MAX_MULTISIG_KEYS {
            return Err(BtcError::ScriptLimitExceeded(format!(
                "multisig needs between 1 and {MAX_MULTISIG_KEYS} keys, got {total}"
            )));
        }
        if required == 0 || required > total {
            return Err(BtcError::ScriptLimitExceeded(format!(
                "required signatures must be between 1 and {total}, got {required}"
            )));
        }
        for key in &public_keys {
            check_public_key_len(key)?;
        }

        let mut script = vec![OP_1 + required as u8 - 1];
        for key in &public_keys {
            script.extend_from_slice(&push_data(key));
        }
        script.push(OP_1 + total as u8 - 1);
        script.push(OP_CHECKMULTISIG);

        if script.len() > MAX_REDEEM_SCRIPT_SIZE {
            return Err(BtcError::ScriptLimitExceeded(format!(
                "redeem script is {} bytes, limit is {MAX_REDEEM_SCRIPT_SIZE}",
                script.len()
            )));
        }

        Ok(Self {
            public_keys,
            required,
            script,
        })
    }

    /// Build from an unordered key set; keys are scripted in byte order.
    pub fn from_key_set(public_keys: &BTreeSet<Vec<u8>>, required: usize) -> Result<Self, BtcError> {
        Self::new(public_keys.iter().cloned().collect(), required)
    }

    /// Parse `OP_m <key>... OP_n OP_CHECKMULTISIG`.
    pub fn parse(script: &[u8]) -> Result<Self, BtcError> {
        let not_multisig =
            || BtcError::InvalidKeyOrAddress("script is not an m-of-n multisig script".into());
        let elements = parse_script(script)?;
        let (first, rest) = elements.split_first().ok_or_else(not_multisig)?;
        let (last, rest) = rest.split_last().ok_or_else(not_multisig)?;
        let (count, keys) = rest.split_last().ok_or_else(not_multisig)?;

        let small_int = |element: &ScriptElement<'_>| match element {
            ScriptElement::Op(op) if (OP_1..=OP_16).contains(op) => Some((op - OP_1 + 1) as usize),
            _ => None,
        };
        let required = small_int(first).ok_or_else(not_multisig)?;
        let total = small_int(count).ok_or_else(not_multisig)?;
        if *last != ScriptElement::Op(OP_CHECKMULTISIG) || keys.len() != total {
            return Err(not_multisig());
        }

        let public_keys = keys
            .iter()
            .map(|element| match element {
                ScriptElement::Push(key) => Ok(key.to_vec()),
                ScriptElement::Op(_) => Err(not_multisig()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let parsed = Self::new(public_keys, required)?;
        if parsed.script != script {
            return Err(BtcError::InvalidKeyOrAddress(
                "multisig script does not use minimal pushes".into(),
            ));
        }
        Ok(parsed)
    }

    pub fn public_keys(&self) -> &[Vec<u8>] {
        &self.public_keys
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.script
    }

    /// Whether the script may be used as a segwit v0 witness script, which
    /// requires every key to be compressed.
    pub fn is_witness_compatible(&self) -> bool {
        self.public_keys
            .iter()
            .all(|key| key.len() == COMPRESSED_PUBKEY_LEN)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.script)
    }

    /// HASH160 of the script, committed to by P2SH.
    pub fn script_hash(&self) -> [u8; 20] {
        hash160(&self.script)
    }

    /// SHA-256 of the script, committed to by P2WSH.
    pub fn witness_script_hash(&self) -> [u8; 32] {
        sha256(&self.script)
    }

    pub fn p2sh_script_pubkey(&self) -> Vec<u8> {
        p2sh_script(&self.script_hash())
    }

    pub fn p2wsh_script_pubkey(&self) -> Vec<u8> {
        p2wsh_script(&self.witness_script_hash())
    }

    /// Locking script of the P2SH output that wraps the P2WSH program.
    pub fn np2wsh_script_pubkey(&self) -> Vec<u8> {
        p2sh_script(&hash160(&self.p2wsh_script_pubkey()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K1: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const K2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
    const K3: &str = "02f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

    fn keys() -> Vec<Vec<u8>> {
        [K1, K2, K3].iter().map(|k| hex::decode(k).unwrap()).collect()
    }

    #[test]
    fn p2pkh_layout() {
        let hash = [0x11; 20];
        let script = p2pkh_script(&hash);
        assert_eq!(
            hex::encode(script),
            format!("76a914{}88ac", "11".repeat(20))
        );
    }

    #[test]
    fn p2sh_layout() {
        let script = p2sh_script(&[0x22; 20]);
        assert_eq!(hex::encode(script), format!("a914{}87", "22".repeat(20)));
    }

    #[test]
    fn segwit_v0_programs() {
        assert_eq!(
            segwit_script(0, &[0x33; 20]).unwrap(),
            p2wpkh_script(&[0x33; 20])
        );
        assert_eq!(
            segwit_script(0, &[0x44; 32]).unwrap(),
            p2wsh_script(&[0x44; 32])
        );
        assert_eq!(segwit_script(1, &[0x55; 32]).unwrap()[0], OP_1);
        assert!(segwit_script(17, &[0x55; 32]).is_err());
        assert!(segwit_script(0, &[0x55; 1]).is_err());
    }

    #[test]
    fn op_return_short_and_long_pushes() {
        assert_eq!(hex::encode(op_return_script(b"hi").unwrap()), "6a026869");
        let script = op_return_script(&[0xab; MESSAGE_LIMIT]).unwrap();
        assert_eq!(&script[..3], &[OP_RETURN, OP_PUSHDATA1, 80]);
        assert_eq!(script.len(), 83);
    }

    #[test]
    fn op_return_rejects_oversized_chunk() {
        let err = op_return_script(&[0; MESSAGE_LIMIT + 1]).unwrap_err();
        assert!(matches!(err, BtcError::ScriptLimitExceeded(_)));
    }

    #[test]
    fn message_chunking() {
        assert!(message_chunks(b"").is_empty());
        let long = vec![b'x'; 2 * MESSAGE_LIMIT + 5];
        let chunks = message_chunks(&long);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MESSAGE_LIMIT);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn parse_script_reads_pushes_and_ops() {
        let mut script = vec![OP_0, 0x02, 0xaa, 0xbb, OP_PUSHDATA1, 0x01, 0xcc, OP_CHECKSIG];
        script.extend_from_slice(&[OP_PUSHDATA2, 0x01, 0x00, 0xdd]);
        let elements = parse_script(&script).unwrap();
        assert_eq!(
            elements,
            vec![
                ScriptElement::Push(&[]),
                ScriptElement::Push(&[0xaa, 0xbb]),
                ScriptElement::Push(&[0xcc]),
                ScriptElement::Op(OP_CHECKSIG),
                ScriptElement::Push(&[0xdd]),
            ]
        );
    }

    #[test]
    fn parse_script_rejects_truncated_push() {
        assert!(parse_script(&[0x05, 0x01, 0x02]).is_err());
        assert!(parse_script(&[OP_PUSHDATA2, 0x01]).is_err());
    }

    #[test]
    fn two_of_three_redeem_script() {
        let redeem = RedeemScript::new(keys(), 2).unwrap();
        assert_eq!(
            redeem.to_hex(),
            format!("5221{K1}21{K2}21{K3}53ae")
        );
        assert_eq!(redeem.as_bytes().len(), 105);
        assert_eq!(redeem.required(), 2);
        assert_eq!(redeem.public_keys().len(), 3);
    }

    #[test]
    fn key_set_is_sorted() {
        let mut reversed = keys();
        reversed.reverse();
        let set: BTreeSet<Vec<u8>> = reversed.iter().cloned().collect();
        let from_set = RedeemScript::from_key_set(&set, 2).unwrap();
        assert_eq!(from_set, RedeemScript::new(keys(), 2).unwrap());
        assert_ne!(from_set, RedeemScript::new(reversed, 2).unwrap());
    }

    #[test]
    fn parse_roundtrip() {
        let redeem = RedeemScript::new(keys(), 2).unwrap();
        let parsed = RedeemScript::parse(redeem.as_bytes()).unwrap();
        assert_eq!(parsed, redeem);
    }

    #[test]
    fn parse_rejects_non_multisig() {
        assert!(RedeemScript::parse(&p2pkh_script(&[0; 20])).is_err());
        assert!(RedeemScript::parse(&[]).is_err());
        let mut wrong_count = RedeemScript::new(keys(), 2).unwrap().as_bytes().to_vec();
        let n = wrong_count.len() - 2;
        wrong_count[n] = OP_1 + 1;
        assert!(RedeemScript::parse(&wrong_count).is_err());
    }

    #[test]
    fn threshold_above_key_count_is_rejected() {
        let err = RedeemScript::new(keys(), 4).unwrap_err();
        assert!(matches!(err, BtcError::ScriptLimitExceeded(_)));
        let err = RedeemScript::new(keys(), 0).unwrap_err();
        assert!(matches!(err, BtcError::ScriptLimitExceeded(_)));
    }

    #[test]
    fn oversized_script_is_rejected() {
        // 16 compressed keys: 3 + 16 * 34 = 547 bytes.
        let many = vec![hex::decode(K1).unwrap(); 16];
        let err = RedeemScript::new(many, 1).unwrap_err();
        assert!(matches!(err, BtcError::ScriptLimitExceeded(_)));

        let fifteen = vec![hex::decode(K1).unwrap(); 15];
        assert_eq!(RedeemScript::new(fifteen, 1).unwrap().as_bytes().len(), 513);
    }

    #[test]
    fn too_many_keys_is_rejected() {
        let many = vec![hex::decode(K1).unwrap(); 17];
        assert!(matches!(
            RedeemScript::new(many, 1).unwrap_err(),
            BtcError::ScriptLimitExceeded(_)
        ));
    }

    #[test]
    fn bad_key_length_is_rejected() {
        let err = RedeemScript::new(vec![vec![0x02; 32]], 1).unwrap_err();
        assert!(matches!(err, BtcError::InvalidKeyOrAddress(_)));
    }

    #[test]
    fn script_hashes() {
        let redeem = RedeemScript::new(keys(), 2).unwrap();
        assert_eq!(redeem.script_hash(), hash160(redeem.as_bytes()));
        assert_eq!(redeem.witness_script_hash(), sha256(redeem.as_bytes()));
        assert_eq!(redeem.p2wsh_script_pubkey()[..2], [OP_0, 32]);
        assert_eq!(redeem.np2wsh_script_pubkey()[0], OP_HASH160);
    }
}
