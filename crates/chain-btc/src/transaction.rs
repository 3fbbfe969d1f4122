//! Transaction wire model.
//!
//! Varint length prefixes are never stored; they are recomputed from the
//! script and witness contents on every serialization. The segwit marker and
//! flag are likewise derived: a transaction is segwit-encoded iff some input
//! carries a non-empty witness stack.

use crypto_utils::hash::double_sha256;

use crate::codec::{hex_to_bytes, txid_to_wire, wire_to_txid, write_varint, ByteReader};
use crate::error::BtcError;

/// Final sequence: no relative locktime, not replaceable.
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Highest sequence that still signals opt-in replace-by-fee.
pub const RBF_SEQUENCE: u32 = 0xffff_fffd;

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

/// Smallest possible input on the wire: outpoint, empty script, sequence.
const MIN_INPUT_SIZE: usize = 41;
/// Smallest possible output on the wire: amount and empty script.
const MIN_OUTPUT_SIZE: usize = 9;

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// Previous transaction id in wire (internal, little-endian) order.
    pub txid: [u8; 32],
    pub vout: u32,
    pub script_sig: Vec<u8>,
    pub witness: Vec<Vec<u8>>,
    pub sequence: u32,
}

impl TxIn {
    /// An unsigned input with the default sequence.
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        Self {
            txid,
            vout,
            script_sig: Vec::new(),
            witness: Vec::new(),
            sequence: DEFAULT_SEQUENCE,
        }
    }

    /// An unsigned input spending a display-order txid.
    pub fn from_display_txid(txid_hex: &str, vout: u32) -> Result<Self, BtcError> {
        Ok(Self::new(txid_to_wire(txid_hex)?, vout))
    }

    /// Previous txid in display (big-endian) order.
    pub fn txid_hex(&self) -> String {
        wire_to_txid(&self.txid)
    }

    /// Outpoint as committed to by signatures: txid then vout.
    pub fn outpoint(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&self.txid);
        out[32..].copy_from_slice(&self.vout.to_le_bytes());
        out
    }

    pub fn is_replaceable(&self) -> bool {
        self.sequence <= RBF_SEQUENCE
    }

    pub(crate) fn write_with_script(&self, buf: &mut Vec<u8>, script: &[u8]) {
        buf.extend_from_slice(&self.outpoint());
        write_varint(buf, script.len() as u64);
        buf.extend_from_slice(script);
        buf.extend_from_slice(&self.sequence.to_le_bytes());
    }

    fn write_witness(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.witness.len() as u64);
        for item in &self.witness {
            write_varint(buf, item.len() as u64);
            buf.extend_from_slice(item);
        }
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(amount: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            amount,
            script_pubkey,
        }
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.amount.to_le_bytes());
        write_varint(buf, self.script_pubkey.len() as u64);
        buf.extend_from_slice(&self.script_pubkey);
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf.len()
    }
}

/// A Bitcoin transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(version: u32, inputs: Vec<TxIn>, outputs: Vec<TxOut>, lock_time: u32) -> Self {
        Self {
            version,
            inputs,
            outputs,
            lock_time,
        }
    }

    pub fn is_segwit(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    /// Full wire serialization, including witness data when present.
    pub fn serialize(&self) -> Vec<u8> {
        self.encode(self.is_segwit())
    }

    /// Serialization without marker, flag or witnesses; what the txid commits to.
    pub fn serialize_legacy(&self) -> Vec<u8> {
        self.encode(false)
    }

    fn encode(&self, with_witness: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        if with_witness {
            buf.extend_from_slice(&[SEGWIT_MARKER, SEGWIT_FLAG]);
        }

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_with_script(&mut buf, &input.script_sig);
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut buf);
        }

        if with_witness {
            for input in &self.inputs {
                input.write_witness(&mut buf);
            }
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Parse a wire-format transaction. The whole buffer must be consumed.
    ///
    /// A legacy transaction with no inputs and one output starts with the
    /// same two bytes as the segwit marker and flag. When the segwit reading
    /// fails the bytes are retried as a legacy transaction, and the segwit
    /// error is reported only if that fails too.
    pub fn deserialize(data: &[u8]) -> Result<Self, BtcError> {
        let flagged = data.get(4..6) == Some(&[SEGWIT_MARKER, SEGWIT_FLAG][..]);
        if !flagged {
            return Self::parse(data, false);
        }
        Self::parse(data, true).or_else(|segwit_err| {
            Self::parse(data, false).map_err(|_| segwit_err)
        })
    }

    fn parse(data: &[u8], segwit: bool) -> Result<Self, BtcError> {
        let mut reader = ByteReader::new(data);
        let version = reader.read_u32_le()?;
        if segwit {
            reader.read_bytes(2)?;
        }

        let input_count = read_count(&mut reader, MIN_INPUT_SIZE, "input")?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let txid = reader.read_array::<32>()?;
            let vout = reader.read_u32_le()?;
            let script_sig = reader.read_var_bytes()?.to_vec();
            let sequence = reader.read_u32_le()?;
            inputs.push(TxIn {
                txid,
                vout,
                script_sig,
                witness: Vec::new(),
                sequence,
            });
        }

        let output_count = read_count(&mut reader, MIN_OUTPUT_SIZE, "output")?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let amount = reader.read_u64_le()?;
            let script_pubkey = reader.read_var_bytes()?.to_vec();
            outputs.push(TxOut {
                amount,
                script_pubkey,
            });
        }

        if segwit {
            for input in &mut inputs {
                let item_count = read_count(&mut reader, 1, "witness item")?;
                let mut witness = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    witness.push(reader.read_var_bytes()?.to_vec());
                }
                input.witness = witness;
            }
            if inputs.iter().all(|input| input.witness.is_empty()) {
                return Err(BtcError::MalformedTransaction(
                    "segwit flag set but every witness is empty".into(),
                ));
            }
        }

        let lock_time = reader.read_u32_le()?;
        if !reader.is_empty() {
            return Err(BtcError::MalformedTransaction(format!(
                "{} trailing bytes after locktime",
                reader.remaining()
            )));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn from_hex(tx_hex: &str) -> Result<Self, BtcError> {
        Self::deserialize(&hex_to_bytes(tx_hex)?)
    }

    /// Double-SHA-256 of the legacy serialization, wire order.
    pub fn txid_wire(&self) -> [u8; 32] {
        double_sha256(&self.serialize_legacy())
    }

    /// Transaction id in display (big-endian) hex.
    pub fn txid(&self) -> String {
        wire_to_txid(&self.txid_wire())
    }

    /// BIP141 weight: base size * 3 + total size.
    pub fn weight(&self) -> usize {
        self.serialize_legacy().len() * 3 + self.serialize().len()
    }

    /// Virtual size, weight / 4 rounded up.
    pub fn vsize(&self) -> usize {
        self.weight().div_ceil(4)
    }
}

/// Read an element count, refusing counts the remaining bytes cannot hold.
fn read_count(reader: &mut ByteReader<'_>, min_size: usize, what: &str) -> Result<usize, BtcError> {
    let count = reader.read_varint()?;
    let fits = usize::try_from(count)
        .ok()
        .filter(|n| n.saturating_mul(min_size) <= reader.remaining());
    fits.ok_or_else(|| {
        BtcError::MalformedTransaction(format!(
            "{what} count {count} exceeds the {} remaining bytes",
            reader.remaining()
        ))
    })
}
