//! Signature hashes for legacy and segwit v0 (BIP143) inputs.
//!
//! Only `SIGHASH_ALL` is supported. Both paths return the double-SHA-256
//! digest that gets signed.

use crypto_utils::hash::double_sha256;

use crate::codec::write_varint;
use crate::error::BtcError;
use crate::transaction::Transaction;

pub const SIGHASH_ALL: u32 = 0x01;

/// Reject every sighash type other than `SIGHASH_ALL`.
pub fn check_sighash_type(sighash_type: u32) -> Result<(), BtcError> {
    if sighash_type == SIGHASH_ALL {
        Ok(())
    } else {
        Err(BtcError::UnsupportedSighash(sighash_type))
    }
}

/// Sighash computation over one transaction.
///
/// The BIP143 midstate hashes (prevouts, sequences, outputs) are computed
/// once and shared by every input.
#[derive(Debug)]
pub struct SighashCache<'a> {
    tx: &'a Transaction,
    hash_prevouts: [u8; 32],
    hash_sequence: [u8; 32],
    hash_outputs: [u8; 32],
}

impl<'a> SighashCache<'a> {
    pub fn new(tx: &'a Transaction) -> Self {
        let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
        let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
        for input in &tx.inputs {
            prevouts.extend_from_slice(&input.outpoint());
            sequences.extend_from_slice(&input.sequence.to_le_bytes());
        }
        let mut outputs = Vec::new();
        for output in &tx.outputs {
            output.write(&mut outputs);
        }

        Self {
            tx,
            hash_prevouts: double_sha256(&prevouts),
            hash_sequence: double_sha256(&sequences),
            hash_outputs: double_sha256(&outputs),
        }
    }

    fn check_index(&self, index: usize) -> Result<(), BtcError> {
        if index >= self.tx.inputs.len() {
            return Err(BtcError::MalformedTransaction(format!(
                "input index {index} out of range for {} inputs",
                self.tx.inputs.len()
            )));
        }
        Ok(())
    }

    /// Legacy preimage: the transaction with every scriptSig emptied except
    /// the signed input's, which becomes `script_code`, then the sighash type.
    pub fn legacy_preimage(
        &self,
        index: usize,
        script_code: &[u8],
        sighash_type: u32,
    ) -> Result<Vec<u8>, BtcError> {
        check_sighash_type(sighash_type)?;
        self.check_index(index)?;

        let tx = self.tx;
        let mut buf = Vec::new();
        buf.extend_from_slice(&tx.version.to_le_bytes());
        write_varint(&mut buf, tx.inputs.len() as u64);
        for (i, input) in tx.inputs.iter().enumerate() {
            let script: &[u8] = if i == index { script_code } else { &[] };
            input.write_with_script(&mut buf, script);
        }
        write_varint(&mut buf, tx.outputs.len() as u64);
        for output in &tx.outputs {
            output.write(&mut buf);
        }
        buf.extend_from_slice(&tx.lock_time.to_le_bytes());
        buf.extend_from_slice(&sighash_type.to_le_bytes());
        Ok(buf)
    }

    pub fn legacy_signature_hash(
        &self,
        index: usize,
        script_code: &[u8],
        sighash_type: u32,
    ) -> Result<[u8; 32], BtcError> {
        Ok(double_sha256(&self.legacy_preimage(
            index,
            script_code,
            sighash_type,
        )?))
    }

    /// BIP143 preimage for a segwit v0 input spending `amount` satoshis.
    ///
    /// `script_code` is the P2PKH script of the key hash for P2WPKH, or the
    /// witness script for P2WSH.
    pub fn segwit_preimage(
        &self,
        index: usize,
        script_code: &[u8],
        amount: u64,
        sighash_type: u32,
    ) -> Result<Vec<u8>, BtcError> {
        check_sighash_type(sighash_type)?;
        self.check_index(index)?;

        let tx = self.tx;
        let input = &tx.inputs[index];
        let mut buf = Vec::with_capacity(156 + script_code.len());
        buf.extend_from_slice(&tx.version.to_le_bytes());
        buf.extend_from_slice(&self.hash_prevouts);
        buf.extend_from_slice(&self.hash_sequence);
        buf.extend_from_slice(&input.outpoint());
        write_varint(&mut buf, script_code.len() as u64);
        buf.extend_from_slice(script_code);
        buf.extend_from_slice(&amount.to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
        buf.extend_from_slice(&self.hash_outputs);
        buf.extend_from_slice(&tx.lock_time.to_le_bytes());
        buf.extend_from_slice(&sighash_type.to_le_bytes());
        Ok(buf)
    }

    pub fn segwit_signature_hash(
        &self,
        index: usize,
        script_code: &[u8],
        amount: u64,
        sighash_type: u32,
    ) -> Result<[u8; 32], BtcError> {
        Ok(double_sha256(&self.segwit_preimage(
            index,
            script_code,
            amount,
            sighash_type,
        )?))
    }
}
