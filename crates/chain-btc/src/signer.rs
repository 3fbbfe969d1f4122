//! Input signing and scriptSig / witness assembly.
//!
//! Signing runs in two passes: every digest is computed against the
//! transaction as it stands, then signatures are produced and written back.
//! Neither legacy nor BIP143 digests cover the unlocking data of any input,
//! so writing one input never changes another input's digest.

use crypto_utils::hash::hash160;
use crypto_utils::{Crypto, SecretKey};

use crate::codec::push_data;
use crate::curve::COMPRESSED_PUBKEY_LEN;
use crate::error::BtcError;
use crate::script::{
    p2pkh_script, p2sh_script, p2wpkh_script, parse_script, RedeemScript, ScriptElement, OP_0,
};
use crate::sighash::{SighashCache, SIGHASH_ALL};
use crate::transaction::Transaction;
use crate::utxo::{Unspent, UnspentType};

/// The key material signing a transaction.
#[derive(Debug, Clone)]
pub enum Signer<'a> {
    SingleKey {
        secret: &'a SecretKey,
        public_key: Vec<u8>,
    },
    MultiSig {
        secret: &'a SecretKey,
        public_key: Vec<u8>,
        redeem_script: &'a RedeemScript,
    },
}

impl<'a> Signer<'a> {
    pub fn single_key<C: Crypto>(
        crypto: &C,
        secret: &'a SecretKey,
        compressed: bool,
    ) -> Result<Self, BtcError> {
        Ok(Signer::SingleKey {
            secret,
            public_key: crypto.public_key(secret, compressed)?,
        })
    }

    /// A co-signer of `redeem_script`. The secret's public key must appear
    /// in the script, in either encoding.
    pub fn multisig<C: Crypto>(
        crypto: &C,
        secret: &'a SecretKey,
        redeem_script: &'a RedeemScript,
    ) -> Result<Self, BtcError> {
        for compressed in [true, false] {
            let public_key = crypto.public_key(secret, compressed)?;
            if redeem_script.public_keys().contains(&public_key) {
                return Ok(Signer::MultiSig {
                    secret,
                    public_key,
                    redeem_script,
                });
            }
        }
        Err(BtcError::InvalidKeyOrAddress(
            "private key is not part of the multisig redeem script".into(),
        ))
    }

    pub fn public_key(&self) -> &[u8] {
        match self {
            Signer::SingleKey { public_key, .. } | Signer::MultiSig { public_key, .. } => {
                public_key
            }
        }
    }

    fn secret(&self) -> &SecretKey {
        match self {
            Signer::SingleKey { secret, .. } | Signer::MultiSig { secret, .. } => secret,
        }
    }

    /// Kinds this signer can spend, in inference order.
    fn spendable_kinds(&self) -> &'static [UnspentType] {
        match self {
            Signer::SingleKey { .. } => &[
                UnspentType::P2pkh,
                UnspentType::P2pkhUncompressed,
                UnspentType::Np2wkh,
                UnspentType::P2wkh,
            ],
            Signer::MultiSig { .. } => &[UnspentType::P2sh, UnspentType::Np2wsh, UnspentType::P2wsh],
        }
    }

    /// The locking script this signer controls for `kind`, if any.
    fn locking_script(&self, kind: UnspentType) -> Option<Vec<u8>> {
        match (self, kind) {
            (Signer::SingleKey { public_key, .. }, UnspentType::P2pkh)
                if public_key.len() == COMPRESSED_PUBKEY_LEN =>
            {
                Some(p2pkh_script(&hash160(public_key)))
            }
            (Signer::SingleKey { public_key, .. }, UnspentType::P2pkhUncompressed)
                if public_key.len() != COMPRESSED_PUBKEY_LEN =>
            {
                Some(p2pkh_script(&hash160(public_key)))
            }
            (Signer::SingleKey { public_key, .. }, UnspentType::Np2wkh)
                if public_key.len() == COMPRESSED_PUBKEY_LEN =>
            {
                Some(p2sh_script(&hash160(&p2wpkh_script(&hash160(public_key)))))
            }
            (Signer::SingleKey { public_key, .. }, UnspentType::P2wkh)
                if public_key.len() == COMPRESSED_PUBKEY_LEN =>
            {
                Some(p2wpkh_script(&hash160(public_key)))
            }
            (Signer::MultiSig { redeem_script, .. }, UnspentType::P2sh) => {
                Some(redeem_script.p2sh_script_pubkey())
            }
            (Signer::MultiSig { redeem_script, .. }, UnspentType::Np2wsh)
                if redeem_script.is_witness_compatible() =>
            {
                Some(redeem_script.np2wsh_script_pubkey())
            }
            (Signer::MultiSig { redeem_script, .. }, UnspentType::P2wsh)
                if redeem_script.is_witness_compatible() =>
            {
                Some(redeem_script.p2wsh_script_pubkey())
            }
            _ => None,
        }
    }

    /// How to spend `unspent`, or `None` when it is not ours.
    ///
    /// A tagged output must match the tag's locking script; an untagged one
    /// is matched against every kind this signer can spend.
    fn resolve(&self, unspent: &Unspent) -> Option<UnspentType> {
        let owned = |kind: UnspentType| {
            self.locking_script(kind).as_deref() == Some(unspent.script_pubkey.as_slice())
        };
        match unspent.kind() {
            UnspentType::Unknown => {
                let script = unspent.script_pubkey.as_slice();
                self.spendable_kinds()
                    .iter()
                    .copied()
                    .filter(|kind| match kind {
                        UnspentType::P2pkh | UnspentType::P2pkhUncompressed => {
                            UnspentType::is_p2pkh_script(script)
                        }
                        UnspentType::P2sh | UnspentType::Np2wkh | UnspentType::Np2wsh => {
                            UnspentType::is_p2sh_script(script)
                        }
                        _ => true,
                    })
                    .find(|kind| owned(*kind))
            }
            // A P2PKH tag does not pin compression; accept either encoding.
            UnspentType::P2pkh | UnspentType::P2pkhUncompressed => [
                UnspentType::P2pkh,
                UnspentType::P2pkhUncompressed,
            ]
            .into_iter()
            .find(|k| owned(*k)),
            kind => Some(kind).filter(|k| owned(*k)),
        }
    }

    /// Script code committed to by the signature.
    fn script_code(&self, kind: UnspentType) -> Vec<u8> {
        match self {
            Signer::SingleKey { public_key, .. } => p2pkh_script(&hash160(public_key)),
            Signer::MultiSig { redeem_script, .. } => {
                debug_assert!(matches!(
                    kind,
                    UnspentType::P2sh | UnspentType::Np2wsh | UnspentType::P2wsh
                ));
                redeem_script.as_bytes().to_vec()
            }
        }
    }
}

/// Which inputs a signing pass touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOutcome {
    pub signed: Vec<usize>,
    pub skipped: Vec<usize>,
}

struct PendingInput {
    index: usize,
    kind: UnspentType,
    digest: [u8; 32],
}

/// Sign every input of `tx` that `signer` controls.
///
/// `unspents` supplies amounts and locking scripts for the inputs; inputs
/// with no matching unspent, or whose output belongs to someone else, are
/// left untouched and reported as skipped.
pub fn sign_tx<C: Crypto>(
    crypto: &C,
    signer: &Signer<'_>,
    tx: &mut Transaction,
    unspents: &[Unspent],
) -> Result<SignOutcome, BtcError> {
    let mut outcome = SignOutcome::default();
    let mut pending = Vec::new();

    {
        let cache = SighashCache::new(tx);
        for (index, input) in tx.inputs.iter().enumerate() {
            let txid = input.txid_hex();
            let owned = unspents
                .iter()
                .find(|u| u.spends(&txid, input.vout))
                .and_then(|u| signer.resolve(u).map(|kind| (u, kind)));
            let Some((unspent, kind)) = owned else {
                log::debug!("input {index} ({txid}:{}) is not ours, skipping", input.vout);
                outcome.skipped.push(index);
                continue;
            };

            let script_code = signer.script_code(kind);
            let digest = if kind.is_segwit() {
                cache.segwit_signature_hash(index, &script_code, unspent.amount, SIGHASH_ALL)?
            } else {
                cache.legacy_signature_hash(index, &script_code, SIGHASH_ALL)?
            };
            pending.push(PendingInput {
                index,
                kind,
                digest,
            });
        }
    }

    // Nothing is written until every input has been assembled, so an error
    // on any input leaves the transaction as it was passed in.
    let mut staged = Vec::with_capacity(pending.len());
    for PendingInput {
        index,
        kind,
        digest,
    } in pending
    {
        let mut signature = crypto.sign_digest(signer.secret(), &digest)?;
        signature.push(SIGHASH_ALL as u8);

        let unlocking = match signer {
            Signer::SingleKey { public_key, .. } => {
                assemble_single(kind, signature, public_key)
            }
            Signer::MultiSig {
                public_key,
                redeem_script,
                ..
            } => assemble_multisig(
                crypto,
                tx,
                index,
                kind,
                &digest,
                (public_key.as_slice(), signature),
                redeem_script,
            )?,
        };
        staged.push((index, unlocking));
    }

    for (index, unlocking) in staged {
        let input = &mut tx.inputs[index];
        input.script_sig = unlocking.script_sig;
        input.witness = unlocking.witness;
        outcome.signed.push(index);
    }

    if !outcome.skipped.is_empty() {
        log::info!(
            "signed {} inputs, skipped {} not controlled by this key",
            outcome.signed.len(),
            outcome.skipped.len()
        );
    }
    Ok(outcome)
}

/// The scriptSig and witness that replace an input's unlocking data.
struct Unlocking {
    script_sig: Vec<u8>,
    witness: Vec<Vec<u8>>,
}

fn assemble_single(kind: UnspentType, signature: Vec<u8>, public_key: &[u8]) -> Unlocking {
    match kind {
        UnspentType::Np2wkh => Unlocking {
            script_sig: push_data(&p2wpkh_script(&hash160(public_key))),
            witness: vec![signature, public_key.to_vec()],
        },
        UnspentType::P2wkh => Unlocking {
            script_sig: Vec::new(),
            witness: vec![signature, public_key.to_vec()],
        },
        _ => {
            let mut script_sig = push_data(&signature);
            script_sig.extend_from_slice(&push_data(public_key));
            Unlocking {
                script_sig,
                witness: Vec::new(),
            }
        }
    }
}

/// Signatures already carried by a multisig input, dummy and script removed.
fn existing_signatures(
    tx: &Transaction,
    index: usize,
    kind: UnspentType,
    redeem: &[u8],
) -> Result<Vec<Vec<u8>>, BtcError> {
    let input = &tx.inputs[index];
    let items: Vec<Vec<u8>> = if kind.is_segwit() {
        input.witness.clone()
    } else {
        parse_script(&input.script_sig)?
            .into_iter()
            .filter_map(|element| match element {
                ScriptElement::Push(data) => Some(data.to_vec()),
                ScriptElement::Op(_) => None,
            })
            .collect()
    };
    Ok(items
        .into_iter()
        .filter(|item| !item.is_empty() && item.as_slice() != redeem)
        .collect())
}

fn assemble_multisig<C: Crypto>(
    crypto: &C,
    tx: &Transaction,
    index: usize,
    kind: UnspentType,
    digest: &[u8; 32],
    (own_key, own_signature): (&[u8], Vec<u8>),
    redeem: &RedeemScript,
) -> Result<Unlocking, BtcError> {
    let verifies = |key: &[u8], signature: &[u8]| match signature.split_last() {
        Some((&hash_type, der)) => {
            u32::from(hash_type) == SIGHASH_ALL && crypto.verify_digest(key, der, digest)
        }
        None => false,
    };

    let mut existing = existing_signatures(tx, index, kind, redeem.as_bytes())?;

    // Match co-signer signatures to key slots; anything left is invalid.
    let mut slots: Vec<Option<Vec<u8>>> = vec![None; redeem.public_keys().len()];
    for (slot, key) in slots.iter_mut().zip(redeem.public_keys()) {
        if let Some(pos) = existing.iter().position(|sig| verifies(key.as_slice(), sig.as_slice())) {
            *slot = Some(existing.remove(pos));
        }
    }
    if !existing.is_empty() {
        log::warn!(
            "input {index}: discarding {} signature(s) that do not verify against the redeem script",
            existing.len()
        );
    }

    let present = slots.iter().filter(|slot| slot.is_some()).count();
    if present >= redeem.required() {
        return Err(BtcError::AlreadySigned(format!(
            "input {index} already carries {present} of {} required signatures",
            redeem.required()
        )));
    }

    let own_slot = redeem
        .public_keys()
        .iter()
        .position(|key| key.as_slice() == own_key)
        .ok_or_else(|| {
            BtcError::InvalidKeyOrAddress("signing key is not in the redeem script".into())
        })?;
    slots[own_slot] = Some(own_signature);

    let signatures: Vec<Vec<u8>> = slots.into_iter().flatten().collect();
    let unlocking = match kind {
        UnspentType::P2sh => {
            let mut script_sig = vec![OP_0];
            for signature in &signatures {
                script_sig.extend_from_slice(&push_data(signature));
            }
            script_sig.extend_from_slice(&push_data(redeem.as_bytes()));
            Unlocking {
                script_sig,
                witness: Vec::new(),
            }
        }
        _ => {
            let script_sig = if kind == UnspentType::Np2wsh {
                push_data(&redeem.p2wsh_script_pubkey())
            } else {
                Vec::new()
            };
            let mut witness = Vec::with_capacity(signatures.len() + 2);
            witness.push(Vec::new());
            witness.extend(signatures);
            witness.push(redeem.as_bytes().to_vec());
            Unlocking { script_sig, witness }
        }
    };
    Ok(unlocking)
}
