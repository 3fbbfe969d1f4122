//! Unspent outputs and coin selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::hex_to_bytes;
use crate::error::BtcError;
use crate::fee::estimate_tx_fee;
use crate::script::{OP_0, OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160};
use crate::transaction::{DEFAULT_SEQUENCE, RBF_SEQUENCE};

/// How an unspent output is locked, which fixes how it is signed and its
/// estimated input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnspentType {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "p2pkh-uncompressed")]
    P2pkhUncompressed,
    #[serde(rename = "p2pkh")]
    P2pkh,
    #[serde(rename = "p2sh")]
    P2sh,
    #[serde(rename = "np2wkh")]
    Np2wkh,
    #[serde(rename = "np2wsh")]
    Np2wsh,
    #[serde(rename = "p2wkh")]
    P2wkh,
    #[serde(rename = "p2wsh")]
    P2wsh,
}

impl UnspentType {
    pub const ALL: [UnspentType; 8] = [
        UnspentType::Unknown,
        UnspentType::P2pkhUncompressed,
        UnspentType::P2pkh,
        UnspentType::P2sh,
        UnspentType::Np2wkh,
        UnspentType::Np2wsh,
        UnspentType::P2wkh,
        UnspentType::P2wsh,
    ];

    /// Estimated vsize of an input spending this kind of output.
    ///
    /// Script-hash kinds assume a 2-of-3 multisig redeem script.
    pub fn vsize(self) -> usize {
        match self {
            UnspentType::Unknown => 148,
            UnspentType::P2pkhUncompressed => 180,
            UnspentType::P2pkh => 148,
            UnspentType::P2sh => 292,
            UnspentType::Np2wkh => 90,
            UnspentType::Np2wsh => 139,
            UnspentType::P2wkh => 67,
            UnspentType::P2wsh => 104,
        }
    }

    pub fn is_segwit(self) -> bool {
        matches!(
            self,
            UnspentType::Np2wkh | UnspentType::Np2wsh | UnspentType::P2wkh | UnspentType::P2wsh
        )
    }

    /// Infer the kind from a locking script where the script alone decides it.
    ///
    /// Native witness programs are unambiguous. P2PKH and P2SH scripts hide
    /// key compression and nesting, so they stay `Unknown` for the signer to
    /// resolve against its own keys.
    pub fn from_script(script_pubkey: &[u8]) -> Self {
        match script_pubkey {
            [OP_0, 20, rest @ ..] if rest.len() == 20 => UnspentType::P2wkh,
            [OP_0, 32, rest @ ..] if rest.len() == 32 => UnspentType::P2wsh,
            _ => UnspentType::Unknown,
        }
    }

    /// Whether the script has the P2PKH shape.
    pub fn is_p2pkh_script(script_pubkey: &[u8]) -> bool {
        matches!(
            script_pubkey,
            [OP_DUP, OP_HASH160, 20, .., OP_EQUALVERIFY, OP_CHECKSIG] if script_pubkey.len() == 25
        )
    }

    /// Whether the script has the P2SH shape.
    pub fn is_p2sh_script(script_pubkey: &[u8]) -> bool {
        matches!(
            script_pubkey,
            [OP_HASH160, 20, .., OP_EQUAL] if script_pubkey.len() == 23
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnspentType::Unknown => "unknown",
            UnspentType::P2pkhUncompressed => "p2pkh-uncompressed",
            UnspentType::P2pkh => "p2pkh",
            UnspentType::P2sh => "p2sh",
            UnspentType::Np2wkh => "np2wkh",
            UnspentType::Np2wsh => "np2wsh",
            UnspentType::P2wkh => "p2wkh",
            UnspentType::P2wsh => "p2wsh",
        }
    }
}

impl fmt::Display for UnspentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnspentType {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnspentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| BtcError::InvalidEncoding(format!("unknown unspent type: {s}")))
    }
}

/// An unspent transaction output available as an input.
///
/// `vsize` and the segwit flag always follow the type tag; changing the tag
/// through [`Unspent::set_type`] recomputes both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UnspentRecord", into = "UnspentRecord")]
pub struct Unspent {
    pub amount: u64,
    pub confirmations: u32,
    pub script_pubkey: Vec<u8>,
    /// Source transaction id, display order.
    pub txid: String,
    pub txindex: u32,
    pub sequence: u32,
    kind: UnspentType,
    vsize: usize,
    segwit: bool,
}

impl Unspent {
    pub fn new(
        amount: u64,
        confirmations: u32,
        script_pubkey: Vec<u8>,
        txid: impl Into<String>,
        txindex: u32,
        kind: UnspentType,
    ) -> Self {
        Self {
            amount,
            confirmations,
            script_pubkey,
            txid: txid.into(),
            txindex,
            sequence: DEFAULT_SEQUENCE,
            kind,
            vsize: kind.vsize(),
            segwit: kind.is_segwit(),
        }
    }

    /// Like [`Unspent::new`] with the type inferred from the script.
    pub fn from_script(
        amount: u64,
        confirmations: u32,
        script_pubkey: Vec<u8>,
        txid: impl Into<String>,
        txindex: u32,
    ) -> Self {
        let kind = UnspentType::from_script(&script_pubkey);
        Self::new(amount, confirmations, script_pubkey, txid, txindex, kind)
    }

    pub fn kind(&self) -> UnspentType {
        self.kind
    }

    pub fn vsize(&self) -> usize {
        self.vsize
    }

    pub fn is_segwit(&self) -> bool {
        self.segwit
    }

    pub fn set_type(&mut self, kind: UnspentType) {
        self.kind = kind;
        self.vsize = kind.vsize();
        self.segwit = kind.is_segwit();
    }

    /// Signal replace-by-fee on the input that will spend this output.
    pub fn opt_in_for_rbf(&mut self) {
        self.sequence = RBF_SEQUENCE;
    }

    pub fn script_hex(&self) -> String {
        hex::encode(&self.script_pubkey)
    }

    /// Whether this is the output `txid:txindex`.
    pub fn spends(&self, txid: &str, txindex: u32) -> bool {
        self.txindex == txindex && self.txid.eq_ignore_ascii_case(txid)
    }
}

fn default_sequence() -> u32 {
    DEFAULT_SEQUENCE
}

/// Interchange form of [`Unspent`]. `vsize` and `segwit` are written for
/// readers but ignored on input in favor of the type tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnspentRecord {
    amount: u64,
    #[serde(default)]
    confirmations: u32,
    script: String,
    txid: String,
    txindex: u32,
    #[serde(rename = "type", default)]
    kind: UnspentType,
    #[serde(default, skip_deserializing)]
    vsize: usize,
    #[serde(default, skip_deserializing)]
    segwit: bool,
    #[serde(default = "default_sequence")]
    sequence: u32,
}

impl TryFrom<UnspentRecord> for Unspent {
    type Error = BtcError;

    fn try_from(record: UnspentRecord) -> Result<Self, Self::Error> {
        let mut unspent = Unspent::new(
            record.amount,
            record.confirmations,
            hex_to_bytes(&record.script)?,
            record.txid,
            record.txindex,
            record.kind,
        );
        unspent.sequence = record.sequence;
        Ok(unspent)
    }
}

impl From<Unspent> for UnspentRecord {
    fn from(unspent: Unspent) -> Self {
        Self {
            amount: unspent.amount,
            confirmations: unspent.confirmations,
            script: hex::encode(&unspent.script_pubkey),
            txid: unspent.txid,
            txindex: unspent.txindex,
            kind: unspent.kind,
            vsize: unspent.vsize,
            segwit: unspent.segwit,
            sequence: unspent.sequence,
        }
    }
}

/// Whether to spend every available output or only as many as needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Spend all outputs, consolidating them.
    #[default]
    Combine,
    /// Smallest-first selection, pruned to a minimal covering set.
    Select,
}

/// What the selected inputs must pay for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionTarget {
    /// Sum of all output amounts.
    pub amount: u64,
    /// Serialized size of all outputs, excluding change.
    pub output_size: usize,
    pub output_count: usize,
    /// Serialized size of the change output.
    pub change_size: usize,
    /// Satoshis per vbyte.
    pub fee_rate: u64,
}

impl SelectionTarget {
    /// Fee for spending `inputs`. The change output is always counted.
    pub fn fee_for<'a>(&self, inputs: impl IntoIterator<Item = &'a Unspent>) -> u64 {
        let (mut vsize, mut count, mut segwit) = (0usize, 0usize, false);
        for unspent in inputs {
            vsize += unspent.vsize();
            count += 1;
            segwit |= unspent.is_segwit();
        }
        estimate_tx_fee(
            vsize,
            count,
            self.output_size + self.change_size,
            self.output_count + 1,
            segwit,
            self.fee_rate,
        )
    }

    fn required(&self, fee: u64) -> u64 {
        self.amount.saturating_add(fee)
    }
}

/// The inputs chosen to fund a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    pub selected: Vec<Unspent>,
    pub total: u64,
    pub fee: u64,
    /// `total - amount - fee`; zero means no change output.
    pub change: u64,
}

fn total_of<'a>(unspents: impl IntoIterator<Item = &'a Unspent>) -> u64 {
    unspents
        .into_iter()
        .fold(0u64, |acc, u| acc.saturating_add(u.amount))
}

fn covers(target: &SelectionTarget, unspents: &[Unspent]) -> bool {
    !unspents.is_empty() && total_of(unspents) >= target.required(target.fee_for(unspents))
}

/// Choose inputs covering `target` plus the fee they imply.
pub fn select_coins(
    unspents: &[Unspent],
    target: &SelectionTarget,
    mode: SelectionMode,
) -> Result<CoinSelection, BtcError> {
    let selected = match mode {
        SelectionMode::Combine => unspents.to_vec(),
        SelectionMode::Select => select_minimal(unspents, target),
    };

    if !covers(target, &selected) {
        let available = total_of(unspents);
        let required = target.required(target.fee_for(unspents));
        log::debug!(
            "coin selection failed: {} outputs worth {available} cannot cover {required}",
            unspents.len()
        );
        // An empty input set never covers, even a zero target.
        return Err(BtcError::insufficient(available, required.max(1)));
    }

    let total = total_of(&selected);
    let fee = target.fee_for(&selected);
    let change = total - target.required(fee);
    log::debug!(
        "selected {} of {} outputs ({mode:?}): total {total}, fee {fee}, change {change}",
        selected.len(),
        unspents.len()
    );

    Ok(CoinSelection {
        selected,
        total,
        fee,
        change,
    })
}

/// Ascending greedy accumulation, then drop inputs until none can be
/// removed without breaking coverage. Returns everything when even the full
/// set falls short so the caller reports the shortfall.
fn select_minimal(unspents: &[Unspent], target: &SelectionTarget) -> Vec<Unspent> {
    let mut sorted = unspents.to_vec();
    sorted.sort_by_key(|u| u.amount);

    let mut selected: Vec<Unspent> = Vec::new();
    for unspent in sorted {
        selected.push(unspent);
        if covers(target, &selected) {
            break;
        }
    }
    if !covers(target, &selected) {
        return selected;
    }

    'prune: loop {
        for i in 0..selected.len() {
            let mut candidate = selected.clone();
            candidate.remove(i);
            if covers(target, &candidate) {
                selected = candidate;
                continue 'prune;
            }
        }
        break;
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    const P2PKH_SCRIPT: &str = "76a91492461bde6283b461ece7ddf4dbf1e0a48bd113d888ac";

    fn make_unspent(txid: &str, amount: u64) -> Unspent {
        Unspent::new(
            amount,
            1,
            hex::decode(P2PKH_SCRIPT).unwrap(),
            txid,
            0,
            UnspentType::P2pkh,
        )
    }

    fn target(amount: u64, fee_rate: u64) -> SelectionTarget {
        SelectionTarget {
            amount,
            output_size: 34,
            output_count: 1,
            change_size: 34,
            fee_rate,
        }
    }

    #[test]
    fn vsize_table() {
        assert_eq!(UnspentType::Unknown.vsize(), 148);
        assert_eq!(UnspentType::P2pkhUncompressed.vsize(), 180);
        assert_eq!(UnspentType::P2wkh.vsize(), 67);
        assert_eq!(UnspentType::P2wsh.vsize(), 104);
        assert!(UnspentType::Np2wkh.is_segwit());
        assert!(!UnspentType::P2sh.is_segwit());
    }

    #[test]
    fn type_names_roundtrip() {
        for kind in UnspentType::ALL {
            assert_eq!(kind.as_str().parse::<UnspentType>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
        assert!("p2tr".parse::<UnspentType>().is_err());
    }

    #[test]
    fn infers_native_segwit_only() {
        let p2wkh = hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        assert_eq!(UnspentType::from_script(&p2wkh), UnspentType::P2wkh);
        assert_eq!(UnspentType::from_script(&[0u8; 34]), UnspentType::Unknown);
        let mut p2wsh = vec![0x00, 0x20];
        p2wsh.extend_from_slice(&[7u8; 32]);
        assert_eq!(UnspentType::from_script(&p2wsh), UnspentType::P2wsh);
        let p2pkh = hex::decode(P2PKH_SCRIPT).unwrap();
        assert_eq!(UnspentType::from_script(&p2pkh), UnspentType::Unknown);
        assert!(UnspentType::is_p2pkh_script(&p2pkh));
        assert!(!UnspentType::is_p2sh_script(&p2pkh));
    }

    #[test]
    fn set_type_recomputes_derived_fields() {
        let mut unspent = make_unspent("aa", 1_000);
        assert_eq!(unspent.vsize(), 148);
        assert!(!unspent.is_segwit());
        unspent.set_type(UnspentType::Np2wkh);
        assert_eq!(unspent.vsize(), 90);
        assert!(unspent.is_segwit());
    }

    #[test]
    fn rbf_opt_in() {
        let mut unspent = make_unspent("aa", 1_000);
        assert_eq!(unspent.sequence, DEFAULT_SEQUENCE);
        unspent.opt_in_for_rbf();
        assert_eq!(unspent.sequence, RBF_SEQUENCE);
    }

    #[test]
    fn json_roundtrip_and_recomputed_fields() {
        let mut unspent = make_unspent("ab", 5_000);
        unspent.set_type(UnspentType::P2wkh);
        let json = serde_json::to_value(&unspent).unwrap();
        assert_eq!(json["type"], "p2wkh");
        assert_eq!(json["vsize"], 67);
        assert_eq!(json["segwit"], true);
        assert_eq!(json["script"], P2PKH_SCRIPT);
        let back: Unspent = serde_json::from_value(json).unwrap();
        assert_eq!(back, unspent);
    }

    #[test]
    fn json_ignores_inconsistent_vsize() {
        let json = serde_json::json!({
            "amount": 1000,
            "confirmations": 3,
            "script": P2PKH_SCRIPT,
            "txid": "ab",
            "txindex": 1,
            "type": "np2wsh",
            "vsize": 1,
            "segwit": false
        });
        let unspent: Unspent = serde_json::from_value(json).unwrap();
        assert_eq!(unspent.vsize(), 139);
        assert!(unspent.is_segwit());
        assert_eq!(unspent.sequence, DEFAULT_SEQUENCE);
    }

    #[test]
    fn json_rejects_bad_script_hex() {
        let json = serde_json::json!({
            "amount": 1, "script": "zz", "txid": "ab", "txindex": 0
        });
        assert!(serde_json::from_value::<Unspent>(json).is_err());
    }

    #[test]
    fn combine_spends_everything() {
        let unspents = vec![make_unspent("a", 30_000), make_unspent("b", 40_000)];
        let selection = select_coins(&unspents, &target(10_000, 1), SelectionMode::Combine).unwrap();
        assert_eq!(selection.selected.len(), 2);
        assert_eq!(selection.total, 70_000);
        // 8 + 1 + 296 + 1 + 68
        assert_eq!(selection.fee, 374);
        assert_eq!(selection.change, 70_000 - 10_000 - 374);
    }

    #[test]
    fn select_prefers_small_then_prunes() {
        let unspents = vec![
            make_unspent("big", 100_000),
            make_unspent("tiny", 500),
            make_unspent("mid", 20_000),
        ];
        let selection = select_coins(&unspents, &target(15_000, 1), SelectionMode::Select).unwrap();
        assert_eq!(selection.selected.len(), 1);
        assert_eq!(selection.selected[0].txid, "mid");
    }

    #[test]
    fn select_drops_inputs_made_redundant() {
        // Ascending: 1_000, 2_000, 50_000. Greedy takes all three; the
        // first two are redundant once 50_000 is in.
        let unspents = vec![
            make_unspent("a", 1_000),
            make_unspent("b", 2_000),
            make_unspent("c", 50_000),
        ];
        let selection = select_coins(&unspents, &target(10_000, 1), SelectionMode::Select).unwrap();
        let ids: Vec<_> = selection.selected.iter().map(|u| u.txid.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn select_result_is_minimal() {
        let unspents: Vec<_> = (1..=8u64)
            .map(|i| make_unspent(&format!("{i}"), i * 3_000))
            .collect();
        let t = target(20_000, 2);
        let selection = select_coins(&unspents, &t, SelectionMode::Select).unwrap();
        assert!(selection.total >= t.amount + selection.fee);
        for i in 0..selection.selected.len() {
            let mut fewer = selection.selected.clone();
            fewer.remove(i);
            let fee = t.fee_for(&fewer);
            assert!(total_of(&fewer) < t.amount + fee || fewer.is_empty());
        }
    }

    #[test]
    fn insufficient_funds_names_shortfall() {
        let unspents = vec![make_unspent("a", 1_000)];
        let err = select_coins(&unspents, &target(5_000, 0), SelectionMode::Select).unwrap_err();
        assert_eq!(
            err,
            BtcError::InsufficientFunds {
                available: 1_000,
                required: 5_000,
                shortfall: 4_000
            }
        );
    }

    #[test]
    fn fee_can_cause_shortfall() {
        let unspents = vec![make_unspent("a", 10_000)];
        let err = select_coins(&unspents, &target(10_000, 1), SelectionMode::Combine).unwrap_err();
        match err {
            BtcError::InsufficientFunds { shortfall, .. } => assert_eq!(shortfall, 226),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exact_amount_leaves_no_change() {
        let unspents = vec![make_unspent("a", 10_226)];
        let selection = select_coins(&unspents, &target(10_000, 1), SelectionMode::Combine).unwrap();
        assert_eq!(selection.change, 0);
    }

    #[test]
    fn no_unspents_is_insufficient() {
        let err = select_coins(&[], &target(0, 0), SelectionMode::Combine).unwrap_err();
        assert!(matches!(err, BtcError::InsufficientFunds { available: 0, .. }));
    }
}
