use proptest::prelude::*;

use chain_btc::codec::{
    b58decode_check, b58encode_check, push_data, txid_to_wire, wire_to_txid, ByteReader, varint,
    varint_len,
};
use chain_btc::fee::estimate_tx_fee;
use chain_btc::script::{parse_script, ScriptElement};
use chain_btc::*;

/// Strategy for transactions with optional witness data on each input.
fn arb_transaction() -> impl Strategy<Value = Transaction> {
    let arb_input = (
        prop::array::uniform32(any::<u8>()),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..80),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..3),
        any::<u32>(),
    )
        .prop_map(|(txid, vout, script_sig, witness, sequence)| {
            let mut input = TxIn::new(txid, vout);
            input.script_sig = script_sig;
            input.witness = witness;
            input.sequence = sequence;
            input
        });

    let arb_output = (any::<u64>(), prop::collection::vec(any::<u8>(), 0..64))
        .prop_map(|(amount, script)| TxOut::new(amount, script));

    (
        any::<u32>(),
        prop::collection::vec(arb_input, 1..4),
        prop::collection::vec(arb_output, 0..4),
        any::<u32>(),
    )
        .prop_map(|(version, inputs, outputs, lock_time)| {
            Transaction::new(version, inputs, outputs, lock_time)
        })
}

fn arb_unspent() -> impl Strategy<Value = Unspent> {
    (1u64..5_000_000, any::<u8>(), 0u32..8).prop_map(|(amount, tag, vout)| {
        let kind = UnspentType::ALL[tag as usize % UnspentType::ALL.len()];
        Unspent::new(
            amount,
            1,
            vec![0x51],
            format!("{:064x}", (u64::from(tag) << 8) | u64::from(vout)),
            vout,
            kind,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn transaction_round_trip(tx in arb_transaction()) {
        let bytes = tx.serialize();
        let decoded = Transaction::deserialize(&bytes).unwrap();
        prop_assert_eq!(&decoded, &tx);
        prop_assert_eq!(decoded.txid(), tx.txid());
        prop_assert!(tx.vsize() <= bytes.len());
    }

    #[test]
    fn legacy_serialization_ignores_witness(tx in arb_transaction()) {
        let mut stripped = tx.clone();
        for input in &mut stripped.inputs {
            input.witness.clear();
        }
        prop_assert_eq!(tx.serialize_legacy(), stripped.serialize());
        prop_assert_eq!(tx.txid(), stripped.txid());
    }

    #[test]
    fn base58check_round_trip(payload in prop::collection::vec(any::<u8>(), 0..64)) {
        let encoded = b58encode_check(&payload);
        prop_assert_eq!(b58decode_check(&encoded).unwrap(), payload);
    }

    #[test]
    fn base58check_detects_corruption(
        payload in prop::collection::vec(any::<u8>(), 1..40),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut raw = payload.clone();
        raw.extend_from_slice(&crypto_utils::hash::double_sha256(&payload)[..4]);
        let i = index.index(raw.len());
        raw[i] ^= 1 << bit;
        prop_assert!(b58decode_check(&bs58::encode(&raw).into_string()).is_err());
    }

    #[test]
    fn varint_round_trip(n in any::<u64>()) {
        let encoded = varint(n);
        prop_assert_eq!(encoded.len(), varint_len(n));
        let mut reader = ByteReader::new(&encoded);
        prop_assert_eq!(reader.read_varint().unwrap(), n);
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn pushes_parse_back(data in prop::collection::vec(any::<u8>(), 1..600)) {
        let script = push_data(&data);
        let parsed = parse_script(&script).unwrap();
        prop_assert_eq!(parsed, vec![ScriptElement::Push(&data)]);
    }

    #[test]
    fn txid_wire_round_trip(bytes in prop::array::uniform32(any::<u8>())) {
        let display = hex::encode(bytes);
        let wire = txid_to_wire(&display).unwrap();
        prop_assert_eq!(wire_to_txid(&wire), display);
    }

    #[test]
    fn fee_is_monotonic(
        inputs in 1usize..300,
        outputs in 1usize..300,
        rate in 1u64..500,
        segwit in any::<bool>(),
    ) {
        let fee = |n_in: usize, n_out: usize, r: u64| {
            estimate_tx_fee(n_in * 148, n_in, n_out * 34, n_out, segwit, r)
        };
        prop_assert!(fee(inputs + 1, outputs, rate) > fee(inputs, outputs, rate));
        prop_assert!(fee(inputs, outputs + 1, rate) > fee(inputs, outputs, rate));
        prop_assert!(fee(inputs, outputs, rate + 1) > fee(inputs, outputs, rate));
    }

    #[test]
    fn select_mode_is_minimal(
        unspents in prop::collection::vec(arb_unspent(), 1..8),
        amount in 1u64..8_000_000,
        fee_rate in 0u64..40,
    ) {
        let target = SelectionTarget {
            amount,
            output_size: 34,
            output_count: 1,
            change_size: 34,
            fee_rate,
        };
        match select_coins(&unspents, &target, SelectionMode::Select) {
            Ok(selection) => {
                prop_assert!(selection.total >= amount + selection.fee);
                prop_assert_eq!(selection.change, selection.total - amount - selection.fee);
                for i in 0..selection.selected.len() {
                    let mut fewer = selection.selected.clone();
                    fewer.remove(i);
                    let covered = !fewer.is_empty()
                        && fewer.iter().map(|u| u.amount).sum::<u64>()
                            >= amount + target.fee_for(&fewer);
                    prop_assert!(!covered, "input {} is redundant", i);
                }
            }
            Err(BtcError::InsufficientFunds { available, required, shortfall }) => {
                prop_assert!(available < required);
                prop_assert_eq!(shortfall, required - available);
                prop_assert!(select_coins(&unspents, &target, SelectionMode::Combine).is_err());
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }
}
