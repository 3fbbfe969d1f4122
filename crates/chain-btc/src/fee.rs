//! Virtual-size and fee estimation ahead of signing.

use crate::codec::varint_len;

/// Version plus locktime.
const TX_FIXED_OVERHEAD: usize = 8;

/// Marker and flag weigh 2 units of 4 and round up to a whole vbyte.
const SEGWIT_OVERHEAD: usize = 1;

/// Estimated vsize of a compressed-key P2PKH input.
pub const P2PKH_INPUT_VSIZE: usize = 148;

/// Size of a P2PKH output: amount, length byte and 25-byte script.
pub const P2PKH_OUTPUT_SIZE: usize = 34;

/// Serialized size of an output carrying a script of `script_len` bytes.
pub fn output_size(script_len: usize) -> usize {
    8 + varint_len(script_len as u64) + script_len
}

/// Estimate the virtual size of a transaction.
///
/// `input_vsize` and `output_size` are totals across all inputs and
/// outputs; the counts add the varint prefixes.
pub fn estimate_vsize(
    input_vsize: usize,
    input_count: usize,
    output_size: usize,
    output_count: usize,
    segwit: bool,
) -> usize {
    TX_FIXED_OVERHEAD
        + varint_len(input_count as u64)
        + input_vsize
        + varint_len(output_count as u64)
        + output_size
        + if segwit { SEGWIT_OVERHEAD } else { 0 }
}

/// Fee for the estimated vsize at `fee_rate` satoshis per vbyte.
pub fn estimate_tx_fee(
    input_vsize: usize,
    input_count: usize,
    output_size: usize,
    output_count: usize,
    segwit: bool,
    fee_rate: u64,
) -> u64 {
    if fee_rate == 0 {
        return 0;
    }
    let vsize = estimate_vsize(input_vsize, input_count, output_size, output_count, segwit);
    (vsize as u64).saturating_mul(fee_rate)
}

/// Fee for a plain P2PKH transaction with the given input and output counts.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, fee_rate: u64) -> u64 {
    estimate_tx_fee(
        num_inputs * P2PKH_INPUT_VSIZE,
        num_inputs,
        num_outputs * P2PKH_OUTPUT_SIZE,
        num_outputs,
        false,
        fee_rate,
    )
}
