//! Byte and string encodings shared by every other module: Base58 and
//! Base58Check, compact-size varints, minimal Script pushes, and a cursor
//! reader for wire data.

use crypto_utils::hash::double_sha256;

use crate::error::BtcError;

pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;

/// Largest length that can be pushed with a single direct length byte.
const MAX_DIRECT_PUSH: usize = 75;

/// Encode bytes as Base58, one leading '1' per leading zero byte.
pub fn b58encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a Base58 string. Fails on any symbol outside the Bitcoin alphabet.
pub fn b58decode(encoded: &str) -> Result<Vec<u8>, BtcError> {
    bs58::decode(encoded).into_vec().map_err(|e| match e {
        bs58::decode::Error::InvalidCharacter { character, index } => BtcError::InvalidEncoding(
            format!("invalid base58 character '{character}' at position {index}"),
        ),
        other => BtcError::InvalidEncoding(format!("invalid base58: {other}")),
    })
}

/// Append the 4-byte double-SHA-256 checksum and Base58-encode.
pub fn b58encode_check(payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum(payload));
    b58encode(&data)
}

/// Decode Base58 and verify and strip the trailing 4-byte checksum.
pub fn b58decode_check(encoded: &str) -> Result<Vec<u8>, BtcError> {
    let mut decoded = b58decode(encoded)?;
    if decoded.len() < 4 {
        return Err(BtcError::InvalidEncoding(format!(
            "base58check payload too short: {} bytes",
            decoded.len()
        )));
    }
    let split = decoded.len() - 4;
    let expected = checksum(&decoded[..split]);
    if decoded[split..] != expected {
        return Err(BtcError::InvalidEncoding(format!(
            "checksum mismatch: expected {}, found {}",
            hex::encode(expected),
            hex::encode(&decoded[split..])
        )));
    }
    decoded.truncate(split);
    Ok(decoded)
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = double_sha256(payload);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Number of bytes the compact-size encoding of `n` occupies.
pub fn varint_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Write a Bitcoin-style CompactSize (variable-length integer).
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

pub fn varint(n: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(varint_len(n));
    write_varint(&mut buf, n);
    buf
}

/// Smallest valid Script push opcode sequence announcing `len` bytes.
pub fn push_prefix(len: usize) -> Vec<u8> {
    if len <= MAX_DIRECT_PUSH {
        vec![len as u8]
    } else if len <= 0xff {
        vec![OP_PUSHDATA1, len as u8]
    } else if len <= 0xffff {
        let mut out = vec![OP_PUSHDATA2];
        out.extend_from_slice(&(len as u16).to_le_bytes());
        out
    } else {
        let mut out = vec![OP_PUSHDATA4];
        out.extend_from_slice(&(len as u32).to_le_bytes());
        out
    }
}

/// `data` preceded by its minimal push prefix.
pub fn push_data(data: &[u8]) -> Vec<u8> {
    let mut out = push_prefix(data.len());
    out.extend_from_slice(data);
    out
}

pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, BtcError> {
    hex::decode(hex_str.trim()).map_err(|e| BtcError::InvalidEncoding(format!("invalid hex: {e}")))
}

/// Parse a display-order (big-endian) txid into internal wire order.
pub fn txid_to_wire(txid_hex: &str) -> Result<[u8; 32], BtcError> {
    let bytes = hex::decode(txid_hex.trim())
        .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid hex: {e}")))?;
    let mut wire: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        BtcError::TransactionBuildError(format!("txid must be 32 bytes, got {}", bytes.len()))
    })?;
    wire.reverse();
    Ok(wire)
}

/// Render a wire-order hash as display-order hex.
pub fn wire_to_txid(wire: &[u8; 32]) -> String {
    let mut display = *wire;
    display.reverse();
    hex::encode(display)
}

/// Cursor over a byte slice that fails instead of reading past the end.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos.checked_add(n)?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], BtcError> {
        let bytes = self.peek(n).ok_or_else(|| {
            BtcError::MalformedTransaction(format!(
                "unexpected end of data: need {n} bytes at offset {}, {} remaining",
                self.pos,
                self.remaining()
            ))
        })?;
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BtcError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, BtcError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, BtcError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, BtcError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, BtcError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<u64, BtcError> {
        match self.read_u8()? {
            0xfd => Ok(u64::from(self.read_u16_le()?)),
            0xfe => Ok(u64::from(self.read_u32_le()?)),
            0xff => self.read_u64_le(),
            n => Ok(u64::from(n)),
        }
    }

    /// Read a varint length followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], BtcError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| {
            BtcError::MalformedTransaction(format!("length {len} does not fit in memory"))
        })?;
        self.read_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b58encode_preserves_leading_zeros() {
        assert_eq!(b58encode(&[0, 0, 1]), "112");
        assert_eq!(b58encode(&[]), "");
        assert_eq!(b58encode(&[0]), "1");
    }

    #[test]
    fn b58decode_restores_leading_zeros() {
        assert_eq!(b58decode("112").unwrap(), vec![0, 0, 1]);
    }

    #[test]
    fn b58decode_names_offending_character() {
        let err = b58decode("1BgGZ9tcN40m").unwrap_err();
        match err {
            BtcError::InvalidEncoding(msg) => assert!(msg.contains("'0'"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn b58decode_rejects_ambiguous_letters() {
        for bad in ["O", "I", "l"] {
            assert!(b58decode(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn base58check_known_address() {
        let payload = hex::decode("00751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        assert_eq!(b58encode_check(&payload), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert_eq!(
            b58decode_check("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap(),
            payload
        );
    }

    #[test]
    fn base58check_detects_corruption() {
        let err = b58decode_check("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMJ").unwrap_err();
        match err {
            BtcError::InvalidEncoding(msg) => assert!(msg.contains("checksum mismatch")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn base58check_too_short() {
        assert!(b58decode_check("11").is_err());
    }

    #[test]
    fn varint_boundaries() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(252), vec![0xfc]);
        assert_eq!(varint(253), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(varint(0xffff), vec![0xfd, 0xff, 0xff]);
        assert_eq!(varint(0x1_0000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(
            varint(0x1_0000_0000),
            vec![0xff, 0, 0, 0, 0, 1, 0, 0, 0]
        );
    }

    #[test]
    fn varint_len_matches_encoding() {
        for n in [0u64, 252, 253, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000, u64::MAX] {
            assert_eq!(varint_len(n), varint(n).len(), "n = {n}");
        }
    }

    #[test]
    fn push_prefix_is_minimal() {
        assert_eq!(push_prefix(0), vec![0x00]);
        assert_eq!(push_prefix(75), vec![75]);
        assert_eq!(push_prefix(76), vec![OP_PUSHDATA1, 76]);
        assert_eq!(push_prefix(255), vec![OP_PUSHDATA1, 0xff]);
        assert_eq!(push_prefix(256), vec![OP_PUSHDATA2, 0x00, 0x01]);
        assert_eq!(
            push_prefix(0x1_0000),
            vec![OP_PUSHDATA4, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn txid_wire_roundtrip() {
        let display = "f3ad23dac2a3546167b27a43ac3e370236caf93f75bfcf27c625ec839d397888";
        let wire = txid_to_wire(display).unwrap();
        assert_eq!(wire[0], 0x88);
        assert_eq!(wire_to_txid(&wire), display);
    }

    #[test]
    fn txid_wrong_length() {
        assert!(matches!(
            txid_to_wire("abcd"),
            Err(BtcError::TransactionBuildError(_))
        ));
    }

    #[test]
    fn reader_reads_fields_in_order() {
        let data = [0x01, 0x02, 0x00, 0x00, 0x00, 0xfd, 0x00, 0x01, 0xaa];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u32_le().unwrap(), 2);
        assert_eq!(reader.read_varint().unwrap(), 256);
        assert_eq!(reader.read_bytes(1).unwrap(), &[0xaa]);
        assert!(reader.is_empty());
    }

    #[test]
    fn reader_fails_past_end() {
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        let err = reader.read_u32_le().unwrap_err();
        assert!(matches!(err, BtcError::MalformedTransaction(_)));
        // A failed read consumes nothing.
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn reader_var_bytes_checks_declared_length() {
        let mut reader = ByteReader::new(&[0x05, 0x01, 0x02]);
        assert!(reader.read_var_bytes().is_err());
    }
}
