//! secp256k1 public-key point handling.
//!
//! Compressed keys carry only `x` and the parity of `y`. Because the field
//! prime satisfies `p ≡ 3 (mod 4)`, the square root of `x³ + 7` is
//! `(x³ + 7)^((p+1)/4) mod p`, and the other root is `p - y`.

use k256::{FieldBytes, FieldElement};

use crate::error::BtcError;

pub const COMPRESSED_PUBKEY_LEN: usize = 33;
pub const UNCOMPRESSED_PUBKEY_LEN: usize = 65;

/// `(p + 1) / 4` for the secp256k1 field prime, big-endian.
const SQRT_EXPONENT: [u8; 32] = [
    0x3f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xbf, 0xff, 0xff, 0x0c,
];

/// Affine coordinates of a curve point, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: [u8; 32],
    pub y: [u8; 32],
}

fn field_element(bytes: &[u8; 32]) -> Result<FieldElement, BtcError> {
    Option::from(FieldElement::from_bytes(FieldBytes::from_slice(bytes))).ok_or_else(|| {
        BtcError::InvalidKeyOrAddress("coordinate is not below the field prime".into())
    })
}

fn to_array(element: FieldElement) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&element.normalize().to_bytes());
    out
}

/// Square-and-multiply over a big-endian exponent whose top bit set is the
/// first one encountered; the accumulator starts at `base` on that bit.
fn pow(base: FieldElement, exponent: &[u8; 32]) -> FieldElement {
    let mut acc: Option<FieldElement> = None;
    for byte in exponent {
        for shift in (0..8).rev() {
            let bit = (byte >> shift) & 1 == 1;
            acc = match (acc, bit) {
                (None, false) => None,
                (None, true) => Some(base),
                (Some(a), false) => Some((a * a).normalize()),
                (Some(a), true) => Some((a * a * base).normalize()),
            };
        }
    }
    acc.unwrap_or(base)
}

/// Recover `y` from `x` and the requested parity.
///
/// Fails when `x³ + 7` has no square root, i.e. `x` is not on the curve.
pub fn x_to_y(x: &[u8; 32], odd: bool) -> Result<[u8; 32], BtcError> {
    let x = field_element(x)?;
    let mut b = [0u8; 32];
    b[31] = 7;
    let seven = field_element(&b)?;
    let rhs = (x * x * x + seven).normalize();
    let candidate = pow(rhs, &SQRT_EXPONENT);

    if to_array(candidate * candidate) != to_array(rhs) {
        return Err(BtcError::InvalidKeyOrAddress(
            "x coordinate is not on the curve".into(),
        ));
    }

    let candidate_odd = bool::from(candidate.normalize().is_odd());
    let y = if candidate_odd == odd {
        candidate
    } else {
        -candidate.normalize()
    };
    Ok(to_array(y))
}

/// Split a 33- or 65-byte SEC1 public key into coordinates.
pub fn public_key_to_coords(public_key: &[u8]) -> Result<Point, BtcError> {
    match public_key.len() {
        COMPRESSED_PUBKEY_LEN => {
            let odd = match public_key[0] {
                0x02 => false,
                0x03 => true,
                other => {
                    return Err(BtcError::InvalidKeyOrAddress(format!(
                        "compressed public key prefix must be 0x02 or 0x03, got {other:#04x}"
                    )))
                }
            };
            let mut x = [0u8; 32];
            x.copy_from_slice(&public_key[1..]);
            let y = x_to_y(&x, odd)?;
            Ok(Point { x, y })
        }
        UNCOMPRESSED_PUBKEY_LEN => {
            if public_key[0] != 0x04 {
                return Err(BtcError::InvalidKeyOrAddress(format!(
                    "uncompressed public key prefix must be 0x04, got {:#04x}",
                    public_key[0]
                )));
            }
            let mut x = [0u8; 32];
            let mut y = [0u8; 32];
            x.copy_from_slice(&public_key[1..33]);
            y.copy_from_slice(&public_key[33..]);
            Ok(Point { x, y })
        }
        other => Err(BtcError::InvalidKeyOrAddress(format!(
            "{other} is an invalid length for a public key"
        ))),
    }
}

/// Encode coordinates as a SEC1 public key.
pub fn coords_to_public_key(point: &Point, compressed: bool) -> Vec<u8> {
    if compressed {
        let mut out = Vec::with_capacity(COMPRESSED_PUBKEY_LEN);
        out.push(if point.y[31] & 1 == 1 { 0x03 } else { 0x02 });
        out.extend_from_slice(&point.x);
        out
    } else {
        let mut out = Vec::with_capacity(UNCOMPRESSED_PUBKEY_LEN);
        out.push(0x04);
        out.extend_from_slice(&point.x);
        out.extend_from_slice(&point.y);
        out
    }
}

pub fn compress_public_key(public_key: &[u8]) -> Result<Vec<u8>, BtcError> {
    Ok(coords_to_public_key(&public_key_to_coords(public_key)?, true))
}

pub fn decompress_public_key(public_key: &[u8]) -> Result<Vec<u8>, BtcError> {
    Ok(coords_to_public_key(&public_key_to_coords(public_key)?, false))
}

/// Reject anything that is not a 33- or 65-byte SEC1 encoding.
pub fn check_public_key_len(public_key: &[u8]) -> Result<(), BtcError> {
    match public_key.len() {
        COMPRESSED_PUBKEY_LEN | UNCOMPRESSED_PUBKEY_LEN => Ok(()),
        other => Err(BtcError::InvalidKeyOrAddress(format!(
            "{other} is an invalid length for a public key"
        ))),
    }
}
