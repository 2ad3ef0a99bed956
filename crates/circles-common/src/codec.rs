//! Binary encoding of [`PermissionSet`]s.
//!
//! Layout (big-endian):
//!
//! ```text
//! [ count: u64 ][ grant bitmap: ceil(count / 8) bytes ][ count × number: u64 ]
//! ```
//!
//! Bit `i % 8` of bitmap byte `i / 8` is the grant flag of the `i`-th number block.
//! An empty set is exactly eight zero bytes. Entries are written in ascending number order.

use crate::permissions::{PermissionNumber, PermissionSet};

const COUNT_LEN: usize = 8;
const NUMBER_LEN: usize = 8;

/// Reasons an encoded permission set cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("permission set truncated: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("permission set has {extra} trailing bytes")]
    TrailingBytes { extra: usize },

    #[error("permission set count {count} is too large")]
    CountOverflow { count: u64 },

    #[error("permission number {number} is out of range")]
    NumberOutOfRange { number: u64 },

    #[error("permission number {number} appears more than once")]
    DuplicateNumber { number: PermissionNumber },
}

/// Size in bytes of the encoding of a set with `count` entries.
fn encoded_len(count: usize) -> Option<usize> {
    let bitmap = count.div_ceil(8);
    count
        .checked_mul(NUMBER_LEN)?
        .checked_add(bitmap)?
        .checked_add(COUNT_LEN)
}

pub fn encode(set: &PermissionSet) -> Vec<u8> {
    let count = set.len();
    let bitmap_len = count.div_ceil(8);
    let mut bytes = vec![0u8; COUNT_LEN + bitmap_len + count * NUMBER_LEN];

    bytes[..COUNT_LEN].copy_from_slice(&(count as u64).to_be_bytes());
    let numbers_start = COUNT_LEN + bitmap_len;

    for (index, (number, granted)) in set.iter().enumerate() {
        if granted {
            bytes[COUNT_LEN + index / 8] |= 1 << (index % 8);
        }
        let at = numbers_start + index * NUMBER_LEN;
        bytes[at..at + NUMBER_LEN].copy_from_slice(&(number as u64).to_be_bytes());
    }

    bytes
}

pub fn decode(bytes: &[u8]) -> Result<PermissionSet, CodecError> {
    if bytes.is_empty() {
        return Ok(PermissionSet::new());
    }

    let count = read_u64(bytes, 0)?;
    if count == 0 {
        return match bytes.len() - COUNT_LEN {
            0 => Ok(PermissionSet::new()),
            extra => Err(CodecError::TrailingBytes { extra }),
        };
    }

    let entries = usize::try_from(count).map_err(|_| CodecError::CountOverflow { count })?;
    let expected = encoded_len(entries).ok_or(CodecError::CountOverflow { count })?;
    if bytes.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(CodecError::TrailingBytes {
            extra: bytes.len() - expected,
        });
    }

    let numbers_start = COUNT_LEN + entries.div_ceil(8);
    let mut set = PermissionSet::new();
    for index in 0..entries {
        let raw = read_u64(bytes, numbers_start + index * NUMBER_LEN)?;
        let number =
            PermissionNumber::try_from(raw).map_err(|_| CodecError::NumberOutOfRange { number: raw })?;
        let granted = bytes[COUNT_LEN + index / 8] & (1 << (index % 8)) != 0;
        if !set.set_if_unset(number, granted) {
            return Err(CodecError::DuplicateNumber { number });
        }
    }

    Ok(set)
}

/// Decode a nullable column. Missing, empty and zero-count blobs all read as `None`.
pub fn decode_optional(bytes: Option<&[u8]>) -> Result<Option<PermissionSet>, CodecError> {
    match bytes {
        None => Ok(None),
        Some(bytes) => {
            let set = decode(bytes)?;
            Ok((!set.is_empty()).then_some(set))
        }
    }
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64, CodecError> {
    let end = at + 8;
    let chunk: [u8; 8] = bytes
        .get(at..end)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(CodecError::Truncated {
            expected: end,
            actual: bytes.len(),
        })?;
    Ok(u64::from_be_bytes(chunk))
}
