//! Piece bitfield
//!
//! Bit vector tracking which pieces a peer (or ourselves) has. The wire
//! representation is byte-padded with zero pad bits; a remote sending
//! non-zero padding is a protocol violation.

use bitvec::prelude::*;

use crate::error::{ClientError, Result};

/// Bit vector of length `num_pieces`, most-significant bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: BitVec<u8, Msb0>,
}

impl Bitfield {
    /// Create an all-zero bitfield for `num_pieces` pieces.
    pub fn new(num_pieces: usize) -> Self {
        Self {
            bits: bitvec![u8, Msb0; 0; num_pieces],
        }
    }

    /// Parse a wire bitfield. The byte length must be exactly
    /// `ceil(num_pieces / 8)` and all trailing pad bits must be zero.
    pub fn from_bytes(bytes: &[u8], num_pieces: usize) -> Result<Self> {
        let expected = num_pieces.div_ceil(8);
        if bytes.len() != expected {
            return Err(ClientError::peer(format!(
                "bitfield has wrong size: expected {} bytes for {} pieces, got {}",
                expected,
                num_pieces,
                bytes.len()
            )));
        }

        let full = BitVec::<u8, Msb0>::from_slice(bytes);
        if full[num_pieces..].any() {
            return Err(ClientError::peer("bitfield has non-zero pad bits"));
        }

        let mut bits = full;
        bits.truncate(num_pieces);
        Ok(Self { bits })
    }

    /// Wire representation: byte-padded, pad bits zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut padded = self.bits.clone();
        padded.resize(self.bits.len().div_ceil(8) * 8, false);
        padded.into_vec()
    }

    /// Check whether piece `index` is set.
    pub fn check(&self, index: u32) -> bool {
        self.bits
            .get(index as usize)
            .map(|b| *b)
            .unwrap_or(false)
    }

    /// Mark piece `index` as present.
    pub fn set(&mut self, index: u32) {
        if (index as usize) < self.bits.len() {
            self.bits.set(index as usize, true);
        }
    }

    /// Number of pieces this bitfield covers.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when the bitfield covers no pieces at all.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of pieces present.
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    /// Indices of every piece still missing, in ascending order.
    pub fn missing_pieces(&self) -> Vec<u32> {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, b)| !**b)
            .map(|(i, _)| i as u32)
            .collect()
    }
}
