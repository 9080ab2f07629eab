//! Update masks
//!
//! An [`UpdateMask`] is a fixed-capacity bitset split into 32-bit blocks, with a
//! second layer (the blocks-mask) recording which blocks are non-zero. The
//! blocks-mask is what lets an unchanged record cost only a few header bits on
//! the wire.
//!
//! Invariant: blocks-mask bit `i` is set iff block `i` is non-zero. Every
//! mutating operation maintains it.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOrAssign};

/// Bits per block
pub const BLOCK_BITS: usize = 32;

/// Number of 32-bit words needed to hold `bits` bits
#[inline]
pub const fn blocks_for(bits: usize) -> usize {
    (bits + BLOCK_BITS - 1) / BLOCK_BITS
}

/// Mask with the low `bits % 32` bits set, or all bits when `bits` is a multiple of 32
#[inline]
fn tail_mask(bits: usize) -> u32 {
    match bits % BLOCK_BITS {
        0 => u32::MAX,
        n => (1u32 << n) - 1,
    }
}

/// Two-layer change mask with a fixed bit capacity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateMask {
    bit_count: usize,
    blocks: Vec<u32>,
    blocks_mask: Vec<u32>,
}

impl UpdateMask {
    /// Create an all-zero mask with room for `bit_count` bits
    pub fn new(bit_count: usize) -> Self {
        let block_count = blocks_for(bit_count);
        Self {
            bit_count,
            blocks: vec![0; block_count],
            blocks_mask: vec![0; blocks_for(block_count)],
        }
    }

    /// Create a mask with the given bits set
    pub fn from_bits(bit_count: usize, bits: &[usize]) -> Self {
        let mut mask = Self::new(bit_count);
        for &bit in bits {
            mask.set(bit);
        }
        mask
    }

    /// Create a mask with every valid bit set
    pub fn all(bit_count: usize) -> Self {
        let mut mask = Self::new(bit_count);
        mask.set_all();
        mask
    }

    /// Number of addressable bits
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Number of 32-bit blocks
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of 32-bit words in the blocks-mask
    #[inline]
    pub fn blocks_mask_count(&self) -> usize {
        self.blocks_mask.len()
    }

    /// Raw value of block `index`
    #[inline]
    pub fn block(&self, index: usize) -> u32 {
        self.blocks[index]
    }

    /// Raw value of blocks-mask word `index`
    #[inline]
    pub fn blocks_mask(&self, index: usize) -> u32 {
        self.blocks_mask[index]
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.bit_count,
            "update mask index {} out of range (bit count {})",
            index,
            self.bit_count
        );
    }

    fn refresh_blocks_mask_bit(&mut self, block: usize) {
        let word = block / BLOCK_BITS;
        let bit = 1u32 << (block % BLOCK_BITS);
        if self.blocks[block] != 0 {
            self.blocks_mask[word] |= bit;
        } else {
            self.blocks_mask[word] &= !bit;
        }
    }

    /// Test bit `index`
    #[inline]
    pub fn test(&self, index: usize) -> bool {
        self.check_index(index);
        self.blocks[index / BLOCK_BITS] & (1 << (index % BLOCK_BITS)) != 0
    }

    /// Set bit `index`
    pub fn set(&mut self, index: usize) {
        self.check_index(index);
        let block = index / BLOCK_BITS;
        self.blocks[block] |= 1 << (index % BLOCK_BITS);
        self.blocks_mask[block / BLOCK_BITS] |= 1 << (block % BLOCK_BITS);
    }

    /// Clear bit `index`
    pub fn reset(&mut self, index: usize) {
        self.check_index(index);
        let block = index / BLOCK_BITS;
        self.blocks[block] &= !(1 << (index % BLOCK_BITS));
        self.refresh_blocks_mask_bit(block);
    }

    /// Set every addressable bit, leaving padding bits clear
    pub fn set_all(&mut self) {
        let block_count = self.blocks.len();
        if block_count == 0 {
            return;
        }
        self.blocks.fill(u32::MAX);
        self.blocks[block_count - 1] = tail_mask(self.bit_count);

        let words = self.blocks_mask.len();
        self.blocks_mask.fill(u32::MAX);
        self.blocks_mask[words - 1] = tail_mask(block_count);
    }

    /// Clear every bit
    pub fn reset_all(&mut self) {
        self.blocks.fill(0);
        self.blocks_mask.fill(0);
    }

    /// Whether any bit is set
    #[inline]
    pub fn is_any(&self) -> bool {
        self.blocks_mask.iter().any(|&word| word != 0)
    }

    /// Whether no bit is set
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.is_any()
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Iterate over the indices of set bits in ascending order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| **block != 0)
            .flat_map(|(i, &block)| {
                (0..BLOCK_BITS)
                    .filter(move |bit| block & (1 << bit) != 0)
                    .map(move |bit| i * BLOCK_BITS + bit)
            })
    }

    fn check_same_capacity(&self, other: &UpdateMask) {
        assert_eq!(
            self.bit_count, other.bit_count,
            "update mask capacity mismatch ({} vs {})",
            self.bit_count, other.bit_count
        );
    }

    /// Intersect in place with `other`
    pub fn and_with(&mut self, other: &UpdateMask) {
        self.check_same_capacity(other);
        for (block, &theirs) in self.blocks.iter_mut().zip(&other.blocks) {
            *block &= theirs;
        }
        for (index, word) in self.blocks_mask.iter_mut().enumerate() {
            *word &= other.blocks_mask[index];
        }
        for block in 0..self.blocks.len() {
            self.refresh_blocks_mask_bit(block);
        }
    }

    /// Union in place with `other`
    pub fn or_with(&mut self, other: &UpdateMask) {
        self.check_same_capacity(other);
        for (block, &theirs) in self.blocks.iter_mut().zip(&other.blocks) {
            *block |= theirs;
        }
        for (word, &theirs) in self.blocks_mask.iter_mut().zip(&other.blocks_mask) {
            *word |= theirs;
        }
    }

    /// Check the blocks-mask invariant
    pub fn is_consistent(&self) -> bool {
        self.blocks.iter().enumerate().all(|(i, &block)| {
            let flagged = self.blocks_mask[i / BLOCK_BITS] & (1 << (i % BLOCK_BITS)) != 0;
            flagged == (block != 0)
        }) && self.blocks.last().map_or(true, |&last| {
            last & !tail_mask(self.bit_count) == 0
        })
    }
}

impl BitAndAssign<&UpdateMask> for UpdateMask {
    fn bitand_assign(&mut self, rhs: &UpdateMask) {
        self.and_with(rhs);
    }
}

impl BitOrAssign<&UpdateMask> for UpdateMask {
    fn bitor_assign(&mut self, rhs: &UpdateMask) {
        self.or_with(rhs);
    }
}

impl BitAnd for &UpdateMask {
    type Output = UpdateMask;

    fn bitand(self, rhs: &UpdateMask) -> UpdateMask {
        let mut result = self.clone();
        result.and_with(rhs);
        result
    }
}

impl fmt::Display for UpdateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in 0..self.bit_count {
            let set = self.blocks[index / BLOCK_BITS] & (1 << (index % BLOCK_BITS)) != 0;
            f.write_str(if set { "1" } else { "0" })?;
        }
        Ok(())
    }
}
