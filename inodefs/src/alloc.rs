use crate::io::BlockNumber;

use bitvec::prelude::*;
use log::warn;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// Tracks which blocks of a mounted volume are in use. Nothing here is ever
/// written to disk; the map is rebuilt from the inode table on every mount.
///
/// Allocation is a naive next-available policy: the lowest free block at or
/// after the start of the data region is handed out first.
#[derive(Debug, Clone)]
pub struct FreeMap {
    /// One bit per device block, set when the block is free.
    free: BitVec<u8, Lsb0>,
    /// First block id that may hold file data or an indirect block.
    data_start: BlockNumber,
}

impl FreeMap {
    /// A map for `block_count` blocks where the super block and every block
    /// below `data_start` are permanently in use and the rest are free.
    pub fn new(block_count: usize, data_start: BlockNumber) -> Self {
        let mut free = BitVec::<u8, Lsb0>::repeat(true, block_count);
        let reserved = data_start.min(block_count);
        free[..reserved].fill(false);
        Self { free, data_start }
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn get(&self, blocknr: BlockNumber) -> State {
        match self.free.get(blocknr).map(|bit| *bit) {
            Some(true) => State::Free,
            _ => State::Used,
        }
    }

    pub fn is_free(&self, blocknr: BlockNumber) -> bool {
        self.get(blocknr) == State::Free
    }

    /// Marks a block referenced by some file. Ids past the end of the device
    /// are reported and ignored.
    pub fn set_reserved(&mut self, blocknr: BlockNumber) {
        if blocknr >= self.free.len() {
            warn!("ignoring reference to block {} outside the device", blocknr);
            return;
        }
        self.free.set(blocknr, false);
    }

    /// Returns a data block to the pool. Metadata blocks are never released.
    pub fn set_free(&mut self, blocknr: BlockNumber) {
        if blocknr < self.data_start || blocknr >= self.free.len() {
            warn!("refusing to release block {}", blocknr);
            return;
        }
        self.free.set(blocknr, true);
    }

    /// Claims the lowest free data block.
    pub fn allocate(&mut self) -> Option<BlockNumber> {
        if self.data_start >= self.free.len() {
            return None;
        }
        let blocknr = self.free[self.data_start..].first_one()? + self.data_start;
        self.free.set(blocknr, false);
        Some(blocknr)
    }

    pub fn free_count(&self) -> usize {
        self.free.count_ones()
    }
}
