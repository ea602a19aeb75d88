use crate::io::BLOCK_SIZE;
use crate::node::INODES_PER_BLOCK;

use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Identifies a formatted volume. Stored in the first word of block 0.
pub const FS_MAGIC: u32 = 0xf0f0_3410;

/// One tenth of the device, rounded up, is set aside for inodes.
const INODE_BLOCK_RATIO: usize = 10;

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy)]
struct RawSuperBlock {
    magic: U32<LittleEndian>,
    nblocks: U32<LittleEndian>,
    ninodeblocks: U32<LittleEndian>,
    ninodes: U32<LittleEndian>,
}

/// The first block of the file system storing information critical for mounting
/// the file system and verifying the underlying disk is formatted correctly.
///
/// All four fields are written once by format and never change while the
/// volume stays formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Expected to equal [`FS_MAGIC`] on a formatted volume.
    pub magic: u32,
    /// Block count of the device at format time.
    pub total_blocks: u32,
    /// Blocks `1..=inode_blocks` hold the inode table.
    pub inode_blocks: u32,
    /// `inode_blocks * INODES_PER_BLOCK`.
    pub total_inodes: u32,
}

impl SuperBlock {
    /// Computes the layout for a device of `block_count` blocks.
    pub fn for_device(block_count: usize) -> Self {
        let inode_blocks = (block_count + INODE_BLOCK_RATIO - 1) / INODE_BLOCK_RATIO;
        Self {
            magic: FS_MAGIC,
            total_blocks: block_count as u32,
            inode_blocks: inode_blocks as u32,
            total_inodes: (inode_blocks * INODES_PER_BLOCK) as u32,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }

    /// First block id past the inode table.
    pub fn data_start(&self) -> usize {
        1 + self.inode_blocks as usize
    }

    /// Reads the super block from the leading bytes of a block buffer. The
    /// magic is not checked here; callers decide what a bad magic means.
    ///
    /// Panics if `buf` is shorter than a block.
    pub fn parse(buf: &[u8]) -> Self {
        assert_eq!(buf.len(), BLOCK_SIZE, "Length of buffer to parse must equal block size.");
        let raw = RawSuperBlock::read_from_prefix(buf).unwrap_or_else(RawSuperBlock::new_zeroed);
        Self {
            magic: raw.magic.get(),
            total_blocks: raw.nblocks.get(),
            inode_blocks: raw.ninodeblocks.get(),
            total_inodes: raw.ninodes.get(),
        }
    }

    /// Serializes the SuperBlock into a BLOCK_SIZE buffer for writing to disk.
    /// The encoding is the four fields as little endian words followed by zeroes.
    pub fn serialize(&self) -> [u8; BLOCK_SIZE] {
        let raw = RawSuperBlock {
            magic: U32::new(self.magic),
            nblocks: U32::new(self.total_blocks),
            ninodeblocks: U32::new(self.inode_blocks),
            ninodes: U32::new(self.total_inodes),
        };
        let mut block = [0; BLOCK_SIZE];
        let bytes = raw.as_bytes();
        block[..bytes.len()].copy_from_slice(bytes);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_encode_and_decode_superblocks() {
        let sb = SuperBlock::for_device(200);
        let encoded = sb.serialize();

        let parsed = SuperBlock::parse(&encoded);

        assert_eq!(parsed, sb);
        assert!(parsed.is_valid());
    }

    #[test]
    fn layout_matches_little_endian_words() {
        let encoded = SuperBlock::for_device(10).serialize();

        assert_eq!(&encoded[0..4], &[0x10, 0x34, 0xf0, 0xf0]);
        assert_eq!(&encoded[4..8], &10u32.to_le_bytes());
        assert_eq!(&encoded[8..12], &1u32.to_le_bytes());
        assert_eq!(&encoded[12..16], &128u32.to_le_bytes());
        assert!(encoded[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn inode_table_is_a_tenth_of_the_device_rounded_up() {
        let cases = [(1, 1), (10, 1), (11, 2), (20, 2), (25, 3), (1000, 100)];
        for &(blocks, inode_blocks) in cases.iter() {
            let sb = SuperBlock::for_device(blocks);
            assert_eq!(sb.inode_blocks, inode_blocks, "device of {} blocks", blocks);
            assert_eq!(sb.total_inodes, inode_blocks * 128);
            assert_eq!(sb.data_start(), 1 + inode_blocks as usize);
        }
    }

    #[test]
    fn zeroed_buffer_has_invalid_magic() {
        let zero_buffer_with_right_size = vec![0; 4096];
        let sb = SuperBlock::parse(&zero_buffer_with_right_size);
        assert!(!sb.is_valid());
        assert_eq!(sb.total_blocks, 0);
    }

    #[test]
    #[should_panic]
    fn parsing_buffer_with_invalid_size_panics() {
        let wrong_size_buffer = vec![0; 512];
        SuperBlock::parse(&wrong_size_buffer);
    }
}
