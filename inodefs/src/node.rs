use crate::fs::FsError;
use crate::io::{BlockNumber, BlockStorage, BLOCK_SIZE};

use log::warn;
use zerocopy::byteorder::{LittleEndian, I32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

pub const INODES_PER_BLOCK: usize = 128;
pub const POINTERS_PER_INODE: usize = 5;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;
/// Five direct blocks plus one indirect block's worth of pointers.
pub const MAX_FILE_SIZE: usize = (POINTERS_PER_INODE + POINTERS_PER_BLOCK) * BLOCK_SIZE;

/// On-disk record, 28 bytes. This structure __must not exceed
/// `BLOCK_SIZE / INODES_PER_BLOCK` bytes.__
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy)]
struct RawInode {
    isvalid: I32<LittleEndian>,
    size: I32<LittleEndian>,
    direct: [I32<LittleEndian>; POINTERS_PER_INODE],
    indirect: I32<LittleEndian>,
}

const NODE_SIZE: usize = std::mem::size_of::<RawInode>();

/// A file's metadata. Pointer value 0 means unset, block 0 being the super
/// block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub valid: bool,
    /// The total size of the file in bytes.
    pub size: u32,
    pub direct: [u32; POINTERS_PER_INODE],
    pub indirect: u32,
}

impl Inode {
    /// A fresh, empty file.
    pub fn empty_file() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    /// Number of data blocks the file's size accounts for.
    pub fn blocks_used(&self) -> usize {
        (self.size as usize + BLOCK_SIZE - 1) / BLOCK_SIZE
    }

    fn decode(raw: &RawInode) -> Self {
        let mut direct = [0; POINTERS_PER_INODE];
        for (ptr, raw_ptr) in direct.iter_mut().zip(raw.direct.iter()) {
            *ptr = raw_ptr.get() as u32;
        }
        Self {
            valid: raw.isvalid.get() != 0,
            size: raw.size.get() as u32,
            direct,
            indirect: raw.indirect.get() as u32,
        }
    }

    fn encode(&self) -> RawInode {
        let mut raw = RawInode::new_zeroed();
        raw.isvalid = I32::new(self.valid as i32);
        raw.size = I32::new(self.size as i32);
        for (raw_ptr, &ptr) in raw.direct.iter_mut().zip(self.direct.iter()) {
            *raw_ptr = I32::new(ptr as i32);
        }
        raw.indirect = I32::new(self.indirect as i32);
        raw
    }
}

/// Maps an inumber to the inode table block holding it and the record's slot
/// within that block.
pub fn inode_location(inumber: u32) -> (BlockNumber, usize) {
    let inumber = inumber as usize;
    (1 + inumber / INODES_PER_BLOCK, inumber % INODES_PER_BLOCK)
}

/// Decodes a whole inode table block.
pub fn decode_inode_block(buf: &[u8]) -> Vec<Inode> {
    buf.chunks_exact(NODE_SIZE)
        .take(INODES_PER_BLOCK)
        .map(|chunk| match RawInode::read_from(chunk) {
            Some(raw) => Inode::decode(&raw),
            None => Inode::default(),
        })
        .collect()
}

fn encode_into_slot(buf: &mut [u8], slot: usize, inode: &Inode) {
    let start = slot * NODE_SIZE;
    buf[start..start + NODE_SIZE].copy_from_slice(inode.encode().as_bytes());
}

/// Reads the record for `inumber`. The inumber is not bounds checked against
/// the inode table; callers validate it first.
pub fn load<T: BlockStorage>(dev: &mut T, inumber: u32) -> Result<Inode, FsError> {
    let (block, slot) = inode_location(inumber);
    let mut buf = [0; BLOCK_SIZE];
    dev.read_block(block, &mut buf)?;
    let start = slot * NODE_SIZE;
    Ok(RawInode::read_from(&buf[start..start + NODE_SIZE])
        .map(|raw| Inode::decode(&raw))
        .unwrap_or_default())
}

/// Writes the record for `inumber`, leaving the other records in its block intact.
pub fn save<T: BlockStorage>(dev: &mut T, inumber: u32, inode: &Inode) -> Result<(), FsError> {
    let (block, slot) = inode_location(inumber);
    let mut buf = [0; BLOCK_SIZE];
    dev.read_block(block, &mut buf)?;
    encode_into_slot(&mut buf, slot, inode);
    dev.write_block(block, &buf)?;
    Ok(())
}

/// A block reinterpreted as an array of block ids.
#[derive(Clone, PartialEq, Eq)]
pub struct PointerBlock {
    pointers: Vec<u32>,
}

impl PointerBlock {
    pub fn new() -> Self {
        Self {
            pointers: vec![0; POINTERS_PER_BLOCK],
        }
    }

    pub fn parse(buf: &[u8]) -> Self {
        let pointers = buf
            .chunks_exact(4)
            .take(POINTERS_PER_BLOCK)
            .map(|word| {
                let mut bytes = [0; 4];
                bytes.copy_from_slice(word);
                i32::from_le_bytes(bytes) as u32
            })
            .collect();
        Self { pointers }
    }

    pub fn serialize(&self) -> [u8; BLOCK_SIZE] {
        let mut block = [0; BLOCK_SIZE];
        for (word, ptr) in block.chunks_exact_mut(4).zip(self.pointers.iter()) {
            word.copy_from_slice(&(*ptr as i32).to_le_bytes());
        }
        block
    }

    pub fn get(&self, index: usize) -> u32 {
        self.pointers[index]
    }

    pub fn set(&mut self, index: usize, blocknr: u32) {
        self.pointers[index] = blocknr;
    }

    pub fn read<T: BlockStorage>(dev: &mut T, blocknr: BlockNumber) -> Result<Self, FsError> {
        let mut buf = [0; BLOCK_SIZE];
        dev.read_block(blocknr, &mut buf)?;
        Ok(Self::parse(&buf))
    }

    pub fn write<T: BlockStorage>(&self, dev: &mut T, blocknr: BlockNumber) -> Result<(), FsError> {
        dev.write_block(blocknr, &self.serialize())?;
        Ok(())
    }
}

/// The blocks a file owns, in logical order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileBlocks {
    /// Direct data blocks.
    pub direct: Vec<BlockNumber>,
    /// The indirect block, only reported when the file's size reaches past
    /// its direct blocks.
    pub indirect: Option<BlockNumber>,
    /// Data blocks addressed through the indirect block.
    pub indirect_data: Vec<BlockNumber>,
}

impl FileBlocks {
    /// Walks the file's size in block sized steps over its non-zero direct
    /// pointers, then over the indirect block's non-zero pointers.
    pub fn walk<T: BlockStorage>(dev: &mut T, inode: &Inode) -> Result<Self, FsError> {
        let mut blocks = Self::default();
        let mut remaining = inode.size as usize;
        for &ptr in inode.direct.iter() {
            if remaining == 0 {
                break;
            }
            if ptr != 0 {
                blocks.direct.push(ptr as BlockNumber);
                remaining = remaining.saturating_sub(BLOCK_SIZE);
            }
        }
        if remaining > 0 && inode.indirect != 0 {
            let indirect = inode.indirect as BlockNumber;
            if indirect >= dev.block_count() {
                warn!("indirect block {} lies outside the device", indirect);
                return Ok(blocks);
            }
            blocks.indirect = Some(indirect);
            let pointers = PointerBlock::read(dev, indirect)?;
            for &ptr in pointers.pointers.iter() {
                if remaining == 0 {
                    break;
                }
                if ptr != 0 {
                    blocks.indirect_data.push(ptr as BlockNumber);
                    remaining = remaining.saturating_sub(BLOCK_SIZE);
                }
            }
        }
        Ok(blocks)
    }

    /// Data blocks in logical order, direct first.
    pub fn data(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.direct.iter().chain(self.indirect_data.iter()).copied()
    }

    pub fn data_len(&self) -> usize {
        self.direct.len() + self.indirect_data.len()
    }

    /// Every block the file owns, data and indirect.
    pub fn all(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.direct
            .iter()
            .chain(self.indirect.iter())
            .chain(self.indirect_data.iter())
            .copied()
    }
}
