use std::io::Write;

use crate::alloc::FreeMap;
use crate::io::{BlockStorage, BLOCK_SIZE};
use crate::node::{self, decode_inode_block, FileBlocks, Inode, INODES_PER_BLOCK};
use crate::sb::SuperBlock;

use log::{debug, info};
use thiserror::Error;

const SUPERBLOCK_INDEX: usize = 0;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("inode {0} is not an allocated file")]
    InvalidInode(u32),
    #[error("no file system found on device (magic {0:#010x})")]
    BadMagic(u32),
    #[error("device of {0} blocks cannot hold a super block and inode table")]
    DeviceTooSmall(usize),
    #[error("inode table is full")]
    NoFreeInodes,
    #[error("block device error")]
    Device(#[from] std::io::Error),
}

/// A mounted volume. Owns the block device and the free block map rebuilt
/// when it was mounted.
///
/// # Layout
/// =====================================================
/// | SuperBlock | Inode table (n / 10 blocks) | Data   |
/// =====================================================
pub struct FileSystem<T: BlockStorage> {
    pub(crate) dev: T,
    pub(crate) super_block: SuperBlock,
    pub(crate) free_map: FreeMap,
}

fn read_super_block<T: BlockStorage>(dev: &mut T) -> Result<SuperBlock, FsError> {
    let mut buf = [0; BLOCK_SIZE];
    dev.read_block(SUPERBLOCK_INDEX, &mut buf)?;
    Ok(SuperBlock::parse(&buf))
}

impl<T: BlockStorage> FileSystem<T> {
    /// Writes a fresh super block sized to the device.
    ///
    /// When the device already holds this file system its inode table is
    /// zeroed first, dropping every file. A device without the magic is not
    /// erased.
    pub fn format(dev: &mut T) -> Result<SuperBlock, FsError> {
        let block_count = dev.block_count();
        let super_block = SuperBlock::for_device(block_count);
        if block_count < super_block.data_start() {
            return Err(FsError::DeviceTooSmall(block_count));
        }

        let old = read_super_block(dev)?;
        if old.is_valid() {
            let zero = [0; BLOCK_SIZE];
            let last = (old.inode_blocks as usize).min(block_count - 1);
            debug!("erasing {} inode blocks of previous volume", last);
            for blocknr in 1..=last {
                dev.write_block(blocknr, &zero)?;
            }
        }

        dev.write_block(SUPERBLOCK_INDEX, &super_block.serialize())?;
        dev.sync_disk()?;
        info!(
            "formatted {} blocks with {} inode blocks ({} inodes)",
            super_block.total_blocks, super_block.inode_blocks, super_block.total_inodes
        );
        Ok(super_block)
    }

    /// Reads the super block and checks the magic without mounting.
    pub fn probe(dev: &mut T) -> Result<SuperBlock, FsError> {
        let super_block = read_super_block(dev)?;
        if !super_block.is_valid() {
            return Err(FsError::BadMagic(super_block.magic));
        }
        Ok(super_block)
    }

    /// Mounts the volume on `dev`, rebuilding the free block map from every
    /// valid inode's pointers.
    pub fn mount(mut dev: T) -> Result<Self, FsError> {
        let super_block = Self::probe(&mut dev)?;
        let block_count = (super_block.total_blocks as usize).min(dev.block_count());
        let mut free_map = FreeMap::new(block_count, super_block.data_start());

        let mut buf = [0; BLOCK_SIZE];
        let mut files = 0;
        for table_block in 1..=super_block.inode_blocks as usize {
            dev.read_block(table_block, &mut buf)?;
            for inode in decode_inode_block(&buf).iter().filter(|inode| inode.valid) {
                let blocks = FileBlocks::walk(&mut dev, inode)?;
                for blocknr in blocks.all() {
                    free_map.set_reserved(blocknr);
                }
                files += 1;
            }
        }

        info!(
            "mounted volume: {} files, {} of {} blocks free",
            files,
            free_map.free_count(),
            block_count
        );
        Ok(Self {
            dev,
            super_block,
            free_map,
        })
    }

    /// Releases the free block map and hands the device back.
    pub fn unmount(mut self) -> Result<T, FsError> {
        self.dev.sync_disk()?;
        info!("unmounted volume");
        Ok(self.dev)
    }

    /// Writes a human readable dump of the volume on `dev` to `out`.
    pub fn dump<W: Write>(dev: &mut T, out: &mut W) -> Result<(), FsError> {
        let super_block = read_super_block(dev)?;
        writeln!(out, "superblock:")?;
        if super_block.is_valid() {
            writeln!(out, "    magic number is valid")?;
        } else {
            writeln!(out, "    magic number is NOT valid")?;
            return Ok(());
        }
        writeln!(out, "    {} blocks", super_block.total_blocks)?;
        writeln!(out, "    {} inode blocks", super_block.inode_blocks)?;
        writeln!(out, "    {} inodes", super_block.total_inodes)?;

        let mut buf = [0; BLOCK_SIZE];
        for table_block in 0..super_block.inode_blocks as usize {
            dev.read_block(table_block + 1, &mut buf)?;
            for (slot, inode) in decode_inode_block(&buf).iter().enumerate() {
                if !inode.valid {
                    continue;
                }
                writeln!(out, "inode {}:", slot + table_block * INODES_PER_BLOCK)?;
                writeln!(out, "    size: {} bytes", inode.size)?;
                if inode.size == 0 {
                    continue;
                }
                let blocks = FileBlocks::walk(dev, inode)?;
                writeln!(out, "    direct blocks:{}", block_list(&blocks.direct))?;
                if let Some(indirect) = blocks.indirect {
                    writeln!(out, "    indirect block: {}", indirect)?;
                    writeln!(
                        out,
                        "    indirect data blocks:{}",
                        block_list(&blocks.indirect_data)
                    )?;
                }
            }
        }
        Ok(())
    }

    /// [`FileSystem::dump`] for the mounted device.
    pub fn debug<W: Write>(&mut self, out: &mut W) -> Result<(), FsError> {
        Self::dump(&mut self.dev, out)
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn free_map(&self) -> &FreeMap {
        &self.free_map
    }

    /// Allocates the lowest unused inode as an empty file.
    pub fn create(&mut self) -> Result<u32, FsError> {
        for inumber in 1..self.super_block.total_inodes {
            let inode = node::load(&mut self.dev, inumber)?;
            if !inode.valid {
                node::save(&mut self.dev, inumber, &Inode::empty_file())?;
                info!("created inode {}", inumber);
                return Ok(inumber);
            }
        }
        Err(FsError::NoFreeInodes)
    }

    /// Frees every block of the file and returns its inode to the table.
    pub fn delete(&mut self, inumber: u32) -> Result<(), FsError> {
        let inode = self.valid_inode(inumber)?;
        let blocks = FileBlocks::walk(&mut self.dev, &inode)?;
        for blocknr in blocks.all() {
            self.free_map.set_free(blocknr);
        }
        node::save(&mut self.dev, inumber, &Inode::default())?;
        info!(
            "deleted inode {} releasing {} blocks",
            inumber,
            blocks.all().count()
        );
        Ok(())
    }

    /// Logical size of the file in bytes.
    pub fn getsize(&mut self, inumber: u32) -> Result<u32, FsError> {
        Ok(self.valid_inode(inumber)?.size)
    }

    pub fn is_valid_inumber(&mut self, inumber: u32) -> Result<bool, FsError> {
        if inumber == 0 || inumber >= self.super_block.total_inodes {
            return Ok(false);
        }
        Ok(node::load(&mut self.dev, inumber)?.valid)
    }

    /// Loads the inode for `inumber`, failing unless it is an allocated file.
    pub(crate) fn valid_inode(&mut self, inumber: u32) -> Result<Inode, FsError> {
        if inumber == 0 || inumber >= self.super_block.total_inodes {
            return Err(FsError::InvalidInode(inumber));
        }
        let inode = node::load(&mut self.dev, inumber)?;
        if !inode.valid {
            return Err(FsError::InvalidInode(inumber));
        }
        Ok(inode)
    }
}

fn block_list(blocks: &[usize]) -> String {
    blocks.iter().map(|b| format!(" {}", b)).collect()
}
