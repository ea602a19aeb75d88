//! Byte level reads and writes against a file's block pointers.

use crate::fs::{FileSystem, FsError};
use crate::io::{BlockNumber, BlockStorage, BLOCK_SIZE};
use crate::node::{self, FileBlocks, PointerBlock, POINTERS_PER_BLOCK, POINTERS_PER_INODE};

use log::debug;

impl<T: BlockStorage> FileSystem<T> {
    /// Copies file bytes starting at `offset` into `buf`, returning how many
    /// were copied. Reads stop at the end of the file, so the count is short
    /// near the end and zero at or past it.
    pub fn read(&mut self, inumber: u32, buf: &mut [u8], offset: usize) -> Result<usize, FsError> {
        let inode = self.valid_inode(inumber)?;
        let size = inode.size as usize;
        if buf.is_empty() || offset >= size {
            return Ok(0);
        }

        let blocks = FileBlocks::walk(&mut self.dev, &inode)?;
        let wanted = buf.len().min(size - offset);
        let mut block = [0; BLOCK_SIZE];
        let mut copied = 0;
        let mut pos = offset;
        for blocknr in blocks.data().skip(offset / BLOCK_SIZE) {
            if copied == wanted {
                break;
            }
            self.dev.read_block(blocknr, &mut block)?;
            let start = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - start).min(wanted - copied);
            buf[copied..copied + n].copy_from_slice(&block[start..start + n]);
            copied += n;
            pos += n;
        }
        debug!("read {} bytes from inode {} at {}", copied, inumber, offset);
        Ok(copied)
    }

    /// Writes `data` into the file at `offset`, growing it as needed, and
    /// returns how many bytes landed. Blocks already owned by the file are
    /// overwritten in place; new ones are taken from the free map in
    /// ascending order. A short count means the device or the file's pointer
    /// capacity ran out.
    ///
    /// `offset` may be at most the current size; files have no holes.
    pub fn write(&mut self, inumber: u32, data: &[u8], offset: usize) -> Result<usize, FsError> {
        let mut inode = self.valid_inode(inumber)?;
        let size = inode.size as usize;
        if offset > size {
            return Err(FsError::InvalidArgument(format!(
                "offset {} is past the end of inode {} ({} bytes)",
                offset, inumber, size
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }

        let blocks = FileBlocks::walk(&mut self.dev, &inode)?;
        let owned: Vec<BlockNumber> = blocks.data().collect();
        let mut block = [0; BLOCK_SIZE];
        let mut written = 0;
        let mut pos = offset;

        // Overwrite whatever falls inside blocks the file already owns.
        let capacity = owned.len() * BLOCK_SIZE;
        while written < data.len() && pos < capacity {
            let blocknr = owned[pos / BLOCK_SIZE];
            let start = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - start).min(data.len() - written);
            if n < BLOCK_SIZE {
                self.dev.read_block(blocknr, &mut block)?;
            }
            block[start..start + n].copy_from_slice(&data[written..written + n]);
            self.dev.write_block(blocknr, &block)?;
            written += n;
            pos += n;
        }
        if pos > size {
            inode.size = pos as u32;
            node::save(&mut self.dev, inumber, &inode)?;
        }
        if written == data.len() {
            debug!("overwrote {} bytes of inode {} at {}", written, inumber, offset);
            return Ok(written);
        }

        // Everything left goes into newly claimed blocks. `pos` is block
        // aligned from here on.
        let mut used = owned.len();
        let mut pointers = match blocks.indirect {
            Some(indirect) if used > POINTERS_PER_INODE => PointerBlock::read(&mut self.dev, indirect)?,
            _ => PointerBlock::new(),
        };
        while written < data.len() && used < POINTERS_PER_INODE + POINTERS_PER_BLOCK {
            let blocknr = match self.free_map.allocate() {
                Some(blocknr) => blocknr,
                None => {
                    debug!("no free blocks left for inode {}", inumber);
                    break;
                }
            };

            if used >= POINTERS_PER_INODE && inode.indirect == 0 {
                pointers = PointerBlock::new();
                pointers.write(&mut self.dev, blocknr)?;
                inode.indirect = blocknr as u32;
                node::save(&mut self.dev, inumber, &inode)?;
                debug!("inode {} claimed indirect block {}", inumber, blocknr);
                continue;
            }

            let n = BLOCK_SIZE.min(data.len() - written);
            block = [0; BLOCK_SIZE];
            block[..n].copy_from_slice(&data[written..written + n]);

            if used < POINTERS_PER_INODE {
                inode.direct[used] = blocknr as u32;
            } else {
                pointers.set(used - POINTERS_PER_INODE, blocknr as u32);
                pointers.write(&mut self.dev, inode.indirect as BlockNumber)?;
            }
            used += 1;
            inode.size += n as u32;
            node::save(&mut self.dev, inumber, &inode)?;
            self.dev.write_block(blocknr, &block)?;
            written += n;
        }

        // An indirect block that never received a pointer would not be seen
        // by the next mount's scan; give it back now.
        if used == POINTERS_PER_INODE && inode.indirect != 0 {
            debug!("inode {} releasing unused indirect block {}", inumber, inode.indirect);
            self.free_map.set_free(inode.indirect as BlockNumber);
            inode.indirect = 0;
            node::save(&mut self.dev, inumber, &inode)?;
        }

        debug!(
            "wrote {} of {} bytes to inode {} at {}, size now {}",
            written,
            data.len(),
            inumber,
            offset,
            inode.size
        );
        Ok(written)
    }
}
