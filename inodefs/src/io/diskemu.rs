use super::{BlockNumber, BlockStorage, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

use log::debug;

/// Emulates block disk/flash storage in userspace using a file as block storage.
/// This is only meant to be used for file system development and testing.
pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: usize,
    reads: u64,
    writes: u64,
}

impl FileBlockEmulator {
    /// Opens an existing disk image without touching its contents. The image is
    /// extended with zeroes if it is shorter than `nblocks` blocks.
    pub fn open<P: AsRef<Path>>(path: P, nblocks: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        FileBlockEmulatorBuilder::from(file)
            .with_block_count(nblocks)
            .clear_medium(false)
            .build()
    }

    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    /// Number of blocks read since the emulator was built.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Number of blocks written since the emulator was built.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "block {} out of range for device of {} blocks",
                    blocknr, self.block_count
                ),
            ));
        }
        Ok(())
    }
}

impl BlockStorage for FileBlockEmulator {
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        if buf.len() < BLOCK_SIZE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;
        // Limit the read to just the block specified.
        self.fd.read_exact(&mut buf[..BLOCK_SIZE])?;
        self.reads += 1;
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        if buf.len() < BLOCK_SIZE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain a full block to write",
            ));
        }
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;
        self.fd.write_all(&buf[..BLOCK_SIZE])?;
        self.writes += 1;
        Ok(())
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: usize,
    clear: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_count: 0,
            clear: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether to zero the whole medium when building. Defaults to true.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    /// This builder assumed ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally, ownership
    /// of the file is transfered to the emulator meaning this builder can only
    /// be used to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        if self.block_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block device must have at least one block",
            ));
        }
        if self.clear {
            self.zero_blocks()?;
        } else {
            let want = (self.block_count * BLOCK_SIZE) as u64;
            if self.fd.metadata()?.len() < want {
                self.fd.set_len(want)?;
            }
        }
        debug!(
            "block device ready with {} blocks (cleared: {})",
            self.block_count, self.clear
        );
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
            reads: 0,
            writes: 0,
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk" block, buffering each write to prevent excessive reads.
        let zero = [0x00; BLOCK_SIZE];
        for _ in 0..self.block_count {
            bfd.write_all(&zero)?;
        }
        bfd.flush()?;
        drop(bfd);
        self.fd.set_len((self.block_count * BLOCK_SIZE) as u64)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(blocks: usize) -> FileBlockEmulator {
        let fs_block = tempfile::tempfile().unwrap();
        FileBlockEmulatorBuilder::from(fs_block)
            .with_block_count(blocks)
            .build()
            .expect("failed to allocate file block")
    }

    #[test]
    fn file_emulator_allocates_correct_num_bytes() {
        let mut disk_emu = device(4);
        disk_emu.sync_disk().unwrap();
        assert_eq!(disk_emu.block_count(), 4);
        assert_eq!(disk_emu.into_file().metadata().unwrap().len(), 4 * 4096);
    }

    #[test]
    fn can_read_and_write_blocks() {
        let mut disk_emu = device(4);

        // Allocate a block with a non-zero character.
        let block = vec![0x55; 4096];
        disk_emu.write_block(2, &block).unwrap();

        let mut read_block = vec![0xff; 4096];
        // Read a different block.
        disk_emu.read_block(3, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x00; 4096]);

        // Read the block with data.
        disk_emu.read_block(2, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x55; 4096]);
        assert_eq!(disk_emu.reads(), 2);
        assert_eq!(disk_emu.writes(), 1);
    }

    #[test]
    fn can_read_and_write_start_and_end_blocks() {
        let mut disk_emu = device(2);

        disk_emu.write_block(0, &[0x11; 4096]).unwrap();
        disk_emu.write_block(1, &[0x22; 4096]).unwrap();

        let mut read_block = vec![0x00; 4096];
        disk_emu.read_block(0, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x11; 4096]);
        disk_emu.read_block(1, &mut read_block).unwrap();
        assert_eq!(read_block, vec![0x22; 4096]);
    }

    #[test]
    fn access_beyond_range_is_an_error() {
        let mut disk_emu = device(1);

        let err = disk_emu.write_block(1, &[0x55; 4096]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let mut buf = [0; 4096];
        assert!(disk_emu.read_block(1, &mut buf).is_err());
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut disk_emu = device(1);

        assert!(disk_emu.write_block(0, &[0x55; 2048]).is_err());
        let mut buf = [0; 512];
        assert!(disk_emu.read_block(0, &mut buf).is_err());
    }

    #[test]
    fn zero_block_device_cannot_be_built() {
        let fs_block = tempfile::tempfile().unwrap();
        assert!(FileBlockEmulatorBuilder::from(fs_block).build().is_err());
    }

    #[test]
    fn reopening_without_clearing_keeps_contents() {
        let disk = tempfile::NamedTempFile::new().unwrap();
        let mut first = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
            .with_block_count(3)
            .build()
            .unwrap();
        first.write_block(1, &[0x42; 4096]).unwrap();
        first.sync_disk().unwrap();

        let mut second = FileBlockEmulator::open(disk.path(), 3).unwrap();
        let mut buf = [0; 4096];
        second.read_block(1, &mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x42; 4096]);
    }
}
