/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// The block store the file system is layered on. Every call is synchronous
/// and either completes or returns the device error.
///
/// Buffers handed to the device are expected to be exactly one block
/// ([`BLOCK_SIZE`](super::BLOCK_SIZE)) wide.
pub trait BlockStorage {
    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
    /// The total number of blocks on the device.
    fn block_count(&self) -> usize;
    /// Flush any buffered disk IO from memory. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}

impl<T: BlockStorage + ?Sized> BlockStorage for &mut T {
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        (**self).read_block(blocknr, buf)
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        (**self).write_block(blocknr, buf)
    }

    fn block_count(&self) -> usize {
        (**self).block_count()
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        (**self).sync_disk()
    }
}
