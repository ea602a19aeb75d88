//! A small inode file system over a fixed-size block device.
//!
//! Files are addressed by inumber only. Each inode holds five direct block
//! pointers and one indirect block of further pointers. The free block map
//! lives in memory and is rebuilt from the inode table on every mount.
mod alloc;
mod file;
mod fs;
pub mod io;
mod node;
mod sb;

pub use crate::alloc::{FreeMap, State};
pub use crate::fs::{FileSystem, FsError};
pub use crate::node::{
    inode_location, FileBlocks, Inode, INODES_PER_BLOCK, MAX_FILE_SIZE, POINTERS_PER_BLOCK,
    POINTERS_PER_INODE,
};
pub use crate::sb::{SuperBlock, FS_MAGIC};
pub use io::BLOCK_SIZE;
