//! Quark is a small inode filesystem living on a fixed-block-size device.
//! No permissions, links or timestamps; one mounted volume per `FileSystem`.
//!
//! Quark's on-disk layout (4096-byte blocks):
//! - Block 0: Superblock
//! - Blocks [1, inode_blocks): Inode table, 128 inodes per block
//! - Blocks [inode_blocks, num_blocks - dir_blocks): Data blocks
//! - Last dir_blocks blocks: Directory records, 8 per block, counted backward from the last block
//!
//! The free-block bitmap is never stored; it is rebuilt from the inode table on every mount.
//!
//! Quark's layers (from bottom to top):
//! 1. Block Device: Synchronous block storage.                 | User implemented, or `FileDisk` / `RamDisk`
//! 2. Superblock/Bitmap: Layout and block allocation.          | Fs implemented
//! 3. Inode: File metadata and block pointer indirection.      | Fs implemented
//! 4. Directory: Fixed 7-entry tables and tree removal.        | Fs implemented
//! 5. File: Byte-offset reads and writes over inodes.          | Fs implemented
//! 6. FileSystem: Mounted volume with a current directory.     | Entry point for drivers

mod config;
mod block_dev;
mod structs;
mod bitmap;
mod superblock;
mod inode;
mod directory;
mod file;
mod fs;
mod error;

pub use block_dev::{BlockDevice, DiskStats, FileDisk, RamDisk};
pub use config::*;
pub use superblock::*;
pub use structs::*;
pub use bitmap::Bitmap;
pub use inode::*;
pub use directory::*;
pub use file::*;
pub use fs::*;
pub use error::FsError as Error;
pub use error::{ErrorKind, Result};
