pub const MAGIC: u32 = 0xf0f03410;

pub const BLOCK_SIZE: usize = 4096;
pub const SUPERBLOCK_ID: u32 = 0; // Block ID for the superblock
pub const MIN_BLOCKS: usize = 3; // Superblock, one inode block and the root directory block

pub const INODES_PER_BLOCK: usize = 128;
pub const INODE_SIZE: usize = BLOCK_SIZE / INODES_PER_BLOCK; // 32 bytes: valid, size, 5 direct, 1 indirect
pub const NUM_DIRECT_PTRS: usize = 5; // Number of direct pointers in an inode
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4; // Number of pointers per block (32-bit pointers)
pub const MAX_FILE_SIZE: usize = (NUM_DIRECT_PTRS + PTRS_PER_BLOCK) * BLOCK_SIZE;

pub const MAX_NAME_LEN: usize = 16;
pub const ENTRIES_PER_DIR: usize = 7; // Including '.' and '..'
pub const DIRS_PER_BLOCK: usize = 8;
pub const ROOT_DIR_ID: u32 = 0; // Slot 0 of the last block
pub const ROOT_NAME: &[u8; 1] = b"/";
pub const DOT_NAME: &[u8; 1] = b".";
pub const DOTDOT_NAME: &[u8; 2] = b"..";
