use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::*;
use crate::BlockDevice;

impl SuperBlock {
    /// Derives the layout of a volume spanning `num_blocks` blocks.
    pub fn new(num_blocks: usize) -> Result<Self> {
        if num_blocks < MIN_BLOCKS {
            return Err(FsError::DeviceTooSmall(num_blocks));
        }
        let num_blocks = u32::try_from(num_blocks).map_err(|_| FsError::InvalidSuperBlock)?;
        let inode_blocks = num_blocks / 10 + 1;
        Ok(SuperBlock {
            magic: MAGIC,
            num_blocks,
            inode_blocks,
            max_inodes: INODES_PER_BLOCK as u32 * inode_blocks,
            dir_blocks: num_blocks / 100 + 1,
        })
    }

    /// First block handed out as file data.
    pub fn data_start(&self) -> u32 {
        self.inode_blocks
    }

    /// First block of the directory region; also the end of the data region.
    pub fn dir_start(&self) -> u32 {
        self.num_blocks - self.dir_blocks
    }

    /// Number of inode slots the table can actually hold, inumber 0 included.
    pub fn inode_capacity(&self) -> u32 {
        self.inode_blocks.saturating_sub(1) * INODES_PER_BLOCK as u32
    }

    /// Block holding the `index`-th directory block, counted backward from the last block.
    pub fn dir_block_id(&self, index: u32) -> u32 {
        self.num_blocks - 1 - index
    }

    fn matches_device(&self, device_blocks: usize) -> bool {
        match SuperBlock::new(device_blocks) {
            Ok(expected) => *self == expected,
            Err(_) => false,
        }
    }
}

/// Reads block 0 without any validation.
pub fn read_raw_superblock<D: BlockDevice + ?Sized>(device: &D) -> Result<SuperBlock> {
    let mut buf = new_block();
    device.read_block(SUPERBLOCK_ID, buf.as_mut_slice())?;
    Ok(read_record(buf.as_slice(), 0))
}

pub fn read_superblock<D: BlockDevice + ?Sized>(device: &D) -> Result<SuperBlock> {
    let superblock = read_raw_superblock(device)?;
    if superblock.magic != MAGIC {
        log::warn!("bad magic {:#x} in superblock", superblock.magic);
        return Err(FsError::InvalidSuperBlock);
    }
    if !superblock.matches_device(device.num_blocks()) {
        log::warn!("superblock {:?} does not describe a {}-block device", superblock, device.num_blocks());
        return Err(FsError::InvalidSuperBlock);
    }
    Ok(superblock)
}

pub fn write_superblock<D: BlockDevice + ?Sized>(device: &D, superblock: &SuperBlock) -> Result<()> {
    let mut buf = new_block();
    write_record(buf.as_mut_slice(), 0, superblock);
    device.write_block(SUPERBLOCK_ID, buf.as_slice())?;
    Ok(())
}

/// Lays out a fresh volume: superblock, zeroed inode table, cleared directory region and the
/// root directory in slot 0 of the last block.
pub fn format_fs<D: BlockDevice + ?Sized>(device: &D) -> Result<SuperBlock> {
    let superblock = SuperBlock::new(device.num_blocks())?;
    write_superblock(device, &superblock)?;

    let zero = new_block();
    for block_id in 1..superblock.inode_blocks {
        device.write_block(block_id, zero.as_slice())?;
    }
    for block_id in superblock.dir_start()..superblock.num_blocks {
        device.write_block(block_id, zero.as_slice())?;
    }

    let root = Directory::new(DirId::ROOT, ROOT_NAME, DirId::ROOT);
    let mut buf = new_block();
    write_record(buf.as_mut_slice(), 0, &root);
    device.write_block(superblock.dir_block_id(0), buf.as_slice())?;
    device.flush()?;

    log::info!(
        "formatted {} blocks: {} inode blocks, {} directory blocks",
        superblock.num_blocks, superblock.inode_blocks, superblock.dir_blocks
    );
    Ok(superblock)
}
