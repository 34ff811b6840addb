//! In-memory block bitmap.
//! Never written to disk: every mount rebuilds it from the superblock layout and the pointers
//! held by valid inodes. A set bit means "in use".

use bitvec::vec::BitVec;

use crate::error::{FsError, Result};
use crate::inode::{inode_blocks, scan_inodes};
use crate::structs::*;
use crate::BlockDevice;

#[derive(Debug, Clone)]
pub struct Bitmap {
    bits: BitVec,
    data_start: u32,
    data_end: u32,
}

impl Bitmap {
    /// A bitmap with only the metadata regions (superblock, inode table, directories) marked.
    pub fn new(superblock: &SuperBlock) -> Self {
        let mut bits = BitVec::repeat(false, superblock.num_blocks as usize);
        for block_id in 0..superblock.data_start() {
            bits.set(block_id as usize, true);
        }
        for block_id in superblock.dir_start()..superblock.num_blocks {
            bits.set(block_id as usize, true);
        }
        Bitmap {
            bits,
            data_start: superblock.data_start(),
            data_end: superblock.dir_start(),
        }
    }

    /// Scans the inode table and marks every block referenced by a valid inode.
    pub fn rebuild(device: &(impl BlockDevice + ?Sized), superblock: &SuperBlock) -> Result<Self> {
        let mut bitmap = Self::new(superblock);
        let inodes = scan_inodes(device, superblock)?;
        for (inode_id, inode) in &inodes {
            for pointer in direct_and_indirect(device, inode, &bitmap)? {
                if bitmap.in_data_region(pointer) {
                    bitmap.bits.set(pointer as usize, true);
                } else {
                    log::warn!("inode {} points outside the data region at block {}", inode_id, pointer);
                }
            }
        }
        log::info!(
            "bitmap rebuilt: {} valid inodes, {} of {} data blocks in use",
            inodes.len(),
            bitmap.used_data_blocks(),
            bitmap.data_end - bitmap.data_start
        );
        Ok(bitmap)
    }

    fn in_data_region(&self, block_id: u32) -> bool {
        (self.data_start..self.data_end).contains(&block_id)
    }

    pub fn is_used(&self, block_id: u32) -> bool {
        self.bits.get(block_id as usize).is_some_and(|bit| *bit)
    }

    /// Claims the first free data block, zeroes it on the device and returns its id.
    pub fn alloc_data_block(&mut self, device: &(impl BlockDevice + ?Sized)) -> Result<u32> {
        let block_id = (self.data_start..self.data_end)
            .find(|&id| !self.bits[id as usize])
            .ok_or(FsError::OutOfSpace)?;
        device.write_block(block_id, new_block().as_slice())?;
        self.bits.set(block_id as usize, true);
        log::trace!("allocated data block {}", block_id);
        Ok(block_id)
    }

    /// Returns a data block to the free pool. Metadata blocks are never released.
    pub fn release(&mut self, block_id: u32) {
        if self.in_data_region(block_id) {
            self.bits.set(block_id as usize, false);
        }
    }

    /// Indices of all used blocks, metadata included.
    pub fn used_blocks(&self) -> Vec<u32> {
        self.bits.iter_ones().map(|i| i as u32).collect()
    }

    pub fn used_data_blocks(&self) -> usize {
        self.bits[self.data_start as usize..self.data_end as usize].count_ones()
    }

    pub fn free_data_blocks(&self) -> usize {
        self.bits[self.data_start as usize..self.data_end as usize].count_zeros()
    }
}

/// Pointers of an inode, skipping the indirect block's entries when the indirect pointer itself
/// is out of range (reading it would fail the whole mount).
fn direct_and_indirect(
    device: &(impl BlockDevice + ?Sized),
    inode: &Inode,
    bitmap: &Bitmap,
) -> Result<Vec<u32>> {
    if inode.indirect_ptr != 0 && !bitmap.in_data_region(inode.indirect_ptr) {
        let mut pointers: Vec<u32> = inode.direct_ptrs.iter().copied().filter(|&p| p != 0).collect();
        pointers.push(inode.indirect_ptr);
        return Ok(pointers);
    }
    inode_blocks(device, inode)
}
