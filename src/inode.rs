//! Management of the inode table and of the block pointers each inode owns.

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::*;
use crate::BlockDevice;

/// Maps an inumber to (inode block, slot within the block).
fn locate(superblock: &SuperBlock, inode_id: InodeId) -> Result<(u32, usize)> {
    if inode_id.0 == 0 || inode_id.0 >= superblock.inode_capacity() {
        return Err(FsError::InvalidInode(inode_id.0));
    }
    let block_id = 1 + inode_id.0 / INODES_PER_BLOCK as u32;
    let slot = inode_id.0 as usize % INODES_PER_BLOCK;
    Ok((block_id, slot))
}

/// Reads the raw inode record, valid or not.
pub fn get_inode(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    inode_id: InodeId,
) -> Result<Inode> {
    let (block_id, slot) = locate(superblock, inode_id)?;
    let mut buf = new_block();
    device.read_block(block_id, buf.as_mut_slice())?;
    Ok(read_record(buf.as_slice(), slot))
}

/// Reads an inode and fails unless it is allocated.
pub fn get_valid_inode(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    inode_id: InodeId,
) -> Result<Inode> {
    let inode = get_inode(device, superblock, inode_id)?;
    if !inode.is_valid() {
        return Err(FsError::InvalidInode(inode_id.0));
    }
    Ok(inode)
}

pub fn write_inode(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    inode_id: InodeId,
    inode: &Inode,
) -> Result<()> {
    let (block_id, slot) = locate(superblock, inode_id)?;
    let mut buf = new_block();
    device.read_block(block_id, buf.as_mut_slice())?;
    write_record(buf.as_mut_slice(), slot, inode);
    device.write_block(block_id, buf.as_slice())?;
    Ok(())
}

/// Claims the first free inode slot (linear scan, inumber 0 skipped) and persists it empty.
pub fn alloc_inode(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
) -> Result<InodeId> {
    let mut buf = new_block();
    for block_id in 1..superblock.inode_blocks {
        device.read_block(block_id, buf.as_mut_slice())?;
        for slot in 0..INODES_PER_BLOCK {
            let inode_id = (block_id - 1) * INODES_PER_BLOCK as u32 + slot as u32;
            if inode_id == 0 {
                continue;
            }
            let inode: Inode = read_record(buf.as_slice(), slot);
            if inode.is_valid() {
                continue;
            }
            let fresh = Inode { valid: 1, ..Inode::NULL };
            write_record(buf.as_mut_slice(), slot, &fresh);
            device.write_block(block_id, buf.as_slice())?;
            log::debug!("allocated inode {}", inode_id);
            return Ok(InodeId(inode_id));
        }
    }
    Err(FsError::OutOfInodes)
}

/// Clears an inode in place and hands its blocks back to the bitmap.
pub fn free_inode(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    bitmap: &mut Bitmap,
    inode_id: InodeId,
) -> Result<()> {
    let inode = get_valid_inode(device, superblock, inode_id)?;
    let blocks = inode_blocks(device, &inode)?;
    write_inode(device, superblock, inode_id, &Inode::NULL)?;
    for block_id in &blocks {
        bitmap.release(*block_id);
    }
    log::debug!("freed inode {} and {} blocks", inode_id, blocks.len());
    Ok(())
}

/// Drops every block of an inode and resets its size, leaving it allocated.
/// The caller persists the inode.
pub fn truncate_inode(
    device: &(impl BlockDevice + ?Sized),
    bitmap: &mut Bitmap,
    inode: &mut Inode,
) -> Result<()> {
    for block_id in inode_blocks(device, inode)? {
        bitmap.release(block_id);
    }
    *inode = Inode { valid: 1, ..Inode::NULL };
    Ok(())
}

/// Every block an inode references: direct blocks, the indirect block and its entries.
pub fn inode_blocks(device: &(impl BlockDevice + ?Sized), inode: &Inode) -> Result<Vec<u32>> {
    let mut blocks: Vec<u32> = inode.direct_ptrs.iter().copied().filter(|&p| p != 0).collect();
    if inode.indirect_ptr != 0 {
        blocks.push(inode.indirect_ptr);
        blocks.extend(read_indirect(device, inode.indirect_ptr)?.into_iter().filter(|&p| p != 0));
    }
    Ok(blocks)
}

/// Collects every valid inode in the table.
pub fn scan_inodes(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
) -> Result<Vec<(InodeId, Inode)>> {
    let mut inodes = Vec::new();
    let mut buf = new_block();
    let last = superblock.inode_blocks.min(superblock.num_blocks);
    for block_id in 1..last {
        device.read_block(block_id, buf.as_mut_slice())?;
        for slot in 0..INODES_PER_BLOCK {
            let inode_id = (block_id - 1) * INODES_PER_BLOCK as u32 + slot as u32;
            let inode: Inode = read_record(buf.as_slice(), slot);
            if inode_id != 0 && inode.is_valid() {
                inodes.push((InodeId(inode_id), inode));
            }
        }
    }
    Ok(inodes)
}

pub(crate) fn read_indirect(device: &(impl BlockDevice + ?Sized), block_id: u32) -> Result<Vec<u32>> {
    let mut buf = new_block();
    device.read_block(block_id, buf.as_mut_slice())?;
    Ok((0..PTRS_PER_BLOCK).map(|i| read_record::<u32>(buf.as_slice(), i)).collect())
}

/// Maps the `block_index`-th block of a file to a device block.
/// Returns `None` for holes.
pub fn bmap(
    device: &(impl BlockDevice + ?Sized),
    inode: &Inode,
    block_index: usize,
) -> Result<Option<u32>> {
    if block_index < NUM_DIRECT_PTRS {
        let block_id = inode.direct_ptrs[block_index];
        return Ok((block_id != 0).then_some(block_id));
    }

    let indirect_offset = block_index - NUM_DIRECT_PTRS;
    if indirect_offset >= PTRS_PER_BLOCK {
        return Err(FsError::FileTooLarge);
    }
    if inode.indirect_ptr == 0 {
        return Ok(None);
    }
    let mut buf = new_block();
    device.read_block(inode.indirect_ptr, buf.as_mut_slice())?;
    let block_id: u32 = read_record(buf.as_slice(), indirect_offset);
    Ok((block_id != 0).then_some(block_id))
}

/// Like [`bmap`], but allocates the data block (and the indirect block on first use past the
/// direct pointers) when it is missing. The caller persists the inode.
pub fn bmap_create(
    device: &(impl BlockDevice + ?Sized),
    bitmap: &mut Bitmap,
    inode: &mut Inode,
    block_index: usize,
) -> Result<u32> {
    if block_index < NUM_DIRECT_PTRS {
        let mut block_id = inode.direct_ptrs[block_index];
        if block_id == 0 {
            block_id = bitmap.alloc_data_block(device)?;
            inode.direct_ptrs[block_index] = block_id;
        }
        return Ok(block_id);
    }

    let indirect_offset = block_index - NUM_DIRECT_PTRS;
    if indirect_offset >= PTRS_PER_BLOCK {
        return Err(FsError::FileTooLarge);
    }
    if inode.indirect_ptr == 0 {
        inode.indirect_ptr = bitmap.alloc_data_block(device)?;
        log::debug!("allocated indirect block {}", inode.indirect_ptr);
    }

    let mut buf = new_block();
    device.read_block(inode.indirect_ptr, buf.as_mut_slice())?;
    let mut block_id: u32 = read_record(buf.as_slice(), indirect_offset);
    if block_id == 0 {
        block_id = bitmap.alloc_data_block(device)?;
        write_record(buf.as_mut_slice(), indirect_offset, &block_id);
        device.write_block(inode.indirect_ptr, buf.as_slice())?;
    }
    Ok(block_id)
}
