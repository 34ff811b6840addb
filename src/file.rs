//! Encapsulation of inode data access.
//! Offsets are byte offsets: partial blocks are read from or merged into the middle of a block.

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::{bmap, bmap_create, write_inode};
use crate::structs::*;
use crate::BlockDevice;

/// Reads data from a file into the provided buffer, starting at `offset`.
/// Returns the number of bytes read, which is short when the file ends first.
/// Holes read back as zeros.
pub fn fread(
    device: &(impl BlockDevice + ?Sized),
    inode: &Inode,
    offset: usize,
    buffer: &mut [u8],
) -> Result<usize> {
    let size = inode.size as usize;
    if offset >= size {
        return Err(FsError::OffsetOutOfRange { offset, size });
    }

    let length = buffer.len().min(size - offset);
    let mut bytes_read = 0;
    let mut block_buf = new_block();

    while bytes_read < length {
        let current_offset = offset + bytes_read;
        let start_offset = current_offset % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - start_offset).min(length - bytes_read);
        let dest = &mut buffer[bytes_read..bytes_read + chunk];

        match bmap(device, inode, current_offset / BLOCK_SIZE)? {
            Some(block_id) => {
                device.read_block(block_id, block_buf.as_mut_slice())?;
                dest.copy_from_slice(&block_buf[start_offset..start_offset + chunk]);
            }
            None => dest.fill(0),
        }
        bytes_read += chunk;
    }

    Ok(bytes_read)
}

/// Writes `buffer` into a file at `offset`, allocating blocks on demand.
/// The file grows to `offset + written` if that is past its end; overwrites do not change the
/// size. The inode is persisted even when allocation fails part way, so blocks already written
/// stay reachable.
pub fn fwrite(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    bitmap: &mut Bitmap,
    inode_id: InodeId,
    inode: &mut Inode,
    offset: usize,
    buffer: &[u8],
) -> Result<usize> {
    if buffer.is_empty() {
        return Ok(0);
    }
    offset
        .checked_add(buffer.len())
        .filter(|&end| end <= MAX_FILE_SIZE)
        .ok_or(FsError::FileTooLarge)?;

    let mut bytes_written = 0;
    let mut block_buf = new_block();
    let mut outcome = Ok(());

    while bytes_written < buffer.len() {
        let current_offset = offset + bytes_written;
        let start_offset = current_offset % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - start_offset).min(buffer.len() - bytes_written);

        let block_id = match bmap_create(device, bitmap, inode, current_offset / BLOCK_SIZE) {
            Ok(block_id) => block_id,
            Err(e) => {
                outcome = Err(e);
                break;
            }
        };

        if chunk < BLOCK_SIZE {
            if let Err(e) = device.read_block(block_id, block_buf.as_mut_slice()) {
                outcome = Err(e);
                break;
            }
        }
        block_buf[start_offset..start_offset + chunk]
            .copy_from_slice(&buffer[bytes_written..bytes_written + chunk]);
        if let Err(e) = device.write_block(block_id, block_buf.as_slice()) {
            outcome = Err(e);
            break;
        }
        bytes_written += chunk;
    }

    let end = (offset + bytes_written) as u32;
    if bytes_written > 0 && end > inode.size {
        inode.size = end;
    }
    write_inode(device, superblock, inode_id, inode)?;
    outcome?;

    Ok(bytes_written)
}
