use std::collections::HashSet;

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::free_inode;
use crate::structs::*;
use crate::BlockDevice;

pub fn trim_zero(name: &[u8]) -> &[u8] {
    let mut end = name.len();
    while end > 0 && name[end - 1] == 0 {
        end -= 1;
    }
    &name[..end]
}

fn name_cmp(n1: &[u8], n2: &[u8]) -> bool {
    trim_zero(n1) == trim_zero(n2)
}

fn pack_name(name: &[u8]) -> [u8; MAX_NAME_LEN] {
    let mut arr = [0; MAX_NAME_LEN];
    arr[..name.len()].copy_from_slice(name);
    arr
}

/// Checks a user supplied entry name: 1 to 16 bytes, no '/' or NUL, and not "." or "..".
pub fn validate_name(name: &str) -> Result<&[u8]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
        return Err(FsError::InvalidFileName);
    }
    if bytes.iter().any(|&c| c == b'/' || c == 0) {
        return Err(FsError::InvalidFileName);
    }
    if is_dot_name(bytes) {
        return Err(FsError::InvalidFileName);
    }
    Ok(bytes)
}

pub fn is_dot_name(name: &[u8]) -> bool {
    name_cmp(name, DOT_NAME) || name_cmp(name, DOTDOT_NAME)
}

impl DirEntry {
    pub const NULL: Self = Self {
        ftype: 0,
        valid: 0,
        id: 0,
        name: [0; MAX_NAME_LEN],
    };

    pub fn new(target: EntryId, name: &[u8]) -> Self {
        let (ftype, id) = match target {
            EntryId::Dir(DirId(id)) => (FileType::Directory as u32, id),
            EntryId::File(InodeId(id)) => (FileType::Regular as u32, id),
        };
        Self {
            ftype,
            valid: 1,
            id,
            name: pack_name(name),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    pub fn target(&self) -> EntryId {
        if self.ftype == FileType::Regular as u32 {
            EntryId::File(InodeId(self.id))
        } else {
            EntryId::Dir(DirId(self.id))
        }
    }

    pub fn name_eq(&self, name: &[u8]) -> bool {
        name_cmp(&self.name, name)
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(trim_zero(&self.name)).into_owned()
    }
}

impl Directory {
    pub const NULL: Self = Self {
        valid: 0,
        id: 0,
        name: [0; MAX_NAME_LEN],
        table: [DirEntry::NULL; ENTRIES_PER_DIR],
    };

    /// A fresh directory seeded with "." (itself) and ".." (its parent).
    pub fn new(id: DirId, name: &[u8], parent: DirId) -> Self {
        let mut table = [DirEntry::NULL; ENTRIES_PER_DIR];
        table[0] = DirEntry::new(EntryId::Dir(id), DOT_NAME);
        table[1] = DirEntry::new(EntryId::Dir(parent), DOTDOT_NAME);
        Self {
            valid: 1,
            id: id.0,
            name: pack_name(name),
            table,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    pub fn dir_id(&self) -> DirId {
        DirId(self.id)
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(trim_zero(&self.name)).into_owned()
    }

    /// Offset of the valid entry called `name`, if any.
    pub fn lookup(&self, name: &[u8]) -> Option<usize> {
        self.table
            .iter()
            .position(|entry| entry.is_valid() && entry.name_eq(name))
    }

    pub fn has_free_entry(&self) -> bool {
        self.table.iter().any(|entry| !entry.is_valid())
    }

    /// Puts a new entry into the first free slot of the table.
    pub fn add_entry(&mut self, target: EntryId, name: &[u8]) -> Result<usize> {
        let offset = self
            .table
            .iter()
            .position(|entry| !entry.is_valid())
            .ok_or(FsError::DirectoryFull)?;
        self.table[offset] = DirEntry::new(target, name);
        Ok(offset)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.table.iter().filter(|entry| entry.is_valid())
    }

    /// Valid entries other than "." and "..".
    pub fn children(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries().filter(|entry| !is_dot_name(&entry.name))
    }

    pub fn listing(&self) -> Vec<DirListing> {
        self.entries()
            .map(|entry| DirListing {
                target: entry.target(),
                name: entry.name_str(),
            })
            .collect()
    }
}

/// Maps a directory id to (device block, record index within the block).
fn locate(superblock: &SuperBlock, dir_id: DirId) -> Result<(u32, usize)> {
    let block_index = dir_id.0 / DIRS_PER_BLOCK as u32;
    if block_index >= superblock.dir_blocks {
        return Err(FsError::NotFound);
    }
    Ok((superblock.dir_block_id(block_index), dir_id.0 as usize % DIRS_PER_BLOCK))
}

/// Reads a directory record and fails unless it is in use.
pub fn read_dir(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    dir_id: DirId,
) -> Result<Directory> {
    let (block_id, offset) = locate(superblock, dir_id)?;
    let mut buf = new_block();
    device.read_block(block_id, buf.as_mut_slice())?;
    let dir: Directory = read_record(buf.as_slice(), offset);
    if !dir.is_valid() {
        return Err(FsError::NotFound);
    }
    Ok(dir)
}

/// Writes a directory record back into its slot, leaving its block neighbours untouched.
pub fn write_dir(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    dir: &Directory,
) -> Result<()> {
    write_slot(device, superblock, dir.dir_id(), dir)
}

fn write_slot(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    dir_id: DirId,
    dir: &Directory,
) -> Result<()> {
    let (block_id, offset) = locate(superblock, dir_id)?;
    let mut buf = new_block();
    device.read_block(block_id, buf.as_mut_slice())?;
    write_record(buf.as_mut_slice(), offset, dir);
    device.write_block(block_id, buf.as_slice())?;
    Ok(())
}

/// Counts the valid directory records of every directory block, last block first.
pub fn count_dirs(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
) -> Result<Vec<u8>> {
    let mut counters = Vec::with_capacity(superblock.dir_blocks as usize);
    let mut buf = new_block();
    for block_index in 0..superblock.dir_blocks {
        device.read_block(superblock.dir_block_id(block_index), buf.as_mut_slice())?;
        let used = (0..DIRS_PER_BLOCK)
            .filter(|&i| read_record::<Directory>(buf.as_slice(), i).is_valid())
            .count();
        counters.push(used as u8);
    }
    Ok(counters)
}

/// Picks a free directory slot in the first directory block with spare room.
pub fn find_free_dir(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    counters: &[u8],
) -> Result<DirId> {
    let block_index = counters
        .iter()
        .position(|&used| (used as usize) < DIRS_PER_BLOCK)
        .ok_or(FsError::OutOfDirectories)?;

    let mut buf = new_block();
    device.read_block(superblock.dir_block_id(block_index as u32), buf.as_mut_slice())?;
    let offset = (0..DIRS_PER_BLOCK)
        .find(|&i| !read_record::<Directory>(buf.as_slice(), i).is_valid())
        .ok_or(FsError::OutOfDirectories)?;
    Ok(DirId((block_index * DIRS_PER_BLOCK + offset) as u32))
}

/// Removes the directory `root` with everything below it: file inodes are freed, directory
/// records cleared and their block's occupancy counter decremented. Walks depth first with an
/// explicit stack. The caller unlinks `root` from its parent.
pub fn remove_tree(
    device: &(impl BlockDevice + ?Sized),
    superblock: &SuperBlock,
    bitmap: &mut Bitmap,
    counters: &mut [u8],
    root: DirId,
) -> Result<()> {
    let mut stack = vec![root];
    let mut visited = HashSet::new();

    while let Some(dir_id) = stack.pop() {
        if !visited.insert(dir_id) {
            log::warn!("directory {} reachable twice, skipping", dir_id);
            continue;
        }
        let dir = read_dir(device, superblock, dir_id)?;
        for entry in dir.children() {
            match entry.target() {
                EntryId::File(inode_id) => match free_inode(device, superblock, bitmap, inode_id) {
                    Ok(()) => {}
                    Err(FsError::InvalidInode(_)) => {
                        log::warn!("entry {} in directory {} names a dead inode", entry.name_str(), dir_id);
                    }
                    Err(e) => return Err(e),
                },
                EntryId::Dir(child) => stack.push(child),
            }
        }

        write_slot(device, superblock, dir_id, &Directory::NULL)?;
        let block_index = dir_id.0 as usize / DIRS_PER_BLOCK;
        counters[block_index] = counters[block_index].saturating_sub(1);
        log::debug!("removed directory {} ({})", dir_id, dir.name_str());
    }
    Ok(())
}
