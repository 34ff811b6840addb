use core::fmt;
use core::mem::size_of;

use crate::config::*;

/// Marker for on-disk records. Implementors are `repr(C)`, built only from `u32`s and byte
/// arrays with no padding, so any byte pattern read from the device is a valid value.
pub(crate) unsafe trait Record: Copy {}

unsafe impl Record for SuperBlock {}
unsafe impl Record for Inode {}
unsafe impl Record for DirEntry {}
unsafe impl Record for Directory {}
unsafe impl Record for u32 {}

/// Reads the `index`-th record of type `T` packed at the start of a block buffer.
pub(crate) fn read_record<T: Record>(buf: &[u8], index: usize) -> T {
    let offset = index * size_of::<T>();
    assert!(offset + size_of::<T>() <= buf.len());
    unsafe { core::ptr::read_unaligned(buf.as_ptr().add(offset) as *const T) }
}

/// Writes `value` as the `index`-th record of type `T` in a block buffer.
pub(crate) fn write_record<T: Record>(buf: &mut [u8], index: usize, value: &T) {
    let offset = index * size_of::<T>();
    assert!(offset + size_of::<T>() <= buf.len());
    unsafe { core::ptr::write_unaligned(buf.as_mut_ptr().add(offset) as *mut T, *value) }
}

pub(crate) fn new_block() -> Box<[u8; BLOCK_SIZE]> {
    Box::new([0u8; BLOCK_SIZE])
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,        // Magic number to identify the filesystem
    pub num_blocks: u32,   // Total number of blocks in the volume
    pub inode_blocks: u32, // Inode table spans blocks [1, inode_blocks)
    pub max_inodes: u32,   // INODES_PER_BLOCK * inode_blocks
    pub dir_blocks: u32,   // Directory region spans the last dir_blocks blocks
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inode {
    pub valid: u32,
    pub size: u32,
    pub direct_ptrs: [u32; NUM_DIRECT_PTRS],
    pub indirect_ptr: u32,
}

const _: () = assert!(size_of::<Inode>() == INODE_SIZE);

impl Inode {
    pub const NULL: Self = Self {
        valid: 0,
        size: 0,
        direct_ptrs: [0; NUM_DIRECT_PTRS],
        indirect_ptr: 0,
    };

    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }
}

/// Identifier of a file inode. Zero is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InodeId(pub u32);

/// Identifier of a directory record: `block_index * DIRS_PER_BLOCK + slot`, where block index 0
/// is the last block of the volume. Unrelated to [`InodeId`] numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(pub u32);

impl DirId {
    pub const ROOT: DirId = DirId(ROOT_DIR_ID);
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Directory = 0,
    Regular = 1,
}

/// What a directory entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryId {
    File(InodeId),
    Dir(DirId),
}

impl EntryId {
    pub fn file_type(&self) -> FileType {
        match self {
            EntryId::File(_) => FileType::Regular,
            EntryId::Dir(_) => FileType::Directory,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub ftype: u32, // 0 for directories, 1 for regular files
    pub valid: u32,
    pub id: u32,
    pub name: [u8; MAX_NAME_LEN],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    pub valid: u32,
    pub id: u32,
    pub name: [u8; MAX_NAME_LEN],
    pub table: [DirEntry; ENTRIES_PER_DIR],
}

const _: () = assert!(size_of::<Directory>() * DIRS_PER_BLOCK <= BLOCK_SIZE);

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub target: EntryId,
    pub name: String,
}

impl DirListing {
    pub fn file_type(&self) -> FileType {
        self.target.file_type()
    }
}
