use thiserror::Error;

/// Coarse classification of [`FsError`], for callers that only care whether
/// they asked for something impossible, ran out of room, or lost the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Exhausted,
    Storage,
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("block {0} is outside the device")]
    InvalidBlockId(u32),
    #[error("block buffer must be exactly one block long, got {0} bytes")]
    BadBufferSize(usize),
    #[error("no volume is mounted")]
    NotMounted,
    #[error("volume is already mounted")]
    AlreadyMounted,
    #[error("device has {0} blocks, at least 3 are required")]
    DeviceTooSmall(usize),
    #[error("superblock is missing or inconsistent with the device")]
    InvalidSuperBlock,
    #[error("inode {0} is out of range or not allocated")]
    InvalidInode(u32),
    #[error("invalid file name")]
    InvalidFileName,
    #[error("name already exists in the current directory")]
    AlreadyExists,
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotDirectory,
    #[error("not a regular file")]
    NotFile,
    #[error("offset {offset} is outside a file of {size} bytes")]
    OffsetOutOfRange { offset: usize, size: usize },
    #[error("the current directory cannot be removed")]
    BusyDirectory,
    #[error("no free inodes left")]
    OutOfInodes,
    #[error("no free data blocks left")]
    OutOfSpace,
    #[error("no free directory slots left")]
    OutOfDirectories,
    #[error("directory is full")]
    DirectoryFull,
    #[error("file would exceed the maximum file size")]
    FileTooLarge,
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::Io(_) | FsError::InvalidBlockId(_) | FsError::BadBufferSize(_) => ErrorKind::Storage,
            FsError::OutOfInodes
            | FsError::OutOfSpace
            | FsError::OutOfDirectories
            | FsError::DirectoryFull
            | FsError::FileTooLarge => ErrorKind::Exhausted,
            _ => ErrorKind::Precondition,
        }
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
