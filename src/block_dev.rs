use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::BLOCK_SIZE;
use crate::error::{FsError, Result};

pub trait BlockDevice: Send + Sync {
    /// Returns the number of blocks in the block device.
    fn num_blocks(&self) -> usize;

    /// Reads a block of data from the block device.
    /// buf.len() must be equal to block_size().
    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<()>;

    /// Writes a block of data to the block device.
    /// buf.len() must be equal to block_size().
    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<()>;

    /// Flushes any buffered data to the backing store.
    fn flush(&self) -> Result<()>;

    /// Returns the size of each block in bytes.
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }
}

/// Cumulative I/O counters of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStats {
    pub reads: u64,
    pub writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DiskStats {
        DiskStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

fn check_access(num_blocks: usize, block_id: u32, buf_len: usize) -> Result<()> {
    if block_id as usize >= num_blocks {
        return Err(FsError::InvalidBlockId(block_id));
    }
    if buf_len != BLOCK_SIZE {
        return Err(FsError::BadBufferSize(buf_len));
    }
    Ok(())
}

/// A disk image stored in a regular host file.
pub struct FileDisk {
    inner: Mutex<File>,
    num_blocks: usize,
    counters: Counters,
}

impl FileDisk {
    /// Opens (or creates) the image at `path` and sizes it to exactly `num_blocks` blocks.
    pub fn open(path: impl AsRef<Path>, num_blocks: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        file.set_len((num_blocks * BLOCK_SIZE) as u64)?;
        log::debug!("opened disk image {} with {} blocks", path.as_ref().display(), num_blocks);
        Ok(FileDisk {
            inner: Mutex::new(file),
            num_blocks,
            counters: Counters::default(),
        })
    }

    pub fn stats(&self) -> DiskStats {
        self.counters.snapshot()
    }

    /// Flushes and closes the image, reporting how many blocks were read and written.
    pub fn close(self) -> Result<DiskStats> {
        self.flush()?;
        let stats = self.stats();
        log::info!("disk closed: {} reads, {} writes", stats.reads, stats.writes);
        Ok(stats)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, File>> {
        self.inner
            .lock()
            .map_err(|_| FsError::Io(std::io::Error::other("disk image lock poisoned")))
    }
}

impl BlockDevice for FileDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<()> {
        check_access(self.num_blocks, block_id, buf.len())?;
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(block_id as u64 * BLOCK_SIZE as u64))?;
        file.read_exact(buf)?;
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<()> {
        check_access(self.num_blocks, block_id, buf.len())?;
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(block_id as u64 * BLOCK_SIZE as u64))?;
        file.write_all(buf)?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.lock()?.flush()?;
        Ok(())
    }
}

/// A disk kept entirely in memory. Contents are lost when it is dropped.
pub struct RamDisk {
    inner: Mutex<Vec<u8>>,
    num_blocks: usize,
    counters: Counters,
}

impl RamDisk {
    /// Creates a new zero-filled RamDisk with the specified number of blocks.
    pub fn new(num_blocks: usize) -> Self {
        RamDisk {
            inner: Mutex::new(vec![0u8; num_blocks * BLOCK_SIZE]),
            num_blocks,
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> DiskStats {
        self.counters.snapshot()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<u8>>> {
        self.inner
            .lock()
            .map_err(|_| FsError::Io(std::io::Error::other("ram disk lock poisoned")))
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<()> {
        check_access(self.num_blocks, block_id, buf.len())?;
        let start = block_id as usize * BLOCK_SIZE;
        let data = self.lock()?;
        buf.copy_from_slice(&data[start..start + BLOCK_SIZE]);
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<()> {
        check_access(self.num_blocks, block_id, buf.len())?;
        let start = block_id as usize * BLOCK_SIZE;
        let mut data = self.lock()?;
        data[start..start + BLOCK_SIZE].copy_from_slice(buf);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // In a RAM disk, flushing is a no-op since data is already in memory.
        Ok(())
    }
}
