use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::directory::{count_dirs, find_free_dir, is_dot_name, read_dir, remove_tree, validate_name, write_dir};
use crate::error::{FsError, Result};
use crate::file::{fread, fwrite};
use crate::inode::{alloc_inode, free_inode, get_valid_inode, read_indirect, truncate_inode, write_inode};
use crate::structs::*;
use crate::superblock::{format_fs, read_raw_superblock, read_superblock};
use crate::BlockDevice;

/// In-memory state of a mounted volume. Rebuilt from disk on every mount.
#[derive(Debug)]
struct Volume {
    superblock: SuperBlock,
    bitmap: Bitmap,
    dir_counters: Vec<u8>, // Valid directory records per directory block, last block first
    cwd: DirId,
}

/// A volume on a block device. Starts unmounted; every call except `format`, `mount` and
/// `debug` requires a mounted volume and fails with [`FsError::NotMounted`] otherwise.
pub struct FileSystem<D: BlockDevice> {
    device: Arc<D>,
    volume: Option<Volume>,
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self { device, volume: None }
    }

    /// Writes a fresh, empty volume over the whole device. Refuses to touch a mounted volume.
    pub fn format(&mut self) -> Result<()> {
        if self.volume.is_some() {
            return Err(FsError::AlreadyMounted);
        }
        format_fs(&*self.device)?;
        Ok(())
    }

    /// Loads the superblock, rebuilds the bitmap and directory occupancy, and moves the current
    /// directory to the root. Mounting again rescans the device.
    pub fn mount(&mut self) -> Result<()> {
        let device = &*self.device;
        let superblock = read_superblock(device)?;
        let bitmap = Bitmap::rebuild(device, &superblock)?;
        let dir_counters = count_dirs(device, &superblock)?;
        let root = read_dir(device, &superblock, DirId::ROOT).map_err(|e| match e {
            FsError::NotFound => FsError::InvalidSuperBlock,
            e => e,
        })?;

        log::info!(
            "mounted {} blocks, {} directories, cwd {}",
            superblock.num_blocks,
            dir_counters.iter().map(|&c| c as usize).sum::<usize>(),
            root.name_str()
        );
        self.volume = Some(Volume {
            superblock,
            bitmap,
            dir_counters,
            cwd: root.dir_id(),
        });
        Ok(())
    }

    /// Drops the in-memory volume state after flushing the device.
    pub fn unmount(&mut self) -> Result<()> {
        if self.volume.take().is_none() {
            return Err(FsError::NotMounted);
        }
        self.device.flush()?;
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    fn volume(&self) -> Result<&Volume> {
        self.volume.as_ref().ok_or(FsError::NotMounted)
    }

    // Inode level operations.

    /// Allocates an empty inode and returns its inumber.
    pub fn create(&mut self) -> Result<InodeId> {
        let volume = self.volume()?;
        alloc_inode(&*self.device, &volume.superblock)
    }

    /// Clears an inode and frees its blocks. Directory entries naming it are left alone.
    pub fn delete(&mut self, inode_id: InodeId) -> Result<()> {
        let device = &*self.device;
        let volume = self.volume.as_mut().ok_or(FsError::NotMounted)?;
        free_inode(device, &volume.superblock, &mut volume.bitmap, inode_id)
    }

    pub fn size_of(&self, inode_id: InodeId) -> Result<usize> {
        let volume = self.volume()?;
        Ok(get_valid_inode(&*self.device, &volume.superblock, inode_id)?.size as usize)
    }

    /// Reads up to `buf.len()` bytes at `offset`. Fails on empty files and offsets at or past
    /// the end of the file.
    pub fn read(&self, inode_id: InodeId, buf: &mut [u8], offset: usize) -> Result<usize> {
        let volume = self.volume()?;
        let inode = get_valid_inode(&*self.device, &volume.superblock, inode_id)?;
        fread(&*self.device, &inode, offset, buf)
    }

    /// Writes `data` at `offset`, growing the file as needed.
    pub fn write(&mut self, inode_id: InodeId, data: &[u8], offset: usize) -> Result<usize> {
        let device = &*self.device;
        let volume = self.volume.as_mut().ok_or(FsError::NotMounted)?;
        let mut inode = get_valid_inode(device, &volume.superblock, inode_id)?;
        let written = fwrite(
            device,
            &volume.superblock,
            &mut volume.bitmap,
            inode_id,
            &mut inode,
            offset,
            data,
        )?;
        log::debug!("wrote {} bytes to inode {} at offset {}", written, inode_id, offset);
        Ok(written)
    }

    /// Reads a whole file.
    pub fn cat(&self, inode_id: InodeId) -> Result<Vec<u8>> {
        let size = self.size_of(inode_id)?;
        let mut data = vec![0u8; size];
        if size > 0 {
            let n = self.read(inode_id, &mut data, 0)?;
            data.truncate(n);
        }
        Ok(data)
    }

    // Directory level operations, all relative to the current directory.

    fn current_dir(&self) -> Result<Directory> {
        let volume = self.volume()?;
        read_dir(&*self.device, &volume.superblock, volume.cwd)
    }

    pub fn cwd(&self) -> Result<DirId> {
        Ok(self.volume()?.cwd)
    }

    pub fn cwd_name(&self) -> Result<String> {
        Ok(self.current_dir()?.name_str())
    }

    /// Resolves a name in the current directory, "." and ".." included.
    pub fn lookup(&self, name: &str) -> Result<EntryId> {
        let cwd = self.current_dir()?;
        let offset = cwd.lookup(name.as_bytes()).ok_or(FsError::NotFound)?;
        Ok(cwd.table[offset].target())
    }

    /// Creates an empty file in the current directory.
    pub fn touch(&mut self, name: &str) -> Result<InodeId> {
        let name = validate_name(name)?;
        let mut cwd = self.current_dir()?;
        if cwd.lookup(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if !cwd.has_free_entry() {
            return Err(FsError::DirectoryFull);
        }

        let volume = self.volume()?;
        let inode_id = alloc_inode(&*self.device, &volume.superblock)?;
        cwd.add_entry(EntryId::File(inode_id), name)?;
        write_dir(&*self.device, &volume.superblock, &cwd)?;
        log::debug!("touched {} as inode {} in {}", String::from_utf8_lossy(name), inode_id, cwd.name_str());
        Ok(inode_id)
    }

    /// Creates a subdirectory of the current directory.
    pub fn mkdir(&mut self, name: &str) -> Result<DirId> {
        let name = validate_name(name)?;
        let mut cwd = self.current_dir()?;
        if cwd.lookup(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if !cwd.has_free_entry() {
            return Err(FsError::DirectoryFull);
        }

        let device = &*self.device;
        let volume = self.volume.as_mut().ok_or(FsError::NotMounted)?;
        let dir_id = find_free_dir(device, &volume.superblock, &volume.dir_counters)?;
        let new_dir = Directory::new(dir_id, name, cwd.dir_id());
        write_dir(device, &volume.superblock, &new_dir)?;
        cwd.add_entry(EntryId::Dir(dir_id), name)?;
        write_dir(device, &volume.superblock, &cwd)?;
        volume.dir_counters[dir_id.0 as usize / DIRS_PER_BLOCK] += 1;

        log::debug!("created directory {} ({}) under {}", dir_id, new_dir.name_str(), cwd.name_str());
        Ok(dir_id)
    }

    /// Moves the current directory to a subdirectory, "." or "..".
    pub fn cd(&mut self, name: &str) -> Result<()> {
        let dir_id = match self.lookup(name)? {
            EntryId::Dir(dir_id) => dir_id,
            EntryId::File(_) => return Err(FsError::NotDirectory),
        };
        let device = &*self.device;
        let volume = self.volume.as_mut().ok_or(FsError::NotMounted)?;
        // Make sure the target still exists before moving.
        read_dir(device, &volume.superblock, dir_id)?;
        volume.cwd = dir_id;
        Ok(())
    }

    /// Lists the current directory.
    pub fn ls(&self) -> Result<Vec<DirListing>> {
        self.dir(".")
    }

    /// Lists the directory called `name` in the current directory.
    pub fn dir(&self, name: &str) -> Result<Vec<DirListing>> {
        let dir_id = match self.lookup(name)? {
            EntryId::Dir(dir_id) => dir_id,
            EntryId::File(_) => return Err(FsError::NotDirectory),
        };
        let volume = self.volume()?;
        Ok(read_dir(&*self.device, &volume.superblock, dir_id)?.listing())
    }

    /// Removes a file, or a directory together with everything below it.
    pub fn rm(&mut self, name: &str) -> Result<()> {
        match self.lookup(name)? {
            EntryId::Dir(_) => self.rmdir(name),
            EntryId::File(inode_id) => {
                let mut cwd = self.current_dir()?;
                let offset = cwd.lookup(name.as_bytes()).ok_or(FsError::NotFound)?;
                match self.delete(inode_id) {
                    Ok(()) => {}
                    Err(FsError::InvalidInode(_)) => log::warn!("{} names a dead inode {}", name, inode_id),
                    Err(e) => return Err(e),
                }
                cwd.table[offset].valid = 0;
                write_dir(&*self.device, &self.volume()?.superblock, &cwd)?;
                log::debug!("removed file {} (inode {})", name, inode_id);
                Ok(())
            }
        }
    }

    /// Removes a subdirectory of the current directory and all of its contents.
    /// The current directory itself (by identity) cannot be removed.
    pub fn rmdir(&mut self, name: &str) -> Result<()> {
        if is_dot_name(name.as_bytes()) {
            return Err(FsError::BusyDirectory);
        }
        let mut cwd = self.current_dir()?;
        let offset = cwd.lookup(name.as_bytes()).ok_or(FsError::NotFound)?;
        let target = match cwd.table[offset].target() {
            EntryId::Dir(dir_id) => dir_id,
            EntryId::File(_) => return Err(FsError::NotDirectory),
        };
        if target == cwd.dir_id() {
            return Err(FsError::BusyDirectory);
        }

        let device = &*self.device;
        let volume = self.volume.as_mut().ok_or(FsError::NotMounted)?;
        remove_tree(device, &volume.superblock, &mut volume.bitmap, &mut volume.dir_counters, target)?;
        cwd.table[offset].valid = 0;
        write_dir(device, &volume.superblock, &cwd)?;
        Ok(())
    }

    // Host transfer helpers.

    /// Streams `reader` into the file `name` of the current directory, creating it if needed.
    /// An existing file is truncated first, so no tail of older contents survives.
    /// Interrupted reads are retried. Returns the number of bytes copied.
    pub fn copy_in(&mut self, mut reader: impl Read, name: &str) -> Result<usize> {
        let inode_id = match self.lookup(name) {
            Ok(EntryId::File(inode_id)) => {
                self.truncate(inode_id)?;
                inode_id
            }
            Ok(EntryId::Dir(_)) => return Err(FsError::NotFile),
            Err(FsError::NotFound) => self.touch(name)?,
            Err(e) => return Err(e),
        };

        let mut buffer = vec![0u8; 4 * BLOCK_SIZE];
        let mut offset = 0;
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            offset += self.write(inode_id, &buffer[..n], offset)?;
        }
        log::info!("{} bytes copied into {}", offset, name);
        Ok(offset)
    }

    /// Streams the file `name` of the current directory into `writer`.
    pub fn copy_out(&self, name: &str, mut writer: impl Write) -> Result<usize> {
        let inode_id = match self.lookup(name)? {
            EntryId::File(inode_id) => inode_id,
            EntryId::Dir(_) => return Err(FsError::NotFile),
        };
        let size = self.size_of(inode_id)?;

        let mut buffer = vec![0u8; 4 * BLOCK_SIZE];
        let mut offset = 0;
        while offset < size {
            let n = self.read(inode_id, &mut buffer, offset)?;
            writer.write_all(&buffer[..n])?;
            offset += n;
        }
        log::info!("{} bytes copied out of {}", offset, name);
        Ok(offset)
    }

    fn truncate(&mut self, inode_id: InodeId) -> Result<()> {
        let device = &*self.device;
        let volume = self.volume.as_mut().ok_or(FsError::NotMounted)?;
        let mut inode = get_valid_inode(device, &volume.superblock, inode_id)?;
        truncate_inode(device, &mut volume.bitmap, &mut inode)?;
        write_inode(device, &volume.superblock, inode_id, &inode)
    }

    // Introspection.

    /// Used block indices of the mounted volume.
    pub fn bitmap(&self) -> Result<Vec<u32>> {
        Ok(self.volume()?.bitmap.used_blocks())
    }

    pub fn free_blocks(&self) -> Result<usize> {
        Ok(self.volume()?.bitmap.free_data_blocks())
    }

    /// Valid directory records per directory block, last block first.
    pub fn dir_occupancy(&self) -> Result<&[u8]> {
        Ok(self.volume()?.dir_counters.as_slice())
    }

    pub fn superblock(&self) -> Option<&SuperBlock> {
        self.volume.as_ref().map(|volume| &volume.superblock)
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }

    /// Describes whatever is on the device. Works mounted or not.
    pub fn debug(&self) -> Result<VolumeReport> {
        let device = &*self.device;
        let superblock = read_raw_superblock(device)?;
        let mut report = VolumeReport {
            magic_valid: superblock.magic == MAGIC,
            superblock,
            inodes: Vec::new(),
        };
        if !report.magic_valid {
            return Ok(report);
        }

        let mut buf = new_block();
        let last = superblock.inode_blocks.min(device.num_blocks() as u32);
        for block_id in 1..last {
            device.read_block(block_id, buf.as_mut_slice())?;
            for slot in 0..INODES_PER_BLOCK {
                let inode: Inode = read_record(buf.as_slice(), slot);
                let inode_id = (block_id - 1) * INODES_PER_BLOCK as u32 + slot as u32;
                if inode_id == 0 || !inode.is_valid() {
                    continue;
                }
                let indirect_ptrs = if inode.indirect_ptr != 0 && inode.indirect_ptr < superblock.num_blocks {
                    read_indirect(device, inode.indirect_ptr)?.into_iter().filter(|&p| p != 0).collect()
                } else {
                    Vec::new()
                };
                report.inodes.push(InodeReport {
                    id: InodeId(inode_id),
                    size: inode.size,
                    direct_ptrs: inode.direct_ptrs.iter().copied().filter(|&p| p != 0).collect(),
                    indirect_ptr: (inode.indirect_ptr != 0).then_some(inode.indirect_ptr),
                    indirect_ptrs,
                });
            }
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeReport {
    pub id: InodeId,
    pub size: u32,
    pub direct_ptrs: Vec<u32>,
    pub indirect_ptr: Option<u32>,
    pub indirect_ptrs: Vec<u32>,
}

/// Snapshot of the on-disk metadata, as produced by [`FileSystem::debug`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeReport {
    pub magic_valid: bool,
    pub superblock: SuperBlock,
    pub inodes: Vec<InodeReport>,
}

impl fmt::Display for VolumeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "superblock:")?;
        if !self.magic_valid {
            return writeln!(f, "    magic number {:#x} is invalid", self.superblock.magic);
        }
        writeln!(f, "    magic number is valid")?;
        writeln!(f, "    {} blocks", self.superblock.num_blocks)?;
        writeln!(f, "    {} inode blocks", self.superblock.inode_blocks)?;
        writeln!(f, "    {} inodes", self.superblock.max_inodes)?;
        writeln!(f, "    {} directory blocks", self.superblock.dir_blocks)?;
        for inode in &self.inodes {
            writeln!(f, "inode {}:", inode.id)?;
            writeln!(f, "    size: {}", inode.size)?;
            write!(f, "    direct blocks:")?;
            for block_id in &inode.direct_ptrs {
                write!(f, " {}", block_id)?;
            }
            writeln!(f)?;
            if let Some(indirect) = inode.indirect_ptr {
                writeln!(f, "    indirect: {}", indirect)?;
                write!(f, "    indirect data blocks:")?;
                for block_id in &inode.indirect_ptrs {
                    write!(f, " {}", block_id)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
