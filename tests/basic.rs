use std::sync::Arc;

mod common;

use common::{init_logger, mounted, pattern};
use quark::BlockDevice;
use quark::DirId;
use quark::EntryId;
use quark::Error;
use quark::ErrorKind;
use quark::FileSystem;
use quark::InodeId;
use quark::RamDisk;
use quark::BLOCK_SIZE;
use quark::MAGIC;
use quark::MAX_FILE_SIZE;

#[test]
fn test_format_too_small() {
    init_logger();
    let rd = Arc::new(RamDisk::new(2));
    let mut fs = FileSystem::new(Arc::clone(&rd));
    assert!(matches!(fs.format(), Err(Error::DeviceTooSmall(2))));
    assert_eq!(rd.stats().writes, 0);

    let mut buf = vec![0u8; BLOCK_SIZE];
    rd.read_block(0, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0), "no magic should be written");
}

#[test]
fn test_format_and_mount() {
    let (_rd, fs) = mounted(10);
    let sb = fs.superblock().unwrap();
    assert_eq!(sb.magic, MAGIC);
    assert_eq!(sb.num_blocks, 10);
    assert_eq!(sb.inode_blocks, 2);
    assert_eq!(sb.max_inodes, 256);
    assert_eq!(sb.dir_blocks, 1);

    // Exactly one directory, the root, holding '.' and '..' that both point at itself.
    assert_eq!(fs.dir_occupancy().unwrap(), &[1]);
    assert_eq!(fs.cwd().unwrap(), DirId::ROOT);
    assert_eq!(fs.cwd_name().unwrap(), "/");
    let entries = fs.ls().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, ".");
    assert_eq!(entries[1].name, "..");
    assert!(entries.iter().all(|e| e.target == EntryId::Dir(DirId::ROOT)));

    assert_eq!(fs.bitmap().unwrap(), vec![0, 1, 9]);
    assert_eq!(fs.free_blocks().unwrap(), 7);
}

#[test]
fn test_format_refuses_mounted_volume() {
    let (_rd, mut fs) = mounted(10);
    fs.touch("keep.txt").unwrap();
    assert!(matches!(fs.format(), Err(Error::AlreadyMounted)));
    assert_eq!(fs.ls().unwrap().len(), 3);

    fs.unmount().unwrap();
    fs.format().unwrap();
    fs.mount().unwrap();
    assert_eq!(fs.ls().unwrap().len(), 2);
}

#[test]
fn test_unmounted_operations_fail_fast() {
    init_logger();
    let rd = Arc::new(RamDisk::new(10));
    let mut fs = FileSystem::new(Arc::clone(&rd));
    let before = rd.stats();

    assert!(matches!(fs.create(), Err(Error::NotMounted)));
    assert!(matches!(fs.delete(InodeId(1)), Err(Error::NotMounted)));
    assert!(matches!(fs.read(InodeId(1), &mut [0u8; 8], 0), Err(Error::NotMounted)));
    assert!(matches!(fs.write(InodeId(1), b"data", 0), Err(Error::NotMounted)));
    assert!(matches!(fs.touch("a"), Err(Error::NotMounted)));
    assert!(matches!(fs.mkdir("d"), Err(Error::NotMounted)));
    assert!(matches!(fs.cd("d"), Err(Error::NotMounted)));
    assert!(matches!(fs.ls(), Err(Error::NotMounted)));
    assert!(matches!(fs.rm("a"), Err(Error::NotMounted)));
    assert!(matches!(fs.rmdir("d"), Err(Error::NotMounted)));
    assert!(matches!(fs.bitmap(), Err(Error::NotMounted)));
    assert!(matches!(fs.unmount(), Err(Error::NotMounted)));
    assert_eq!(rd.stats(), before);
}

#[test]
fn test_mount_rejects_unformatted_device() {
    init_logger();
    let mut fs = FileSystem::new(Arc::new(RamDisk::new(10)));
    let err = fs.mount().unwrap_err();
    assert!(matches!(err, Error::InvalidSuperBlock));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(!fs.is_mounted());
}

#[test]
fn test_mount_rejects_foreign_geometry() {
    init_logger();
    // A superblock formatted for 20 blocks copied onto a 10-block device.
    let big = Arc::new(RamDisk::new(20));
    FileSystem::new(Arc::clone(&big)).format().unwrap();
    let mut block = vec![0u8; BLOCK_SIZE];
    big.read_block(0, &mut block).unwrap();

    let small = Arc::new(RamDisk::new(10));
    small.write_block(0, &block).unwrap();
    let mut fs = FileSystem::new(small);
    assert!(matches!(fs.mount(), Err(Error::InvalidSuperBlock)));
}

#[test]
fn test_create_and_read_empty() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.create().unwrap();
    assert_eq!(id, InodeId(1), "inumber 0 is reserved");
    assert_eq!(fs.size_of(id).unwrap(), 0);

    let mut buf = [0u8; 16];
    assert!(matches!(fs.read(id, &mut buf, 0), Err(Error::OffsetOutOfRange { offset: 0, size: 0 })));
    assert!(matches!(fs.read(InodeId(0), &mut buf, 0), Err(Error::InvalidInode(0))));
    assert!(matches!(fs.read(InodeId(2), &mut buf, 0), Err(Error::InvalidInode(2))));
    assert!(matches!(fs.read(InodeId(128), &mut buf, 0), Err(Error::InvalidInode(128))));
}

#[test]
fn test_roundtrip_direct_blocks() {
    let (_rd, mut fs) = mounted(64);
    let id = fs.create().unwrap();
    let data = pattern(5 * BLOCK_SIZE);
    assert_eq!(fs.write(id, &data, 0).unwrap(), data.len());
    assert_eq!(fs.size_of(id).unwrap(), data.len());

    let mut buf = vec![0u8; data.len()];
    assert_eq!(fs.read(id, &mut buf, 0).unwrap(), data.len());
    assert_eq!(buf, data);

    let report = fs.debug().unwrap();
    assert_eq!(report.inodes[0].direct_ptrs.len(), 5);
    assert_eq!(report.inodes[0].indirect_ptr, None);
}

#[test]
fn test_roundtrip_indirect_blocks() {
    let (_rd, mut fs) = mounted(64);
    let id = fs.create().unwrap();
    let data = pattern(8 * BLOCK_SIZE + 100);
    assert_eq!(fs.write(id, &data, 0).unwrap(), data.len());

    let mut buf = vec![0u8; data.len()];
    assert_eq!(fs.read(id, &mut buf, 0).unwrap(), data.len());
    assert_eq!(buf, data);

    // Data blocks start right after the inode table (7 blocks on a 64-block volume).
    let report = fs.debug().unwrap();
    let inode = &report.inodes[0];
    assert_eq!(inode.direct_ptrs, vec![7, 8, 9, 10, 11]);
    assert_eq!(inode.indirect_ptr, Some(12));
    assert_eq!(inode.indirect_ptrs, vec![13, 14, 15, 16]);
    assert!(report.to_string().contains("indirect data blocks: 13 14 15 16"));
}

#[test]
fn test_unaligned_offsets() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.create().unwrap();
    fs.write(id, &pattern(BLOCK_SIZE), 0).unwrap();
    fs.write(id, b"hello world", BLOCK_SIZE - 6).unwrap();
    assert_eq!(fs.size_of(id).unwrap(), BLOCK_SIZE + 5);

    let mut buf = [0u8; 5];
    assert_eq!(fs.read(id, &mut buf, BLOCK_SIZE).unwrap(), 5);
    assert_eq!(&buf, b"world");

    // Reads are clipped at the end of the file.
    let mut buf = [0u8; 100];
    assert_eq!(fs.read(id, &mut buf, BLOCK_SIZE - 6).unwrap(), 11);
    assert_eq!(&buf[..11], b"hello world");

    // Bytes before the overwrite are untouched.
    let mut buf = [0u8; 4];
    fs.read(id, &mut buf, 10).unwrap();
    assert_eq!(&buf[..], &pattern(14)[10..14]);
}

#[test]
fn test_overwrite_keeps_size() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.create().unwrap();
    fs.write(id, &[1u8; 100], 0).unwrap();
    fs.write(id, &[2u8; 100], 0).unwrap();
    fs.write(id, &[3u8; 10], 50).unwrap();
    assert_eq!(fs.size_of(id).unwrap(), 100);
    let data = fs.cat(id).unwrap();
    assert_eq!(&data[..50], &[2u8; 50]);
    assert_eq!(&data[50..60], &[3u8; 10]);
    assert_eq!(&data[60..], &[2u8; 40]);
}

#[test]
fn test_sparse_write() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.create().unwrap();
    let free = fs.free_blocks().unwrap();
    fs.write(id, b"x", 2 * BLOCK_SIZE + 5).unwrap();
    assert_eq!(fs.size_of(id).unwrap(), 2 * BLOCK_SIZE + 6);
    assert_eq!(fs.free_blocks().unwrap(), free - 1, "holes are not allocated");

    let data = fs.cat(id).unwrap();
    assert!(data[..2 * BLOCK_SIZE + 5].iter().all(|&b| b == 0));
    assert_eq!(data[2 * BLOCK_SIZE + 5], b'x');
}

#[test]
fn test_out_of_space_keeps_partial_write() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.create().unwrap();
    // 7 data blocks: 5 direct, 1 indirect, 1 through the indirect block.
    let err = fs.write(id, &pattern(8 * BLOCK_SIZE), 0).unwrap_err();
    assert!(matches!(err, Error::OutOfSpace));
    assert_eq!(err.kind(), ErrorKind::Exhausted);
    assert_eq!(fs.size_of(id).unwrap(), 6 * BLOCK_SIZE);
    assert_eq!(fs.free_blocks().unwrap(), 0);
    assert_eq!(fs.cat(id).unwrap(), pattern(6 * BLOCK_SIZE));
}

#[test]
fn test_file_too_large() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.create().unwrap();
    assert!(matches!(fs.write(id, b"x", MAX_FILE_SIZE), Err(Error::FileTooLarge)));
    assert_eq!(fs.size_of(id).unwrap(), 0);
    assert_eq!(fs.write(id, b"", 0).unwrap(), 0);
}

#[test]
fn test_write_huge_offset() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.create().unwrap();
    assert!(matches!(fs.write(id, b"x", usize::MAX), Err(Error::FileTooLarge)));
    assert!(matches!(fs.write(id, b"xy", usize::MAX - 1), Err(Error::FileTooLarge)));
    assert_eq!(fs.size_of(id).unwrap(), 0);
}

#[test]
fn test_delete_and_reuse() {
    let (_rd, mut fs) = mounted(10);
    let a = fs.create().unwrap();
    let b = fs.create().unwrap();
    let c = fs.create().unwrap();
    assert_eq!((a, b, c), (InodeId(1), InodeId(2), InodeId(3)));

    let free = fs.free_blocks().unwrap();
    fs.write(b, &pattern(2 * BLOCK_SIZE), 0).unwrap();
    assert_eq!(fs.free_blocks().unwrap(), free - 2);

    fs.delete(b).unwrap();
    assert_eq!(fs.free_blocks().unwrap(), free, "data blocks are reclaimed");
    assert!(matches!(fs.read(b, &mut [0u8; 4], 0), Err(Error::InvalidInode(2))));
    assert!(matches!(fs.delete(b), Err(Error::InvalidInode(2))));

    assert_eq!(fs.create().unwrap(), InodeId(2), "smallest freed slot is reused");
    assert_eq!(fs.size_of(InodeId(2)).unwrap(), 0);
}

#[test]
fn test_inode_exhaustion() {
    let (_rd, mut fs) = mounted(10);
    // One inode block of 128 slots, slot 0 reserved.
    for i in 1..128 {
        assert_eq!(fs.create().unwrap(), InodeId(i));
    }
    assert!(matches!(fs.create(), Err(Error::OutOfInodes)));
}

#[test]
fn test_mount_rebuilds_bitmap() {
    let (_rd, mut fs) = mounted(64);
    let id = fs.create().unwrap();
    let data = pattern(6 * BLOCK_SIZE + 1);
    fs.write(id, &data, 0).unwrap();
    let used = fs.bitmap().unwrap();

    fs.unmount().unwrap();
    fs.mount().unwrap();
    assert_eq!(fs.bitmap().unwrap(), used);
    assert_eq!(fs.cat(id).unwrap(), data);

    // A new file must not land on blocks owned by the first one.
    let other = fs.create().unwrap();
    fs.write(other, &[0xEE; 10], 0).unwrap();
    assert_eq!(fs.cat(id).unwrap(), data);
}

#[test]
fn test_debug_unformatted() {
    init_logger();
    let fs = FileSystem::new(Arc::new(RamDisk::new(10)));
    let report = fs.debug().unwrap();
    assert!(!report.magic_valid);
    assert!(report.inodes.is_empty());
    assert!(report.to_string().contains("invalid"));
}

#[test]
fn test_end_to_end() {
    let (_rd, mut fs) = mounted(10);
    let id = fs.touch("a.txt").unwrap();
    let data = pattern(5000);
    assert_eq!(fs.write(id, &data, 0).unwrap(), 5000);

    let mut buf = vec![0u8; 5000];
    assert_eq!(fs.read(id, &mut buf, 0).unwrap(), 5000);
    assert_eq!(buf, data);

    let names: Vec<String> = fs.ls().unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec![".", "..", "a.txt"]);
    log!("{}", fs.debug().unwrap());
}
