//! Common utilities for tests
#![allow(dead_code)]

use std::sync::Arc;

use quark::{FileSystem, RamDisk};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// Routes the library's `log` output through the test harness.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A formatted and mounted volume on a fresh RamDisk.
pub fn mounted(num_blocks: usize) -> (Arc<RamDisk>, FileSystem<RamDisk>) {
    init_logger();
    let rd = Arc::new(RamDisk::new(num_blocks));
    let mut fs = FileSystem::new(Arc::clone(&rd));
    fs.format().unwrap();
    fs.mount().unwrap();
    (rd, fs)
}

/// Deterministic, non-repeating-per-block test data.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
