//! Platform constants and host queries.
//!
//! The page constants must agree with the user-side definition of the CPU
//! page size; the cache constants describe the L1 data cache.

use crate::error::{OskError, Result};
use std::num::NonZeroUsize;

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;
pub const PAGE_MASK: u64 = !(PAGE_SIZE - 1);

/// L1 data cache line size, as log2 of the size in bytes.
pub const L1_DCACHE_LINE_SIZE_LOG2: u32 = 6;
pub const L1_DCACHE_LINE_SIZE: usize = 1 << L1_DCACHE_LINE_SIZE_LOG2;

/// L1 data cache size, in bytes.
pub const L1_DCACHE_SIZE: u32 = 0x0000_8000;

/// Number of CPU cores the host makes available to us.
#[must_use]
pub fn num_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Total amount of host memory, in pages.
///
/// # Errors
///
/// [`OskError::MemInfoUnavailable`] if the host does not expose its memory
/// size or the report cannot be parsed.
pub fn total_ram_pages() -> Result<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo")
        .map_err(|_| OskError::MemInfoUnavailable("cannot read /proc/meminfo"))?;
    parse_mem_total_pages(&meminfo)
}

/// Extracts `MemTotal` (reported in KiB) and converts it to pages.
fn parse_mem_total_pages(meminfo: &str) -> Result<u64> {
    let line = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .ok_or(OskError::MemInfoUnavailable("no MemTotal entry"))?;

    let mut fields = line["MemTotal:".len()..].split_whitespace();
    let kib: u64 = fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or(OskError::MemInfoUnavailable("malformed MemTotal value"))?;
    if fields.next() != Some("kB") {
        return Err(OskError::MemInfoUnavailable("unexpected MemTotal unit"));
    }

    let bytes = kib
        .checked_mul(1024)
        .ok_or(OskError::MemInfoUnavailable("MemTotal out of range"))?;
    Ok(bytes / PAGE_SIZE)
}
