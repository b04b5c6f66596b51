//! System information syscalls (0xE0 range).

use super::{SyscallResult, write_struct_to_user};
use crate::mm::{heap, pmm};
use viper_abi::MemInfo;

pub fn sys_mem_info(info_ptr: u64) -> SyscallResult {
    let (total, free) = pmm::stats();
    let (heap_used, heap_free) = heap::stats();

    let info = MemInfo {
        total_pages: total as u64,
        free_pages: free as u64,
        used_pages: (total - free) as u64,
        heap_used: heap_used as u64,
        heap_free: heap_free as u64,
    };
    match write_struct_to_user(info_ptr, &info) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}
