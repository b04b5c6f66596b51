//! Kernel heap backing `alloc`.
//!
//! A fixed early-RAM window is handed to `linked_list_allocator` before any
//! `Arc`/`Vec` use. Host tests run under std and never touch this.

use crate::config::{HEAP_BASE, HEAP_SIZE};
use linked_list_allocator::LockedHeap;

#[cfg_attr(target_arch = "aarch64", global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the heap region. Must run before the first allocation and
/// exactly once.
pub fn init() {
    // SAFETY: the [HEAP_BASE, HEAP_BASE + HEAP_SIZE) window is reserved for
    // the heap by the platform layout and is unused until this call.
    unsafe {
        ALLOCATOR.lock().init(HEAP_BASE as *mut u8, HEAP_SIZE);
    }
    log::info!(
        "[heap] {} MiB at {:#x}",
        HEAP_SIZE / (1024 * 1024),
        HEAP_BASE
    );
}

/// (used, free) byte counts for `MemInfo`.
pub fn stats() -> (usize, usize) {
    let heap = ALLOCATOR.lock();
    (heap.used(), heap.free())
}
