//! Physical page allocator.
//!
//! Free frames are threaded into a doubly-linked list through the first two
//! words of each free page, giving O(1) single-page alloc/free. A compact
//! bitmap mirrors the free state so multi-page requests can find contiguous
//! runs; pages taken from the middle of a run are unlinked from the list in
//! O(1) via their back pointers.
//!
//! The allocator only ever manages the RAM window it was initialized with,
//! so kernel-image and device ranges can never be handed out.

use crate::config::PAGE_SIZE;
use viper_hal::IrqSafeLock;

/// Upper bound on managed frames (128 MiB of 4 KiB pages).
const MAX_PAGES: usize = 32768;
const BITMAP_WORDS: usize = MAX_PAGES / 64;

/// Link block stored in the first 16 bytes of every free page.
#[repr(C)]
struct FreePage {
    next: u64, // physical address, 0 = end
    prev: u64,
}

pub struct FrameAllocator {
    base: u64,
    page_count: usize,
    free_head: u64,
    free_count: usize,
    /// Bit set = frame is free.
    bitmap: [u64; BITMAP_WORDS],
}

/// Kernel mappings are identity, so a physical address is directly
/// dereferencable.
#[inline]
pub fn phys_to_virt(phys: u64) -> *mut u8 {
    phys as *mut u8
}

#[inline]
pub fn virt_to_phys_linear(virt: *const u8) -> u64 {
    virt as u64
}

impl FrameAllocator {
    pub const fn empty() -> Self {
        Self {
            base: 0,
            page_count: 0,
            free_head: 0,
            free_count: 0,
            bitmap: [0; BITMAP_WORDS],
        }
    }

    /// Take ownership of `[base, base + size)`. Both bounds must be
    /// page-aligned; the region must not contain anything live.
    pub fn init(&mut self, base: u64, size: u64) {
        debug_assert_eq!(base % PAGE_SIZE as u64, 0);
        self.base = base;
        self.page_count = ((size as usize) / PAGE_SIZE).min(MAX_PAGES);
        self.free_head = 0;
        self.free_count = 0;
        self.bitmap = [0; BITMAP_WORDS];

        // Push in reverse so the list pops lowest-address first.
        for i in (0..self.page_count).rev() {
            self.push_free(self.base + (i * PAGE_SIZE) as u64);
        }
    }

    #[inline]
    fn index_of(&self, addr: u64) -> usize {
        ((addr - self.base) as usize) / PAGE_SIZE
    }

    #[inline]
    fn is_free(&self, idx: usize) -> bool {
        self.bitmap[idx / 64] & (1 << (idx % 64)) != 0
    }

    #[inline]
    fn set_free(&mut self, idx: usize, free: bool) {
        if free {
            self.bitmap[idx / 64] |= 1 << (idx % 64);
        } else {
            self.bitmap[idx / 64] &= !(1 << (idx % 64));
        }
    }

    fn push_free(&mut self, addr: u64) {
        let page = phys_to_virt(addr) as *mut FreePage;
        // SAFETY: the page belongs to this allocator and is not in use.
        unsafe {
            (*page).next = self.free_head;
            (*page).prev = 0;
            if self.free_head != 0 {
                (*(phys_to_virt(self.free_head) as *mut FreePage)).prev = addr;
            }
        }
        self.free_head = addr;
        self.set_free(self.index_of(addr), true);
        self.free_count += 1;
    }

    /// Unlink a specific free page from the list (O(1) via its back link).
    fn unlink(&mut self, addr: u64) {
        let page = phys_to_virt(addr) as *mut FreePage;
        // SAFETY: addr is on the free list, so its link block is valid.
        unsafe {
            let next = (*page).next;
            let prev = (*page).prev;
            if prev != 0 {
                (*(phys_to_virt(prev) as *mut FreePage)).next = next;
            } else {
                self.free_head = next;
            }
            if next != 0 {
                (*(phys_to_virt(next) as *mut FreePage)).prev = prev;
            }
        }
        self.set_free(self.index_of(addr), false);
        self.free_count -= 1;
    }

    /// Allocate one frame; 0 on exhaustion.
    pub fn alloc_page(&mut self) -> u64 {
        let addr = self.free_head;
        if addr == 0 {
            return 0;
        }
        self.unlink(addr);
        addr
    }

    /// Allocate `n` physically contiguous frames; 0 on failure. First-fit
    /// over the bitmap; only the single-page path is O(1).
    pub fn alloc_pages(&mut self, n: usize) -> u64 {
        if n == 0 {
            return 0;
        }
        if n == 1 {
            return self.alloc_page();
        }

        let mut run = 0usize;
        let mut start = 0usize;
        for idx in 0..self.page_count {
            if self.is_free(idx) {
                if run == 0 {
                    start = idx;
                }
                run += 1;
                if run == n {
                    for i in start..start + n {
                        self.unlink(self.base + (i * PAGE_SIZE) as u64);
                    }
                    return self.base + (start * PAGE_SIZE) as u64;
                }
            } else {
                run = 0;
            }
        }
        0
    }

    /// Return `n` frames starting at `addr`. The range must match the
    /// granularity it was allocated with.
    pub fn free_pages(&mut self, addr: u64, n: usize) {
        for i in 0..n {
            let page = addr + (i * PAGE_SIZE) as u64;
            debug_assert!(!self.is_free(self.index_of(page)), "double free");
            self.push_free(page);
        }
    }

    pub fn total_pages(&self) -> usize {
        self.page_count
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }
}

static PMM: IrqSafeLock<FrameAllocator> = IrqSafeLock::new(FrameAllocator::empty());

/// Hand the boot-described RAM window to the allocator.
pub fn init(base: u64, size: u64) {
    let mut pmm = PMM.lock();
    pmm.init(base, size);
    log::info!(
        "[pmm] {} pages ({} KiB) at {:#x}",
        pmm.total_pages(),
        pmm.total_pages() * PAGE_SIZE / 1024,
        base
    );
}

/// One page-aligned 4 KiB frame, or 0 on exhaustion.
pub fn alloc_page() -> u64 {
    PMM.lock().alloc_page()
}

/// `n` contiguous frames, or 0.
pub fn alloc_pages(n: usize) -> u64 {
    PMM.lock().alloc_pages(n)
}

pub fn free_pages(addr: u64, n: usize) {
    PMM.lock().free_pages(addr, n);
}

/// (total, free) frame counts for `MemInfo`.
pub fn stats() -> (usize, usize) {
    let pmm = PMM.lock();
    (pmm.total_pages(), pmm.free_count())
}

#[cfg(all(test, feature = "std"))]
pub(crate) mod testutil {
    use crate::config::PAGE_SIZE;
    use viper_utils::Once;

    /// Leak an aligned buffer and return its (base, size) as a fake physical
    /// region for allocator tests.
    pub fn leaked_region(pages: usize) -> (u64, u64) {
        let bytes = (pages + 1) * PAGE_SIZE;
        let buf = vec![0u8; bytes].leak();
        let raw = buf.as_mut_ptr() as u64;
        let base = (raw + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1);
        (base, (pages * PAGE_SIZE) as u64)
    }

    static GLOBAL_READY: Once<()> = Once::new();

    /// Point the global PMM at a leaked region, once per test process. Every
    /// test that allocates through the global allocator goes through here so
    /// no test re-initializes it under another's feet.
    pub fn ensure_global_pmm() {
        GLOBAL_READY.call_once(|| {
            let (base, size) = leaked_region(2048);
            super::init(base, size);
        });
    }
}
