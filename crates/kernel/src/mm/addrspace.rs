//! Per-process address spaces: a root translation table, an ASID, and the
//! VMA set.
//!
//! ASID 0 is reserved for the kernel's global mappings; user processes get a
//! nonzero ASID so a context switch is a TTBR0 write plus an ASID-scoped
//! invalidate instead of a full TLB flush.

use super::{pmm, vma::VmaList, vmm};
use viper_abi::{VError, VResult};
use viper_hal::IrqSafeLock;

/// ASIDs 1..=255 are handed out from a fixed bitmap; reuse after teardown
/// requires an ASID-scoped invalidation before reinstallation.
static ASID_POOL: IrqSafeLock<[u64; 4]> = IrqSafeLock::new([0; 4]);

fn alloc_asid() -> VResult<u16> {
    let mut pool = ASID_POOL.lock();
    for asid in 1u16..=255 {
        let (word, bit) = ((asid / 64) as usize, asid % 64);
        if pool[word] & (1 << bit) == 0 {
            pool[word] |= 1 << bit;
            return Ok(asid);
        }
    }
    Err(VError::OutOfMemory)
}

fn release_asid(asid: u16) {
    if asid == 0 || asid > 255 {
        return;
    }
    let mut pool = ASID_POOL.lock();
    pool[(asid / 64) as usize] &= !(1 << (asid % 64));
    // The TLB may still hold tagged entries; scrub before the ASID can be
    // handed out again.
    vmm::invalidate_asid(asid);
}

/// One user process's view of memory.
pub struct AddressSpace {
    root: u64,
    asid: u16,
    owner: u32,
    pub vmas: IrqSafeLock<VmaList>,
}

impl AddressSpace {
    /// Create an empty space for process `owner`. The kernel's global L0
    /// entries are copied in so EL1 keeps executing after the TTBR0 switch.
    pub fn new(owner: u32) -> VResult<Self> {
        let root = pmm::alloc_page();
        if root == 0 {
            return Err(VError::OutOfMemory);
        }

        // SAFETY: fresh table page; copy the kernel root's 512 entries.
        unsafe {
            let dst = pmm::phys_to_virt(root) as *mut u64;
            core::ptr::write_bytes(dst, 0, 512);
            let kroot = vmm::kernel_root();
            if kroot != 0 {
                let src = pmm::phys_to_virt(kroot) as *const u64;
                core::ptr::copy_nonoverlapping(src, dst, 512);
            }
        }

        let asid = alloc_asid()?;
        Ok(Self {
            root,
            asid,
            owner,
            vmas: IrqSafeLock::new(VmaList::new()),
        })
    }

    #[inline]
    pub fn root(&self) -> u64 {
        self.root
    }

    #[inline]
    pub fn asid(&self) -> u16 {
        self.asid
    }

    #[inline]
    pub fn owner(&self) -> u32 {
        self.owner
    }

    pub fn map_page(&self, virt: u64, phys: u64, flags: u64) -> bool {
        vmm::map_page_in(self.root, virt, phys, flags)
    }

    pub fn map_range(&self, virt: u64, phys: u64, size: u64, flags: u64) -> bool {
        vmm::map_range_in(self.root, virt, phys, size, flags)
    }

    pub fn unmap_page(&self, virt: u64) {
        vmm::unmap_page_in(self.root, virt);
    }

    pub fn virt_to_phys(&self, virt: u64) -> u64 {
        vmm::virt_to_phys_in(self.root, virt)
    }

    /// Install this space: TTBR0 write with the ASID in the high bits, then
    /// an ASID-scoped invalidate and an `isb` before any user instruction.
    #[cfg(target_arch = "aarch64")]
    pub fn switch_to(&self) {
        use aarch64_cpu::registers::{TTBR0_EL1, Writeable};

        TTBR0_EL1.set(((self.asid as u64) << 48) | self.root);
        vmm::invalidate_asid(self.asid);
        aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);
    }

    #[cfg(not(target_arch = "aarch64"))]
    pub fn switch_to(&self) {}
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        release_asid(self.asid);
        // Root table page goes back to the pool; leaf tables are torn down
        // with the process's mappings by the owner before drop.
        pmm::free_pages(self.root, 1);
    }
}
