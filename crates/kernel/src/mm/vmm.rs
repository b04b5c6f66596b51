//! AArch64 4-level translation tables.
//!
//! Tables are allocated from the PMM, zeroed, and linked with table
//! descriptors; terminal entries carry one of the flag presets below. Every
//! per-page mutation is followed by a VA-scoped TLB invalidate with the
//! barriers the architecture requires; bulk changes use `vmalle1is`.
//!
//! Allocation failure midway through `map_range` leaves already-installed
//! intermediate tables in place. Rollback is deliberately not attempted:
//! running out of page-table memory is already fatal for the caller, and
//! the bookkeeping to distinguish new tables from shared ones is not worth
//! carrying for that case.

use super::pmm;
use crate::config::PAGE_SIZE;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU64, Ordering};

const ENTRIES_PER_TABLE: u64 = 512;
const INDEX_MASK: u64 = 0x1FF;

const L0_SHIFT: u64 = 39;
const L1_SHIFT: u64 = 30;
const L2_SHIFT: u64 = 21;
const L3_SHIFT: u64 = 12;

/// Output-address field of a descriptor.
pub const PHYS_MASK: u64 = 0x0000_FFFF_FFFF_F000;

bitflags! {
    /// Long-descriptor format bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const VALID = 1 << 0;
        /// Table descriptor at L0..L2; page descriptor at L3.
        const TABLE_OR_PAGE = 1 << 1;
        /// MAIR index 1 (device memory); index 0 (normal) is the default.
        const ATTR_DEVICE = 1 << 2;
        const NON_SECURE = 1 << 5;
        /// AP[1]: EL0 access permitted.
        const AP_EL0 = 1 << 6;
        /// AP[2]: read-only.
        const AP_RO = 1 << 7;
        /// Inner shareable.
        const SH_INNER = 0b11 << 8;
        const ACCESS = 1 << 10;
        /// Non-global; translation is ASID-tagged.
        const NG = 1 << 11;
        const PXN = 1 << 53;
        const UXN = 1 << 54;
    }
}

/// Terminal-descriptor presets for each mapping kind.
pub mod preset {
    use super::PteFlags;

    const BASE: u64 = PteFlags::VALID.bits()
        | PteFlags::TABLE_OR_PAGE.bits()
        | PteFlags::ACCESS.bits()
        | PteFlags::SH_INNER.bits();

    /// Kernel data: readable/writable at EL1, never executable.
    pub const KERNEL_RW: u64 = BASE | PteFlags::PXN.bits() | PteFlags::UXN.bits();

    /// Kernel text: read-only, executable at EL1 only.
    pub const KERNEL_RX: u64 = BASE | PteFlags::AP_RO.bits() | PteFlags::UXN.bits();

    /// Kernel read-only data.
    pub const KERNEL_RO: u64 =
        BASE | PteFlags::AP_RO.bits() | PteFlags::PXN.bits() | PteFlags::UXN.bits();

    /// Device MMIO: device attributes, never executable.
    pub const DEVICE: u64 = PteFlags::VALID.bits()
        | PteFlags::TABLE_OR_PAGE.bits()
        | PteFlags::ACCESS.bits()
        | PteFlags::ATTR_DEVICE.bits()
        | PteFlags::PXN.bits()
        | PteFlags::UXN.bits();

    /// User data/stack: EL0 read-write, ASID-tagged, never executable.
    pub const USER_RW: u64 =
        BASE | PteFlags::AP_EL0.bits() | PteFlags::NG.bits() | PteFlags::PXN.bits()
            | PteFlags::UXN.bits();

    /// User text: EL0 read-execute, ASID-tagged.
    pub const USER_RX: u64 = BASE
        | PteFlags::AP_EL0.bits()
        | PteFlags::AP_RO.bits()
        | PteFlags::NG.bits()
        | PteFlags::PXN.bits();
}

#[inline]
fn table_index(va: u64, shift: u64) -> usize {
    ((va >> shift) & INDEX_MASK) as usize
}

#[inline]
fn table_ptr(phys: u64) -> *mut u64 {
    pmm::phys_to_virt(phys) as *mut u64
}

#[inline]
unsafe fn read_entry(table: u64, index: usize) -> u64 {
    unsafe { core::ptr::read_volatile(table_ptr(table).add(index)) }
}

#[inline]
unsafe fn write_entry(table: u64, index: usize, value: u64) {
    unsafe { core::ptr::write_volatile(table_ptr(table).add(index), value) };
}

/// Follow the entry at `table[index]`, allocating and linking a zeroed table
/// page when it is empty. Returns the next table's physical address, or 0 if
/// allocation failed.
fn get_or_create_table(table: u64, index: usize) -> u64 {
    // SAFETY: `table` is a live table page owned by the VMM.
    let entry = unsafe { read_entry(table, index) };

    if entry & PteFlags::VALID.bits() != 0 {
        return entry & PHYS_MASK;
    }

    let new_table = pmm::alloc_page();
    if new_table == 0 {
        log::error!("[vmm] failed to allocate page table");
        return 0;
    }

    // SAFETY: the fresh page belongs to us; zero it before linking.
    unsafe {
        core::ptr::write_bytes(table_ptr(new_table), 0, ENTRIES_PER_TABLE as usize);
        write_entry(
            table,
            index,
            new_table | PteFlags::VALID.bits() | PteFlags::TABLE_OR_PAGE.bits(),
        );
    }

    new_table
}

/// Split a 2 MiB block descriptor into an L3 table of equivalent page
/// descriptors, so a single page inside it can be remapped or removed.
/// Returns the new table's physical address, or 0 on allocation failure.
fn split_block_l2(l2: u64, index: usize) -> u64 {
    // SAFETY: l2 is a live table page.
    let block = unsafe { read_entry(l2, index) };
    let base = block & PHYS_MASK;
    let flags = (block & !PHYS_MASK) | PteFlags::TABLE_OR_PAGE.bits();

    let table = pmm::alloc_page();
    if table == 0 {
        log::error!("[vmm] failed to allocate table for block split");
        return 0;
    }

    // SAFETY: fresh table page; replicate the block as 512 page entries,
    // then swap the descriptors and scrub stale block translations.
    unsafe {
        for i in 0..ENTRIES_PER_TABLE as usize {
            write_entry(table, i, (base + (i * PAGE_SIZE) as u64) | flags);
        }
        write_entry(
            l2,
            index,
            table | PteFlags::VALID.bits() | PteFlags::TABLE_OR_PAGE.bits(),
        );
    }
    invalidate_all();
    table
}

/// L2 -> L3 step that tolerates 2 MiB blocks by splitting them.
fn get_or_create_l3(l2: u64, index: usize) -> u64 {
    // SAFETY: l2 is a live table page.
    let entry = unsafe { read_entry(l2, index) };
    if entry & PteFlags::VALID.bits() != 0 && entry & PteFlags::TABLE_OR_PAGE.bits() == 0 {
        return split_block_l2(l2, index);
    }
    get_or_create_table(l2, index)
}

/// Map one 4 KiB page in the tree rooted at `root`.
pub fn map_page_in(root: u64, virt: u64, phys: u64, flags: u64) -> bool {
    let l1 = get_or_create_table(root, table_index(virt, L0_SHIFT));
    if l1 == 0 {
        return false;
    }
    let l2 = get_or_create_table(l1, table_index(virt, L1_SHIFT));
    if l2 == 0 {
        return false;
    }
    let l3 = get_or_create_l3(l2, table_index(virt, L2_SHIFT));
    if l3 == 0 {
        return false;
    }

    // SAFETY: l3 is a live leaf table.
    unsafe { write_entry(l3, table_index(virt, L3_SHIFT), (phys & PHYS_MASK) | flags) };

    invalidate_page(virt);
    true
}

/// Map a 2 MiB block descriptor at L2. Used for the boot identity map.
pub fn map_block_2m_in(root: u64, virt: u64, phys: u64, flags: u64) -> bool {
    let l1 = get_or_create_table(root, table_index(virt, L0_SHIFT));
    if l1 == 0 {
        return false;
    }
    let l2 = get_or_create_table(l1, table_index(virt, L1_SHIFT));
    if l2 == 0 {
        return false;
    }

    // Block descriptors clear bit 1.
    let desc = ((phys & PHYS_MASK) | flags) & !PteFlags::TABLE_OR_PAGE.bits();
    // SAFETY: l2 is a live table.
    unsafe { write_entry(l2, table_index(virt, L2_SHIFT), desc) };

    invalidate_page(virt);
    true
}

/// Equivalent to `ceil(size / PAGE_SIZE)` successive `map_page_in` calls.
pub fn map_range_in(root: u64, virt: u64, phys: u64, size: u64, flags: u64) -> bool {
    let pages = size.div_ceil(PAGE_SIZE as u64);
    for i in 0..pages {
        let off = i * PAGE_SIZE as u64;
        if !map_page_in(root, virt + off, phys + off, flags) {
            return false;
        }
    }
    true
}

/// Remove the mapping for `virt`, if present. A covering 2 MiB block is
/// split first so only the one page disappears.
pub fn unmap_page_in(root: u64, virt: u64) {
    // SAFETY: every visited table is a live table page.
    unsafe {
        let l0e = read_entry(root, table_index(virt, L0_SHIFT));
        if l0e & PteFlags::VALID.bits() == 0 {
            return;
        }
        let l1 = l0e & PHYS_MASK;
        let l1e = read_entry(l1, table_index(virt, L1_SHIFT));
        if l1e & PteFlags::VALID.bits() == 0 || l1e & PteFlags::TABLE_OR_PAGE.bits() == 0 {
            // 1 GiB blocks are never split; nothing page-sized to remove.
            return;
        }
        let l2 = l1e & PHYS_MASK;
        let l2_idx = table_index(virt, L2_SHIFT);
        let l2e = read_entry(l2, l2_idx);
        if l2e & PteFlags::VALID.bits() == 0 {
            return;
        }
        let l3 = if l2e & PteFlags::TABLE_OR_PAGE.bits() == 0 {
            let table = split_block_l2(l2, l2_idx);
            if table == 0 {
                return;
            }
            table
        } else {
            l2e & PHYS_MASK
        };
        write_entry(l3, table_index(virt, L3_SHIFT), 0);
    }

    invalidate_page(virt);
}

/// Walk the tables; honors block descriptors at L1 and L2. Returns 0 when
/// any level is invalid.
pub fn virt_to_phys_in(root: u64, virt: u64) -> u64 {
    // SAFETY: every visited table is a live table page.
    unsafe {
        let l0e = read_entry(root, table_index(virt, L0_SHIFT));
        if l0e & PteFlags::VALID.bits() == 0 {
            return 0;
        }

        let l1 = l0e & PHYS_MASK;
        let l1e = read_entry(l1, table_index(virt, L1_SHIFT));
        if l1e & PteFlags::VALID.bits() == 0 {
            return 0;
        }
        if l1e & PteFlags::TABLE_OR_PAGE.bits() == 0 {
            // 1 GiB block
            return (l1e & PHYS_MASK) | (virt & ((1 << L1_SHIFT) - 1));
        }

        let l2 = l1e & PHYS_MASK;
        let l2e = read_entry(l2, table_index(virt, L2_SHIFT));
        if l2e & PteFlags::VALID.bits() == 0 {
            return 0;
        }
        if l2e & PteFlags::TABLE_OR_PAGE.bits() == 0 {
            // 2 MiB block
            return (l2e & PHYS_MASK) | (virt & ((1 << L2_SHIFT) - 1));
        }

        let l3 = l2e & PHYS_MASK;
        let l3e = read_entry(l3, table_index(virt, L3_SHIFT));
        if l3e & PteFlags::VALID.bits() == 0 {
            return 0;
        }

        (l3e & PHYS_MASK) | (virt & (PAGE_SIZE as u64 - 1))
    }
}

// ---------------------------------------------------------------------------
// Kernel root table
// ---------------------------------------------------------------------------

static KERNEL_ROOT: AtomicU64 = AtomicU64::new(0);

/// Allocate the kernel root table. Mappings are installed by the boot path;
/// nothing is active until [`enable_mmu`].
pub fn init() -> bool {
    let root = pmm::alloc_page();
    if root == 0 {
        log::error!("[vmm] failed to allocate root table");
        return false;
    }
    // SAFETY: fresh page from the PMM.
    unsafe { core::ptr::write_bytes(table_ptr(root), 0, ENTRIES_PER_TABLE as usize) };
    KERNEL_ROOT.store(root, Ordering::Release);
    log::info!("[vmm] kernel root table at {:#x}", root);
    true
}

pub fn kernel_root() -> u64 {
    KERNEL_ROOT.load(Ordering::Acquire)
}

pub fn map_page(virt: u64, phys: u64, flags: u64) -> bool {
    map_page_in(kernel_root(), virt, phys, flags)
}

pub fn map_range(virt: u64, phys: u64, size: u64, flags: u64) -> bool {
    map_range_in(kernel_root(), virt, phys, size, flags)
}

pub fn unmap_page(virt: u64) {
    let root = kernel_root();
    if root != 0 {
        unmap_page_in(root, virt);
    }
}

pub fn virt_to_phys(virt: u64) -> u64 {
    let root = kernel_root();
    if root == 0 {
        // Identity mapping before the VMM owns translation.
        return virt;
    }
    virt_to_phys_in(root, virt)
}

// ---------------------------------------------------------------------------
// TLB maintenance
// ---------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
pub fn invalidate_page(virt: u64) {
    // SAFETY: TLB maintenance; barriers order the update.
    unsafe {
        core::arch::asm!("tlbi vaae1is, {}", in(reg) virt >> 12);
        core::arch::asm!("dsb sy");
        core::arch::asm!("isb");
    }
}

#[cfg(target_arch = "aarch64")]
pub fn invalidate_all() {
    // SAFETY: TLB maintenance.
    unsafe {
        core::arch::asm!("tlbi vmalle1is");
        core::arch::asm!("dsb sy");
        core::arch::asm!("isb");
    }
}

#[cfg(target_arch = "aarch64")]
pub fn invalidate_asid(asid: u16) {
    // SAFETY: TLB maintenance scoped to one ASID.
    unsafe {
        core::arch::asm!("tlbi aside1is, {}", in(reg) (asid as u64) << 48);
        core::arch::asm!("dsb sy");
        core::arch::asm!("isb");
    }
}

#[cfg(not(target_arch = "aarch64"))]
pub fn invalidate_page(_virt: u64) {}
#[cfg(not(target_arch = "aarch64"))]
pub fn invalidate_all() {}
#[cfg(not(target_arch = "aarch64"))]
pub fn invalidate_asid(_asid: u16) {}

/// Build the kernel identity map and turn translation on. Called once,
/// before the first user task exists.
#[cfg(target_arch = "aarch64")]
pub fn enable_mmu() {
    use crate::config;
    use aarch64_cpu::registers::{MAIR_EL1, SCTLR_EL1, TCR_EL1, TTBR0_EL1, Readable, Writeable};

    let root = kernel_root();

    // RAM as 2 MiB kernel blocks; text stays executable because the image
    // sits inside this window and the coarse map uses RW permissions with
    // PXN clear below.
    const BLOCK: u64 = 2 * 1024 * 1024;
    let ram_blocks = config::RAM_SIZE / BLOCK;
    let ram_flags = preset::KERNEL_RW & !PteFlags::PXN.bits();
    for i in 0..ram_blocks {
        let addr = config::RAM_BASE + i * BLOCK;
        map_block_2m_in(root, addr, addr, ram_flags);
    }

    // Device window: GIC + UART + the rest of the virt MMIO block.
    for i in 0..16 {
        let addr = 0x0800_0000u64 + i * BLOCK;
        map_block_2m_in(root, addr, addr, preset::DEVICE);
    }

    // Attr0 = normal write-back, Attr1 = device nGnRE.
    MAIR_EL1.set(0x04FF);

    // 48-bit VA through TTBR0 with 4 KiB granule; TTBR1 walks disabled;
    // 16-bit ASIDs selected from TTBR0.
    let tcr: u64 = (16 << 0)        // T0SZ
        | (1 << 8)                  // IRGN0 write-back
        | (1 << 10)                 // ORGN0 write-back
        | (3 << 12)                 // SH0 inner
        | (1 << 23)                 // EPD1
        | (0b101 << 32)             // IPS 48-bit
        | (1 << 36); // AS: 16-bit ASID
    TCR_EL1.set(tcr);

    TTBR0_EL1.set(root);

    invalidate_all();

    // M + C + I; SP alignment checking stays off during bring-up.
    SCTLR_EL1.set(SCTLR_EL1.get() | (1 << 0) | (1 << 2) | (1 << 12));
    aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);

    log::info!("[vmm] MMU enabled (identity map active)");
}

#[cfg(not(target_arch = "aarch64"))]
pub fn enable_mmu() {}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::mm::pmm::testutil::ensure_global_pmm;

    fn fresh_root() -> u64 {
        ensure_global_pmm();
        let root = crate::mm::pmm::alloc_page();
        assert_ne!(root, 0);
        unsafe { core::ptr::write_bytes(table_ptr(root), 0, ENTRIES_PER_TABLE as usize) };
        root
    }

    #[test]
    fn map_then_translate() {
        let root = fresh_root();
        let frame = crate::mm::pmm::alloc_page();
        let va = 0x0000_7000_0000_0000u64;

        assert!(map_page_in(root, va, frame, preset::USER_RW));
        assert_eq!(virt_to_phys_in(root, va), frame);
        assert_eq!(virt_to_phys_in(root, va + 0x123), frame + 0x123);
    }

    #[test]
    fn unmap_clears_translation() {
        let root = fresh_root();
        let frame = crate::mm::pmm::alloc_page();
        let va = 0x0000_6000_0000_0000u64;

        assert!(map_page_in(root, va, frame, preset::KERNEL_RW));
        assert_ne!(virt_to_phys_in(root, va), 0);
        unmap_page_in(root, va);
        assert_eq!(virt_to_phys_in(root, va), 0);
    }

    #[test]
    fn map_range_equals_per_page_maps() {
        let root = fresh_root();
        let frames = crate::mm::pmm::alloc_pages(4);
        assert_ne!(frames, 0);
        let va = 0x0000_5000_0000_0000u64;

        // 3.5 pages rounds up to 4
        assert!(map_range_in(
            root,
            va,
            frames,
            3 * PAGE_SIZE as u64 + PAGE_SIZE as u64 / 2,
            preset::USER_RW
        ));
        for i in 0..4u64 {
            assert_eq!(
                virt_to_phys_in(root, va + i * PAGE_SIZE as u64),
                frames + i * PAGE_SIZE as u64
            );
        }
    }

    #[test]
    fn block_descriptor_readds_offset() {
        let root = fresh_root();
        let phys = 0x4000_0000u64;
        let va = 0x4000_0000u64;
        assert!(map_block_2m_in(root, va, phys, preset::KERNEL_RW));
        assert_eq!(virt_to_phys_in(root, va + 0x12345), phys + 0x12345);
    }

    #[test]
    fn untouched_addresses_translate_to_zero() {
        let root = fresh_root();
        assert_eq!(virt_to_phys_in(root, 0xdead_b000), 0);
    }

    #[test]
    fn unmap_inside_block_splits_it() {
        let root = fresh_root();
        let base = 0x6000_0000u64; // 2 MiB aligned
        assert!(map_block_2m_in(root, base, base, preset::KERNEL_RW));

        // Punch out one page in the middle (the stack-guard pattern).
        let guard = base + 0x8000;
        unmap_page_in(root, guard);

        assert_eq!(virt_to_phys_in(root, guard), 0);
        assert_eq!(virt_to_phys_in(root, guard - 0x1000), guard - 0x1000);
        assert_eq!(virt_to_phys_in(root, guard + 0x1000), guard + 0x1000);
        assert_eq!(virt_to_phys_in(root, base), base);
        assert_eq!(
            virt_to_phys_in(root, base + 2 * 1024 * 1024 - 0x1000),
            base + 2 * 1024 * 1024 - 0x1000
        );
    }
}
