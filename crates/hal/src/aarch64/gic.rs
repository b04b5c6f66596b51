//! GICv2 / GICv3 driver for QEMU `virt`.
//!
//! Version detection reads GICD_PIDR2 at runtime; v2 uses the memory-mapped
//! CPU interface while v3 goes through the ICC_* system registers and the
//! per-CPU redistributor. Dispatch issues EOI *before* invoking the handler:
//! the timer handler may context-switch, and holding the interrupt in
//! service across a switch invites recursive delivery once the next task
//! unmasks IRQs.

use super::memmap::{GICC_BASE, GICD_BASE, GICR_BASE, GICR_STRIDE};
use crate::IrqSafeLock;
use bitflags::bitflags;
use core::sync::atomic::{AtomicPtr, Ordering};

// Distributor registers (shared between v2 and v3)
const GICD_CTLR: usize = 0x000;
const GICD_TYPER: usize = 0x004;
const GICD_ISENABLER: usize = 0x100;
const GICD_ICENABLER: usize = 0x180;
const GICD_ICPENDR: usize = 0x280;
const GICD_IPRIORITYR: usize = 0x400;
const GICD_ITARGETSR: usize = 0x800; // GICv2 only
const GICD_ICFGR: usize = 0xC00;
const GICD_PIDR2_V2: usize = 0x0FE8;
const GICD_PIDR2_V3: usize = 0xFFE8;

// GICv2 CPU interface registers (memory-mapped)
const GICC_CTLR: usize = 0x000;
const GICC_PMR: usize = 0x004;
const GICC_IAR: usize = 0x00C;
const GICC_EOIR: usize = 0x010;

// GICv3 redistributor registers
const GICR_WAKER: usize = 0x0014;
// SGI frame is the second 64 KiB of each redistributor
const GICR_SGI_BASE: usize = 0x10000;
const GICR_IGROUPR0: usize = 0x0080;
const GICR_ISENABLER0: usize = 0x0100;
const GICR_ICENABLER0: usize = 0x0180;
const GICR_IPRIORITYR: usize = 0x0400;

const GICR_WAKER_PROCESSOR_SLEEP: u32 = 1 << 1;
const GICR_WAKER_CHILDREN_ASLEEP: u32 = 1 << 2;

bitflags! {
    /// GICD_CTLR register flags.
    pub struct GicdCtlrFlags: u32 {
        /// Register Write Pending (GICv3).
        const RWP = 1 << 31;
        /// Affinity Routing Enable (Secure).
        const ARE_S = 1 << 4;
        /// Affinity Routing Enable (Non-secure).
        const ARE_NS = 1 << 5;
        /// Enable Group 1 Non-secure interrupts.
        const ENABLE_GRP1_NS = 1 << 1;
        /// Enable Group 0 interrupts.
        const ENABLE_GRP0 = 1 << 0;
    }
}

/// Highest interrupt ID the driver manages.
pub const GIC_MAX_IRQ: u32 = 256;
/// First shared peripheral interrupt.
pub const GIC_SPI_START: u32 = 32;
/// IDs at or above this value are spurious acknowledgements.
pub const SPURIOUS_IRQ: u32 = 1020;

/// An IRQ handler runs in interrupt context and must stay bounded.
pub type IrqHandler = fn();

static HANDLERS: IrqSafeLock<[Option<IrqHandler>; GIC_MAX_IRQ as usize]> =
    IrqSafeLock::new([None; GIC_MAX_IRQ as usize]);

// ============================================================================
// GICv3 system register access (ICC_*_EL1)
// ============================================================================

#[cfg(target_arch = "aarch64")]
mod sysreg {
    /// ICC_* registers are not modeled by aarch64-cpu; raw encodings stay.
    #[inline]
    pub fn icc_sre_el1_read() -> u64 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {}, S3_0_C12_C12_5", out(reg) val) };
        val
    }

    #[inline]
    pub fn icc_sre_el1_write(val: u64) {
        unsafe { core::arch::asm!("msr S3_0_C12_C12_5, {}", in(reg) val) };
    }

    #[inline]
    pub fn icc_iar1_el1_read() -> u32 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {}, S3_0_C12_C12_0", out(reg) val) };
        val as u32
    }

    #[inline]
    pub fn icc_eoir1_el1_write(val: u32) {
        unsafe { core::arch::asm!("msr S3_0_C12_C12_1, {}", in(reg) val as u64) };
    }

    #[inline]
    pub fn icc_pmr_el1_write(val: u32) {
        unsafe { core::arch::asm!("msr S3_0_C4_C6_0, {}", in(reg) val as u64) };
    }

    #[inline]
    pub fn icc_igrpen1_el1_write(val: u32) {
        unsafe { core::arch::asm!("msr S3_0_C12_C12_7, {}", in(reg) val as u64) };
    }

    #[inline]
    pub fn isb() {
        aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);
    }
}

#[cfg(not(target_arch = "aarch64"))]
mod sysreg {
    // Host-test stubs.
    pub fn icc_sre_el1_read() -> u64 {
        0
    }
    pub fn icc_sre_el1_write(_val: u64) {}
    pub fn icc_iar1_el1_read() -> u32 {
        1023
    }
    pub fn icc_eoir1_el1_write(_val: u32) {}
    pub fn icc_pmr_el1_write(_val: u32) {}
    pub fn icc_igrpen1_el1_write(_val: u32) {}
    pub fn isb() {}
}

#[cfg(target_arch = "aarch64")]
mod mmio {
    use aarch64_cpu::asm::barrier;
    use core::ptr::{read_volatile, write_volatile};

    #[inline]
    pub unsafe fn write32(addr: usize, value: u32) {
        unsafe { write_volatile(addr as *mut u32, value) };
        barrier::dmb(barrier::SY);
    }

    #[inline]
    pub unsafe fn read32(addr: usize) -> u32 {
        let val = unsafe { read_volatile(addr as *const u32) };
        barrier::dmb(barrier::SY);
        val
    }

    #[inline]
    pub unsafe fn write8(addr: usize, value: u8) {
        unsafe { write_volatile(addr as *mut u8, value) };
        barrier::dmb(barrier::SY);
    }
}

#[cfg(not(target_arch = "aarch64"))]
mod mmio {
    // Host-test stubs: no device memory to touch.
    pub unsafe fn write32(_addr: usize, _value: u32) {}
    pub unsafe fn read32(_addr: usize) -> u32 {
        0
    }
    pub unsafe fn write8(_addr: usize, _value: u8) {}
}

/// GIC version detected at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GicVersion {
    V2,
    V3,
}

pub struct Gic {
    dist_base: usize,
    cpu_base: usize,    // GICv2 only (GICC)
    redist_base: usize, // GICv3 only (GICR)
    version: GicVersion,
}

// Single-core bring-up: one CPU programs and services the GIC.
unsafe impl Sync for Gic {}

/// Read GICD_PIDR2 and classify the controller. The ID register block sits in
/// the last 4 KiB of the distributor frame, whose size differs by version, so
/// both candidate offsets are probed.
fn detect_gic_version(dist_base: usize) -> GicVersion {
    let pidr2_v2 = unsafe { mmio::read32(dist_base + GICD_PIDR2_V2) };
    if (pidr2_v2 >> 4) & 0xF == 2 {
        return GicVersion::V2;
    }

    let pidr2_v3 = unsafe { mmio::read32(dist_base + GICD_PIDR2_V3) };
    if (pidr2_v3 >> 4) & 0xF >= 3 {
        GicVersion::V3
    } else {
        GicVersion::V2
    }
}

/// GICv2 instance.
pub static API: Gic = Gic::new_v2(GICD_BASE, GICC_BASE);

/// GICv3 instance with redistributor support.
pub static API_V3: Gic = Gic::new_v3(GICD_BASE, GICR_BASE);

static ACTIVE_GIC_PTR: AtomicPtr<Gic> = AtomicPtr::new(&raw const API as *mut Gic);

/// Detect the controller version, select the matching instance, program it
/// into a known state, and return it. Called once during boot.
pub fn init() -> &'static Gic {
    let api = match detect_gic_version(GICD_BASE) {
        GicVersion::V3 => &API_V3,
        GicVersion::V2 => &API,
    };
    ACTIVE_GIC_PTR.store(core::ptr::from_ref(api) as *mut Gic, Ordering::Release);
    api.init();
    log::info!("[gic] GIC{:?} initialized", api.version());
    api
}

/// The instance selected by [`init`].
pub fn active_api() -> &'static Gic {
    unsafe { &*ACTIVE_GIC_PTR.load(Ordering::Acquire) }
}

/// Install a handler for `irq`. Later registrations replace earlier ones.
pub fn register_handler(irq: u32, handler: IrqHandler) {
    if irq >= GIC_MAX_IRQ {
        log::warn!("[gic] register_handler: IRQ {} out of range", irq);
        return;
    }
    HANDLERS.lock()[irq as usize] = Some(handler);
}

/// Acknowledge and dispatch one pending interrupt.
///
/// EOI is issued before the handler runs so that a handler which context
/// switches does not leave the interrupt in service (see module docs).
pub fn handle_irq() {
    let gic = active_api();
    let irq = gic.acknowledge();

    if Gic::is_spurious(irq) {
        return;
    }

    gic.end_interrupt(irq);

    let handler = if irq < GIC_MAX_IRQ {
        HANDLERS.lock()[irq as usize]
    } else {
        None
    };

    match handler {
        Some(f) => f(),
        None => log::warn!("[gic] Unhandled IRQ {}", irq),
    }
}

pub fn enable_irq(irq: u32) {
    active_api().enable_irq(irq);
}

pub fn disable_irq(irq: u32) {
    active_api().disable_irq(irq);
}

pub fn set_priority(irq: u32, prio: u8) {
    active_api().set_priority(irq, prio);
}

impl Gic {
    pub const fn new_v2(dist_base: usize, cpu_base: usize) -> Self {
        Self {
            dist_base,
            cpu_base,
            redist_base: 0,
            version: GicVersion::V2,
        }
    }

    pub const fn new_v3(dist_base: usize, redist_base: usize) -> Self {
        Self {
            dist_base,
            cpu_base: 0,
            redist_base,
            version: GicVersion::V3,
        }
    }

    pub fn version(&self) -> GicVersion {
        self.version
    }

    pub fn init(&self) {
        match self.version {
            GicVersion::V2 => self.init_v2(),
            GicVersion::V3 => self.init_v3(),
        }
    }

    fn read_num_irqs(&self) -> u32 {
        let typer = unsafe { mmio::read32(self.dist_base + GICD_TYPER) };
        let num = ((typer & 0x1F) + 1) * 32;
        num.min(GIC_MAX_IRQ)
    }

    /// GICv2: quiesce the distributor, route every SPI to CPU 0 as
    /// level-triggered at default priority, then enable distribution and the
    /// memory-mapped CPU interface.
    fn init_v2(&self) {
        unsafe {
            mmio::write32(self.dist_base + GICD_CTLR, 0);

            let num_irqs = self.read_num_irqs();

            // Disable and clear all pending interrupts
            for i in 0..(num_irqs / 32) as usize {
                mmio::write32(self.dist_base + GICD_ICENABLER + i * 4, 0xFFFF_FFFF);
                mmio::write32(self.dist_base + GICD_ICPENDR + i * 4, 0xFFFF_FFFF);
            }

            // Default priority
            for i in 0..(num_irqs / 4) as usize {
                mmio::write32(self.dist_base + GICD_IPRIORITYR + i * 4, 0xA0A0_A0A0);
            }

            // Target SPIs to CPU0
            for i in (GIC_SPI_START / 4) as usize..(num_irqs / 4) as usize {
                mmio::write32(self.dist_base + GICD_ITARGETSR + i * 4, 0x0101_0101);
            }

            // SPIs level-triggered
            for i in (GIC_SPI_START / 16) as usize..(num_irqs / 16) as usize {
                mmio::write32(self.dist_base + GICD_ICFGR + i * 4, 0);
            }

            mmio::write32(
                self.dist_base + GICD_CTLR,
                (GicdCtlrFlags::ENABLE_GRP0 | GicdCtlrFlags::ENABLE_GRP1_NS).bits(),
            );

            // CPU interface: accept all priorities, enable
            mmio::write32(self.cpu_base + GICC_PMR, 0xFF);
            mmio::write32(self.cpu_base + GICC_CTLR, 1);
        }
    }

    /// GICv3: enable the system-register interface, quiesce the distributor
    /// with RWP waits, wake the redistributor, then enable group-1 NS with
    /// affinity routing.
    fn init_v3(&self) {
        unsafe {
            let sre = sysreg::icc_sre_el1_read();
            sysreg::icc_sre_el1_write(sre | 0x1);
            sysreg::isb();

            mmio::write32(self.dist_base + GICD_CTLR, 0);
            self.wait_rwp();

            let num_irqs = self.read_num_irqs();

            // SPIs only; SGI/PPI state lives in the redistributor
            for i in 1..(num_irqs / 32) as usize {
                mmio::write32(self.dist_base + GICD_ICENABLER + i * 4, 0xFFFF_FFFF);
                mmio::write32(self.dist_base + GICD_ICPENDR + i * 4, 0xFFFF_FFFF);
            }
            for i in (GIC_SPI_START / 4) as usize..(num_irqs / 4) as usize {
                mmio::write32(self.dist_base + GICD_IPRIORITYR + i * 4, 0xA0A0_A0A0);
            }
            for i in (GIC_SPI_START / 16) as usize..(num_irqs / 16) as usize {
                mmio::write32(self.dist_base + GICD_ICFGR + i * 4, 0);
            }

            self.init_redistributor();

            mmio::write32(
                self.dist_base + GICD_CTLR,
                (GicdCtlrFlags::ARE_NS
                    | GicdCtlrFlags::ENABLE_GRP1_NS
                    | GicdCtlrFlags::ENABLE_GRP0)
                    .bits(),
            );
            self.wait_rwp();

            sysreg::icc_pmr_el1_write(0xFF);
            sysreg::icc_igrpen1_el1_write(1);
            sysreg::isb();
        }
    }

    fn wait_rwp(&self) {
        let mut spins = 0u32;
        while unsafe { mmio::read32(self.dist_base + GICD_CTLR) } & GicdCtlrFlags::RWP.bits() != 0 {
            spins += 1;
            if spins > 1_000_000 {
                log::warn!("[gic] RWP did not clear, continuing");
                return;
            }
        }
    }

    /// Wake the CPU 0 redistributor and put its SGIs/PPIs into a known
    /// state. A wake timeout is logged and tolerated (best effort).
    fn init_redistributor(&self) {
        unsafe {
            let redist = self.redist_base;

            let waker = mmio::read32(redist + GICR_WAKER);
            mmio::write32(redist + GICR_WAKER, waker & !GICR_WAKER_PROCESSOR_SLEEP);

            let mut spins = 0u32;
            while mmio::read32(redist + GICR_WAKER) & GICR_WAKER_CHILDREN_ASLEEP != 0 {
                spins += 1;
                if spins > 1_000_000 {
                    log::warn!("[gic] redistributor wake timed out, continuing");
                    break;
                }
            }

            let sgi_base = redist + GICR_SGI_BASE;

            // All SGIs/PPIs to group 1, default priority, disabled
            mmio::write32(sgi_base + GICR_IGROUPR0, 0xFFFF_FFFF);
            for i in 0..8 {
                mmio::write32(sgi_base + GICR_IPRIORITYR + i * 4, 0xA0A0_A0A0);
            }
            mmio::write32(sgi_base + GICR_ICENABLER0, 0xFFFF_FFFF);
        }
    }

    /// Read IAR; IDs >= 1020 are spurious and must be skipped without EOI.
    pub fn acknowledge(&self) -> u32 {
        match self.version {
            GicVersion::V2 => unsafe { mmio::read32(self.cpu_base + GICC_IAR) & 0x3FF },
            GicVersion::V3 => sysreg::icc_iar1_el1_read() & 0x3FF,
        }
    }

    #[inline]
    pub fn is_spurious(irq: u32) -> bool {
        irq >= SPURIOUS_IRQ
    }

    pub fn end_interrupt(&self, irq: u32) {
        match self.version {
            GicVersion::V2 => unsafe { mmio::write32(self.cpu_base + GICC_EOIR, irq) },
            GicVersion::V3 => sysreg::icc_eoir1_el1_write(irq),
        }
    }

    pub fn enable_irq(&self, irq: u32) {
        if irq >= GIC_MAX_IRQ {
            return;
        }
        let reg = (irq / 32) as usize;
        let bit = irq % 32;
        unsafe {
            if self.version == GicVersion::V3 && irq < GIC_SPI_START {
                mmio::write32(
                    self.redist_base + GICR_SGI_BASE + GICR_ISENABLER0,
                    1 << bit,
                );
            } else {
                mmio::write32(self.dist_base + GICD_ISENABLER + reg * 4, 1 << bit);
            }
        }
    }

    pub fn disable_irq(&self, irq: u32) {
        if irq >= GIC_MAX_IRQ {
            return;
        }
        let reg = (irq / 32) as usize;
        let bit = irq % 32;
        unsafe {
            if self.version == GicVersion::V3 && irq < GIC_SPI_START {
                mmio::write32(
                    self.redist_base + GICR_SGI_BASE + GICR_ICENABLER0,
                    1 << bit,
                );
            } else {
                mmio::write32(self.dist_base + GICD_ICENABLER + reg * 4, 1 << bit);
            }
        }
    }

    /// Per-IRQ priority; the priority registers are byte-indexed.
    pub fn set_priority(&self, irq: u32, prio: u8) {
        if irq >= GIC_MAX_IRQ {
            return;
        }
        unsafe {
            if self.version == GicVersion::V3 && irq < GIC_SPI_START {
                mmio::write8(
                    self.redist_base + GICR_SGI_BASE + GICR_IPRIORITYR + irq as usize,
                    prio,
                );
            } else {
                mmio::write8(self.dist_base + GICD_IPRIORITYR + irq as usize, prio);
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn spurious_check() {
        assert!(Gic::is_spurious(1023));
        assert!(Gic::is_spurious(1022));
        assert!(Gic::is_spurious(1021));
        assert!(Gic::is_spurious(1020));
        assert!(!Gic::is_spurious(30));
        assert!(!Gic::is_spurious(33));
    }

    #[test]
    fn handler_registration_and_lookup() {
        static FIRED: AtomicU32 = AtomicU32::new(0);

        fn test_handler() {
            FIRED.fetch_add(1, Ordering::SeqCst);
        }

        register_handler(33, test_handler);
        let h = HANDLERS.lock()[33].unwrap();
        h();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);

        // Out-of-range registration is refused rather than corrupting memory.
        register_handler(GIC_MAX_IRQ + 5, test_handler);
        assert!(HANDLERS.lock().iter().filter(|h| h.is_some()).count() >= 1);
    }

    #[test]
    fn version_constructors() {
        let v2 = Gic::new_v2(0x0800_0000, 0x0801_0000);
        assert_eq!(v2.version(), GicVersion::V2);
        let v3 = Gic::new_v3(0x0800_0000, 0x080A_0000);
        assert_eq!(v3.version(), GicVersion::V3);
    }
}
