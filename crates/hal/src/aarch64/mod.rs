//! AArch64 / QEMU `virt` specifics: PL011 serial, GIC, architected timer.

pub mod gic;
pub mod serial;
pub mod timer;

/// QEMU `virt` MMIO layout used by this HAL (identity-mapped).
pub mod memmap {
    /// GIC distributor (v2 and v3).
    pub const GICD_BASE: usize = 0x0800_0000;
    /// GICv2 CPU interface.
    pub const GICC_BASE: usize = 0x0801_0000;
    /// GICv3 redistributor region; one frame per CPU.
    pub const GICR_BASE: usize = 0x080A_0000;
    /// Redistributor stride per CPU (RD frame + SGI frame).
    pub const GICR_STRIDE: usize = 0x0002_0000;
    /// PL011 UART.
    pub const UART0_BASE: usize = 0x0900_0000;
}
