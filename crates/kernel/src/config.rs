//! Kernel-wide platform constants for QEMU `virt`.
//!
//! Everything here is a fixed physical layout decision; subsystem-local
//! tunables stay in their own modules.

/// Fixed translation granule.
pub const PAGE_SIZE: usize = 4096;

/// Start of RAM on the QEMU `virt` machine.
pub const RAM_BASE: u64 = 0x4000_0000;

/// RAM size the kernel manages (matches the default `-m 128M` invocation).
pub const RAM_SIZE: u64 = 128 * 1024 * 1024;

/// Kernel image load address (linker script origin).
pub const KERNEL_BASE: u64 = RAM_BASE;

/// Framebuffer reservation immediately after the kernel image region.
pub const FRAMEBUFFER_BASE: u64 = RAM_BASE + 16 * 1024 * 1024;
pub const FRAMEBUFFER_SIZE: u64 = 16 * 1024 * 1024;

/// Kernel heap region (backs `alloc`).
pub const HEAP_BASE: u64 = 0x4200_0000;
pub const HEAP_SIZE: usize = 16 * 1024 * 1024;

/// Kernel stack pool: one guard page + 16 KiB usable per task slot.
pub const STACK_POOL_BASE: u64 = 0x4400_0000;

/// First physical address handed to the page allocator.
pub const PMM_POOL_BASE: u64 = 0x4600_0000;

/// Milliseconds per scheduler tick (the architected timer runs at 1 kHz).
pub const TICK_HZ: u64 = 1000;
