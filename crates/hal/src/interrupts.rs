//! EL1 interrupt masking via DAIF.

#[cfg(target_arch = "aarch64")]
mod imp {
    use aarch64_cpu::registers::{DAIF, Readable, Writeable};

    /// Mask IRQs and return the previous DAIF state.
    #[inline(always)]
    pub fn disable() -> u64 {
        let state = DAIF.get();
        // SAFETY: daifset takes an immediate-only operand not modeled by aarch64-cpu.
        unsafe { core::arch::asm!("msr daifset, #2") };
        state
    }

    /// Unmask IRQs unconditionally.
    ///
    /// # Safety
    /// The caller must be at a point where taking an interrupt is valid
    /// (vector table installed, no half-initialized shared state).
    #[inline(always)]
    pub unsafe fn enable() {
        // SAFETY: daifclr is the immediate-only companion of daifset.
        unsafe { core::arch::asm!("msr daifclr, #2") };
    }

    /// Restore a DAIF state captured by [`disable`].
    #[inline(always)]
    pub fn restore(state: u64) {
        DAIF.set(state);
    }

    /// True when IRQs are currently unmasked.
    #[inline(always)]
    pub fn is_enabled() -> bool {
        // The I bit is bit 7; clear means deliverable.
        (DAIF.get() & (1 << 7)) == 0
    }
}

#[cfg(not(target_arch = "aarch64"))]
mod imp {
    // Host-test stubs: interrupts are never delivered, masking is a no-op.
    pub fn disable() -> u64 {
        0
    }
    pub unsafe fn enable() {}
    pub fn restore(_state: u64) {}
    pub fn is_enabled() -> bool {
        false
    }
}

pub use imp::{disable, enable, is_enabled, restore};
