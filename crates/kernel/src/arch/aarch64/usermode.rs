//! The EL1 → EL0 transition.

#[cfg(target_arch = "aarch64")]
unsafe extern "C" {
    /// Program SP_EL0/ELR_EL1/SPSR_EL1, clear the register file, and `eret`
    /// into EL0t with interrupts enabled. Never returns (see `vectors.S`).
    pub fn enter_user_mode(entry: u64, stack: u64, arg: u64) -> !;
}

#[cfg(not(target_arch = "aarch64"))]
pub unsafe fn enter_user_mode(_entry: u64, _stack: u64, _arg: u64) -> ! {
    unreachable!("enter_user_mode is only meaningful on the target")
}
