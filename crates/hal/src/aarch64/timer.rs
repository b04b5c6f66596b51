//! Architected timer (EL1 physical timer) register access.
//!
//! The kernel's tick module programs `CNTP_CVAL_EL0` for periodic 1 kHz
//! interrupts; this module only wraps the registers behind a mockable trait.

use bitflags::bitflags;

/// Private peripheral interrupt of the EL1 physical timer on QEMU `virt`.
pub const TIMER_PPI: u32 = 30;

bitflags! {
    /// CNTP_CTL_EL0 bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerCtrlFlags: u64 {
        /// Timer enabled.
        const ENABLE = 1 << 0;
        /// Timer interrupt masked.
        const IMASK = 1 << 1;
        /// Timer condition met (read-only).
        const ISTATUS = 1 << 2;
    }
}

/// Architected-timer register interface; mocked in host tests.
pub trait Timer {
    /// Current system counter (`CNTPCT_EL0`).
    fn read_counter(&self) -> u64;

    /// Counter frequency in Hz (`CNTFRQ_EL0`).
    fn read_frequency(&self) -> u64;

    /// Program the absolute compare value (`CNTP_CVAL_EL0`).
    fn set_compare(&self, value: u64);

    /// Write the control register (`CNTP_CTL_EL0`).
    fn configure(&self, flags: TimerCtrlFlags);

    fn enable(&self) {
        self.configure(TimerCtrlFlags::ENABLE);
    }

    fn disable(&self) {
        self.configure(TimerCtrlFlags::IMASK);
    }
}

/// The EL1 physical timer.
pub struct PhysTimer;

#[cfg(target_arch = "aarch64")]
impl Timer for PhysTimer {
    fn read_counter(&self) -> u64 {
        use aarch64_cpu::registers::{CNTPCT_EL0, Readable};
        CNTPCT_EL0.get()
    }

    fn read_frequency(&self) -> u64 {
        use aarch64_cpu::registers::{CNTFRQ_EL0, Readable};
        CNTFRQ_EL0.get()
    }

    fn set_compare(&self, value: u64) {
        use aarch64_cpu::registers::{CNTP_CVAL_EL0, Writeable};
        CNTP_CVAL_EL0.set(value);
    }

    fn configure(&self, flags: TimerCtrlFlags) {
        use aarch64_cpu::registers::{CNTP_CTL_EL0, Writeable};
        CNTP_CTL_EL0.set(flags.bits());
    }
}

#[cfg(not(target_arch = "aarch64"))]
impl Timer for PhysTimer {
    fn read_counter(&self) -> u64 {
        0
    }
    fn read_frequency(&self) -> u64 {
        1 // avoid division by zero in host tests
    }
    fn set_compare(&self, _value: u64) {}
    fn configure(&self, _flags: TimerCtrlFlags) {}
}

/// Global instance of the EL1 physical timer.
pub static API: PhysTimer = PhysTimer;

/// Low-power wait for the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "aarch64")]
    aarch64_cpu::asm::wfi();
    #[cfg(not(target_arch = "aarch64"))]
    core::hint::spin_loop();
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct MockTimer {
        counter: Cell<u64>,
        frequency: u64,
        compare: Cell<u64>,
    }

    impl Timer for MockTimer {
        fn read_counter(&self) -> u64 {
            self.counter.get()
        }
        fn read_frequency(&self) -> u64 {
            self.frequency
        }
        fn set_compare(&self, value: u64) {
            self.compare.set(value);
        }
        fn configure(&self, _flags: TimerCtrlFlags) {}
    }

    #[test]
    fn one_khz_interval_from_frequency() {
        let t = MockTimer {
            counter: Cell::new(1_000_000),
            frequency: 62_500_000, // QEMU virt default
            compare: Cell::new(0),
        };
        let interval = t.read_frequency() / 1000;
        assert_eq!(interval, 62_500);
        t.set_compare(t.read_counter() + interval);
        assert_eq!(t.compare.get(), 1_062_500);
    }

    #[test]
    fn ctrl_flags_layout() {
        assert_eq!(TimerCtrlFlags::ENABLE.bits(), 1);
        assert_eq!(TimerCtrlFlags::IMASK.bits(), 2);
        assert_eq!(TimerCtrlFlags::ISTATUS.bits(), 4);
    }
}
