//! Hardware abstraction layer for the QEMU `virt` AArch64 platform.
//!
//! The root module holds generic pieces (interrupt-safe locking, the console
//! facade); everything that touches system registers or MMIO lives under
//! `aarch64/` and is stubbed out on other architectures so the logic above it
//! can run in host tests.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod console;
pub mod interrupts;

pub mod aarch64;

pub use aarch64::{gic, serial, timer};

use core::mem::ManuallyDrop;
use viper_utils::{Mutex, MutexGuard};

/// IRQ-safe lock that disables interrupts while held.
///
/// Every structure that is touched from both task context and IRQ context
/// (scheduler queues, timer wheel, channel table) must be guarded by one of
/// these; a plain spinlock deadlocks the moment an IRQ handler spins on a
/// lock its interrupted task already holds.
pub struct IrqSafeLock<T> {
    inner: Mutex<T>,
}

impl<T> IrqSafeLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    /// Disable IRQs, then acquire. The saved mask state is restored when the
    /// guard drops.
    pub fn lock(&self) -> IrqSafeLockGuard<'_, T> {
        let state = interrupts::disable();
        let guard = self.inner.lock();
        IrqSafeLockGuard {
            guard: ManuallyDrop::new(guard),
            state,
        }
    }

    /// Non-blocking acquire; restores the IRQ mask immediately on failure.
    pub fn try_lock(&self) -> Option<IrqSafeLockGuard<'_, T>> {
        let state = interrupts::disable();
        if let Some(guard) = self.inner.try_lock() {
            Some(IrqSafeLockGuard {
                guard: ManuallyDrop::new(guard),
                state,
            })
        } else {
            interrupts::restore(state);
            None
        }
    }
}

pub struct IrqSafeLockGuard<'a, T> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    state: u64,
}

impl<T> core::ops::Deref for IrqSafeLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> core::ops::DerefMut for IrqSafeLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IrqSafeLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release the spinlock before re-enabling interrupts.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        interrupts::restore(self.state);
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn irq_safe_lock_guards_data() {
        let lock = IrqSafeLock::new(7);
        {
            let mut g = lock.lock();
            *g += 1;
        }
        assert_eq!(*lock.lock(), 8);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = IrqSafeLock::new(());
        let g = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(g);
        assert!(lock.try_lock().is_some());
    }
}
