//! ViperOS kernel core for the QEMU `virt` AArch64 machine.
//!
//! The crate is a library so the hardware-independent logic (scheduling
//! queues, timer wheel, VFS, capability tables, fault classification) runs
//! under host tests with `--features std`; the `viper-kernel` binary wraps
//! it with the boot path for the real machine.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod arch;
pub mod assign;
pub mod cap;
pub mod config;
pub mod fs;
pub mod ipc;
pub mod logger;
pub mod mm;
pub mod proc;
pub mod sched;
pub mod syscall;
pub mod time;
