//! Shared user/kernel ABI for ViperOS.
//!
//! This crate is the single source of truth for the syscall contract: numeric
//! syscall identifiers, the `VError` result code, and the fixed-layout
//! structures exchanged across the EL0/EL1 boundary. Both the kernel
//! dispatcher and user-space wrappers depend on it so they cannot drift.
//!
//! Calling convention (AArch64):
//! - `svc #0` with the syscall number in `x8` and up to six arguments in
//!   `x0..x5`.
//! - On return `x0` holds a `VError` code (0 on success, negative on error)
//!   and `x1..x3` hold result values when the call produces them.

#![cfg_attr(not(feature = "std"), no_std)]

mod error;
mod sysno;
mod types;

pub use error::{VError, VResult};
pub use sysno::SyscallNumber;
pub use types::*;
