//! Architecture support. Only AArch64 is implemented; the modules compile on
//! other architectures with stubbed register access so the kernel's logic can
//! run under host tests.

pub mod aarch64;

pub use aarch64::{context, exceptions, usermode};
