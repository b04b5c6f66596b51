//! Syscall ranges owned by out-of-core services.
//!
//! Sockets/DNS, TLS, device management, and the GUI keep their ABI numbers
//! and dispatch entries here, but the core ships no provider; every call
//! reports `NotSupported` until the owning service registers one.

use super::SyscallResult;
use viper_abi::{SyscallNumber, VError};

pub fn sys_net(number: SyscallNumber, _args: &[u64; 6]) -> SyscallResult {
    log::debug!("[syscall] network service not present for {:?}", number);
    SyscallResult::err(VError::NotSupported)
}

pub fn sys_tls(number: SyscallNumber, _args: &[u64; 6]) -> SyscallResult {
    log::debug!("[syscall] TLS service not present for {:?}", number);
    SyscallResult::err(VError::NotSupported)
}

pub fn sys_info(number: SyscallNumber, _args: &[u64; 6]) -> SyscallResult {
    log::debug!("[syscall] no provider for {:?}", number);
    SyscallResult::err(VError::NotSupported)
}

pub fn sys_device(number: SyscallNumber, _args: &[u64; 6]) -> SyscallResult {
    log::debug!("[syscall] device service not present for {:?}", number);
    SyscallResult::err(VError::NotSupported)
}

pub fn sys_gui(number: SyscallNumber, _args: &[u64; 6]) -> SyscallResult {
    log::debug!("[syscall] display service not present for {:?}", number);
    SyscallResult::err(VError::NotSupported)
}
