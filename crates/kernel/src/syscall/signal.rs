//! Signal syscalls (0x90 range).

use super::SyscallResult;
use crate::arch::exceptions::ExceptionFrame;
use crate::sched::task;
use viper_abi::VError;

pub fn sys_sigaction(sig: u64, handler: u64, flags: u32, mask: u32) -> SyscallResult {
    let t = task::current();
    let mut signals = t.signals.lock();
    match signals.set_action(sig as usize, handler, flags, mask) {
        Ok(old) => SyscallResult::ok1(old),
        Err(e) => e.into(),
    }
}

pub fn sys_sigprocmask(how: u32, mask: u32) -> SyscallResult {
    let t = task::current();
    let mut signals = t.signals.lock();
    match signals.set_mask(how, mask) {
        Ok(old) => SyscallResult::ok1(old as u64),
        Err(e) => e.into(),
    }
}

/// Replace the frame with the one saved at signal delivery. Returns false
/// when no delivery is in progress; the dispatcher then reports
/// `InvalidArg` through `x0`.
pub fn sys_sigreturn(frame: &mut ExceptionFrame) -> bool {
    let Some(t) = task::try_current() else {
        return false;
    };
    t.signals.lock().restore_frame(frame)
}

pub fn sys_kill(pid: u32, sig: i32) -> SyscallResult {
    if sig <= 0 || sig >= viper_abi::signal::NSIG as i32 {
        return VError::InvalidArg.into();
    }
    match task::kill(pid, sig) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_sigpending() -> SyscallResult {
    let t = task::current();
    let pending = t.signals.lock().pending;
    SyscallResult::ok1(pending as u64)
}
