//! Time syscalls (0x30 range).

use super::SyscallResult;
use crate::ipc::poll;
use crate::time::tick;

pub fn sys_time_now() -> SyscallResult {
    SyscallResult::ok1(tick::get_ticks())
}

pub fn sys_sleep(ms: u64) -> SyscallResult {
    match poll::sleep_ms(ms) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_timer_create(timeout_ms: u64) -> SyscallResult {
    match poll::timer_create(timeout_ms) {
        Ok(id) => SyscallResult::ok1(id as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_timer_cancel(timer_id: u32) -> SyscallResult {
    match poll::timer_cancel(timer_id) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}
