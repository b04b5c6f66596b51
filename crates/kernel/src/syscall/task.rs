//! Task-management syscalls (0x00 range).

use super::{SyscallResult, copy_to_user};
use crate::proc;
use crate::sched::task;
use alloc::vec::Vec;
use viper_abi::{TaskFlags, TaskInfo, VError};

pub fn sys_yield() -> SyscallResult {
    task::yield_now();
    SyscallResult::ok()
}

pub fn sys_exit(code: i32) -> SyscallResult {
    task::exit(code);
}

pub fn sys_current() -> SyscallResult {
    SyscallResult::ok1(task::current().id as u64)
}

/// Spawning a user program needs the loader, which lives outside the core;
/// the number is reserved and the dispatcher keeps its slot.
pub fn sys_spawn(_path_ptr: u64, _arg_ptr: u64) -> SyscallResult {
    SyscallResult::err(VError::NotSupported)
}

pub fn sys_join(pid: u32) -> SyscallResult {
    match task::join(pid) {
        Ok(code) => SyscallResult::ok1(code as u32 as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_list(buf_ptr: u64, max_count: u32) -> SyscallResult {
    if buf_ptr == 0 || max_count == 0 {
        return VError::InvalidArg.into();
    }
    let max = (max_count as usize).min(task::MAX_TASKS);
    let mut infos: Vec<TaskInfo> = alloc::vec![TaskInfo::default(); max];
    let n = task::list_tasks(&mut infos);

    let bytes = unsafe {
        core::slice::from_raw_parts(infos.as_ptr() as *const u8, n * size_of::<TaskInfo>())
    };
    match copy_to_user(buf_ptr, bytes) {
        Ok(()) => SyscallResult::ok1(n as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_set_priority(pid: u32, priority: u64) -> SyscallResult {
    if priority > 255 {
        return VError::InvalidArg.into();
    }
    let Some(t) = task::get_by_id(pid) else {
        return VError::NotFound.into();
    };
    if t.flags.contains(TaskFlags::IDLE) {
        return VError::Denied.into();
    }
    t.set_priority(priority as u8);
    SyscallResult::ok()
}

pub fn sys_get_priority(pid: u32) -> SyscallResult {
    match task::get_by_id(pid) {
        Some(t) => SyscallResult::ok1(t.priority() as u64),
        None => VError::NotFound.into(),
    }
}

pub fn sys_wait() -> SyscallResult {
    match task::wait_any() {
        Ok((id, code)) => SyscallResult::ok2(id as u64, code as u32 as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_sbrk(increment: i64) -> SyscallResult {
    match proc::current().sbrk(increment) {
        Ok(old) => SyscallResult::ok1(old),
        Err(e) => e.into(),
    }
}
