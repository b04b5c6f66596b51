//! Capability syscalls (0x70 range).

use super::{SyscallResult, copy_to_user};
use crate::proc;
use viper_abi::{CapRights, VError};

pub fn sys_derive(handle: u32, rights: u32) -> SyscallResult {
    let Some(rights) = CapRights::from_bits(rights) else {
        return VError::InvalidArg.into();
    };
    let process = proc::current();
    let mut caps = process.caps.lock();
    match caps.derive(handle, rights) {
        Ok(h) => SyscallResult::ok1(h as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_revoke(handle: u32) -> SyscallResult {
    let process = proc::current();
    match process.caps.lock().revoke(handle) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_query(handle: u32) -> SyscallResult {
    let process = proc::current();
    match process.caps.lock().query(handle) {
        Ok(info) => SyscallResult::ok3(
            info.kind as u64,
            info.rights.bits() as u64,
            info.generation as u64,
        ),
        Err(e) => e.into(),
    }
}

pub fn sys_list(buf_ptr: u64, max_count: u32) -> SyscallResult {
    let max = (max_count as usize).min(crate::cap::MAX_CAPS);
    let mut handles = alloc::vec![0u32; max];
    let process = proc::current();
    let n = process.caps.lock().list(&mut handles);

    let bytes = unsafe { core::slice::from_raw_parts(handles.as_ptr() as *const u8, n * 4) };
    match copy_to_user(buf_ptr, bytes) {
        Ok(()) => SyscallResult::ok1(n as u64),
        Err(e) => e.into(),
    }
}
