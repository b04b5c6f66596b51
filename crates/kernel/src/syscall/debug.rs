//! Debug / console syscalls (0xF0 range).

use super::SyscallResult;
use crate::time::tick;
use viper_abi::VError;
use viper_hal::print;

/// Cap on a single debug print.
const MAX_DEBUG_PRINT: u64 = 1024;

pub fn sys_debug_print(str_ptr: u64) -> SyscallResult {
    if str_ptr == 0 {
        return VError::InvalidArg.into();
    }

    // NUL-terminated, length-capped; invalid UTF-8 prints lossily.
    let mut bytes = alloc::vec::Vec::new();
    for i in 0..MAX_DEBUG_PRINT {
        match super::copy_from_user(str_ptr + i, 1) {
            Ok(b) if b[0] == 0 => break,
            Ok(b) => bytes.push(b[0]),
            Err(e) => return e.into(),
        }
    }

    for chunk in bytes.utf8_chunks() {
        print!("{}", chunk.valid());
    }
    SyscallResult::ok1(bytes.len() as u64)
}

pub fn sys_getchar() -> SyscallResult {
    match viper_hal::console::read_byte() {
        Some(b) => SyscallResult::ok1(b as u64),
        None => VError::WouldBlock.into(),
    }
}

pub fn sys_putchar(c: u8) -> SyscallResult {
    print!("{}", c as char);
    SyscallResult::ok()
}

pub fn sys_uptime() -> SyscallResult {
    SyscallResult::ok1(tick::get_ticks())
}
