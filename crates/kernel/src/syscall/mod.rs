//! Syscall dispatch.
//!
//! ABI: number in `x8`, arguments in `x0..x5`; on return `x0` carries the
//! `VError` and `x1..x3` any results. Keeping results out of `x0` lets every
//! call site check errors the same way.
//!
//! `sigreturn` bypasses the normal result write-back: it replaces the whole
//! frame with the one saved at signal delivery, and clobbering `x0..x3`
//! afterwards would corrupt the interrupted context.

mod cap;
mod debug;
mod dir;
mod ext;
mod fd;
mod handlefs;
mod info;
mod ipc;
mod signal;
mod task;
mod time;

use crate::arch::exceptions::ExceptionFrame;
use crate::proc;
use alloc::vec::Vec;
use viper_abi::{MAX_PATH, SyscallNumber, VError};

/// Marshalled result of one syscall.
#[derive(Debug, Clone, Copy)]
pub struct SyscallResult {
    pub verr: VError,
    pub res0: u64,
    pub res1: u64,
    pub res2: u64,
}

impl SyscallResult {
    pub const fn ok() -> Self {
        Self {
            verr: VError::Ok,
            res0: 0,
            res1: 0,
            res2: 0,
        }
    }

    pub const fn ok1(res0: u64) -> Self {
        Self {
            verr: VError::Ok,
            res0,
            res1: 0,
            res2: 0,
        }
    }

    pub const fn ok2(res0: u64, res1: u64) -> Self {
        Self {
            verr: VError::Ok,
            res0,
            res1,
            res2: 0,
        }
    }

    pub const fn ok3(res0: u64, res1: u64, res2: u64) -> Self {
        Self {
            verr: VError::Ok,
            res0,
            res1,
            res2,
        }
    }

    pub const fn err(verr: VError) -> Self {
        Self {
            verr,
            res0: 0,
            res1: 0,
            res2: 0,
        }
    }
}

impl From<VError> for SyscallResult {
    fn from(verr: VError) -> Self {
        Self::err(verr)
    }
}

/// Entry from the synchronous exception handlers for `SVC`.
pub fn dispatch(frame: &mut ExceptionFrame) {
    let nr = frame.syscall_number();

    // Restores the saved frame wholesale; no result write-back.
    if nr == SyscallNumber::SigReturn as u32 {
        if !signal::sys_sigreturn(frame) {
            frame.regs[0] = VError::InvalidArg.code() as u64;
        }
        return;
    }

    let args = [
        frame.arg(0),
        frame.arg(1),
        frame.arg(2),
        frame.arg(3),
        frame.arg(4),
        frame.arg(5),
    ];

    let Some(number) = SyscallNumber::from_u32(nr) else {
        // Undefined number: only x0 is written, x1..x3 stay untouched.
        frame.regs[0] = VError::NotSupported.code() as u64;
        return;
    };

    let result = dispatch_number(number, &args);
    frame.set_syscall_result(result.verr.code(), result.res0, result.res1, result.res2);
}

fn dispatch_number(number: SyscallNumber, args: &[u64; 6]) -> SyscallResult {
    use SyscallNumber as N;
    match number {
        // Task management
        N::TaskYield => task::sys_yield(),
        N::TaskExit => task::sys_exit(args[0] as i32),
        N::TaskCurrent => task::sys_current(),
        N::TaskSpawn => task::sys_spawn(args[0], args[1]),
        N::TaskJoin => task::sys_join(args[0] as u32),
        N::TaskList => task::sys_list(args[0], args[1] as u32),
        N::TaskSetPriority => task::sys_set_priority(args[0] as u32, args[1]),
        N::TaskGetPriority => task::sys_get_priority(args[0] as u32),
        N::TaskWait => task::sys_wait(),
        N::TaskFork => SyscallResult::err(VError::NotSupported),
        N::Sbrk => task::sys_sbrk(args[0] as i64),

        // Channels
        N::ChannelCreate => ipc::sys_channel_create(),
        N::ChannelSend => ipc::sys_channel_send(args[0] as u32, args[1], args[2]),
        N::ChannelRecv => ipc::sys_channel_recv(args[0] as u32, args[1], args[2]),
        N::ChannelClose => ipc::sys_channel_close(args[0] as u32),

        // Poll
        N::PollCreate => ipc::sys_poll_create(),
        N::PollAdd => ipc::sys_poll_add(args[0] as u32, args[1] as u32, args[2] as u32),
        N::PollRemove => ipc::sys_poll_remove(args[0] as u32, args[1] as u32),
        N::PollWait => ipc::sys_poll_wait(args[0] as u32, args[1], args[2] as i64),

        // Time
        N::TimeNow => time::sys_time_now(),
        N::Sleep => time::sys_sleep(args[0]),
        N::TimerCreate => time::sys_timer_create(args[0]),
        N::TimerCancel => time::sys_timer_cancel(args[0] as u32),

        // FD I/O
        N::Open => fd::sys_open(args[0], args[1] as u32),
        N::Close => fd::sys_close(args[0] as usize),
        N::Read => fd::sys_read(args[0] as usize, args[1], args[2]),
        N::Write => fd::sys_write(args[0] as usize, args[1], args[2]),
        N::Lseek => fd::sys_lseek(args[0] as usize, args[1] as i64, args[2] as i32),
        N::Stat => fd::sys_stat(args[0], args[1]),
        N::Fstat => fd::sys_fstat(args[0] as usize, args[1]),
        N::Dup => fd::sys_dup(args[0] as usize),
        N::Dup2 => fd::sys_dup2(args[0] as usize, args[1] as usize),

        // Sockets + DNS: provided by the network service
        N::SocketCreate
        | N::SocketConnect
        | N::SocketSend
        | N::SocketRecv
        | N::SocketClose
        | N::DnsResolve => ext::sys_net(number, args),

        // Directory operations
        N::ReadDir => dir::sys_readdir(args[0] as usize, args[1], args[2]),
        N::Mkdir => dir::sys_mkdir(args[0]),
        N::Rmdir => dir::sys_rmdir(args[0]),
        N::Unlink => dir::sys_unlink(args[0]),
        N::Rename => dir::sys_rename(args[0], args[1]),
        N::Symlink => dir::sys_symlink(args[0], args[1]),
        N::Readlink => dir::sys_readlink(args[0], args[1], args[2]),
        N::Getcwd => dir::sys_getcwd(args[0], args[1]),
        N::Chdir => dir::sys_chdir(args[0]),

        // Capabilities
        N::CapDerive => cap::sys_derive(args[0] as u32, args[1] as u32),
        N::CapRevoke => cap::sys_revoke(args[0] as u32),
        N::CapQuery => cap::sys_query(args[0] as u32),
        N::CapList => cap::sys_list(args[0], args[1] as u32),

        // Handle-based filesystem
        N::FsOpenRoot => handlefs::sys_open_root(),
        N::FsOpen => handlefs::sys_open(args[0] as u32, args[1], args[2] as u32),
        N::IoRead => handlefs::sys_io_read(args[0] as u32, args[1], args[2]),
        N::IoWrite => handlefs::sys_io_write(args[0] as u32, args[1], args[2]),
        N::IoSeek => handlefs::sys_io_seek(args[0] as u32, args[1] as i64, args[2] as i32),
        N::FsReadDir => handlefs::sys_read_dir(args[0] as u32, args[1], args[2]),
        N::FsClose => handlefs::sys_close(args[0] as u32),
        N::FsRewindDir => handlefs::sys_rewind_dir(args[0] as u32),

        // Signals (sigreturn is intercepted in dispatch())
        N::SigAction => signal::sys_sigaction(args[0], args[1], args[2] as u32, args[3] as u32),
        N::SigProcMask => signal::sys_sigprocmask(args[0] as u32, args[1] as u32),
        N::SigReturn => SyscallResult::err(VError::InvalidArg),
        N::Kill => signal::sys_kill(args[0] as u32, args[1] as i32),
        N::SigPending => signal::sys_sigpending(),

        // Assigns
        N::AssignSet => dir::sys_assign_set(args[0], args[1]),
        N::AssignGet => dir::sys_assign_get(args[0], args[1], args[2]),
        N::AssignRemove => dir::sys_assign_remove(args[0]),
        N::AssignList => dir::sys_assign_list(args[0], args[1]),
        N::AssignResolve => dir::sys_assign_resolve(args[0], args[1], args[2]),

        // TLS: provided by the TLS service
        N::TlsCreate | N::TlsHandshake | N::TlsSend | N::TlsRecv | N::TlsClose | N::TlsInfo => {
            ext::sys_tls(number, args)
        }

        // System information
        N::MemInfo => info::sys_mem_info(args[0]),
        N::NetStats | N::Ping | N::DeviceList => ext::sys_info(number, args),

        // Debug / console
        N::DebugPrint => debug::sys_debug_print(args[0]),
        N::Getchar => debug::sys_getchar(),
        N::Putchar => debug::sys_putchar(args[0] as u8),
        N::Uptime => debug::sys_uptime(),

        // Device management / GUI: provided by their services
        N::DeviceOpen | N::DeviceClose | N::DeviceCtl => ext::sys_device(number, args),
        N::GuiCreateSurface | N::GuiPresent | N::GuiInfo => ext::sys_gui(number, args),
    }
}

// ---------------------------------------------------------------------------
// User memory access
// ---------------------------------------------------------------------------

/// Largest single user buffer a syscall accepts.
pub const MAX_USER_IO: usize = 1 << 20;

/// Check that `[addr, addr+len)` is a plausible user range for the calling
/// process: non-null, bounded, and covered by VMAs with the right
/// protection when the caller has an address space. Kernel-process callers
/// (bring-up tasks) pass unchecked beyond the basic bounds.
fn validate_user_range(addr: u64, len: u64, write: bool) -> Result<(), VError> {
    if len == 0 {
        return Ok(());
    }
    if addr == 0 || len as usize > MAX_USER_IO || addr.checked_add(len).is_none() {
        return Err(VError::InvalidArg);
    }

    let process = proc::current();
    if let Some(space) = process.addr_space.user() {
        use crate::mm::vma::Prot;
        let required = if write { Prot::WRITE } else { Prot::READ };
        if !space.vmas.lock().covers(addr, len, required) {
            return Err(VError::InvalidArg);
        }
    }
    Ok(())
}

/// Copy a user buffer into the kernel.
pub fn copy_from_user(addr: u64, len: u64) -> Result<Vec<u8>, VError> {
    validate_user_range(addr, len, false)?;
    let mut out = alloc::vec![0u8; len as usize];
    // SAFETY: the range was validated against the caller's VMAs (or the
    // caller is a kernel task); the address space is installed.
    unsafe {
        core::ptr::copy_nonoverlapping(addr as *const u8, out.as_mut_ptr(), len as usize);
    }
    Ok(out)
}

/// Copy kernel bytes out to a user buffer.
pub fn copy_to_user(addr: u64, data: &[u8]) -> Result<(), VError> {
    validate_user_range(addr, data.len() as u64, true)?;
    // SAFETY: as in copy_from_user, with write permission checked.
    unsafe {
        core::ptr::copy_nonoverlapping(data.as_ptr(), addr as *mut u8, data.len());
    }
    Ok(())
}

/// Read a NUL-terminated user string, capped at `MAX_PATH`.
pub fn read_user_str(addr: u64) -> Result<alloc::string::String, VError> {
    if addr == 0 {
        return Err(VError::InvalidArg);
    }
    let mut bytes = Vec::new();
    for i in 0..MAX_PATH as u64 {
        validate_user_range(addr + i, 1, false)?;
        // SAFETY: single validated byte.
        let b = unsafe { *((addr + i) as *const u8) };
        if b == 0 {
            return alloc::string::String::from_utf8(bytes).map_err(|_| VError::InvalidArg);
        }
        bytes.push(b);
    }
    Err(VError::InvalidArg)
}

/// Copy a `#[repr(C)]` value out to user memory.
pub fn write_struct_to_user<T: Copy>(addr: u64, value: &T) -> Result<(), VError> {
    let bytes = unsafe {
        core::slice::from_raw_parts(core::ptr::from_ref(value) as *const u8, size_of::<T>())
    };
    copy_to_user(addr, bytes)
}
