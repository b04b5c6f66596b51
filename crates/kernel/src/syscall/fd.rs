//! File-descriptor I/O syscalls (0x40 range).
//!
//! FDs live in the calling process's table. Console FDs bypass the VFS;
//! file FDs carry an offset that reads/writes advance, with `O_APPEND`
//! repositioning each write at the current end.

use super::{SyscallResult, copy_from_user, copy_to_user, read_user_str, write_struct_to_user};
use crate::fs::fd::{FdEntry, FdKind};
use crate::fs::vfs::{self, NodeKind};
use crate::proc;
use crate::sched::task;
use viper_abi::open_flags::{O_ACCMODE, O_APPEND, O_RDONLY, O_WRONLY};
use viper_abi::{Stat, VError, seek_whence};

fn access_allows_read(flags: u32) -> bool {
    flags & O_ACCMODE != O_WRONLY
}

fn access_allows_write(flags: u32) -> bool {
    flags & O_ACCMODE != O_RDONLY
}

fn current_cwd() -> alloc::string::String {
    task::try_current()
        .map(|t| t.cwd.lock().clone())
        .unwrap_or_else(|| alloc::string::String::from("/"))
}

pub fn sys_open(path_ptr: u64, flags: u32) -> SyscallResult {
    let path = match read_user_str(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.into(),
    };

    let (ino, kind) = match vfs::open(&current_cwd(), &path, flags) {
        Ok(v) => v,
        Err(e) => return e.into(),
    };

    let fd_kind = match kind {
        NodeKind::Directory => FdKind::Directory,
        _ => FdKind::File,
    };

    let process = proc::current();
    let mut fds = process.fds.lock();
    match fds.alloc(FdEntry {
        kind: fd_kind,
        ino,
        offset: 0,
        flags,
    }) {
        Ok(fd) => SyscallResult::ok1(fd as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_close(fd: usize) -> SyscallResult {
    let process = proc::current();
    match process.fds.lock().close(fd) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_read(fd: usize, buf_ptr: u64, len: u64) -> SyscallResult {
    let process = proc::current();
    let entry = match process.fds.lock().get(fd) {
        Ok(e) => e,
        Err(e) => return e.into(),
    };

    match entry.kind {
        FdKind::Console => {
            // Non-blocking console read: whatever bytes are pending now.
            let max = len as usize;
            let mut data = alloc::vec::Vec::new();
            while data.len() < max {
                match viper_hal::console::read_byte() {
                    Some(b) => data.push(b),
                    None => break,
                }
            }
            if data.is_empty() && max > 0 {
                return VError::WouldBlock.into();
            }
            match copy_to_user(buf_ptr, &data) {
                Ok(()) => SyscallResult::ok1(data.len() as u64),
                Err(e) => e.into(),
            }
        }
        FdKind::File => {
            if !access_allows_read(entry.flags) {
                return VError::Denied.into();
            }
            let mut data = alloc::vec![0u8; len as usize];
            match vfs::read_at(entry.ino, entry.offset, &mut data) {
                Ok(n) => {
                    if let Err(e) = copy_to_user(buf_ptr, &data[..n]) {
                        return e.into();
                    }
                    let mut fds = process.fds.lock();
                    if let Ok(e) = fds.get_mut(fd) {
                        e.offset += n as u64;
                    }
                    SyscallResult::ok1(n as u64)
                }
                Err(e) => e.into(),
            }
        }
        FdKind::Directory => VError::InvalidArg.into(),
    }
}

pub fn sys_write(fd: usize, buf_ptr: u64, len: u64) -> SyscallResult {
    let process = proc::current();
    let entry = match process.fds.lock().get(fd) {
        Ok(e) => e,
        Err(e) => return e.into(),
    };

    let data = match copy_from_user(buf_ptr, len) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };

    match entry.kind {
        FdKind::Console => {
            for chunk in data.utf8_chunks() {
                viper_hal::print!("{}", chunk.valid());
            }
            SyscallResult::ok1(data.len() as u64)
        }
        FdKind::File => {
            if !access_allows_write(entry.flags) {
                return VError::Denied.into();
            }
            let offset = if entry.flags & O_APPEND != 0 {
                match vfs::stat_ino(entry.ino) {
                    Ok(st) => st.size,
                    Err(e) => return e.into(),
                }
            } else {
                entry.offset
            };
            match vfs::write_at(entry.ino, offset, &data) {
                Ok(n) => {
                    let mut fds = process.fds.lock();
                    if let Ok(e) = fds.get_mut(fd) {
                        e.offset = offset + n as u64;
                    }
                    SyscallResult::ok1(n as u64)
                }
                Err(e) => e.into(),
            }
        }
        FdKind::Directory => VError::InvalidArg.into(),
    }
}

pub fn sys_lseek(fd: usize, offset: i64, whence: i32) -> SyscallResult {
    let process = proc::current();
    let mut fds = process.fds.lock();
    let entry = match fds.get(fd) {
        Ok(e) => e,
        Err(e) => return e.into(),
    };
    if entry.kind == FdKind::Console {
        return VError::InvalidArg.into();
    }

    let base = match whence {
        seek_whence::SET => 0,
        seek_whence::CUR => entry.offset as i64,
        seek_whence::END => match vfs::stat_ino(entry.ino) {
            Ok(st) => st.size as i64,
            Err(e) => return e.into(),
        },
        _ => return VError::InvalidArg.into(),
    };

    let new = base + offset;
    if new < 0 {
        return VError::InvalidArg.into();
    }
    match fds.get_mut(fd) {
        Ok(e) => {
            e.offset = new as u64;
            SyscallResult::ok1(new as u64)
        }
        Err(e) => e.into(),
    }
}

pub fn sys_stat(path_ptr: u64, stat_ptr: u64) -> SyscallResult {
    let path = match read_user_str(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.into(),
    };
    match vfs::stat_path(&current_cwd(), &path) {
        Ok(st) => match write_struct_to_user(stat_ptr, &st) {
            Ok(()) => SyscallResult::ok(),
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    }
}

pub fn sys_fstat(fd: usize, stat_ptr: u64) -> SyscallResult {
    let process = proc::current();
    let entry = match process.fds.lock().get(fd) {
        Ok(e) => e,
        Err(e) => return e.into(),
    };

    let st = match entry.kind {
        FdKind::Console => Stat {
            mode: 0o020_666, // character device
            ..Stat::default()
        },
        _ => match vfs::stat_ino(entry.ino) {
            Ok(st) => st,
            Err(e) => return e.into(),
        },
    };
    match write_struct_to_user(stat_ptr, &st) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_dup(fd: usize) -> SyscallResult {
    let process = proc::current();
    match process.fds.lock().dup(fd) {
        Ok(newfd) => SyscallResult::ok1(newfd as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_dup2(fd: usize, newfd: usize) -> SyscallResult {
    let process = proc::current();
    match process.fds.lock().dup2(fd, newfd) {
        Ok(newfd) => SyscallResult::ok1(newfd as u64),
        Err(e) => e.into(),
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::fs::vfs::testutil::ensure_root;
    use crate::mm::pmm::testutil::ensure_global_pmm;
    use crate::proc::testutil::ensure_kernel_process;
    use crate::sched::task::testutil::sched_test_guard;
    use viper_abi::VError;
    use viper_abi::open_flags::{O_CREAT, O_RDWR};

    fn setup() {
        ensure_global_pmm();
        ensure_kernel_process();
        ensure_root();
    }

    fn open(path: &str, flags: u32) -> usize {
        let mut p = path.as_bytes().to_vec();
        p.push(0);
        let r = sys_open(p.as_ptr() as u64, flags);
        assert_eq!(r.verr, VError::Ok, "open {path}");
        r.res0 as usize
    }

    #[test]
    fn open_write_read_lseek_fstat_round_trip() {
        let _g = sched_test_guard();
        setup();

        let fd = open("/sysfd-file", O_CREAT | O_RDWR);

        let payload = *b"file descriptor bytes";
        let w = sys_write(fd, payload.as_ptr() as u64, payload.len() as u64);
        assert_eq!(w.verr, VError::Ok);
        assert_eq!(w.res0, payload.len() as u64);

        // Offset advanced; read at EOF yields 0 bytes.
        let mut buf = [0u8; 32];
        let r = sys_read(fd, buf.as_mut_ptr() as u64, buf.len() as u64);
        assert_eq!(r.verr, VError::Ok);
        assert_eq!(r.res0, 0);

        // Rewind and read it back.
        let s = sys_lseek(fd, 0, seek_whence::SET);
        assert_eq!(s.verr, VError::Ok);
        let r = sys_read(fd, buf.as_mut_ptr() as u64, buf.len() as u64);
        assert_eq!(r.res0, payload.len() as u64);
        assert_eq!(&buf[..payload.len()], &payload);

        // SEEK_END lands on the size.
        let s = sys_lseek(fd, 0, seek_whence::END);
        assert_eq!(s.res0, payload.len() as u64);

        let mut st = Stat::default();
        let f = sys_fstat(fd, core::ptr::from_mut(&mut st) as u64);
        assert_eq!(f.verr, VError::Ok);
        assert_eq!(st.size, payload.len() as u64);

        assert_eq!(sys_close(fd).verr, VError::Ok);
        assert_eq!(sys_close(fd).verr, VError::InvalidArg);
    }

    #[test]
    fn access_mode_is_enforced() {
        let _g = sched_test_guard();
        setup();

        let fd = open("/sysfd-ro", O_CREAT); // O_RDONLY
        let b = *b"x";
        assert_eq!(
            sys_write(fd, b.as_ptr() as u64, 1).verr,
            VError::Denied
        );
        sys_close(fd);

        let fd = open("/sysfd-ro", viper_abi::open_flags::O_WRONLY);
        let mut buf = [0u8; 4];
        assert_eq!(
            sys_read(fd, buf.as_mut_ptr() as u64, 4).verr,
            VError::Denied
        );
        sys_close(fd);
    }

    #[test]
    fn dup_shares_the_inode() {
        let _g = sched_test_guard();
        setup();

        let fd = open("/sysfd-dup", O_CREAT | O_RDWR);
        let d = sys_dup(fd);
        assert_eq!(d.verr, VError::Ok);
        let dup_fd = d.res0 as usize;

        let b = *b"through-dup";
        assert_eq!(sys_write(dup_fd, b.as_ptr() as u64, b.len() as u64).verr, VError::Ok);

        let mut st = Stat::default();
        sys_fstat(fd, core::ptr::from_mut(&mut st) as u64);
        assert_eq!(st.size, b.len() as u64);

        sys_close(fd);
        sys_close(dup_fd);
    }
}
