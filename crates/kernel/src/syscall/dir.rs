//! Directory and assign syscalls (0x60 and 0xC0 ranges).

use super::{SyscallResult, copy_to_user, read_user_str};
use crate::assign;
use crate::fs::fd::FdKind;
use crate::fs::vfs::{self, NodeKind};
use crate::proc;
use crate::sched::task;
use alloc::string::String;
use viper_abi::VError;

fn current_cwd() -> String {
    task::try_current()
        .map(|t| t.cwd.lock().clone())
        .unwrap_or_else(|| String::from("/"))
}

/// getdents: pack directory records into the caller's buffer, advancing the
/// FD's enumeration index past what was returned.
pub fn sys_readdir(fd: usize, buf_ptr: u64, len: u64) -> SyscallResult {
    let process = proc::current();
    let entry = match process.fds.lock().get(fd) {
        Ok(e) => e,
        Err(e) => return e.into(),
    };
    if entry.kind != FdKind::Directory {
        return VError::InvalidArg.into();
    }

    let mut buf = alloc::vec![0u8; (len as usize).min(super::MAX_USER_IO)];
    match vfs::getdents(entry.ino, entry.offset as usize, &mut buf) {
        Ok((bytes, next_index)) => {
            if bytes > 0
                && let Err(e) = copy_to_user(buf_ptr, &buf[..bytes])
            {
                return e.into();
            }
            let mut fds = process.fds.lock();
            if let Ok(e) = fds.get_mut(fd) {
                e.offset = next_index as u64;
            }
            SyscallResult::ok1(bytes as u64)
        }
        Err(e) => e.into(),
    }
}

pub fn sys_mkdir(path_ptr: u64) -> SyscallResult {
    match read_user_str(path_ptr) {
        Ok(path) => match vfs::mkdir(&current_cwd(), &path) {
            Ok(()) => SyscallResult::ok(),
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    }
}

pub fn sys_rmdir(path_ptr: u64) -> SyscallResult {
    match read_user_str(path_ptr) {
        Ok(path) => match vfs::rmdir(&current_cwd(), &path) {
            Ok(()) => SyscallResult::ok(),
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    }
}

pub fn sys_unlink(path_ptr: u64) -> SyscallResult {
    match read_user_str(path_ptr) {
        Ok(path) => match vfs::unlink(&current_cwd(), &path) {
            Ok(()) => SyscallResult::ok(),
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    }
}

pub fn sys_rename(from_ptr: u64, to_ptr: u64) -> SyscallResult {
    let (from, to) = match (read_user_str(from_ptr), read_user_str(to_ptr)) {
        (Ok(f), Ok(t)) => (f, t),
        (Err(e), _) | (_, Err(e)) => return e.into(),
    };
    match vfs::rename(&current_cwd(), &from, &to) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_symlink(target_ptr: u64, link_ptr: u64) -> SyscallResult {
    let (target, link) = match (read_user_str(target_ptr), read_user_str(link_ptr)) {
        (Ok(t), Ok(l)) => (t, l),
        (Err(e), _) | (_, Err(e)) => return e.into(),
    };
    match vfs::symlink(&current_cwd(), &target, &link) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_readlink(path_ptr: u64, buf_ptr: u64, len: u64) -> SyscallResult {
    let path = match read_user_str(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.into(),
    };
    match vfs::readlink(&current_cwd(), &path) {
        Ok(target) => {
            let n = target.len().min(len as usize);
            match copy_to_user(buf_ptr, &target.as_bytes()[..n]) {
                Ok(()) => SyscallResult::ok1(n as u64),
                Err(e) => e.into(),
            }
        }
        Err(e) => e.into(),
    }
}

pub fn sys_getcwd(buf_ptr: u64, len: u64) -> SyscallResult {
    let cwd = current_cwd();
    // The cwd must fit with its NUL terminator.
    if (len as usize) < cwd.len() + 1 {
        return VError::InvalidArg.into();
    }
    let mut bytes = cwd.into_bytes();
    bytes.push(0);
    match copy_to_user(buf_ptr, &bytes) {
        Ok(()) => SyscallResult::ok1(bytes.len() as u64 - 1),
        Err(e) => e.into(),
    }
}

pub fn sys_chdir(path_ptr: u64) -> SyscallResult {
    let path = match read_user_str(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.into(),
    };
    let cwd = current_cwd();

    let ino = match vfs::resolve(&cwd, &path) {
        Ok(i) => i,
        Err(e) => return e.into(),
    };
    match vfs::node_kind(ino) {
        Ok(NodeKind::Directory) => {}
        Ok(_) => return VError::InvalidArg.into(),
        Err(e) => return e.into(),
    }

    // Store the normalized absolute path.
    let absolute = if path.starts_with('/') {
        path
    } else {
        let mut joined = cwd;
        if !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(&path);
        joined
    };

    if let Some(t) = task::try_current() {
        *t.cwd.lock() = absolute;
    }
    SyscallResult::ok()
}

// ---------------------------------------------------------------------------
// Assigns
// ---------------------------------------------------------------------------

pub fn sys_assign_set(name_ptr: u64, target_ptr: u64) -> SyscallResult {
    let (name, target) = match (read_user_str(name_ptr), read_user_str(target_ptr)) {
        (Ok(n), Ok(t)) => (n, t),
        (Err(e), _) | (_, Err(e)) => return e.into(),
    };
    match assign::set(&name, &target) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_assign_get(name_ptr: u64, buf_ptr: u64, len: u64) -> SyscallResult {
    let name = match read_user_str(name_ptr) {
        Ok(n) => n,
        Err(e) => return e.into(),
    };
    match assign::get(&name) {
        Ok(target) => {
            let n = target.len().min(len as usize);
            match copy_to_user(buf_ptr, &target.as_bytes()[..n]) {
                Ok(()) => SyscallResult::ok1(n as u64),
                Err(e) => e.into(),
            }
        }
        Err(e) => e.into(),
    }
}

pub fn sys_assign_remove(name_ptr: u64) -> SyscallResult {
    match read_user_str(name_ptr) {
        Ok(name) => match assign::remove(&name) {
            Ok(()) => SyscallResult::ok(),
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    }
}

/// Pack `name=target` lines, one per assign, NUL-separated.
pub fn sys_assign_list(buf_ptr: u64, len: u64) -> SyscallResult {
    let mut out = alloc::vec::Vec::new();
    let entries = assign::list();
    let count = entries.len();
    for (name, target) in entries {
        out.extend_from_slice(name.as_bytes());
        out.push(b'=');
        out.extend_from_slice(target.as_bytes());
        out.push(0);
    }
    if out.len() > len as usize {
        return VError::InvalidArg.into();
    }
    match copy_to_user(buf_ptr, &out) {
        Ok(()) => SyscallResult::ok2(count as u64, out.len() as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_assign_resolve(path_ptr: u64, buf_ptr: u64, len: u64) -> SyscallResult {
    let path = match read_user_str(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.into(),
    };
    match assign::resolve(&path) {
        Ok(resolved) => {
            let n = resolved.len().min(len as usize);
            match copy_to_user(buf_ptr, &resolved.as_bytes()[..n]) {
                Ok(()) => SyscallResult::ok1(n as u64),
                Err(e) => e.into(),
            }
        }
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
    use viper_abi::open_flags::O_CREAT;

    fn cstr(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    #[test]
    fn mkdir_open_readdir_unlink_flow() {
        let _g = sched_test_guard();
        ensure_global_pmm();
        ensure_kernel_process();
        ensure_root();

        let dir = cstr("/sysdir");
        assert_eq!(sys_mkdir(dir.as_ptr() as u64).verr, VError::Ok);
        // Creating it again collides.
        assert_eq!(sys_mkdir(dir.as_ptr() as u64).verr, VError::Exists);

        for name in ["/sysdir/one", "/sysdir/two"] {
            let p = cstr(name);
            let r = crate::syscall::fd::sys_open(p.as_ptr() as u64, O_CREAT);
            assert_eq!(r.verr, VError::Ok);
            crate::syscall::fd::sys_close(r.res0 as usize);
        }

        // Enumerate through a directory FD.
        let r = crate::syscall::fd::sys_open(dir.as_ptr() as u64, 0);
        assert_eq!(r.verr, VError::Ok);
        let dfd = r.res0 as usize;

        let mut buf = [0u8; 256];
        let r = sys_readdir(dfd, buf.as_mut_ptr() as u64, buf.len() as u64);
        assert_eq!(r.verr, VError::Ok);
        assert!(r.res0 > 0);
        // Exhausted on the second call.
        let r2 = sys_readdir(dfd, buf.as_mut_ptr() as u64, buf.len() as u64);
        assert_eq!(r2.res0, 0);
        crate::syscall::fd::sys_close(dfd);

        let one = cstr("/sysdir/one");
        assert_eq!(sys_unlink(one.as_ptr() as u64).verr, VError::Ok);
        let two = cstr("/sysdir/two");
        let renamed = cstr("/sysdir/renamed");
        assert_eq!(
            sys_rename(two.as_ptr() as u64, renamed.as_ptr() as u64).verr,
            VError::Ok
        );
        assert_eq!(sys_unlink(renamed.as_ptr() as u64).verr, VError::Ok);
        assert_eq!(sys_rmdir(dir.as_ptr() as u64).verr, VError::Ok);
    }

    #[test]
    fn assigns_via_syscalls() {
        let _g = sched_test_guard();
        ensure_global_pmm();
        ensure_kernel_process();
        ensure_root();

        let name = cstr("SDATA");
        let target = cstr("/sysassign");
        let mkpath = cstr("/sysassign");
        assert_eq!(sys_mkdir(mkpath.as_ptr() as u64).verr, VError::Ok);
        assert_eq!(
            sys_assign_set(name.as_ptr() as u64, target.as_ptr() as u64).verr,
            VError::Ok
        );

        let qualified = cstr("SDATA:nested");
        let mut buf = [0u8; 64];
        let r = sys_assign_resolve(
            qualified.as_ptr() as u64,
            buf.as_mut_ptr() as u64,
            buf.len() as u64,
        );
        assert_eq!(r.verr, VError::Ok);
        assert_eq!(&buf[..r.res0 as usize], b"/sysassign/nested");

        assert_eq!(sys_assign_remove(name.as_ptr() as u64).verr, VError::Ok);
        let rm = cstr("/sysassign");
        assert_eq!(sys_rmdir(rm.as_ptr() as u64).verr, VError::Ok);
    }
}
