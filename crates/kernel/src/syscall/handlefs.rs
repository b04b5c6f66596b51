//! Handle-based filesystem syscalls (0x80 range).
//!
//! The object-capability face of the VFS: directories and files are opened
//! as handles in the process capability table, and I/O goes through those
//! handles instead of the FD table. Cursors (file offset / directory
//! enumeration index) live in a per-process side table keyed by handle.

use super::{SyscallResult, copy_from_user, copy_to_user, read_user_str};
use crate::fs::vfs::{self, NodeKind};
use crate::proc;
use alloc::vec::Vec;
use viper_abi::open_flags::O_CREAT;
use viper_abi::{CapRights, DIRENT_HEADER_LEN, DirEnt, VError, cap_kind, seek_whence};
use viper_hal::IrqSafeLock;

struct Cursor {
    pid: u32,
    handle: u32,
    offset: u64,
}

static CURSORS: IrqSafeLock<Vec<Cursor>> = IrqSafeLock::new(Vec::new());

fn cursor_get(pid: u32, handle: u32) -> u64 {
    CURSORS
        .lock()
        .iter()
        .find(|c| c.pid == pid && c.handle == handle)
        .map(|c| c.offset)
        .unwrap_or(0)
}

fn cursor_set(pid: u32, handle: u32, offset: u64) {
    let mut cursors = CURSORS.lock();
    if let Some(c) = cursors.iter_mut().find(|c| c.pid == pid && c.handle == handle) {
        c.offset = offset;
    } else {
        cursors.push(Cursor {
            pid,
            handle,
            offset,
        });
    }
}

fn cursor_drop(pid: u32, handle: u32) {
    CURSORS
        .lock()
        .retain(|c| !(c.pid == pid && c.handle == handle));
}

const DIR_RIGHTS: CapRights = CapRights::READ
    .union(CapRights::ENUMERATE)
    .union(CapRights::DERIVE)
    .union(CapRights::MANAGE);

const FILE_RIGHTS: CapRights = CapRights::READ
    .union(CapRights::WRITE)
    .union(CapRights::DERIVE);

/// Handle to the file-system root directory.
pub fn sys_open_root() -> SyscallResult {
    let root = match vfs::resolve("/", "/") {
        Ok(i) => i,
        Err(e) => return e.into(),
    };
    let process = proc::current();
    let mut caps = process.caps.lock();
    match caps.insert(cap_kind::DIRECTORY, DIR_RIGHTS, root) {
        Ok(h) => SyscallResult::ok1(h as u64),
        Err(e) => e.into(),
    }
}

/// Open a path relative to a directory handle; returns a new handle.
pub fn sys_open(dir_handle: u32, path_ptr: u64, flags: u32) -> SyscallResult {
    let path = match read_user_str(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.into(),
    };

    let process = proc::current();
    let dir_ino = {
        let caps = process.caps.lock();
        match caps.resolve(dir_handle, cap_kind::DIRECTORY, CapRights::READ) {
            Ok(ino) => ino,
            Err(e) => return e.into(),
        }
    };

    let ino = match vfs::resolve_at(dir_ino, &path) {
        Ok(i) => i,
        Err(VError::NotFound) if flags & O_CREAT != 0 => {
            // Create directly in the handle's directory; nested components
            // must already exist.
            if path.contains('/') {
                return VError::NotFound.into();
            }
            {
                let caps = process.caps.lock();
                if caps
                    .resolve(dir_handle, cap_kind::DIRECTORY, CapRights::MANAGE)
                    .is_err()
                {
                    return VError::Denied.into();
                }
            }
            match vfs::create_at(dir_ino, &path) {
                Ok(i) => i,
                Err(e) => return e.into(),
            }
        }
        Err(e) => return e.into(),
    };

    let (kind_code, rights) = match vfs::node_kind(ino) {
        Ok(NodeKind::Directory) => (cap_kind::DIRECTORY, DIR_RIGHTS),
        Ok(_) => (cap_kind::FILE, FILE_RIGHTS),
        Err(e) => return e.into(),
    };

    let mut caps = process.caps.lock();
    match caps.insert(kind_code, rights, ino) {
        Ok(h) => SyscallResult::ok1(h as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_io_read(handle: u32, buf_ptr: u64, len: u64) -> SyscallResult {
    let process = proc::current();
    let ino = {
        let caps = process.caps.lock();
        match caps.resolve(handle, cap_kind::FILE, CapRights::READ) {
            Ok(i) => i,
            Err(e) => return e.into(),
        }
    };

    let offset = cursor_get(process.id, handle);
    let mut data = alloc::vec![0u8; len as usize];
    match vfs::read_at(ino, offset, &mut data) {
        Ok(n) => {
            if let Err(e) = copy_to_user(buf_ptr, &data[..n]) {
                return e.into();
            }
            cursor_set(process.id, handle, offset + n as u64);
            SyscallResult::ok1(n as u64)
        }
        Err(e) => e.into(),
    }
}

pub fn sys_io_write(handle: u32, buf_ptr: u64, len: u64) -> SyscallResult {
    let process = proc::current();
    let ino = {
        let caps = process.caps.lock();
        match caps.resolve(handle, cap_kind::FILE, CapRights::WRITE) {
            Ok(i) => i,
            Err(e) => return e.into(),
        }
    };

    let data = match copy_from_user(buf_ptr, len) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };

    let offset = cursor_get(process.id, handle);
    match vfs::write_at(ino, offset, &data) {
        Ok(n) => {
            cursor_set(process.id, handle, offset + n as u64);
            SyscallResult::ok1(n as u64)
        }
        Err(e) => e.into(),
    }
}

pub fn sys_io_seek(handle: u32, offset: i64, whence: i32) -> SyscallResult {
    let process = proc::current();
    let ino = {
        let caps = process.caps.lock();
        match caps.resolve(handle, cap_kind::FILE, CapRights::READ) {
            Ok(i) => i,
            Err(e) => return e.into(),
        }
    };

    let base = match whence {
        seek_whence::SET => 0,
        seek_whence::CUR => cursor_get(process.id, handle) as i64,
        seek_whence::END => match vfs::stat_ino(ino) {
            Ok(st) => st.size as i64,
            Err(e) => return e.into(),
        },
        _ => return VError::InvalidArg.into(),
    };

    let new = base + offset;
    if new < 0 {
        return VError::InvalidArg.into();
    }
    cursor_set(process.id, handle, new as u64);
    SyscallResult::ok1(new as u64)
}

/// Read the next directory entry as a single packed `DirEnt` record.
pub fn sys_read_dir(handle: u32, buf_ptr: u64, len: u64) -> SyscallResult {
    let process = proc::current();
    let ino = {
        let caps = process.caps.lock();
        match caps.resolve(handle, cap_kind::DIRECTORY, CapRights::ENUMERATE) {
            Ok(i) => i,
            Err(e) => return e.into(),
        }
    };

    let index = cursor_get(process.id, handle) as usize;
    let mut buf = alloc::vec![0u8; (len as usize).min(DirEnt::record_len(255))];
    match vfs::getdents_one(ino, index, &mut buf) {
        Ok(Some(bytes)) => {
            if let Err(e) = copy_to_user(buf_ptr, &buf[..bytes]) {
                return e.into();
            }
            cursor_set(process.id, handle, index as u64 + 1);
            SyscallResult::ok1(bytes as u64)
        }
        Ok(None) => SyscallResult::ok1(0), // end of directory
        Err(e) => e.into(),
    }
}

pub fn sys_close(handle: u32) -> SyscallResult {
    let process = proc::current();
    cursor_drop(process.id, handle);
    match process.caps.lock().revoke(handle) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_rewind_dir(handle: u32) -> SyscallResult {
    let process = proc::current();
    {
        let caps = process.caps.lock();
        if let Err(e) = caps.resolve(handle, cap_kind::DIRECTORY, CapRights::ENUMERATE) {
            return e.into();
        }
    }
    cursor_set(process.id, handle, 0);
    SyscallResult::ok()
}

// keep DIRENT_HEADER_LEN referenced for record layout sanity
const _: () = assert!(DIRENT_HEADER_LEN == 12);
