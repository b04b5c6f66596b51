//! Fixed-layout structures and constants shared across the syscall boundary.
//!
//! Everything here is `#[repr(C)]`, little-endian, naturally aligned. The
//! kernel writes these into caller-provided buffers; user-space reads them
//! without translation.

use bitflags::bitflags;

/// Maximum supported path length, including the terminating NUL.
pub const MAX_PATH: usize = 256;

/// Upper bound on the name stored in an assign mapping.
pub const MAX_ASSIGN_NAME: usize = 16;

// ---------------------------------------------------------------------------
// Task introspection
// ---------------------------------------------------------------------------

/// Task state codes stored in [`TaskInfo::state`].
pub mod task_state {
    pub const INVALID: u8 = 0;
    pub const READY: u8 = 1;
    pub const RUNNING: u8 = 2;
    pub const BLOCKED: u8 = 3;
    pub const EXITED: u8 = 4;
}

bitflags! {
    /// Coarse task classification stored in [`TaskInfo::flags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u8 {
        /// Runs in kernel mode (EL1).
        const KERNEL = 1 << 0;
        /// The idle task; runs only when nothing else is ready.
        const IDLE = 1 << 1;
        /// Runs in user mode (EL0).
        const USER = 1 << 2;
    }
}

/// Per-task snapshot returned by `TaskList`.
///
/// The list is a snapshot: any field may change as soon as the syscall
/// returns, so callers must treat it as diagnostic output rather than a
/// synchronization primitive.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TaskInfo {
    /// Kernel task identifier.
    pub id: u32,
    /// One of [`task_state`].
    pub state: u8,
    /// [`TaskFlags`] bits.
    pub flags: u8,
    /// Scheduler priority; 0 is highest, 255 lowest.
    pub priority: u8,
    pub _pad: u8,
    /// NUL-terminated display name.
    pub name: [u8; 32],
    /// Timer ticks spent running.
    pub cpu_ticks: u64,
    /// Times the scheduler dispatched this task.
    pub switch_count: u64,
    /// Creator's task id (0 for boot-created tasks).
    pub parent_id: u32,
    /// Exit status once `state == EXITED`.
    pub exit_code: i32,
}

impl Default for TaskInfo {
    fn default() -> Self {
        Self {
            id: 0,
            state: task_state::INVALID,
            flags: 0,
            priority: 0,
            _pad: 0,
            name: [0; 32],
            cpu_ticks: 0,
            switch_count: 0,
            parent_id: 0,
            exit_code: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Poll events
// ---------------------------------------------------------------------------

bitflags! {
    /// Readiness conditions a poll entry can request or report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventMask: u32 {
        /// A message is queued on the channel.
        const CHANNEL_READ = 1 << 0;
        /// The channel has room for another message.
        const CHANNEL_WRITE = 1 << 1;
        /// The one-shot timer identified by the handle has expired.
        const TIMER = 1 << 2;
        /// Network RX pseudo-handle has pending data for this process.
        const NET_RX = 1 << 3;
    }
}

/// One entry of a `PollWait` set. `events` is the request, `triggered` is
/// filled by the kernel on each pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PollEvent {
    /// Channel or timer handle (subsystem-scoped).
    pub handle: u32,
    /// Requested [`EventMask`] bits.
    pub events: u32,
    /// Reported [`EventMask`] bits; cleared before each evaluation pass.
    pub triggered: u32,
}

/// Upper bound on entries accepted by a single `PollWait`.
pub const MAX_POLL_EVENTS: usize = 16;

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Open flags accepted by `Open`.
pub mod open_flags {
    pub const O_RDONLY: u32 = 0x0000;
    pub const O_WRONLY: u32 = 0x0001;
    pub const O_RDWR: u32 = 0x0002;
    /// Mask selecting the access mode from the flag word.
    pub const O_ACCMODE: u32 = 0x0003;
    pub const O_CREAT: u32 = 0x0040;
    pub const O_TRUNC: u32 = 0x0200;
    pub const O_APPEND: u32 = 0x0400;
}

/// Seek origins for `Lseek` / `IoSeek`.
pub mod seek_whence {
    pub const SET: i32 = 0;
    pub const CUR: i32 = 1;
    pub const END: i32 = 2;
}

/// Directory entry type codes stored in [`DirEnt::entry_type`].
pub mod dirent_type {
    pub const FILE: u8 = 1;
    pub const DIRECTORY: u8 = 2;
    pub const SYMLINK: u8 = 3;
}

/// File metadata filled by `Stat` / `Fstat`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stat {
    /// Inode number (filesystem-specific).
    pub ino: u64,
    /// Type and permission bits (kernel-defined).
    pub mode: u32,
    pub _pad: u32,
    /// File size in bytes.
    pub size: u64,
    /// Allocated blocks (filesystem-defined units).
    pub blocks: u64,
    /// Last access time in ms since boot.
    pub atime: u64,
    /// Last modification time.
    pub mtime: u64,
    /// Creation/change time.
    pub ctime: u64,
}

/// Variable-length directory record packed by `ReadDir`/getdents.
///
/// Records are laid out back to back; `reclen` (always a multiple of 8)
/// advances from one record to the next. `name` is NUL-terminated and
/// truncated at 255 bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DirEnt {
    pub ino: u64,
    /// Total record length in bytes, padded to an 8-byte multiple.
    pub reclen: u16,
    /// One of [`dirent_type`].
    pub entry_type: u8,
    /// Name length excluding the NUL.
    pub namelen: u8,
    pub name: [u8; MAX_PATH],
}

/// Fixed header bytes preceding `name` in a packed [`DirEnt`] record.
pub const DIRENT_HEADER_LEN: usize = 12;

impl DirEnt {
    /// Packed record length for a name of `namelen` bytes: header + name +
    /// NUL, rounded up to an 8-byte multiple.
    pub const fn record_len(namelen: usize) -> usize {
        (DIRENT_HEADER_LEN + namelen + 1 + 7) & !7
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Kind codes reported by `CapQuery`.
pub mod cap_kind {
    pub const NONE: u8 = 0;
    pub const CHANNEL: u8 = 1;
    pub const FILE: u8 = 2;
    pub const DIRECTORY: u8 = 3;
    pub const BLOB: u8 = 4;
    pub const TLS_SESSION: u8 = 5;
    pub const TIMER: u8 = 6;
    pub const SOCKET: u8 = 7;
}

bitflags! {
    /// Rights carried by a capability handle. Derivation can only narrow.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapRights: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// List directory contents / enumerate the object.
        const ENUMERATE = 1 << 2;
        /// Derive further handles from this one.
        const DERIVE = 1 << 3;
        /// Mutate namespace state (create/unlink/rename below a directory).
        const MANAGE = 1 << 4;
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Signal numbers understood by `Kill`.
pub mod signal {
    pub const SIGKILL: i32 = 9;
    pub const SIGTERM: i32 = 15;
    pub const SIGCONT: i32 = 18;
    pub const SIGSTOP: i32 = 19;
    /// Number of signal slots per task.
    pub const NSIG: usize = 32;
}

/// `SigProcMask` operations.
pub mod sigmask_how {
    pub const BLOCK: u32 = 0;
    pub const UNBLOCK: u32 = 1;
    pub const SETMASK: u32 = 2;
}

// ---------------------------------------------------------------------------
// System information
// ---------------------------------------------------------------------------

/// Physical memory statistics filled by `MemInfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemInfo {
    pub total_pages: u64,
    pub free_pages: u64,
    pub used_pages: u64,
    pub heap_used: u64,
    pub heap_free: u64,
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};

    #[test]
    fn stat_layout_is_abi() {
        assert_eq!(size_of::<Stat>(), 56);
        assert_eq!(offset_of!(Stat, ino), 0);
        assert_eq!(offset_of!(Stat, mode), 8);
        assert_eq!(offset_of!(Stat, size), 16);
        assert_eq!(offset_of!(Stat, blocks), 24);
        assert_eq!(offset_of!(Stat, ctime), 48);
    }

    #[test]
    fn taskinfo_layout_is_abi() {
        assert_eq!(size_of::<TaskInfo>(), 64);
        assert_eq!(offset_of!(TaskInfo, name), 8);
        assert_eq!(offset_of!(TaskInfo, cpu_ticks), 40);
        assert_eq!(offset_of!(TaskInfo, parent_id), 56);
        assert_eq!(offset_of!(TaskInfo, exit_code), 60);
    }

    #[test]
    fn dirent_header_matches_layout() {
        assert_eq!(offset_of!(DirEnt, name), DIRENT_HEADER_LEN);
        assert_eq!(align_of::<DirEnt>(), 8);
    }

    #[test]
    fn dirent_record_len_is_8_aligned() {
        // header(12) + "a"(1) + NUL(1) = 14 -> 16
        assert_eq!(DirEnt::record_len(1), 16);
        // 12 + 3 + 1 = 16 exactly
        assert_eq!(DirEnt::record_len(3), 16);
        assert_eq!(DirEnt::record_len(4), 24);
        for n in 0..255 {
            assert_eq!(DirEnt::record_len(n) % 8, 0);
            assert!(DirEnt::record_len(n) >= DIRENT_HEADER_LEN + n + 1);
        }
    }

    #[test]
    fn poll_event_is_packed_triple() {
        assert_eq!(size_of::<PollEvent>(), 12);
    }

    #[test]
    fn derive_narrows() {
        let parent = CapRights::READ | CapRights::WRITE;
        let requested = CapRights::WRITE | CapRights::MANAGE;
        assert_eq!(parent & requested, CapRights::WRITE);
    }
}
