//! Syscall number assignments.
//!
//! Numbers are grouped into ranges by subsystem to keep the table readable
//! and leave room for growth. The assignments are the user/kernel contract;
//! renumbering is an ABI break.

/// Every defined syscall, with its fixed numeric identifier.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallNumber {
    // === Task management (0x00 - 0x0F) ===
    /// Yield the CPU to the scheduler.
    TaskYield = 0x00,
    /// Terminate the calling task with an exit code.
    TaskExit = 0x01,
    /// Return the calling task's ID.
    TaskCurrent = 0x02,
    /// Spawn a kernel task running a registered entry (bring-up surface).
    TaskSpawn = 0x03,
    /// Block until the target task exits; returns its exit code.
    TaskJoin = 0x04,
    /// Enumerate tasks into a caller-provided `TaskInfo` buffer.
    TaskList = 0x05,
    /// Set a task's priority (0 = highest, 255 = lowest).
    TaskSetPriority = 0x06,
    /// Get a task's priority.
    TaskGetPriority = 0x07,
    /// Wait for any child task to exit; returns (id, exit code).
    TaskWait = 0x08,
    /// Fork the calling process (reserved; returns `NotSupported`).
    TaskFork = 0x09,
    /// Grow or shrink the process heap break.
    Sbrk = 0x0A,

    // === Channel IPC (0x10 - 0x1F) ===
    ChannelCreate = 0x10,
    ChannelSend = 0x11,
    ChannelRecv = 0x12,
    ChannelClose = 0x13,

    // === Poll (0x20 - 0x2F) ===
    PollCreate = 0x20,
    PollAdd = 0x21,
    PollRemove = 0x22,
    /// Wait for readiness on a set of events (may block).
    PollWait = 0x23,

    // === Time (0x30 - 0x3F) ===
    /// Monotonic milliseconds since boot.
    TimeNow = 0x30,
    /// Sleep for a number of milliseconds (may block).
    Sleep = 0x31,
    /// Create a one-shot timer whose expiry is observable via poll.
    TimerCreate = 0x32,
    TimerCancel = 0x33,

    // === File descriptor I/O (0x40 - 0x4F) ===
    Open = 0x40,
    Close = 0x41,
    Read = 0x42,
    Write = 0x43,
    Lseek = 0x44,
    Stat = 0x45,
    Fstat = 0x46,
    Dup = 0x47,
    Dup2 = 0x48,

    // === Sockets + DNS (0x50 - 0x5F); provided by the network service ===
    SocketCreate = 0x50,
    SocketConnect = 0x51,
    SocketSend = 0x52,
    SocketRecv = 0x53,
    SocketClose = 0x54,
    DnsResolve = 0x55,

    // === Directory operations (0x60 - 0x6F) ===
    ReadDir = 0x60,
    Mkdir = 0x61,
    Rmdir = 0x62,
    Unlink = 0x63,
    Rename = 0x64,
    Symlink = 0x65,
    Readlink = 0x66,
    Getcwd = 0x67,
    Chdir = 0x68,

    // === Capabilities (0x70 - 0x7F) ===
    /// Derive a new handle with narrowed rights.
    CapDerive = 0x70,
    CapRevoke = 0x71,
    CapQuery = 0x72,
    CapList = 0x73,

    // === Handle-based filesystem (0x80 - 0x8F) ===
    FsOpenRoot = 0x80,
    FsOpen = 0x81,
    IoRead = 0x82,
    IoWrite = 0x83,
    IoSeek = 0x84,
    FsReadDir = 0x85,
    FsClose = 0x86,
    FsRewindDir = 0x87,

    // === Signals (0x90 - 0x9F) ===
    SigAction = 0x90,
    SigProcMask = 0x91,
    /// Restore the exception frame saved at signal delivery. The dispatcher
    /// must not overwrite result registers on this path.
    SigReturn = 0x92,
    Kill = 0x93,
    SigPending = 0x94,

    // === Assigns (0xC0 - 0xCF) ===
    AssignSet = 0xC0,
    AssignGet = 0xC1,
    AssignRemove = 0xC2,
    AssignList = 0xC3,
    AssignResolve = 0xC4,

    // === TLS sessions (0xD0 - 0xDF); provided by the TLS service ===
    TlsCreate = 0xD0,
    TlsHandshake = 0xD1,
    TlsSend = 0xD2,
    TlsRecv = 0xD3,
    TlsClose = 0xD4,
    TlsInfo = 0xD5,

    // === System information (0xE0 - 0xEF) ===
    /// Fill a `MemInfo` structure with physical memory statistics.
    MemInfo = 0xE0,
    NetStats = 0xE1,
    Ping = 0xE2,
    DeviceList = 0xE3,

    // === Debug / console (0xF0 - 0xFF) ===
    DebugPrint = 0xF0,
    /// Read a console character; `WouldBlock` when none is pending.
    Getchar = 0xF1,
    Putchar = 0xF2,
    /// Kernel uptime tick count.
    Uptime = 0xF3,

    // === Device management (0x100 - 0x10F); provided by device services ===
    DeviceOpen = 0x100,
    DeviceClose = 0x101,
    DeviceCtl = 0x102,

    // === GUI / display (0x110 - 0x11F); provided by the display service ===
    GuiCreateSurface = 0x110,
    GuiPresent = 0x111,
    GuiInfo = 0x112,
}

impl SyscallNumber {
    /// Decode the value found in `x8`. Returns `None` for numbers outside the
    /// defined table (the dispatcher turns that into `VError::NotSupported`).
    pub fn from_u32(n: u32) -> Option<Self> {
        Some(match n {
            0x00 => Self::TaskYield,
            0x01 => Self::TaskExit,
            0x02 => Self::TaskCurrent,
            0x03 => Self::TaskSpawn,
            0x04 => Self::TaskJoin,
            0x05 => Self::TaskList,
            0x06 => Self::TaskSetPriority,
            0x07 => Self::TaskGetPriority,
            0x08 => Self::TaskWait,
            0x09 => Self::TaskFork,
            0x0A => Self::Sbrk,
            0x10 => Self::ChannelCreate,
            0x11 => Self::ChannelSend,
            0x12 => Self::ChannelRecv,
            0x13 => Self::ChannelClose,
            0x20 => Self::PollCreate,
            0x21 => Self::PollAdd,
            0x22 => Self::PollRemove,
            0x23 => Self::PollWait,
            0x30 => Self::TimeNow,
            0x31 => Self::Sleep,
            0x32 => Self::TimerCreate,
            0x33 => Self::TimerCancel,
            0x40 => Self::Open,
            0x41 => Self::Close,
            0x42 => Self::Read,
            0x43 => Self::Write,
            0x44 => Self::Lseek,
            0x45 => Self::Stat,
            0x46 => Self::Fstat,
            0x47 => Self::Dup,
            0x48 => Self::Dup2,
            0x50 => Self::SocketCreate,
            0x51 => Self::SocketConnect,
            0x52 => Self::SocketSend,
            0x53 => Self::SocketRecv,
            0x54 => Self::SocketClose,
            0x55 => Self::DnsResolve,
            0x60 => Self::ReadDir,
            0x61 => Self::Mkdir,
            0x62 => Self::Rmdir,
            0x63 => Self::Unlink,
            0x64 => Self::Rename,
            0x65 => Self::Symlink,
            0x66 => Self::Readlink,
            0x67 => Self::Getcwd,
            0x68 => Self::Chdir,
            0x70 => Self::CapDerive,
            0x71 => Self::CapRevoke,
            0x72 => Self::CapQuery,
            0x73 => Self::CapList,
            0x80 => Self::FsOpenRoot,
            0x81 => Self::FsOpen,
            0x82 => Self::IoRead,
            0x83 => Self::IoWrite,
            0x84 => Self::IoSeek,
            0x85 => Self::FsReadDir,
            0x86 => Self::FsClose,
            0x87 => Self::FsRewindDir,
            0x90 => Self::SigAction,
            0x91 => Self::SigProcMask,
            0x92 => Self::SigReturn,
            0x93 => Self::Kill,
            0x94 => Self::SigPending,
            0xC0 => Self::AssignSet,
            0xC1 => Self::AssignGet,
            0xC2 => Self::AssignRemove,
            0xC3 => Self::AssignList,
            0xC4 => Self::AssignResolve,
            0xD0 => Self::TlsCreate,
            0xD1 => Self::TlsHandshake,
            0xD2 => Self::TlsSend,
            0xD3 => Self::TlsRecv,
            0xD4 => Self::TlsClose,
            0xD5 => Self::TlsInfo,
            0xE0 => Self::MemInfo,
            0xE1 => Self::NetStats,
            0xE2 => Self::Ping,
            0xE3 => Self::DeviceList,
            0xF0 => Self::DebugPrint,
            0xF1 => Self::Getchar,
            0xF2 => Self::Putchar,
            0xF3 => Self::Uptime,
            0x100 => Self::DeviceOpen,
            0x101 => Self::DeviceClose,
            0x102 => Self::DeviceCtl,
            0x110 => Self::GuiCreateSurface,
            0x111 => Self::GuiPresent,
            0x112 => Self::GuiInfo,
            _ => return None,
        })
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn defined_numbers_round_trip() {
        let all = [
            SyscallNumber::TaskYield,
            SyscallNumber::TaskExit,
            SyscallNumber::TaskCurrent,
            SyscallNumber::TaskSpawn,
            SyscallNumber::TaskJoin,
            SyscallNumber::TaskList,
            SyscallNumber::TaskSetPriority,
            SyscallNumber::TaskGetPriority,
            SyscallNumber::TaskWait,
            SyscallNumber::TaskFork,
            SyscallNumber::Sbrk,
            SyscallNumber::ChannelCreate,
            SyscallNumber::ChannelSend,
            SyscallNumber::ChannelRecv,
            SyscallNumber::ChannelClose,
            SyscallNumber::PollCreate,
            SyscallNumber::PollAdd,
            SyscallNumber::PollRemove,
            SyscallNumber::PollWait,
            SyscallNumber::TimeNow,
            SyscallNumber::Sleep,
            SyscallNumber::TimerCreate,
            SyscallNumber::TimerCancel,
            SyscallNumber::Open,
            SyscallNumber::Close,
            SyscallNumber::Read,
            SyscallNumber::Write,
            SyscallNumber::Lseek,
            SyscallNumber::Stat,
            SyscallNumber::Fstat,
            SyscallNumber::Dup,
            SyscallNumber::Dup2,
            SyscallNumber::SocketCreate,
            SyscallNumber::SocketConnect,
            SyscallNumber::SocketSend,
            SyscallNumber::SocketRecv,
            SyscallNumber::SocketClose,
            SyscallNumber::DnsResolve,
            SyscallNumber::ReadDir,
            SyscallNumber::Mkdir,
            SyscallNumber::Rmdir,
            SyscallNumber::Unlink,
            SyscallNumber::Rename,
            SyscallNumber::Symlink,
            SyscallNumber::Readlink,
            SyscallNumber::Getcwd,
            SyscallNumber::Chdir,
            SyscallNumber::CapDerive,
            SyscallNumber::CapRevoke,
            SyscallNumber::CapQuery,
            SyscallNumber::CapList,
            SyscallNumber::FsOpenRoot,
            SyscallNumber::FsOpen,
            SyscallNumber::IoRead,
            SyscallNumber::IoWrite,
            SyscallNumber::IoSeek,
            SyscallNumber::FsReadDir,
            SyscallNumber::FsClose,
            SyscallNumber::FsRewindDir,
            SyscallNumber::SigAction,
            SyscallNumber::SigProcMask,
            SyscallNumber::SigReturn,
            SyscallNumber::Kill,
            SyscallNumber::SigPending,
            SyscallNumber::AssignSet,
            SyscallNumber::AssignGet,
            SyscallNumber::AssignRemove,
            SyscallNumber::AssignList,
            SyscallNumber::AssignResolve,
            SyscallNumber::TlsCreate,
            SyscallNumber::TlsHandshake,
            SyscallNumber::TlsSend,
            SyscallNumber::TlsRecv,
            SyscallNumber::TlsClose,
            SyscallNumber::TlsInfo,
            SyscallNumber::MemInfo,
            SyscallNumber::NetStats,
            SyscallNumber::Ping,
            SyscallNumber::DeviceList,
            SyscallNumber::DebugPrint,
            SyscallNumber::Getchar,
            SyscallNumber::Putchar,
            SyscallNumber::Uptime,
            SyscallNumber::DeviceOpen,
            SyscallNumber::DeviceClose,
            SyscallNumber::DeviceCtl,
            SyscallNumber::GuiCreateSurface,
            SyscallNumber::GuiPresent,
            SyscallNumber::GuiInfo,
        ];
        for n in all {
            assert_eq!(SyscallNumber::from_u32(n as u32), Some(n));
        }
    }

    #[test]
    fn gaps_are_undefined() {
        for n in [0x0B, 0x14, 0x2F, 0x49, 0x69, 0x95, 0xC5, 0xD6, 0xE4, 0xF4, 0x103, 0x113, 0xFFFF]
        {
            assert_eq!(SyscallNumber::from_u32(n), None);
        }
    }

    #[test]
    fn range_grouping_is_stable() {
        assert_eq!(SyscallNumber::ChannelCreate as u32, 0x10);
        assert_eq!(SyscallNumber::PollWait as u32, 0x23);
        assert_eq!(SyscallNumber::SigReturn as u32, 0x92);
        assert_eq!(SyscallNumber::AssignSet as u32, 0xC0);
        assert_eq!(SyscallNumber::GuiInfo as u32, 0x112);
    }
}
