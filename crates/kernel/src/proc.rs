//! Process descriptors.
//!
//! A process owns the resources a task merely uses: the address space, the
//! capability table, the file-descriptor table, and the heap break. Kernel
//! tasks share one boot-time "kernel" process so path- and fd-based
//! syscalls behave identically at EL1 and EL0.

use crate::cap::CapTable;
use crate::fs::fd::FdTable;
use crate::mm::addrspace::AddressSpace;
use crate::mm::vma::{Prot, VmaKind};
use crate::mm::{pmm, vmm};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use viper_abi::{VError, VResult};
use viper_hal::IrqSafeLock;

pub const MAX_PROCESSES: usize = 32;

/// Heap-break state behind `sbrk`.
#[derive(Debug, Clone, Copy)]
pub struct HeapBreak {
    pub base: u64,
    pub current: u64,
    pub max: u64,
}

/// Per-process heap ceiling (64 MiB).
pub const HEAP_BREAK_MAX: u64 = 64 * 1024 * 1024;

impl HeapBreak {
    pub const fn new(base: u64) -> Self {
        Self {
            base,
            current: base,
            max: base + HEAP_BREAK_MAX,
        }
    }

    /// Move the break; returns the old break on success.
    pub fn grow(&mut self, increment: i64) -> VResult<u64> {
        let old = self.current;
        let new = if increment >= 0 {
            self.current.checked_add(increment as u64)
        } else {
            self.current.checked_sub((-increment) as u64)
        }
        .ok_or(VError::InvalidArg)?;

        if new < self.base || new > self.max {
            return Err(VError::InvalidArg);
        }
        self.current = new;
        Ok(old)
    }
}

pub struct Process {
    pub id: u32,
    name: [u8; 32],
    /// `None` for the kernel process, which lives in the kernel map.
    pub addr_space: ProcessSpace,
    pub caps: IrqSafeLock<CapTable>,
    pub fds: IrqSafeLock<FdTable>,
    pub brk: IrqSafeLock<HeapBreak>,
    exited: AtomicBool,
    exit_code: AtomicI32,
}

/// Address-space handle that tolerates the kernel process.
pub enum ProcessSpace {
    Kernel,
    User(AddressSpace),
}

impl ProcessSpace {
    pub fn switch_to(&self) {
        if let Self::User(space) = self {
            space.switch_to();
        }
    }

    pub fn user(&self) -> Option<&AddressSpace> {
        match self {
            Self::User(s) => Some(s),
            Self::Kernel => None,
        }
    }
}

impl Process {
    pub fn name(&self) -> &str {
        viper_utils::name_str(&self.name)
    }

    pub fn mark_exited(&self, code: i32) {
        self.exit_code.store(code, Ordering::Release);
        self.exited.store(true, Ordering::Release);
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire)
    }

    /// Grow the break and eagerly back new pages with mapped frames.
    pub fn sbrk(&self, increment: i64) -> VResult<u64> {
        let mut brk = self.brk.lock();
        let old = brk.grow(increment)?;
        let new = brk.current;
        drop(brk);

        if increment > 0
            && let ProcessSpace::User(space) = &self.addr_space
        {
            let first_new = old.next_multiple_of(4096);
            let last = new.next_multiple_of(4096);
            let mut va = first_new;
            while va < last {
                let frame = pmm::alloc_page();
                if frame == 0 {
                    return Err(VError::OutOfMemory);
                }
                // Zero the frame before it becomes user-visible.
                // SAFETY: fresh frame from the PMM.
                unsafe {
                    core::ptr::write_bytes(pmm::phys_to_virt(frame), 0, 4096);
                }
                if !space.map_page(va, frame, vmm::preset::USER_RW) {
                    return Err(VError::OutOfMemory);
                }
                va += 4096;
            }
            let mut vmas = space.vmas.lock();
            if first_new < last {
                let _ = vmas.add(
                    first_new,
                    last,
                    Prot::READ | Prot::WRITE,
                    VmaKind::Anonymous,
                );
            }
        }

        Ok(old)
    }
}

// ---------------------------------------------------------------------------
// Process table
// ---------------------------------------------------------------------------

struct ProcTable {
    slots: [Option<Arc<Process>>; MAX_PROCESSES],
}

static PROCESSES: IrqSafeLock<ProcTable> = IrqSafeLock::new(ProcTable {
    slots: [const { None }; MAX_PROCESSES],
});
static NEXT_PID: AtomicU32 = AtomicU32::new(1);
static KERNEL_PROC: IrqSafeLock<Option<Arc<Process>>> = IrqSafeLock::new(None);

fn build(name: &str, id: u32, space: ProcessSpace, heap_base: u64) -> Process {
    let mut name_buf = [0u8; 32];
    viper_utils::copy_name(&mut name_buf, name);
    Process {
        id,
        name: name_buf,
        addr_space: space,
        caps: IrqSafeLock::new(CapTable::new()),
        fds: IrqSafeLock::new(FdTable::new()),
        brk: IrqSafeLock::new(HeapBreak::new(heap_base)),
        exited: AtomicBool::new(false),
        exit_code: AtomicI32::new(0),
    }
}

/// Create the shared kernel process (id 0). Must run before any syscall.
pub fn init() {
    let kproc = Arc::new(build("kernel", 0, ProcessSpace::Kernel, 0));
    *KERNEL_PROC.lock() = Some(kproc);
    log::info!("[proc] kernel process initialized");
}

pub fn kernel_process() -> Arc<Process> {
    match KERNEL_PROC.lock().as_ref() {
        Some(p) => p.clone(),
        None => panic!("proc::init not called"),
    }
}

/// Create a user process with its own address space. `heap_base` seeds the
/// sbrk break (typically the end of the loaded image).
pub fn create(name: &str, heap_base: u64) -> VResult<Arc<Process>> {
    let id = NEXT_PID.fetch_add(1, Ordering::Relaxed);
    let space = AddressSpace::new(id)?;

    let proc = Arc::new(build(name, id, ProcessSpace::User(space), heap_base));

    let mut table = PROCESSES.lock();
    let slot = table
        .slots
        .iter_mut()
        .find(|s| s.is_none())
        .ok_or(VError::OutOfMemory)?;
    *slot = Some(proc.clone());
    Ok(proc)
}

pub fn get_by_id(id: u32) -> Option<Arc<Process>> {
    if id == 0 {
        return Some(kernel_process());
    }
    PROCESSES
        .lock()
        .slots
        .iter()
        .flatten()
        .find(|p| p.id == id)
        .cloned()
}

/// Drop an exited process's table entry.
pub fn reap(id: u32) {
    let mut table = PROCESSES.lock();
    for slot in table.slots.iter_mut() {
        if slot.as_ref().is_some_and(|p| p.id == id && p.has_exited()) {
            *slot = None;
        }
    }
}

/// The process context of the calling task: its own for user tasks, the
/// kernel process otherwise.
pub fn current() -> Arc<Process> {
    crate::sched::task::try_current()
        .and_then(|t| t.process.clone())
        .unwrap_or_else(kernel_process)
}

#[cfg(all(test, feature = "std"))]
pub(crate) mod testutil {
    use viper_utils::Once;

    /// Initialize the kernel process once for the whole test run.
    pub fn ensure_kernel_process() {
        static READY: Once<()> = Once::new();
        READY.call_once(|| super::init());
    }
}
