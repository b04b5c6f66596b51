//! Task control blocks, the fixed task table, kernel stacks, and lifecycle.
//!
//! Tasks are `Arc`s handed between the table (which owns a slot per live
//! task), the ready queue, and wait queues. Kernel stacks come from a fixed
//! pool with a 4 KiB unmapped guard page below each 16 KiB usable region;
//! stacks of reaped tasks go onto a free list and are handed out again.

use crate::arch::context::{self, TaskContext};
use crate::arch::usermode;
use crate::config;
use crate::mm::vmm;
use crate::proc::Process;
use crate::sched::signal::SignalState;
use crate::sched::{scheduler, wait::WaitQueue};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use viper_abi::TaskFlags;
use viper_abi::signal::{SIGCONT, SIGKILL, SIGSTOP, SIGTERM};
use viper_abi::{TaskInfo, VError, VResult};
use viper_hal::IrqSafeLock;

pub const MAX_TASKS: usize = 64;
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;
pub const GUARD_PAGE_SIZE: usize = config::PAGE_SIZE;
const STACK_SLOT_SIZE: usize = KERNEL_STACK_SIZE + GUARD_PAGE_SIZE;

/// Default slice in timer ticks (10 ms at 1 kHz).
pub const TIME_SLICE_DEFAULT: u32 = 10;
/// Fixed slice for `SCHED_RR`.
pub const RT_TIME_SLICE_DEFAULT: u32 = 5;

pub const PRIORITY_DEFAULT: u8 = 128;
pub const PRIORITY_LOWEST: u8 = 255;

/// Lifecycle state. Numeric values are the ABI task-state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Invalid = 0,
    Ready = 1,
    Running = 2,
    Blocked = 3,
    Exited = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Blocked,
            4 => Self::Exited,
            _ => Self::Invalid,
        }
    }
}

/// Scheduling class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedPolicy {
    /// Priority-derived time slicing.
    Other = 0,
    /// Runs until it yields or blocks.
    Fifo = 1,
    /// Fixed real-time slice.
    Rr = 2,
}

impl SchedPolicy {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Other),
            1 => Some(Self::Fifo),
            2 => Some(Self::Rr),
            _ => None,
        }
    }
}

/// Slice length for `SCHED_OTHER` tasks by priority band.
pub fn time_slice_for_priority(priority: u8) -> u32 {
    match priority {
        0..=63 => 20,
        64..=127 => 15,
        128..=191 => 10,
        _ => 5,
    }
}

/// Kernel task entry point. C ABI so the assembly trampoline's `blr` finds
/// the argument where it put it.
pub type TaskEntry = extern "C" fn(arg: usize);

/// Task control block.
pub struct Task {
    pub id: u32,
    name: [u8; 32],
    state: AtomicU8,
    pub flags: TaskFlags,
    priority: AtomicU8,
    policy: AtomicU8,
    time_slice: AtomicU32,
    /// Saved callee-saved context. Only the scheduler touches this, with
    /// IRQs masked, which is what makes the `UnsafeCell` sound.
    context: UnsafeCell<TaskContext>,
    /// Usable stack base (guard page sits just below).
    pub kernel_stack: u64,
    pub kernel_stack_top: u64,
    /// `*const WaitQueue` of the queue currently holding this task; 0 when
    /// none. Diagnostic and kill-path backlink.
    wait_channel: AtomicUsize,
    exit_code: AtomicI32,
    pub cpu_ticks: AtomicU64,
    pub switch_count: AtomicU64,
    pub parent_id: u32,
    /// Owning process for user tasks.
    pub process: Option<Arc<Process>>,
    pub user_entry: u64,
    pub user_stack: u64,
    pub cwd: IrqSafeLock<String>,
    pub signals: IrqSafeLock<SignalState>,
    /// Woken when this task exits (join/wait).
    pub exit_waiters: WaitQueue,
}

// SAFETY: the UnsafeCell'd context is only accessed by the context-switch
// path with IRQs masked on a single CPU; every other field is atomic or
// lock-guarded.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    pub fn name(&self) -> &str {
        viper_utils::name_str(&self.name)
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_priority(&self, priority: u8) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn policy(&self) -> SchedPolicy {
        SchedPolicy::from_u8(self.policy.load(Ordering::Relaxed)).unwrap_or(SchedPolicy::Other)
    }

    pub fn set_policy(&self, policy: SchedPolicy) {
        self.policy.store(policy as u8, Ordering::Relaxed);
        self.reset_time_slice();
    }

    pub fn time_slice(&self) -> u32 {
        self.time_slice.load(Ordering::Relaxed)
    }

    pub fn tick_time_slice(&self) -> u32 {
        let cur = self.time_slice.load(Ordering::Relaxed);
        if cur > 0 {
            self.time_slice.store(cur - 1, Ordering::Relaxed);
            cur - 1
        } else {
            0
        }
    }

    /// Reset the slice according to policy and priority.
    pub fn reset_time_slice(&self) {
        let slice = match self.policy() {
            SchedPolicy::Fifo => u32::MAX,
            SchedPolicy::Rr => RT_TIME_SLICE_DEFAULT,
            SchedPolicy::Other => time_slice_for_priority(self.priority()),
        };
        self.time_slice.store(slice, Ordering::Relaxed);
    }

    pub fn wait_channel(&self) -> usize {
        self.wait_channel.load(Ordering::Acquire)
    }

    pub fn set_wait_channel(&self, wq: usize) {
        self.wait_channel.store(wq, Ordering::Release);
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire)
    }

    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::Release);
    }

    /// Process id for diagnostics: the owning process's id, or the task id
    /// for kernel tasks.
    pub fn process_id(&self) -> u32 {
        self.process.as_ref().map(|p| p.id).unwrap_or(self.id)
    }

    pub(crate) fn context_ptr(&self) -> *mut TaskContext {
        self.context.get()
    }

    pub fn snapshot(&self) -> TaskInfo {
        let mut info = TaskInfo::default();
        info.id = self.id;
        info.state = self.state() as u8;
        info.flags = self.flags.bits();
        info.priority = self.priority();
        viper_utils::copy_name(&mut info.name, self.name());
        info.cpu_ticks = self.cpu_ticks.load(Ordering::Relaxed);
        info.switch_count = self.switch_count.load(Ordering::Relaxed);
        info.parent_id = self.parent_id;
        info.exit_code = self.exit_code();
        info
    }
}

// ---------------------------------------------------------------------------
// Kernel stack pool
// ---------------------------------------------------------------------------

struct StackPool {
    next_offset: usize,
    free: Vec<u64>,
}

static STACK_POOL: IrqSafeLock<StackPool> = IrqSafeLock::new(StackPool {
    next_offset: 0,
    free: Vec::new(),
});

#[cfg(target_arch = "aarch64")]
fn stack_pool_base() -> u64 {
    config::STACK_POOL_BASE
}

#[cfg(not(target_arch = "aarch64"))]
fn stack_pool_base() -> u64 {
    use viper_utils::Once;
    static HOST_POOL: Once<u64> = Once::new();
    *HOST_POOL.call_once(|| {
        let buf = alloc::vec![0u8; STACK_SLOT_SIZE * (MAX_TASKS + 1)].leak();
        let raw = buf.as_mut_ptr() as u64;
        (raw + config::PAGE_SIZE as u64 - 1) & !(config::PAGE_SIZE as u64 - 1)
    })
}

/// Hand out a kernel stack: recycled from the free list when possible,
/// otherwise carved off the pool with its guard page unmapped.
///
/// Slot layout, low to high:
/// guard page (unmapped, faults on overflow) | 16 KiB usable stack.
fn allocate_kernel_stack() -> Option<u64> {
    let mut pool = STACK_POOL.lock();

    if let Some(base) = pool.free.pop() {
        return Some(base);
    }

    if pool.next_offset + STACK_SLOT_SIZE > STACK_SLOT_SIZE * MAX_TASKS {
        log::error!("[task] kernel stack pool exhausted");
        return None;
    }

    let slot_base = stack_pool_base() + pool.next_offset as u64;
    pool.next_offset += STACK_SLOT_SIZE;
    drop(pool);

    // Overflowing the stack must fault instead of silently corrupting the
    // neighbor slot.
    vmm::unmap_page(slot_base);

    Some(slot_base + GUARD_PAGE_SIZE as u64)
}

fn free_kernel_stack(base: u64) {
    STACK_POOL.lock().free.push(base);
}

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

struct TaskTable {
    slots: [Option<Arc<Task>>; MAX_TASKS],
    next_id: u32,
}

static TASKS: IrqSafeLock<TaskTable> = IrqSafeLock::new(TaskTable {
    slots: [const { None }; MAX_TASKS],
    next_id: 1,
});

static CURRENT: IrqSafeLock<Option<Arc<Task>>> = IrqSafeLock::new(None);

/// Woken whenever any task exits; `task_wait` blocks here.
static CHILD_WAIT: WaitQueue = WaitQueue::new();

/// The running task. Panics before the scheduler owns a current task.
pub fn current() -> Arc<Task> {
    match try_current() {
        Some(t) => t,
        None => panic!("task::current() before scheduler init"),
    }
}

pub fn try_current() -> Option<Arc<Task>> {
    CURRENT.lock().as_ref().cloned()
}

pub(crate) fn set_current(t: Arc<Task>) {
    *CURRENT.lock() = Some(t);
}

/// Look up a live task by id.
pub fn get_by_id(id: u32) -> Option<Arc<Task>> {
    let table = TASKS.lock();
    table
        .slots
        .iter()
        .flatten()
        .find(|t| t.id == id && t.state() != TaskState::Invalid)
        .cloned()
}

fn build_task(
    name: &str,
    flags: TaskFlags,
    stack_base: u64,
    context: TaskContext,
    process: Option<Arc<Process>>,
    user_entry: u64,
    user_stack: u64,
) -> Task {
    let mut name_buf = [0u8; 32];
    viper_utils::copy_name(&mut name_buf, name);

    let parent = try_current();
    let cwd = parent
        .as_ref()
        .map(|p| p.cwd.lock().clone())
        .unwrap_or_else(|| String::from("/"));

    Task {
        id: 0, // assigned on insert
        name: name_buf,
        state: AtomicU8::new(TaskState::Ready as u8),
        flags,
        priority: AtomicU8::new(PRIORITY_DEFAULT),
        policy: AtomicU8::new(SchedPolicy::Other as u8),
        time_slice: AtomicU32::new(TIME_SLICE_DEFAULT),
        context: UnsafeCell::new(context),
        kernel_stack: stack_base,
        kernel_stack_top: stack_base + KERNEL_STACK_SIZE as u64,
        wait_channel: AtomicUsize::new(0),
        exit_code: AtomicI32::new(0),
        cpu_ticks: AtomicU64::new(0),
        switch_count: AtomicU64::new(0),
        parent_id: parent.map(|p| p.id).unwrap_or(0),
        process,
        user_entry,
        user_stack,
        cwd: IrqSafeLock::new(cwd),
        signals: IrqSafeLock::new(SignalState::new()),
        exit_waiters: WaitQueue::new(),
    }
}

fn insert(mut task: Task, fixed_id: Option<u32>) -> Option<Arc<Task>> {
    let mut table = TASKS.lock();
    let slot = table.slots.iter().position(|s| s.is_none())?;
    task.id = match fixed_id {
        Some(id) => id,
        None => {
            let id = table.next_id;
            table.next_id += 1;
            id
        }
    };
    let arc = Arc::new(task);
    table.slots[slot] = Some(arc.clone());
    Some(arc)
}

/// Seed the stack with the (entry, arg) pair the trampoline pops, and build
/// the first-run context.
fn seed_stack(stack_top: u64, entry: u64, arg: u64) -> TaskContext {
    let sp = stack_top - 16;
    // SAFETY: the two slots below the stack top belong to this brand-new
    // stack and nothing else references them yet.
    unsafe {
        let p = sp as *mut u64;
        p.write(entry);
        p.add(1).write(arg);
    }
    TaskContext::first_run(context::trampoline_addr(), sp)
}

/// Create a kernel task ready to be enqueued. `None` when the table or the
/// stack pool is exhausted.
pub fn create(name: &str, entry: TaskEntry, arg: usize, flags: TaskFlags) -> Option<Arc<Task>> {
    let stack = allocate_kernel_stack()?;
    let stack_top = stack + KERNEL_STACK_SIZE as u64;
    let context = seed_stack(stack_top, entry as usize as u64, arg as u64);

    let task = build_task(
        name,
        flags | TaskFlags::KERNEL,
        stack,
        context,
        None,
        0,
        0,
    );
    let arc = insert(task, None);
    if arc.is_none() {
        free_kernel_stack(stack);
        log::error!("[task] no free task slots");
    }
    arc
}

/// First-scheduled body of a user task: install the address space, flush
/// its ASID, and drop to EL0. Does not return.
extern "C" fn user_task_entry(_arg: usize) {
    let t = current();
    let Some(process) = t.process.as_ref() else {
        panic!("user task without a process");
    };

    log::debug!(
        "[task] '{}' entering user mode at {:#x}",
        t.name(),
        t.user_entry
    );

    process.addr_space.switch_to();

    // SAFETY: entry/stack were validated at creation; the transition never
    // returns.
    unsafe { usermode::enter_user_mode(t.user_entry, t.user_stack, 0) };
}

/// Create a user task bound to `process`. The kernel stack carries syscalls
/// and exceptions; `entry`/`stack` are EL0 addresses.
pub fn create_user_task(
    name: &str,
    process: Arc<Process>,
    entry: u64,
    stack: u64,
) -> Option<Arc<Task>> {
    let kstack = allocate_kernel_stack()?;
    let stack_top = kstack + KERNEL_STACK_SIZE as u64;
    let context = seed_stack(stack_top, user_task_entry as usize as u64, 0);

    let task = build_task(
        name,
        TaskFlags::USER,
        kstack,
        context,
        Some(process),
        entry,
        stack,
    );
    let arc = insert(task, None);
    if arc.is_none() {
        free_kernel_stack(kstack);
        log::error!("[task] no free task slots for user task");
    } else if let Some(t) = &arc {
        log::info!("[task] created user task '{}' (id={})", t.name(), t.id);
    }
    arc
}

/// Create the idle task (id 0). Runs `wfi` forever at the lowest priority
/// and never appears on the ready queue.
pub fn init() {
    extern "C" fn idle_body(_arg: usize) {
        loop {
            viper_hal::timer::wait_for_interrupt();
        }
    }

    let stack = match allocate_kernel_stack() {
        Some(s) => s,
        None => panic!("cannot allocate idle stack"),
    };
    let stack_top = stack + KERNEL_STACK_SIZE as u64;
    let context = seed_stack(stack_top, idle_body as usize as u64, 0);

    let idle = build_task(
        "idle",
        TaskFlags::KERNEL | TaskFlags::IDLE,
        stack,
        context,
        None,
        0,
        0,
    );
    idle.set_priority(PRIORITY_LOWEST);

    let arc = match insert(idle, Some(0)) {
        Some(a) => a,
        None => panic!("task table full at init"),
    };
    scheduler::set_idle(arc);
    log::info!("[task] task subsystem initialized");
}

/// Terminate the calling task. Never returns.
pub fn exit(code: i32) -> ! {
    let t = current();
    log::debug!("[task] '{}' exiting with code {}", t.name(), code);

    if let Some(p) = &t.process {
        p.mark_exited(code);
    }

    crate::ipc::poll::clear_task_waiters(&t);

    t.set_exit_code(code);
    t.set_state(TaskState::Exited);
    t.exit_waiters.wake_all();
    CHILD_WAIT.wake_all();

    scheduler::yield_now();

    // An exited task must never be rescheduled.
    panic!("exited task '{}' was rescheduled", t.name());
}

/// Called by the assembly trampoline when a task's entry function returns.
#[unsafe(no_mangle)]
pub extern "C" fn task_exit_on_return() {
    exit(0);
}

pub fn yield_now() {
    scheduler::yield_now();
}

/// Pull a blocked task out of its wait queue and make it runnable.
pub fn wakeup(t: &Arc<Task>) -> bool {
    if t.state() != TaskState::Blocked {
        return false;
    }

    let wq = t.wait_channel();
    if wq != 0 {
        // SAFETY: queues registered in wait_channel are statics or live in
        // structures that outlive every task blocked on them; the pointer
        // was stored by WaitQueue::enqueue and cleared on dequeue.
        unsafe { (*(wq as *const WaitQueue)).dequeue(t) };
    }

    t.set_state(TaskState::Ready);
    scheduler::enqueue(t.clone());
    true
}

/// Deliver a termination-class signal to `pid`.
///
/// SIGKILL/SIGTERM: wake the target if blocked, then terminate it (via
/// `exit` when it is the caller). SIGSTOP/SIGCONT are accepted as no-ops.
pub fn kill(pid: u32, sig: i32) -> VResult<()> {
    let t = get_by_id(pid).ok_or(VError::NotFound)?;

    if t.flags.contains(TaskFlags::IDLE) {
        log::warn!("[task] refusing to kill the idle task");
        return Err(VError::Denied);
    }

    match sig {
        SIGKILL | SIGTERM => {
            log::info!("[task] killing '{}' (id={}) with signal {}", t.name(), pid, sig);

            if t.state() == TaskState::Blocked {
                wakeup(&t);
            }

            if let Some(cur) = try_current()
                && Arc::ptr_eq(&cur, &t)
            {
                exit(-sig);
            }

            if let Some(p) = &t.process {
                p.mark_exited(-sig);
            }
            t.set_exit_code(-sig);
            t.set_state(TaskState::Exited);
            t.exit_waiters.wake_all();
            CHILD_WAIT.wake_all();
            Ok(())
        }
        SIGSTOP | SIGCONT => Ok(()),
        _ => {
            t.signals.lock().raise(sig as usize);
            Ok(())
        }
    }
}

/// Block until `pid` exits; returns its exit code.
///
/// Prepare-check-abort: the waiter enqueues itself before re-testing the
/// exit state, so an exit that lands between the test and the sleep still
/// finds the waiter on the queue.
pub fn join(pid: u32) -> VResult<i32> {
    loop {
        let t = get_by_id(pid).ok_or(VError::NotFound)?;
        if t.state() == TaskState::Exited {
            return Ok(t.exit_code());
        }

        let me = current();
        t.exit_waiters.enqueue(me.clone());
        if t.state() == TaskState::Exited {
            t.exit_waiters.dequeue(&me);
            me.set_state(TaskState::Running);
            continue;
        }
        scheduler::yield_now();
    }
}

/// Block until any child of the caller exits; reaps it and returns
/// `(id, exit_code)`.
pub fn wait_any() -> VResult<(u32, i32)> {
    let me = current().id;
    loop {
        let found = {
            let table = TASKS.lock();
            table
                .slots
                .iter()
                .flatten()
                .find(|t| t.parent_id == me && t.state() == TaskState::Exited)
                .cloned()
        };
        if let Some(t) = found {
            let result = (t.id, t.exit_code());
            reap_task(&t);
            return Ok(result);
        }

        // No child at all means the wait can never complete.
        let has_children = TASKS
            .lock()
            .slots
            .iter()
            .flatten()
            .any(|t| t.parent_id == me && t.state() != TaskState::Invalid);
        if !has_children {
            return Err(VError::NotFound);
        }

        // Enqueue before the final re-check so a child exit in between
        // still wakes this task.
        let waiter = current();
        CHILD_WAIT.enqueue(waiter.clone());
        let exited_child = TASKS
            .lock()
            .slots
            .iter()
            .flatten()
            .any(|t| t.parent_id == me && t.state() == TaskState::Exited);
        if exited_child {
            CHILD_WAIT.dequeue(&waiter);
            waiter.set_state(TaskState::Running);
            continue;
        }
        scheduler::yield_now();
    }
}

fn reap_task(t: &Arc<Task>) {
    let mut table = TASKS.lock();
    if let Some(slot) = table
        .slots
        .iter_mut()
        .find(|s| s.as_ref().is_some_and(|x| Arc::ptr_eq(x, t)))
    {
        *slot = None;
    }
    drop(table);
    free_kernel_stack(t.kernel_stack);
}

/// Reclaim every exited task's slot and stack. Runs from idle or on demand.
pub fn reap_exited() -> u32 {
    let mut reaped = 0;
    loop {
        let victim = {
            let table = TASKS.lock();
            table
                .slots
                .iter()
                .flatten()
                .filter(|t| !t.flags.contains(TaskFlags::IDLE))
                .find(|t| {
                    t.state() == TaskState::Exited
                        && try_current().is_none_or(|c| !Arc::ptr_eq(&c, t))
                })
                .cloned()
        };
        match victim {
            Some(t) => {
                log::debug!("[task] reaping '{}' (id={})", t.name(), t.id);
                reap_task(&t);
                reaped += 1;
            }
            None => return reaped,
        }
    }
}

/// Snapshot live tasks into `buf`; returns the number written.
pub fn list_tasks(buf: &mut [TaskInfo]) -> usize {
    let table = TASKS.lock();
    let mut n = 0;
    for t in table.slots.iter().flatten() {
        if n >= buf.len() {
            break;
        }
        if t.state() != TaskState::Invalid {
            buf[n] = t.snapshot();
            n += 1;
        }
    }
    n
}

#[cfg(all(test, feature = "std"))]
pub(crate) mod testutil {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Serializes tests that touch the global scheduler/ready-queue state.
    static SCHED_TEST_LOCK: Mutex<()> = Mutex::new(());

    pub fn sched_test_guard() -> MutexGuard<'static, ()> {
        SCHED_TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    extern "C" fn nop_entry(_arg: usize) {}

    /// A task with a real stack slot but outside the table and queues.
    pub fn spawn_detached(name: &str) -> Arc<Task> {
        spawn_detached_flags(name, TaskFlags::KERNEL)
    }

    pub fn spawn_detached_flags(name: &str, flags: TaskFlags) -> Arc<Task> {
        let stack = allocate_kernel_stack().expect("stack pool");
        let top = stack + KERNEL_STACK_SIZE as u64;
        let context = seed_stack(top, nop_entry as usize as u64, 0);
        Arc::new(build_task(name, flags, stack, context, None, 0, 0))
    }

    pub fn force_current(t: Arc<Task>) {
        t.set_state(TaskState::Running);
        set_current(t);
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use testutil::*;

    #[test]
    fn create_fills_table_and_reuses_stacks() {
        let _g = sched_test_guard();

        let a = create("tt-a", dummy_entry(), 0, TaskFlags::empty()).unwrap();
        assert_ne!(a.id, 0);
        assert_eq!(a.state(), TaskState::Ready);
        assert!(a.flags.contains(TaskFlags::KERNEL));
        let stack = a.kernel_stack;
        assert_eq!(a.kernel_stack_top - stack, KERNEL_STACK_SIZE as u64);

        // Exit + reap returns the stack to the pool; the next create gets it
        // back (LIFO free list).
        a.set_state(TaskState::Exited);
        assert!(reap_exited() >= 1);
        let b = create("tt-b", dummy_entry(), 0, TaskFlags::empty()).unwrap();
        assert_eq!(b.kernel_stack, stack);

        b.set_state(TaskState::Exited);
        reap_exited();
    }

    #[test]
    fn snapshot_reflects_fields() {
        let _g = sched_test_guard();
        let t = spawn_detached("snapshot-me");
        t.set_priority(42);
        t.cpu_ticks.store(7, Ordering::Relaxed);
        let info = t.snapshot();
        assert_eq!(info.priority, 42);
        assert_eq!(info.cpu_ticks, 7);
        assert_eq!(viper_utils::name_str(&info.name), "snapshot-me");
        assert_eq!(info.state, TaskState::Ready as u8);
    }

    #[test]
    fn policy_changes_reset_slice() {
        let _g = sched_test_guard();
        let t = spawn_detached("policy");
        t.set_policy(SchedPolicy::Fifo);
        assert_eq!(t.time_slice(), u32::MAX);
        t.set_policy(SchedPolicy::Rr);
        assert_eq!(t.time_slice(), RT_TIME_SLICE_DEFAULT);
        t.set_policy(SchedPolicy::Other);
        assert_eq!(t.time_slice(), time_slice_for_priority(t.priority()));
    }

    #[test]
    fn slice_for_priority_is_monotone() {
        assert!(time_slice_for_priority(0) >= time_slice_for_priority(100));
        assert!(time_slice_for_priority(100) >= time_slice_for_priority(200));
        assert_eq!(time_slice_for_priority(PRIORITY_DEFAULT), TIME_SLICE_DEFAULT);
    }

    fn dummy_entry() -> TaskEntry {
        extern "C" fn f(_a: usize) {}
        f
    }
}
