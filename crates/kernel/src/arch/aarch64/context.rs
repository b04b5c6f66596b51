//! Saved CPU context for the context switch.
//!
//! Only the callee-saved set plus SP is preserved; everything else is dead
//! across the function-call boundary that `context_switch` presents. The
//! layout is fixed by `context.S`.

/// Callee-saved register block. Offsets are load-bearing: `context.S`
/// addresses fields by byte offset.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskContext {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    /// Frame pointer.
    pub x29: u64,
    /// Link register; `ret` in the switch continues here.
    pub x30: u64,
    pub sp: u64,
}

impl TaskContext {
    pub const fn new() -> Self {
        Self {
            x19: 0,
            x20: 0,
            x21: 0,
            x22: 0,
            x23: 0,
            x24: 0,
            x25: 0,
            x26: 0,
            x27: 0,
            x28: 0,
            x29: 0,
            x30: 0,
            sp: 0,
        }
    }

    /// Prepare a first-run context: `sp` points at the two-slot
    /// (entry, arg) block the creator pushed, `x30` at the trampoline.
    pub fn first_run(trampoline: u64, sp: u64) -> Self {
        let mut ctx = Self::new();
        ctx.x30 = trampoline;
        ctx.sp = sp;
        ctx
    }
}

#[cfg(target_arch = "aarch64")]
unsafe extern "C" {
    /// Save the outgoing context into `old`, load `new`, and return into the
    /// incoming task. Implemented in `context.S`.
    pub fn context_switch(old: *mut TaskContext, new: *const TaskContext);

    /// First-entry point of newly created tasks (see `context.S`).
    pub fn task_entry_trampoline();
}

#[cfg(not(target_arch = "aarch64"))]
pub unsafe fn context_switch(_old: *mut TaskContext, _new: *const TaskContext) {
    // Host tests exercise queue logic, never a real switch.
}

#[cfg(not(target_arch = "aarch64"))]
pub fn task_entry_trampoline() {}

/// Address of the trampoline for seeding `x30` in a fresh context.
pub fn trampoline_addr() -> u64 {
    #[cfg(target_arch = "aarch64")]
    {
        task_entry_trampoline as usize as u64
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        task_entry_trampoline as usize as u64
    }
}
