//! Exception frame, classification, and the Rust halves of the vector stubs.
//!
//! The assembly in `vectors.S` saves the interrupted context into an
//! [`ExceptionFrame`] and calls one of the `handle_*` functions below with a
//! pointer to it. Handlers may mutate the frame; the restore path writes it
//! back before `eret`.
//!
//! Faults from kernel mode are unrecoverable and halt with a register dump.
//! Faults from user mode terminate the offending task and the system keeps
//! running.

use crate::sched::task;
use viper_hal::println;

/// Snapshot of the interrupted CPU state, written by `vectors.S`.
///
/// `regs[0..=30]` are x0..x30; `sp` is the interrupted level's stack pointer
/// (SP_EL0 for lower-EL entries). Writing `regs[0..=3]` is how syscalls
/// return results.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExceptionFrame {
    pub regs: [u64; 31],
    pub sp: u64,
    pub elr: u64,
    pub spsr: u64,
    pub esr: u64,
    pub far: u64,
}

impl ExceptionFrame {
    pub const fn zeroed() -> Self {
        Self {
            regs: [0; 31],
            sp: 0,
            elr: 0,
            spsr: 0,
            esr: 0,
            far: 0,
        }
    }

    /// Syscall number from x8.
    #[inline]
    pub fn syscall_number(&self) -> u32 {
        self.regs[8] as u32
    }

    /// Syscall argument `n` (0..=5) from x0..x5.
    #[inline]
    pub fn arg(&self, n: usize) -> u64 {
        self.regs[n]
    }

    /// Store syscall results per the ABI: x0 = VError, x1..x3 = values.
    #[inline]
    pub fn set_syscall_result(&mut self, verr: i64, res0: u64, res1: u64, res2: u64) {
        self.regs[0] = verr as u64;
        self.regs[1] = res0;
        self.regs[2] = res1;
        self.regs[3] = res2;
    }

    /// True when the frame was captured from EL0 (SPSR.M[3:0] == 0).
    #[inline]
    pub fn from_user(&self) -> bool {
        self.spsr & 0xF == 0
    }
}

/// ESR_EL1 exception class values the kernel recognizes.
pub mod ec {
    pub const UNKNOWN: u32 = 0x00;
    pub const WFI_WFE: u32 = 0x01;
    pub const ILLEGAL_STATE: u32 = 0x0E;
    pub const SVC_A64: u32 = 0x15;
    pub const INST_ABORT_LOWER: u32 = 0x20;
    pub const INST_ABORT_SAME: u32 = 0x21;
    pub const PC_ALIGN: u32 = 0x22;
    pub const DATA_ABORT_LOWER: u32 = 0x24;
    pub const DATA_ABORT_SAME: u32 = 0x25;
    pub const SP_ALIGN: u32 = 0x26;
    pub const BRK_A64: u32 = 0x3C;
}

/// Extract ESR_EL1.EC.
#[inline]
pub fn exception_class(esr: u64) -> u32 {
    ((esr >> 26) & 0x3F) as u32
}

/// Human-readable exception class name for diagnostics.
pub fn exception_class_name(class: u32) -> &'static str {
    match class {
        ec::UNKNOWN => "unknown",
        ec::WFI_WFE => "wfi/wfe trap",
        ec::ILLEGAL_STATE => "illegal execution state",
        ec::SVC_A64 => "svc (aarch64)",
        ec::INST_ABORT_LOWER => "instruction abort (lower EL)",
        ec::INST_ABORT_SAME => "instruction abort (same EL)",
        ec::PC_ALIGN => "pc alignment fault",
        ec::DATA_ABORT_LOWER => "data abort (lower EL)",
        ec::DATA_ABORT_SAME => "data abort (same EL)",
        ec::SP_ALIGN => "sp alignment fault",
        ec::BRK_A64 => "brk (aarch64)",
        _ => "other",
    }
}

/// Install the vector table into VBAR_EL1.
#[cfg(target_arch = "aarch64")]
pub fn init() {
    use aarch64_cpu::registers::{VBAR_EL1, Writeable};

    unsafe extern "C" {
        static exception_vectors: u8;
    }
    // SAFETY: taking the address of a linker-provided symbol.
    let base = unsafe { core::ptr::addr_of!(exception_vectors) as u64 };
    VBAR_EL1.set(base);
    aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);
    log::info!("[exceptions] vector table installed at {:#x}", base);
}

#[cfg(not(target_arch = "aarch64"))]
pub fn init() {}

/// Dump the frame to the serial console. Fatal paths only.
pub fn print_frame(frame: &ExceptionFrame) {
    println!("\n=== EXCEPTION FRAME ===");
    println!("ELR:  {:#018x}", frame.elr);
    println!("SPSR: {:#018x}", frame.spsr);
    println!("ESR:  {:#018x}", frame.esr);
    println!("FAR:  {:#018x}", frame.far);
    println!("SP:   {:#018x}", frame.sp);
    for i in (0..30).step_by(2) {
        println!(
            "x{:02}: {:#018x}  x{:02}: {:#018x}",
            i,
            frame.regs[i],
            i + 1,
            frame.regs[i + 1]
        );
    }
    println!("x30: {:#018x}", frame.regs[30]);
    println!("=======================");
}

/// Unrecoverable kernel-mode exception: dump, mirror to the graphics
/// console, halt.
fn kernel_fatal(frame: &ExceptionFrame, what: &str) -> ! {
    println!("\n!!! KERNEL PANIC: {} !!!", what);
    print_frame(frame);
    viper_hal::console::mirror_panic_line("KERNEL PANIC");
    viper_hal::console::mirror_panic_line(what);
    println!("\nSystem halted.");
    super::halt();
}

/// Terminate a user task that hit a fatal exception. Logs the single
/// `USERFAULT` line the rest of the system keys on, then exits the task and
/// reschedules; the system survives.
pub fn terminate_faulting_task(frame: &ExceptionFrame, kind: &str) -> ! {
    let current = task::try_current();
    let (pid, tid) = current
        .as_ref()
        .map(|t| (t.process_id(), t.id))
        .unwrap_or((0, 0));

    println!(
        "USERFAULT pid={} tid={} pc={:#x} far={:#x} esr={:#x} kind={}",
        pid, tid, frame.elr, frame.far, frame.esr, kind
    );
    if let Some(t) = &current {
        log::warn!("[fault] Task '{}' terminated", t.name());
    }

    task::exit(-1);
}

// ---------------------------------------------------------------------------
// Vector stub targets (called from vectors.S)
// ---------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
mod handlers {
    use super::*;
    use crate::mm::fault;

    #[unsafe(no_mangle)]
    extern "C" fn handle_el1_sync(frame: *mut ExceptionFrame) {
        // SAFETY: vectors.S passes a frame it owns on the current stack; the
        // reference does not outlive this call.
        let frame = unsafe { &mut *frame };
        let class = exception_class(frame.esr);

        match class {
            ec::SVC_A64 => crate::syscall::dispatch(frame),
            ec::DATA_ABORT_SAME => fault::handle_page_fault(frame, false),
            ec::INST_ABORT_SAME => fault::handle_page_fault(frame, true),
            _ => {
                let what = exception_class_name(class);
                println!("\n!!! SYNCHRONOUS EXCEPTION (EL1): {} !!!", what);
                kernel_fatal(frame, what);
            }
        }
    }

    #[unsafe(no_mangle)]
    extern "C" fn handle_el1_irq(_frame: *mut ExceptionFrame) {
        viper_hal::gic::handle_irq();
    }

    #[unsafe(no_mangle)]
    extern "C" fn handle_fiq(_frame: *mut ExceptionFrame) {
        // FIQ is unused on this platform.
        log::warn!("[exceptions] unexpected FIQ");
    }

    #[unsafe(no_mangle)]
    extern "C" fn handle_el1_serror(frame: *mut ExceptionFrame) {
        let frame = unsafe { &mut *frame };
        kernel_fatal(frame, "SError (system error)");
    }

    #[unsafe(no_mangle)]
    extern "C" fn handle_el0_sync(frame: *mut ExceptionFrame) {
        let frame = unsafe { &mut *frame };
        let class = exception_class(frame.esr);

        match class {
            ec::SVC_A64 => crate::syscall::dispatch(frame),
            ec::DATA_ABORT_LOWER => fault::handle_page_fault(frame, false),
            ec::INST_ABORT_LOWER => fault::handle_page_fault(frame, true),
            ec::PC_ALIGN => terminate_faulting_task(frame, "pc_alignment"),
            ec::SP_ALIGN => terminate_faulting_task(frame, "sp_alignment"),
            ec::UNKNOWN => terminate_faulting_task(frame, "illegal_instruction"),
            ec::ILLEGAL_STATE => terminate_faulting_task(frame, "illegal_state"),
            ec::BRK_A64 => terminate_faulting_task(frame, "breakpoint"),
            _ => {
                log::warn!(
                    "[fault] unknown user exception EC={:#x} ({})",
                    class,
                    exception_class_name(class)
                );
                terminate_faulting_task(frame, "unknown");
            }
        }
    }

    #[unsafe(no_mangle)]
    extern "C" fn handle_el0_irq(_frame: *mut ExceptionFrame) {
        viper_hal::gic::handle_irq();
    }

    #[unsafe(no_mangle)]
    extern "C" fn handle_el0_serror(frame: *mut ExceptionFrame) {
        let frame = unsafe { &mut *frame };
        terminate_faulting_task(frame, "serror");
    }

    #[unsafe(no_mangle)]
    extern "C" fn handle_invalid_entry(frame: *mut ExceptionFrame) {
        let frame = unsafe { &mut *frame };
        println!("\n!!! INVALID EXCEPTION ENTRY !!!");
        kernel_fatal(frame, "exception from an unsupported origin");
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn frame_layout_matches_vectors_s() {
        assert_eq!(size_of::<ExceptionFrame>(), 288);
        assert_eq!(offset_of!(ExceptionFrame, sp), 248);
        assert_eq!(offset_of!(ExceptionFrame, elr), 256);
        assert_eq!(offset_of!(ExceptionFrame, spsr), 264);
        assert_eq!(offset_of!(ExceptionFrame, esr), 272);
        assert_eq!(offset_of!(ExceptionFrame, far), 280);
    }

    #[test]
    fn classification_reads_ec_field() {
        assert_eq!(exception_class((ec::SVC_A64 as u64) << 26), ec::SVC_A64);
        assert_eq!(
            exception_class(((ec::DATA_ABORT_LOWER as u64) << 26) | 0x7),
            ec::DATA_ABORT_LOWER
        );
    }

    #[test]
    fn spsr_mode_detects_origin() {
        let mut f = ExceptionFrame::zeroed();
        f.spsr = 0; // EL0t
        assert!(f.from_user());
        f.spsr = 0x5; // EL1h
        assert!(!f.from_user());
    }

    #[test]
    fn syscall_result_lands_in_x0_to_x3() {
        let mut f = ExceptionFrame::zeroed();
        f.set_syscall_result(-5, 1, 2, 3);
        assert_eq!(f.regs[0] as i64, -5);
        assert_eq!(f.regs[1], 1);
        assert_eq!(f.regs[2], 2);
        assert_eq!(f.regs[3], 3);
    }
}
