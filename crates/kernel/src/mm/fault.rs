//! Page-fault classification and disposition.
//!
//! The fault status code sits in ESR_EL1[5:0]:
//! - `0b0000xx` address-size fault at level xx
//! - `0b0001xx` translation fault at level xx
//! - `0b0010xx` access-flag fault at level xx
//! - `0b0011xx` permission fault at level xx
//! - `0b010000`..`0b010101` synchronous external abort
//! - `0b011000`..`0b011101` parity/ECC error
//! - `0b100001` alignment fault
//! - `0b110000` TLB conflict abort
//!
//! Kernel-mode faults are unrecoverable; user-mode faults terminate the
//! task. The classification layer is deliberately separable from the
//! disposition so translation/permission faults on valid VMAs can later
//! become demand paging and copy-on-write without touching it.

use crate::arch::exceptions::{self, ExceptionFrame};
use crate::sched::task;
use viper_hal::println;

/// Decoded fault class from DFSC/IFSC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    AddressSize,
    Translation,
    AccessFlag,
    Permission,
    External,
    Parity,
    Alignment,
    TlbConflict,
    Unknown,
}

impl FaultType {
    /// Diagnostic name; also the `kind=` token in `USERFAULT` lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::AddressSize => "address_size",
            Self::Translation => "translation",
            Self::AccessFlag => "access_flag",
            Self::Permission => "permission",
            Self::External => "external",
            Self::Parity => "parity",
            Self::Alignment => "alignment",
            Self::TlbConflict => "tlb_conflict",
            Self::Unknown => "unknown",
        }
    }
}

/// Everything a disposition decision needs, decoded once.
#[derive(Debug, Clone, Copy)]
pub struct FaultInfo {
    pub fault_addr: u64,
    pub pc: u64,
    pub esr: u64,
    pub fault_type: FaultType,
    /// Table level for faults that encode one; -1 otherwise.
    pub level: i8,
    pub is_instruction: bool,
    pub is_write: bool,
    pub is_user: bool,
}

#[inline]
fn fault_status(esr: u64) -> u32 {
    (esr & 0x3F) as u32
}

#[inline]
fn is_write_access(esr: u64) -> bool {
    // WnR is only meaningful for data aborts.
    esr & (1 << 6) != 0
}

fn classify_fault(fsc: u32) -> FaultType {
    match (fsc >> 2) & 0xF {
        0b0000 => return FaultType::AddressSize,
        0b0001 => return FaultType::Translation,
        0b0010 => return FaultType::AccessFlag,
        0b0011 => return FaultType::Permission,
        _ => {}
    }

    match fsc {
        0b010000..=0b010101 => FaultType::External,
        0b011000..=0b011101 => FaultType::Parity,
        0b100001 => FaultType::Alignment,
        0b110000 => FaultType::TlbConflict,
        _ => FaultType::Unknown,
    }
}

fn fault_level(fsc: u32) -> i8 {
    // The low two bits carry the level for the four classed fault kinds.
    if (fsc >> 2) & 0xF <= 3 {
        (fsc & 0x3) as i8
    } else {
        -1
    }
}

/// Decompose ESR/FAR/ELR into a [`FaultInfo`].
pub fn parse_fault(fault_addr: u64, esr: u64, pc: u64, is_instruction: bool, is_user: bool) -> FaultInfo {
    let fsc = fault_status(esr);
    FaultInfo {
        fault_addr,
        pc,
        esr,
        fault_type: classify_fault(fsc),
        level: fault_level(fsc),
        is_instruction,
        is_write: !is_instruction && is_write_access(esr),
        is_user,
    }
}

fn log_fault(info: &FaultInfo, task_name: &str) {
    log::warn!(
        "[page_fault] {} {} fault in '{}'",
        if info.is_user { "user" } else { "kernel" },
        if info.is_instruction { "instruction" } else { "data" },
        task_name
    );
    if info.level >= 0 {
        log::warn!(
            "[page_fault] type={} level={} addr={:#x} pc={:#x}",
            info.fault_type.name(),
            info.level,
            info.fault_addr,
            info.pc
        );
    } else {
        log::warn!(
            "[page_fault] type={} addr={:#x} pc={:#x}",
            info.fault_type.name(),
            info.fault_addr,
            info.pc
        );
    }
    if !info.is_instruction {
        log::warn!(
            "[page_fault] access={} esr={:#x}",
            if info.is_write { "write" } else { "read" },
            info.esr
        );
    }
}

/// A fault the kernel itself took: dump state and halt.
fn kernel_panic(info: &FaultInfo, frame: &ExceptionFrame) -> ! {
    println!(
        "\n!!! KERNEL PANIC: unhandled {} fault in kernel mode !!!",
        info.fault_type.name()
    );
    println!("address {:#x}, pc {:#x}", info.fault_addr, info.pc);
    exceptions::print_frame(frame);
    viper_hal::console::mirror_panic_line("KERNEL PANIC: page fault");
    println!("\nSystem halted.");
    crate::arch::aarch64::halt();
}

/// Entry from the synchronous exception path for data/instruction aborts.
///
/// Never returns: kernel faults halt, user faults terminate the task and
/// reschedule.
pub fn handle_page_fault(frame: &mut ExceptionFrame, is_instruction: bool) -> ! {
    let is_user = frame.from_user();
    let info = parse_fault(frame.far, frame.esr, frame.elr, is_instruction, is_user);

    let current = task::try_current();
    let name = current.as_ref().map(|t| t.name()).unwrap_or("<unknown>");
    log_fault(&info, name);

    if !is_user {
        kernel_panic(&info, frame);
    }

    exceptions::terminate_faulting_task(frame, info.fault_type.name());
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    fn esr_with_fsc(fsc: u32) -> u64 {
        fsc as u64
    }

    #[test]
    fn translation_fault_with_level() {
        for level in 0..4u32 {
            let info = parse_fault(0x0, esr_with_fsc(0b0001_00 | level), 0x1000, false, true);
            assert_eq!(info.fault_type, FaultType::Translation);
            assert_eq!(info.level, level as i8);
        }
    }

    #[test]
    fn classed_faults_decode() {
        assert_eq!(classify_fault(0b0000_01), FaultType::AddressSize);
        assert_eq!(classify_fault(0b0010_10), FaultType::AccessFlag);
        assert_eq!(classify_fault(0b0011_11), FaultType::Permission);
    }

    #[test]
    fn specific_codes_decode() {
        assert_eq!(classify_fault(0b010000), FaultType::External);
        assert_eq!(classify_fault(0b010011), FaultType::External);
        assert_eq!(classify_fault(0b011000), FaultType::Parity);
        assert_eq!(classify_fault(0b100001), FaultType::Alignment);
        assert_eq!(classify_fault(0b110000), FaultType::TlbConflict);
        assert_eq!(classify_fault(0b111111), FaultType::Unknown);
    }

    #[test]
    fn specific_codes_have_no_level() {
        let info = parse_fault(0, esr_with_fsc(0b100001), 0, false, true);
        assert_eq!(info.level, -1);
    }

    #[test]
    fn write_bit_only_for_data_aborts() {
        let esr = esr_with_fsc(0b0001_11) | (1 << 6);
        let data = parse_fault(0, esr, 0, false, true);
        assert!(data.is_write);
        let inst = parse_fault(0, esr, 0, true, true);
        assert!(!inst.is_write);
    }

    #[test]
    fn kind_token_matches_userfault_format() {
        assert_eq!(FaultType::Translation.name(), "translation");
        assert_eq!(FaultType::Permission.name(), "permission");
    }
}
