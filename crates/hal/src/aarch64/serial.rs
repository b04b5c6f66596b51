//! PL011 UART driver for the QEMU `virt` board.
//!
//! QEMU's PL011 model comes up usable, so init is limited to making the
//! enable state explicit. Output spins on the TX-full flag; input is
//! non-blocking.

use super::memmap::UART0_BASE;

const UARTDR: usize = 0x000;
const UARTFR: usize = 0x018;
const UARTIBRD: usize = 0x024;
const UARTFBRD: usize = 0x028;
const UARTLCR_H: usize = 0x02C;
const UARTCR: usize = 0x030;

const FR_TXFF: u32 = 1 << 5;
const FR_RXFE: u32 = 1 << 4;

const LCR_FEN: u32 = 1 << 4;
const LCR_WLEN_8: u32 = 0b11 << 5;

const CR_UARTEN: u32 = 1 << 0;
const CR_TXE: u32 = 1 << 8;
const CR_RXE: u32 = 1 << 9;

#[cfg(target_arch = "aarch64")]
mod imp {
    use super::*;
    use core::ptr::{read_volatile, write_volatile};

    #[inline]
    fn reg(offset: usize) -> *mut u32 {
        (UART0_BASE + offset) as *mut u32
    }

    pub fn init() {
        // SAFETY: UART0_BASE is the PL011 MMIO window on QEMU virt.
        unsafe {
            write_volatile(reg(UARTCR), 0);
            // 115200 @ 24 MHz reference clock: IBRD=13, FBRD=1.
            write_volatile(reg(UARTIBRD), 13);
            write_volatile(reg(UARTFBRD), 1);
            write_volatile(reg(UARTLCR_H), LCR_FEN | LCR_WLEN_8);
            write_volatile(reg(UARTCR), CR_UARTEN | CR_TXE | CR_RXE);
        }
    }

    pub fn write_byte(b: u8) {
        // SAFETY: MMIO reads/writes of the PL011 data/flag registers.
        unsafe {
            while read_volatile(reg(UARTFR)) & FR_TXFF != 0 {
                core::hint::spin_loop();
            }
            write_volatile(reg(UARTDR), u32::from(b));
        }
    }

    pub fn read_byte() -> Option<u8> {
        // SAFETY: MMIO reads of the PL011 flag/data registers.
        unsafe {
            if read_volatile(reg(UARTFR)) & FR_RXFE != 0 {
                None
            } else {
                Some(read_volatile(reg(UARTDR)) as u8)
            }
        }
    }
}

#[cfg(not(target_arch = "aarch64"))]
mod imp {
    // Host-test stubs; console output is discarded.
    pub fn init() {}
    pub fn write_byte(_b: u8) {}
    pub fn read_byte() -> Option<u8> {
        None
    }
}

pub use imp::{init, read_byte, write_byte};

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn register_constants_match_pl011() {
        assert_eq!(UARTDR, 0x000);
        assert_eq!(UARTFR, 0x018);
        assert_eq!(FR_TXFF, 0x20);
        assert_eq!(FR_RXFE, 0x10);
    }
}
