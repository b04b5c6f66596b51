//! Serial console facade and the kernel's `print!` / `println!` macros.
//!
//! Serial is the authoritative log; everything the kernel reports flows
//! through here. A graphics console, when present, can mirror panic output
//! by registering a [`PanicMirror`].

use crate::IrqSafeLock;
use crate::aarch64::serial;
use core::fmt::{self, Write};

pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                serial::write_byte(b'\r');
            }
            serial::write_byte(b);
        }
        Ok(())
    }
}

/// Global console writer. IRQ-safe: handlers log through the same lock an
/// interrupted task may hold, so the guard must mask interrupts.
pub static WRITER: IrqSafeLock<ConsoleWriter> = IrqSafeLock::new(ConsoleWriter);

/// Hook a secondary sink (e.g. the graphics console) for panic mirroring.
pub trait PanicMirror: Sync {
    /// Render a panic line; implementations choose their own emphasis.
    fn panic_line(&self, line: &str);
}

static PANIC_MIRROR: IrqSafeLock<Option<&'static dyn PanicMirror>> = IrqSafeLock::new(None);

pub fn set_panic_mirror(mirror: &'static dyn PanicMirror) {
    *PANIC_MIRROR.lock() = Some(mirror);
}

/// Forward a panic line to the registered mirror, if any.
pub fn mirror_panic_line(line: &str) {
    if let Some(m) = *PANIC_MIRROR.lock() {
        m.panic_line(line);
    }
}

pub fn init() {
    serial::init();
}

/// Non-blocking console input; `None` when no byte is pending.
pub fn read_byte() -> Option<u8> {
    serial::read_byte()
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = WRITER.lock().write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
