//! Kernel logger: routes `log` records to the serial console.

use log::{Level, LevelFilter, Metadata, Record};
use viper_hal::println;

static LOGGER: SerialLogger = SerialLogger;

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match record.level() {
                Level::Error | Level::Warn => {
                    println!("[{}] {}", record.level(), record.args());
                }
                _ => println!("{}", record.args()),
            }
        }
    }

    fn flush(&self) {}
}

/// Install the logger; records above `max_level` are dropped at the macro.
pub fn init(max_level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(max_level);
    }
}
