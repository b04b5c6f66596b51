//! AArch64 kernel/architecture glue: exception frames and handlers, the
//! saved-context block, and the user-mode transition.
//!
//! The assembly halves live in `boot.S`, `vectors.S`, and `context.S`,
//! compiled by the build script on aarch64 targets.

pub mod context;
pub mod exceptions;
pub mod usermode;

/// Low-power halt loop for fatal paths.
pub fn halt() -> ! {
    loop {
        viper_hal::timer::wait_for_interrupt();
    }
}
