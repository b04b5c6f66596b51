//! The 1 kHz system heartbeat.
//!
//! The IRQ handler does bounded work only: bump the tick counter, re-arm
//! the compare register, advance the timer wheel, run the sleep/poll timer
//! sweep, and let the scheduler account and preempt. Device polling hooks
//! are registered by their drivers during bring-up and can move to threads
//! later without touching this module.

use crate::config::TICK_HZ;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use viper_hal::gic;
use viper_hal::timer::{API, TIMER_PPI, Timer};

static TICKS: AtomicU64 = AtomicU64::new(0);
static INTERVAL: AtomicU64 = AtomicU64::new(0);
static FREQUENCY: AtomicU64 = AtomicU64::new(0);

/// Optional per-tick device poll (input/net RX during bring-up); 0 = none.
static POLL_HOOK: AtomicUsize = AtomicUsize::new(0);

/// Register a function the tick handler calls once per millisecond.
pub fn set_poll_hook(hook: fn()) {
    POLL_HOOK.store(hook as usize, Ordering::Release);
}

fn timer_irq_handler() {
    let ticks = TICKS.fetch_add(1, Ordering::Relaxed) + 1;

    // Re-arm for the next interval before doing any work.
    API.set_compare(API.read_counter() + INTERVAL.load(Ordering::Relaxed));

    let hook = POLL_HOOK.load(Ordering::Acquire);
    if hook != 0 {
        // SAFETY: only set_poll_hook stores here, always from a fn pointer.
        let f: fn() = unsafe { core::mem::transmute(hook) };
        f();
    }

    super::wheel::tick(ticks);
    crate::ipc::poll::check_timers();

    crate::sched::scheduler::tick();
    crate::sched::scheduler::preempt();
}

/// Program the EL1 physical timer for `TICK_HZ` interrupts and hook its PPI.
pub fn init() {
    let frequency = API.read_frequency();
    let interval = frequency / TICK_HZ;
    FREQUENCY.store(frequency, Ordering::Relaxed);
    INTERVAL.store(interval, Ordering::Relaxed);

    log::info!(
        "[timer] frequency {} MHz, {} counter ticks per ms",
        frequency / 1_000_000,
        interval
    );

    gic::register_handler(TIMER_PPI, timer_irq_handler);
    gic::set_priority(TIMER_PPI, 0x80);
    gic::enable_irq(TIMER_PPI);

    API.set_compare(API.read_counter() + interval);
    API.enable();

    log::info!("[timer] started ({} Hz)", TICK_HZ);
}

/// Monotonic milliseconds since the timer started.
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Nanoseconds derived from the raw counter.
pub fn get_ns() -> u64 {
    let freq = FREQUENCY.load(Ordering::Relaxed);
    if freq == 0 {
        return 0;
    }
    let per_us = freq / 1_000_000;
    if per_us == 0 {
        return 0;
    }
    (API.read_counter() / per_us) * 1000
}

/// Milliseconds derived from the raw counter.
pub fn get_ms() -> u64 {
    get_ns() / 1_000_000
}

/// Busy-wait (via `wfi`) for `ms` milliseconds of ticks.
pub fn delay_ms(ms: u64) {
    let target = get_ticks() + ms;
    while get_ticks() < target {
        viper_hal::timer::wait_for_interrupt();
    }
}
