//! Poll, one-shot timers, and sleep.
//!
//! Poll re-evaluates readiness predicates on each pass and yields between
//! passes. Yield-until-ready is the bring-up model: it keeps the kernel
//! paths for blocking and non-blocking callers identical at the cost of
//! wasted wakeups. A composite waiter signaled by channel and timer
//! notifications replaces it once the scheduler grows real wakeup routing.
//!
//! Timers here are the handle-based kind whose expiry is observable through
//! poll's `TIMER` event; the callback-based timer wheel is `time::wheel`.

use crate::ipc::channel;
use crate::sched::{scheduler, task, task::Task, task::TaskState};
use crate::time::{tick, wheel};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};
use viper_abi::{EventMask, MAX_POLL_EVENTS, PollEvent, VError, VResult};
use viper_hal::IrqSafeLock;

const MAX_POLL_TIMERS: usize = 32;

struct PollTimer {
    id: u32,
    expire_time: u64,
    active: bool,
    waiter: Option<Arc<Task>>,
}

impl PollTimer {
    const fn empty() -> Self {
        Self {
            id: 0,
            expire_time: 0,
            active: false,
            waiter: None,
        }
    }
}

static TIMERS: IrqSafeLock<[PollTimer; MAX_POLL_TIMERS]> =
    IrqSafeLock::new([const { PollTimer::empty() }; MAX_POLL_TIMERS]);
static NEXT_TIMER_ID: AtomicUsize = AtomicUsize::new(1);

/// Per-process network RX readiness probe, registered by the network
/// service; absent during core bring-up.
static NET_RX_PROBE: AtomicUsize = AtomicUsize::new(0);

pub fn set_net_rx_probe(probe: fn(pid: u32) -> bool) {
    NET_RX_PROBE.store(probe as usize, Ordering::Release);
}

fn net_rx_ready(pid: u32) -> bool {
    let probe = NET_RX_PROBE.load(Ordering::Acquire);
    if probe == 0 {
        return false;
    }
    // SAFETY: only set_net_rx_probe stores here, always from a fn pointer.
    let f: fn(u32) -> bool = unsafe { core::mem::transmute(probe) };
    f(pid)
}

/// Reset the timer table and the timer wheel underneath it.
pub fn init() {
    let mut timers = TIMERS.lock();
    for t in timers.iter_mut() {
        *t = PollTimer::empty();
    }
    drop(timers);
    wheel::init(tick::get_ticks());
    log::info!("[poll] poll subsystem initialized");
}

/// Monotonic milliseconds, shared clock for every timeout here.
pub fn time_now_ms() -> u64 {
    tick::get_ticks()
}

/// Arm a one-shot timer; its handle becomes pollable with `TIMER`.
pub fn timer_create(timeout_ms: u64) -> VResult<u32> {
    let mut timers = TIMERS.lock();
    let slot = timers
        .iter_mut()
        .find(|t| !t.active)
        .ok_or(VError::OutOfMemory)?;

    let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed) as u32;
    slot.id = id;
    slot.expire_time = time_now_ms() + timeout_ms;
    slot.active = true;
    slot.waiter = None;
    Ok(id)
}

/// A missing timer counts as expired, so pollers of stale handles make
/// progress instead of spinning forever.
pub fn timer_expired(timer_id: u32) -> bool {
    let timers = TIMERS.lock();
    match timers.iter().find(|t| t.active && t.id == timer_id) {
        Some(t) => time_now_ms() >= t.expire_time,
        None => true,
    }
}

pub fn timer_cancel(timer_id: u32) -> VResult<()> {
    let waiter = {
        let mut timers = TIMERS.lock();
        let slot = timers
            .iter_mut()
            .find(|t| t.active && t.id == timer_id)
            .ok_or(VError::NotFound)?;
        slot.active = false;
        slot.id = 0;
        slot.waiter.take()
    };

    if let Some(w) = waiter {
        w.set_state(TaskState::Ready);
        scheduler::enqueue(w);
    }
    Ok(())
}

/// Sleep by arming a timer and blocking until the tick sweep wakes us.
pub fn sleep_ms(ms: u64) -> VResult<()> {
    if ms == 0 {
        return Ok(());
    }

    let timer_id = timer_create(ms)?;
    let me = task::current();

    loop {
        if timer_expired(timer_id) {
            break;
        }

        {
            let mut timers = TIMERS.lock();
            match timers.iter_mut().find(|t| t.active && t.id == timer_id) {
                Some(slot) => {
                    me.set_state(TaskState::Blocked);
                    slot.waiter = Some(me.clone());
                }
                // Timer vanished (canceled underneath us).
                None => break,
            }
        }

        task::yield_now();
    }

    let _ = timer_cancel(timer_id);
    Ok(())
}

/// Evaluate a poll set.
///
/// Clears each entry's `triggered`, ORs in the satisfied events, and
/// returns the number of triggered entries. `timeout_ms == 0` polls once;
/// negative waits forever; otherwise the wait gives up at the deadline and
/// returns 0.
pub fn poll(events: &mut [PollEvent], timeout_ms: i64) -> VResult<u32> {
    if events.is_empty() || events.len() > MAX_POLL_EVENTS {
        return Err(VError::InvalidArg);
    }

    let deadline = if timeout_ms > 0 {
        time_now_ms() + timeout_ms as u64
    } else {
        0
    };

    let pid = task::try_current().map(|t| t.process_id()).unwrap_or(0);

    loop {
        let mut ready = 0u32;

        for ev in events.iter_mut() {
            ev.triggered = EventMask::empty().bits();
            let requested = EventMask::from_bits_truncate(ev.events);
            let mut hit = EventMask::empty();

            if requested.contains(EventMask::CHANNEL_READ) && channel::has_message(ev.handle) {
                hit |= EventMask::CHANNEL_READ;
            }
            if requested.contains(EventMask::CHANNEL_WRITE) && channel::has_space(ev.handle) {
                hit |= EventMask::CHANNEL_WRITE;
            }
            if requested.contains(EventMask::TIMER) && timer_expired(ev.handle) {
                hit |= EventMask::TIMER;
            }
            if requested.contains(EventMask::NET_RX) && net_rx_ready(pid) {
                hit |= EventMask::NET_RX;
            }

            if !hit.is_empty() {
                ev.triggered = hit.bits();
                ready += 1;
            }
        }

        if ready > 0 {
            return Ok(ready);
        }
        if timeout_ms == 0 {
            return Ok(0);
        }
        if timeout_ms > 0 && time_now_ms() >= deadline {
            return Ok(0);
        }

        task::yield_now();
    }
}

/// Tick-side sweep: advance the wheel and wake sleepers whose timers are
/// due. Runs in IRQ context; bounded work only.
pub fn check_timers() {
    let now = time_now_ms();
    wheel::tick(now);

    loop {
        let waiter = {
            let mut timers = TIMERS.lock();
            let Some(slot) = timers
                .iter_mut()
                .find(|t| t.active && t.waiter.is_some() && now >= t.expire_time)
            else {
                break;
            };
            slot.waiter.take()
        };
        if let Some(w) = waiter {
            w.set_state(TaskState::Ready);
            scheduler::enqueue(w);
        }
    }
}

/// Detach a dying task from every timer that references it.
pub fn clear_task_waiters(t: &Arc<Task>) {
    let mut timers = TIMERS.lock();
    for slot in timers.iter_mut() {
        if let Some(w) = &slot.waiter
            && Arc::ptr_eq(w, t)
        {
            slot.waiter = None;
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sched::task::testutil::{sched_test_guard, spawn_detached};
    use crate::time::tick::testutil::set_ticks;

    #[test]
    fn timer_expires_with_the_clock() {
        let _g = sched_test_guard();
        set_ticks(1000);
        let id = timer_create(50).unwrap();
        assert!(!timer_expired(id));
        set_ticks(1049);
        assert!(!timer_expired(id));
        set_ticks(1050);
        assert!(timer_expired(id));
        timer_cancel(id).unwrap();
    }

    #[test]
    fn missing_timer_counts_as_expired() {
        let _g = sched_test_guard();
        assert!(timer_expired(0xDEAD));
    }

    #[test]
    fn cancel_frees_and_wakes() {
        let _g = sched_test_guard();
        set_ticks(0);
        let id = timer_create(1000).unwrap();

        let sleeper = spawn_detached("poll-sleeper");
        sleeper.set_state(TaskState::Blocked);
        {
            let mut timers = TIMERS.lock();
            let slot = timers.iter_mut().find(|t| t.active && t.id == id).unwrap();
            slot.waiter = Some(sleeper.clone());
        }

        timer_cancel(id).unwrap();
        assert_eq!(sleeper.state(), TaskState::Ready);
        assert_eq!(timer_cancel(id), Err(VError::NotFound));
    }

    #[test]
    fn nonblocking_poll_reports_channel_readiness() {
        let _g = sched_test_guard();
        let ch = channel::create().unwrap();

        let mut evs = [PollEvent {
            handle: ch,
            events: (EventMask::CHANNEL_READ | EventMask::CHANNEL_WRITE).bits(),
            triggered: 0,
        }];

        // Empty: writable, not readable.
        assert_eq!(poll(&mut evs, 0).unwrap(), 1);
        assert_eq!(
            EventMask::from_bits_truncate(evs[0].triggered),
            EventMask::CHANNEL_WRITE
        );

        channel::send(ch, b"hi").unwrap();
        assert_eq!(poll(&mut evs, 0).unwrap(), 1);
        assert_eq!(
            EventMask::from_bits_truncate(evs[0].triggered),
            EventMask::CHANNEL_READ | EventMask::CHANNEL_WRITE
        );

        channel::close(ch).unwrap();
    }

    #[test]
    fn nonblocking_poll_with_nothing_ready_returns_zero() {
        let _g = sched_test_guard();
        let ch = channel::create().unwrap();
        let mut evs = [PollEvent {
            handle: ch,
            events: EventMask::CHANNEL_READ.bits(),
            triggered: EventMask::CHANNEL_READ.bits(), // stale; must be cleared
        }];
        assert_eq!(poll(&mut evs, 0).unwrap(), 0);
        assert_eq!(evs[0].triggered, 0);
        channel::close(ch).unwrap();
    }

    #[test]
    fn poll_rejects_empty_and_oversized_sets() {
        let _g = sched_test_guard();
        let mut none: [PollEvent; 0] = [];
        assert_eq!(poll(&mut none, 0), Err(VError::InvalidArg));

        let mut too_many = [PollEvent::default(); MAX_POLL_EVENTS + 1];
        assert_eq!(poll(&mut too_many, 0), Err(VError::InvalidArg));
    }

    #[test]
    fn timer_event_is_pollable() {
        let _g = sched_test_guard();
        set_ticks(5000);
        let id = timer_create(10).unwrap();
        let mut evs = [PollEvent {
            handle: id,
            events: EventMask::TIMER.bits(),
            triggered: 0,
        }];
        assert_eq!(poll(&mut evs, 0).unwrap(), 0);
        set_ticks(5010);
        assert_eq!(poll(&mut evs, 0).unwrap(), 1);
        assert_eq!(
            EventMask::from_bits_truncate(evs[0].triggered),
            EventMask::TIMER
        );
        timer_cancel(id).unwrap();
    }

    #[test]
    fn check_timers_wakes_due_sleepers() {
        let _g = sched_test_guard();
        set_ticks(100);
        let id = timer_create(20).unwrap();
        let sleeper = spawn_detached("due-sleeper");
        sleeper.set_state(TaskState::Blocked);
        {
            let mut timers = TIMERS.lock();
            let slot = timers.iter_mut().find(|t| t.active && t.id == id).unwrap();
            slot.waiter = Some(sleeper.clone());
        }

        set_ticks(110);
        check_timers();
        assert_eq!(sleeper.state(), TaskState::Blocked); // not due yet

        set_ticks(120);
        check_timers();
        assert_eq!(sleeper.state(), TaskState::Ready);

        timer_cancel(id).unwrap();
    }

    #[test]
    fn clear_task_waiters_detaches() {
        let _g = sched_test_guard();
        set_ticks(0);
        let id = timer_create(500).unwrap();
        let t = spawn_detached("detach-me");
        {
            let mut timers = TIMERS.lock();
            let slot = timers.iter_mut().find(|x| x.active && x.id == id).unwrap();
            slot.waiter = Some(t.clone());
        }
        clear_task_waiters(&t);
        {
            let timers = TIMERS.lock();
            let slot = timers.iter().find(|x| x.active && x.id == id).unwrap();
            assert!(slot.waiter.is_none());
        }
        timer_cancel(id).unwrap();
    }
}
