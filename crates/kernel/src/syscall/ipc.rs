//! Channel and poll syscalls (0x10 and 0x20 ranges).
//!
//! Sends are non-blocking (`WouldBlock` when full) so senders can multiplex;
//! receives block through the channel's reader queue. Poll sets collect
//! `(handle, mask)` pairs and evaluate them through the shared poll loop.

use super::{SyscallResult, copy_from_user, copy_to_user};
use crate::ipc::{channel, poll};
use alloc::vec::Vec;
use viper_abi::{EventMask, MAX_POLL_EVENTS, PollEvent, VError};
use viper_hal::IrqSafeLock;

pub fn sys_channel_create() -> SyscallResult {
    match channel::create() {
        Ok(handle) => SyscallResult::ok1(handle as u64),
        Err(e) => e.into(),
    }
}

pub fn sys_channel_send(handle: u32, buf_ptr: u64, len: u64) -> SyscallResult {
    if len as usize > channel::MAX_MESSAGE_SIZE {
        return VError::InvalidArg.into();
    }
    let data = match copy_from_user(buf_ptr, len) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };
    match channel::send(handle, &data) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_channel_recv(handle: u32, buf_ptr: u64, max_len: u64) -> SyscallResult {
    let max = (max_len as usize).min(channel::MAX_MESSAGE_SIZE);
    let mut buf = alloc::vec![0u8; max];
    match channel::recv_blocking(handle, &mut buf) {
        Ok(orig_len) => {
            let n = orig_len.min(max);
            if let Err(e) = copy_to_user(buf_ptr, &buf[..n]) {
                return e.into();
            }
            SyscallResult::ok1(orig_len as u64)
        }
        Err(e) => e.into(),
    }
}

pub fn sys_channel_close(handle: u32) -> SyscallResult {
    match channel::close(handle) {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

// ---------------------------------------------------------------------------
// Poll sets
// ---------------------------------------------------------------------------

const MAX_POLL_SETS: usize = 16;

struct PollSet {
    in_use: bool,
    entries: Vec<(u32, u32)>, // (handle, requested mask)
}

impl PollSet {
    const fn empty() -> Self {
        Self {
            in_use: false,
            entries: Vec::new(),
        }
    }
}

static POLL_SETS: IrqSafeLock<[PollSet; MAX_POLL_SETS]> =
    IrqSafeLock::new([const { PollSet::empty() }; MAX_POLL_SETS]);

pub fn sys_poll_create() -> SyscallResult {
    let mut sets = POLL_SETS.lock();
    for (i, s) in sets.iter_mut().enumerate() {
        if !s.in_use {
            s.in_use = true;
            s.entries.clear();
            return SyscallResult::ok1(i as u64 + 1);
        }
    }
    VError::OutOfMemory.into()
}

fn with_set<R>(
    set_handle: u32,
    f: impl FnOnce(&mut PollSet) -> Result<R, VError>,
) -> Result<R, VError> {
    let idx = set_handle.wrapping_sub(1) as usize;
    let mut sets = POLL_SETS.lock();
    let set = sets.get_mut(idx).ok_or(VError::NotFound)?;
    if !set.in_use {
        return Err(VError::NotFound);
    }
    f(set)
}

pub fn sys_poll_add(set_handle: u32, handle: u32, mask: u32) -> SyscallResult {
    if EventMask::from_bits(mask).is_none() {
        return VError::InvalidArg.into();
    }
    let r = with_set(set_handle, |set| {
        if set.entries.len() >= MAX_POLL_EVENTS {
            return Err(VError::OutOfMemory);
        }
        if let Some(e) = set.entries.iter_mut().find(|(h, _)| *h == handle) {
            e.1 |= mask;
        } else {
            set.entries.push((handle, mask));
        }
        Ok(())
    });
    match r {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

pub fn sys_poll_remove(set_handle: u32, handle: u32) -> SyscallResult {
    let r = with_set(set_handle, |set| {
        let before = set.entries.len();
        set.entries.retain(|(h, _)| *h != handle);
        if set.entries.len() == before {
            return Err(VError::NotFound);
        }
        Ok(())
    });
    match r {
        Ok(()) => SyscallResult::ok(),
        Err(e) => e.into(),
    }
}

/// Evaluate a poll set. When `events_out_ptr` is nonzero, the triggered
/// `PollEvent` array is copied back for the caller to inspect.
pub fn sys_poll_wait(set_handle: u32, events_out_ptr: u64, timeout_ms: i64) -> SyscallResult {
    let entries = match with_set(set_handle, |set| Ok(set.entries.clone())) {
        Ok(e) => e,
        Err(e) => return e.into(),
    };
    if entries.is_empty() {
        return VError::InvalidArg.into();
    }

    let mut events: Vec<PollEvent> = entries
        .iter()
        .map(|(handle, mask)| PollEvent {
            handle: *handle,
            events: *mask,
            triggered: 0,
        })
        .collect();

    match poll::poll(&mut events, timeout_ms) {
        Ok(count) => {
            if events_out_ptr != 0 {
                let bytes = unsafe {
                    core::slice::from_raw_parts(
                        events.as_ptr() as *const u8,
                        events.len() * size_of::<PollEvent>(),
                    )
                };
                if let Err(e) = copy_to_user(events_out_ptr, bytes) {
                    return e.into();
                }
            }
            SyscallResult::ok1(count as u64)
        }
        Err(e) => e.into(),
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::mm::pmm::testutil::ensure_global_pmm;
    use crate::proc::testutil::ensure_kernel_process;
    use crate::sched::task::testutil::sched_test_guard;

    #[test]
    fn poll_set_lifecycle() {
        let _g = sched_test_guard();
        ensure_global_pmm();
        ensure_kernel_process();

        let set = {
            let r = sys_poll_create();
            assert_eq!(r.verr, VError::Ok);
            r.res0 as u32
        };

        let ch = channel::create().unwrap();
        assert_eq!(
            sys_poll_add(set, ch, EventMask::CHANNEL_READ.bits()).verr,
            VError::Ok
        );

        // Nothing ready, non-blocking.
        let r = sys_poll_wait(set, 0, 0);
        assert_eq!(r.verr, VError::Ok);
        assert_eq!(r.res0, 0);

        channel::send(ch, b"x").unwrap();
        let mut out = [PollEvent::default(); 1];
        let r = sys_poll_wait(set, out.as_mut_ptr() as u64, 0);
        assert_eq!(r.verr, VError::Ok);
        assert_eq!(r.res0, 1);
        assert_eq!(
            EventMask::from_bits_truncate(out[0].triggered),
            EventMask::CHANNEL_READ
        );

        assert_eq!(sys_poll_remove(set, ch).verr, VError::Ok);
        assert_eq!(sys_poll_remove(set, ch).verr, VError::NotFound);
        channel::close(ch).unwrap();
    }

    #[test]
    fn poll_add_rejects_garbage_mask() {
        let _g = sched_test_guard();
        let set = sys_poll_create().res0 as u32;
        assert_eq!(sys_poll_add(set, 1, 0xFFFF_0000).verr, VError::InvalidArg);
    }
}
