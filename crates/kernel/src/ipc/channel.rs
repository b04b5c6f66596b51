//! Bounded message channels.
//!
//! A channel is a handle to a FIFO of length-prefixed byte messages. Sends
//! fail with `WouldBlock` when the queue is full, receives when it is
//! empty; each successful operation wakes one waiter on the opposite side.
//! Close frees the slot and wakes everyone, who then observe `NotFound`.

use crate::sched::wait::WaitQueue;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use viper_abi::{VError, VResult};
use viper_hal::IrqSafeLock;

pub const MAX_CHANNELS: usize = 32;
/// Messages a channel buffers before send reports `WouldBlock`.
pub const MAX_QUEUED_MESSAGES: usize = 16;
/// Largest accepted message payload.
pub const MAX_MESSAGE_SIZE: usize = 256;

struct ChannelState {
    messages: VecDeque<Vec<u8>>,
}

struct ChannelSlot {
    state: IrqSafeLock<Option<ChannelState>>,
    readers: WaitQueue,
    writers: WaitQueue,
}

impl ChannelSlot {
    const fn new() -> Self {
        Self {
            state: IrqSafeLock::new(None),
            readers: WaitQueue::new(),
            writers: WaitQueue::new(),
        }
    }
}

static CHANNELS: [ChannelSlot; MAX_CHANNELS] = [const { ChannelSlot::new() }; MAX_CHANNELS];

fn slot(handle: u32) -> VResult<&'static ChannelSlot> {
    let idx = handle.wrapping_sub(1) as usize;
    CHANNELS.get(idx).ok_or(VError::NotFound)
}

pub fn init() {
    for ch in &CHANNELS {
        *ch.state.lock() = None;
    }
    log::info!("[ipc] channel table initialized ({} slots)", MAX_CHANNELS);
}

/// Allocate a channel; returns its nonzero handle.
pub fn create() -> VResult<u32> {
    for (i, ch) in CHANNELS.iter().enumerate() {
        let mut state = ch.state.lock();
        if state.is_none() {
            *state = Some(ChannelState {
                messages: VecDeque::new(),
            });
            return Ok(i as u32 + 1);
        }
    }
    Err(VError::OutOfMemory)
}

/// Queue a message and wake one reader. `WouldBlock` when full.
pub fn send(handle: u32, data: &[u8]) -> VResult<()> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(VError::InvalidArg);
    }
    let ch = slot(handle)?;
    {
        let mut state = ch.state.lock();
        let state = state.as_mut().ok_or(VError::NotFound)?;
        if state.messages.len() >= MAX_QUEUED_MESSAGES {
            return Err(VError::WouldBlock);
        }
        state.messages.push_back(data.to_vec());
    }
    ch.readers.wake_one();
    Ok(())
}

/// Dequeue the oldest message into `buf` (truncating) and wake one writer.
/// Returns the original message length. `WouldBlock` when empty.
pub fn recv(handle: u32, buf: &mut [u8]) -> VResult<usize> {
    let ch = slot(handle)?;
    let msg = {
        let mut state = ch.state.lock();
        let state = state.as_mut().ok_or(VError::NotFound)?;
        state.messages.pop_front().ok_or(VError::WouldBlock)?
    };
    ch.writers.wake_one();

    let n = msg.len().min(buf.len());
    buf[..n].copy_from_slice(&msg[..n]);
    Ok(msg.len())
}

/// Free the channel and wake every waiter; they observe `NotFound`.
pub fn close(handle: u32) -> VResult<()> {
    let ch = slot(handle)?;
    {
        let mut state = ch.state.lock();
        if state.take().is_none() {
            return Err(VError::NotFound);
        }
    }
    ch.readers.wake_all();
    ch.writers.wake_all();
    Ok(())
}

/// Readiness predicate for poll: a message is queued.
pub fn has_message(handle: u32) -> bool {
    slot(handle)
        .ok()
        .and_then(|ch| {
            ch.state
                .lock()
                .as_ref()
                .map(|s| !s.messages.is_empty())
        })
        .unwrap_or(false)
}

/// Readiness predicate for poll: the queue has room.
pub fn has_space(handle: u32) -> bool {
    slot(handle)
        .ok()
        .and_then(|ch| {
            ch.state
                .lock()
                .as_ref()
                .map(|s| s.messages.len() < MAX_QUEUED_MESSAGES)
        })
        .unwrap_or(false)
}

/// Blocking send used by the syscall layer: parks on the writer queue until
/// space appears or the channel dies.
///
/// Prepare-check-abort: enqueue first, re-test the condition, and back out
/// instead of sleeping when it flipped in between. Sleeping on a stale
/// check would miss the wakeup that already happened.
pub fn send_blocking(handle: u32, data: &[u8]) -> VResult<()> {
    use crate::sched::task::{self, TaskState};
    loop {
        match send(handle, data) {
            Err(VError::WouldBlock) => {
                let ch = slot(handle)?;
                let me = task::current();
                ch.writers.enqueue(me.clone());
                if has_space(handle) {
                    ch.writers.dequeue(&me);
                    me.set_state(TaskState::Running);
                    continue;
                }
                crate::sched::scheduler::yield_now();
            }
            other => return other,
        }
    }
}

/// Blocking receive used by the syscall layer; same discipline as
/// [`send_blocking`].
pub fn recv_blocking(handle: u32, buf: &mut [u8]) -> VResult<usize> {
    use crate::sched::task::{self, TaskState};
    loop {
        match recv(handle, buf) {
            Err(VError::WouldBlock) => {
                let ch = slot(handle)?;
                let me = task::current();
                ch.readers.enqueue(me.clone());
                if has_message(handle) {
                    ch.readers.dequeue(&me);
                    me.set_state(TaskState::Running);
                    continue;
                }
                crate::sched::scheduler::yield_now();
            }
            other => return other,
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sched::task::testutil::sched_test_guard;

    #[test]
    fn messages_arrive_in_send_order() {
        let _g = sched_test_guard();
        let ch = create().unwrap();
        send(ch, b"PING").unwrap();
        send(ch, b"PONG").unwrap();
        send(ch, b"DONE").unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(recv(ch, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"PING");
        assert_eq!(recv(ch, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"PONG");
        assert_eq!(recv(ch, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"DONE");
        close(ch).unwrap();
    }

    #[test]
    fn empty_recv_and_full_send_would_block() {
        let _g = sched_test_guard();
        let ch = create().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(recv(ch, &mut buf), Err(VError::WouldBlock));

        for _ in 0..MAX_QUEUED_MESSAGES {
            send(ch, b"x").unwrap();
        }
        assert_eq!(send(ch, b"overflow"), Err(VError::WouldBlock));
        close(ch).unwrap();
    }

    #[test]
    fn truncating_recv_reports_original_length() {
        let _g = sched_test_guard();
        let ch = create().unwrap();
        send(ch, b"a longer message").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(recv(ch, &mut buf).unwrap(), 16);
        assert_eq!(&buf, b"a lo");
        close(ch).unwrap();
    }

    #[test]
    fn oversized_send_is_invalid() {
        let _g = sched_test_guard();
        let ch = create().unwrap();
        let big = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert_eq!(send(ch, &big), Err(VError::InvalidArg));
        close(ch).unwrap();
    }

    #[test]
    fn closed_channel_reports_not_found() {
        let _g = sched_test_guard();
        let ch = create().unwrap();
        close(ch).unwrap();
        assert_eq!(send(ch, b"x"), Err(VError::NotFound));
        let mut buf = [0u8; 4];
        assert_eq!(recv(ch, &mut buf), Err(VError::NotFound));
        assert_eq!(close(ch), Err(VError::NotFound));
    }

    #[test]
    fn readiness_predicates_track_occupancy() {
        let _g = sched_test_guard();
        let ch = create().unwrap();
        assert!(!has_message(ch));
        assert!(has_space(ch));

        send(ch, b"m").unwrap();
        assert!(has_message(ch));

        for _ in 1..MAX_QUEUED_MESSAGES {
            send(ch, b"m").unwrap();
        }
        assert!(!has_space(ch));

        let mut buf = [0u8; 4];
        recv(ch, &mut buf).unwrap();
        assert!(has_space(ch));
        close(ch).unwrap();

        assert!(!has_message(ch));
        assert!(!has_space(ch));
        assert!(!has_message(0));
        assert!(!has_space(9999));
    }
}
