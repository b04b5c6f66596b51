//! Wait queues: the blocking primitive under channels, timers, poll, and
//! task join.
//!
//! A queue owns its members: enqueueing moves the task's `Arc` into the
//! queue's deque, so a task can sit on the ready queue or one wait queue but
//! never both. The task's `wait_channel` tag records which queue holds it,
//! which lets `wakeup`/`kill` pull a blocked task out from the outside.
//! Dequeue is idempotent; wake order is FIFO.

use super::scheduler;
use super::task::{Task, TaskState};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use viper_hal::IrqSafeLock;

pub struct WaitQueue {
    waiters: IrqSafeLock<VecDeque<Arc<Task>>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: IrqSafeLock::new(VecDeque::new()),
        }
    }

    /// Mark `t` blocked and move it to the tail of this queue.
    pub fn enqueue(&self, t: Arc<Task>) {
        t.set_state(TaskState::Blocked);
        t.set_wait_channel(core::ptr::from_ref(self) as usize);
        self.waiters.lock().push_back(t);
    }

    /// Remove a specific task without waking it. Idempotent: removing a task
    /// that is not queued returns false.
    pub fn dequeue(&self, t: &Arc<Task>) -> bool {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|w| Arc::ptr_eq(w, t)) {
            let removed = waiters.remove(pos);
            if let Some(task) = removed {
                task.set_wait_channel(0);
            }
            true
        } else {
            false
        }
    }

    /// Wake the head waiter: clear its tag, mark it ready, and hand it to
    /// the scheduler. Entries that were already yanked out of the Blocked
    /// state (killed, woken through another path) are skipped.
    pub fn wake_one(&self) -> Option<Arc<Task>> {
        let mut waiters = self.waiters.lock();
        while let Some(t) = waiters.pop_front() {
            t.set_wait_channel(0);
            if t.state() == TaskState::Blocked {
                drop(waiters);
                t.set_state(TaskState::Ready);
                scheduler::enqueue(t.clone());
                return Some(t);
            }
        }
        None
    }

    /// Wake everything in FIFO order; returns the number woken.
    pub fn wake_all(&self) -> u32 {
        let mut n = 0;
        while self.wake_one().is_some() {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    pub fn count(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Block the calling task on this queue and yield. Returns after another
    /// path wakes the task.
    pub fn block_current(&self) {
        self.enqueue(super::task::current());
        scheduler::yield_now();
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sched::task::testutil::{sched_test_guard, spawn_detached};

    #[test]
    fn wake_order_is_fifo() {
        let _g = sched_test_guard();
        let wq = WaitQueue::new();
        let a = spawn_detached("wq-a");
        let b = spawn_detached("wq-b");
        let c = spawn_detached("wq-c");

        wq.enqueue(a.clone());
        wq.enqueue(b.clone());
        wq.enqueue(c.clone());
        assert_eq!(wq.count(), 3);

        assert!(Arc::ptr_eq(&wq.wake_one().unwrap(), &a));
        assert!(Arc::ptr_eq(&wq.wake_one().unwrap(), &b));
        assert!(Arc::ptr_eq(&wq.wake_one().unwrap(), &c));
        assert!(wq.wake_one().is_none());
    }

    #[test]
    fn enqueue_blocks_and_tags() {
        let _g = sched_test_guard();
        let wq = WaitQueue::new();
        let t = spawn_detached("wq-tag");
        wq.enqueue(t.clone());
        assert_eq!(t.state(), TaskState::Blocked);
        assert_eq!(t.wait_channel(), core::ptr::from_ref(&wq) as usize);
        wq.wake_one();
        assert_eq!(t.wait_channel(), 0);
        assert_eq!(t.state(), TaskState::Ready);
    }

    #[test]
    fn dequeue_is_idempotent() {
        let _g = sched_test_guard();
        let wq = WaitQueue::new();
        let t = spawn_detached("wq-deq");
        wq.enqueue(t.clone());
        assert!(wq.dequeue(&t));
        assert!(!wq.dequeue(&t));
        assert!(wq.is_empty());
        // Dequeue does not wake: state stays Blocked for the caller to fix.
        assert_eq!(t.state(), TaskState::Blocked);
    }

    #[test]
    fn wake_all_drains_in_order() {
        let _g = sched_test_guard();
        let wq = WaitQueue::new();
        let tasks: Vec<_> = (0..5).map(|i| {
            let t = spawn_detached(&format!("wq-{i}"));
            wq.enqueue(t.clone());
            t
        }).collect();

        assert_eq!(wq.wake_all(), 5);
        assert!(wq.is_empty());
        for t in tasks {
            assert_eq!(t.state(), TaskState::Ready);
        }
    }

    #[test]
    fn wake_one_skips_killed_entries() {
        let _g = sched_test_guard();
        let wq = WaitQueue::new();
        let a = spawn_detached("wq-dead");
        let b = spawn_detached("wq-live");
        wq.enqueue(a.clone());
        wq.enqueue(b.clone());
        // a was torn down elsewhere (e.g. kill) without dequeueing.
        a.set_state(TaskState::Exited);
        let woken = wq.wake_one().unwrap();
        assert!(Arc::ptr_eq(&woken, &b));
    }
}
