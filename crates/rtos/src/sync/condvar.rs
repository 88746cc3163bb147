use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::Thread;
use std::time::Instant;

use super::interrupts::assert_may_block;
use super::lock::{InterruptSpinLock, LockGuard, LockImpl};

const PENDING: u8 = 0;
const NOTIFIED: u8 = 1;
const ABORTED: u8 = 2;

struct Waiter {
    thread: Thread,
    state: AtomicU8,
}

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Notified,
    TimedOut,
    Aborted,
}

/// FIFO wait queue of parked tasks.
///
/// Waiters are dequeued and marked under the queue lock, so a waiter whose
/// deadline passes at the same moment it is notified still sees the
/// notification.
pub struct CondVar {
    queue: InterruptSpinLock<VecDeque<Arc<Waiter>>>,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            queue: InterruptSpinLock::new(VecDeque::new()),
        }
    }

    pub fn notify_one(&self) {
        self.wake(NOTIFIED, 1);
    }
    pub fn notify_all(&self) -> usize {
        self.wake(NOTIFIED, usize::MAX)
    }
    /// Wake every waiter with [`Wake::Aborted`]; returns how many there were.
    pub fn abort_all(&self) -> usize {
        self.wake(ABORTED, usize::MAX)
    }

    pub fn waiters(&self) -> usize {
        self.queue.lock().len()
    }

    fn wake(&self, state: u8, max: usize) -> usize {
        let mut queue = self.queue.lock();
        let mut woken = 0;
        while woken < max {
            let Some(waiter) = queue.pop_front() else {
                break;
            };
            waiter.state.store(state, Ordering::Release);
            waiter.thread.unpark();
            woken += 1;
        }
        woken
    }

    /// Drop `guard`, park until woken or `deadline` passes, then re-take the lock.
    ///
    /// Enqueueing happens before the guard is released, so a notify issued
    /// by the next holder of the lock cannot be missed.
    pub fn wait_until<'a, T, L: LockImpl>(
        &self,
        guard: LockGuard<'a, T, L>,
        deadline: Option<Instant>,
    ) -> (LockGuard<'a, T, L>, Wake) {
        let lock = guard.lock;
        let waiter = Arc::new(Waiter {
            thread: std::thread::current(),
            state: AtomicU8::new(PENDING),
        });
        self.queue.lock().push_back(Arc::clone(&waiter));
        drop(guard);
        assert_may_block();

        let wake = loop {
            if crate::thread::termination_requested() {
                if !self.withdraw(&waiter) && waiter.state.load(Ordering::Acquire) == NOTIFIED {
                    // hand the wake-up to the next waiter
                    self.notify_one();
                }
                crate::thread::exit();
            }
            match waiter.state.load(Ordering::Acquire) {
                NOTIFIED => break Wake::Notified,
                ABORTED => break Wake::Aborted,
                _ => (),
            }
            match deadline {
                None => std::thread::park(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        if self.withdraw(&waiter) {
                            break Wake::TimedOut;
                        }
                        continue;
                    }
                    std::thread::park_timeout(deadline - now);
                }
            }
        };
        (lock.lock(), wake)
    }

    pub fn wait<'a, T, L: LockImpl>(&self, guard: LockGuard<'a, T, L>) -> (LockGuard<'a, T, L>, Wake) {
        self.wait_until(guard, None)
    }

    fn withdraw(&self, waiter: &Arc<Waiter>) -> bool {
        let mut queue = self.queue.lock();
        match queue.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            Some(idx) => {
                queue.remove(idx);
                true
            }
            None => false,
        }
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}
