use super::condvar::{CondVar, Wake};
use super::lock::InterruptSpinLock;
use super::time::{self, Timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("timed out")]
    Timeout,
    /// The wait was cancelled with [`Semaphore::abort`]; the waiter is
    /// expected to wind down rather than retry.
    #[error("wait aborted")]
    Aborted,
}

/// Counting semaphore.
///
/// `signal` and `try_wait` never block and may be used from interrupt
/// context (see [`IrqSemaphore`]); `wait` is task-only.
pub struct Semaphore {
    count: InterruptSpinLock<u32>,
    cvar: CondVar,
}

impl Semaphore {
    pub const fn new(value: u32) -> Self {
        Semaphore {
            count: InterruptSpinLock::new(value),
            cvar: CondVar::new(),
        }
    }

    /// Take one unit, blocking until one is available.
    ///
    /// Returns the time spent waiting in milliseconds. A task with a pending
    /// termination exits here without taking a unit, even if one is free.
    pub fn wait(&self, timeout: Timeout) -> Result<u32, WaitError> {
        if crate::thread::termination_requested() {
            crate::thread::exit();
        }
        let begin = time::now_ticks();
        let deadline = timeout.deadline();
        let mut count = self.count.lock();
        while *count == 0 {
            let (guard, wake) = self.cvar.wait_until(count, deadline);
            count = guard;
            match wake {
                Wake::Notified => (),
                Wake::TimedOut => return Err(WaitError::Timeout),
                Wake::Aborted => return Err(WaitError::Aborted),
            }
        }
        *count -= 1;
        drop(count);
        Ok(time::ticks_to_ms(time::now_ticks().wrapping_sub(begin)))
    }

    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    pub fn signal(&self) {
        let mut count = self.count.lock();
        assert!(*count < u32::MAX, "semaphore overflow");
        *count += 1;
        self.cvar.notify_one();
        drop(count);
    }

    /// Wake every blocked waiter with [`WaitError::Aborted`]. The count is
    /// left untouched. Returns the number of waiters woken.
    pub fn abort(&self) -> usize {
        let _count = self.count.lock();
        self.cvar.abort_all()
    }

    pub fn count(&self) -> u32 {
        *self.count.lock()
    }

    pub fn waiters(&self) -> usize {
        self.cvar.waiters()
    }

    pub fn irq(&self) -> IrqSemaphore<'_> {
        IrqSemaphore(self)
    }
}

/// The interrupt-safe half of a [`Semaphore`]: nothing here blocks.
#[derive(Clone, Copy)]
pub struct IrqSemaphore<'a>(&'a Semaphore);

impl IrqSemaphore<'_> {
    pub fn signal(&self) {
        self.0.signal()
    }
    pub fn try_wait(&self) -> bool {
        self.0.try_wait()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_for_waiters(sem: &Semaphore, n: usize) {
        let start = Instant::now();
        while sem.waiters() < n {
            assert!(start.elapsed() < Duration::from_secs(5), "waiters never blocked");
            std::thread::yield_now();
        }
    }

    #[test]
    fn try_wait_consumes_available_units() {
        let sem = Semaphore::new(2);
        assert!(sem.try_wait());
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
        sem.irq().signal();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn wait_times_out_without_signal() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert_eq!(sem.wait(Timeout::from_ms(30)), Err(WaitError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(sem.count(), 0);
        assert_eq!(sem.waiters(), 0);
    }

    #[test]
    fn signal_wakes_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            std::thread::spawn(move || sem.wait(Timeout::Forever))
        };
        wait_for_waiters(&sem, 1);
        sem.signal();
        assert!(waiter.join().unwrap().is_ok());
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn abort_wakes_every_waiter_and_keeps_count() {
        let sem = Arc::new(Semaphore::new(0));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let sem = Arc::clone(&sem);
                std::thread::spawn(move || sem.wait(Timeout::Forever))
            })
            .collect();
        wait_for_waiters(&sem, 3);
        assert_eq!(sem.abort(), 3);
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(WaitError::Aborted));
        }
        assert_eq!(sem.count(), 0);
        assert_eq!(sem.abort(), 0);
    }

    #[test]
    fn every_signal_is_consumed_exactly_once() {
        let sem = Arc::new(Semaphore::new(0));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let sem = Arc::clone(&sem);
                std::thread::spawn(move || {
                    let mut got = 0;
                    while sem.wait(Timeout::from_ms(200)).is_ok() {
                        got += 1;
                    }
                    got
                })
            })
            .collect();
        for _ in 0..500 {
            sem.irq().signal();
        }
        let total: u32 = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        assert_eq!(total, 500);
        assert_eq!(sem.count(), 0);
    }
}
