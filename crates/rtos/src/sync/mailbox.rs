use core::num::NonZeroUsize;

use crate::config::MBOX_SIZE;
use crate::ringbuffer::RingBuffer;

use super::lock::InterruptSpinLock;
use super::semaphore::{Semaphore, WaitError};
use super::time::Timeout;

/// Stands in for a null message; the queue itself cannot hold zero.
const ESC_NULL: NonZeroUsize = NonZeroUsize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("mailbox full")]
pub struct Full;

fn encode(msg: *mut ()) -> NonZeroUsize {
    match NonZeroUsize::new(msg.expose_provenance()) {
        None => ESC_NULL,
        Some(addr) => {
            assert_ne!(addr, ESC_NULL, "message collides with the null sentinel");
            addr
        }
    }
}

fn decode(slot: NonZeroUsize) -> *mut () {
    if slot == ESC_NULL {
        core::ptr::null_mut()
    } else {
        core::ptr::with_exposed_provenance_mut(slot.get())
    }
}

/// Bounded FIFO of pointer-sized messages.
///
/// `free` counts the slots a poster may still claim and `pending` the
/// messages a fetcher may take, so `posted - fetched` never exceeds the
/// capacity.
pub struct Mailbox<const N: usize = MBOX_SIZE> {
    queue: InterruptSpinLock<RingBuffer<NonZeroUsize, N>>,
    pending: Semaphore,
    free: Semaphore,
    capacity: usize,
}

impl<const N: usize> Mailbox<N> {
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity <= N,
            "mailbox capacity {capacity} outside 1..={N}"
        );
        Mailbox {
            queue: InterruptSpinLock::new(RingBuffer::new()),
            pending: Semaphore::new(0),
            free: Semaphore::new(capacity as u32),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enqueue(&self, msg: *mut ()) {
        let pushed = self.queue.lock().push(encode(msg));
        assert!(pushed, "mailbox queue overrun");
        self.pending.signal();
    }

    fn dequeue(&self) -> *mut () {
        let slot = self.queue.lock().pop();
        self.free.signal();
        decode(slot)
    }

    /// Enqueue `msg`, blocking while the mailbox is full.
    ///
    /// Panics if the mailbox is closed while waiting.
    pub fn post(&self, msg: *mut ()) {
        if let Err(err) = self.free.wait(Timeout::Forever) {
            panic!("mailbox post failed: {err}");
        }
        self.enqueue(msg);
    }

    pub fn try_post(&self, msg: *mut ()) -> Result<(), Full> {
        if !self.free.try_wait() {
            return Err(Full);
        }
        self.enqueue(msg);
        Ok(())
    }

    /// Take the oldest message, waiting up to `timeout` for one to arrive.
    /// Returns the message and the time spent waiting in milliseconds.
    pub fn fetch(&self, timeout: Timeout) -> Result<(*mut (), u32), WaitError> {
        let elapsed = self.pending.wait(timeout)?;
        Ok((self.dequeue(), elapsed))
    }

    pub fn try_fetch(&self) -> Option<*mut ()> {
        self.pending.try_wait().then(|| self.dequeue())
    }

    /// Wake every blocked poster and fetcher with [`WaitError::Aborted`].
    pub fn close(&self) -> usize {
        let woken = self.pending.abort() + self.free.abort();
        log::debug!("mailbox closed, {woken} waiters aborted");
        woken
    }

    pub fn fetchers(&self) -> usize {
        self.pending.waiters()
    }

    pub fn irq(&self) -> IrqMailbox<'_, N> {
        IrqMailbox(self)
    }
}

impl<const N: usize> core::fmt::Debug for Mailbox<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mailbox")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Non-blocking view of a [`Mailbox`] for interrupt handlers.
#[derive(Clone, Copy)]
pub struct IrqMailbox<'a, const N: usize = MBOX_SIZE>(&'a Mailbox<N>);

impl<const N: usize> IrqMailbox<'_, N> {
    pub fn try_post(&self, msg: *mut ()) -> Result<(), Full> {
        self.0.try_post(msg)
    }
    pub fn try_fetch(&self) -> Option<*mut ()> {
        self.0.try_fetch()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::sync::enter_interrupt;

    fn msg(addr: usize) -> *mut () {
        core::ptr::with_exposed_provenance_mut(addr)
    }

    #[test]
    fn messages_come_out_in_order() {
        let mbox = Mailbox::<8>::new(4);
        for addr in [0x1000, 0x2000, 0x3000] {
            mbox.post(msg(addr));
        }
        assert_eq!(mbox.len(), 3);
        for addr in [0x1000, 0x2000, 0x3000] {
            let (got, _) = mbox.fetch(Timeout::from_ms(10)).unwrap();
            assert_eq!(got.addr(), addr);
        }
        assert!(mbox.is_empty());
    }

    #[test]
    fn null_round_trips_through_the_sentinel() {
        let mbox = Mailbox::<8>::new(2);
        mbox.post(core::ptr::null_mut());
        assert_eq!(mbox.try_fetch(), Some(core::ptr::null_mut()));
        assert_eq!(mbox.try_fetch(), None);
    }

    #[test]
    #[should_panic(expected = "null sentinel")]
    fn sentinel_address_is_rejected() {
        let mbox = Mailbox::<8>::new(2);
        mbox.post(msg(usize::MAX));
    }

    #[test]
    fn try_post_respects_capacity() {
        let mbox = Mailbox::<8>::new(2);
        let irq = mbox.irq();
        let _scope = enter_interrupt();
        assert_eq!(irq.try_post(msg(1)), Ok(()));
        assert_eq!(irq.try_post(msg(2)), Ok(()));
        assert_eq!(irq.try_post(msg(3)), Err(Full));
        assert_eq!(irq.try_fetch().map(|m| m.addr()), Some(1));
        assert_eq!(irq.try_post(msg(3)), Ok(()));
    }

    #[test]
    fn fetch_times_out_on_empty_mailbox() {
        let mbox = Mailbox::<8>::new(1);
        assert_eq!(mbox.fetch(Timeout::from_ms(20)), Err(WaitError::Timeout));
    }

    #[test]
    fn post_blocks_until_a_fetch_frees_a_slot() {
        let mbox = Arc::new(Mailbox::<8>::new(2));
        mbox.post(msg(1));
        mbox.post(msg(2));

        let done = Arc::new(AtomicBool::new(false));
        let poster = {
            let (mbox, done) = (Arc::clone(&mbox), Arc::clone(&done));
            std::thread::spawn(move || {
                mbox.post(msg(3));
                done.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));

        assert_eq!(mbox.try_fetch().map(|m| m.addr()), Some(1));
        poster.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(mbox.len(), 2);
    }

    #[test]
    fn close_aborts_blocked_fetcher() {
        let mbox = Arc::new(Mailbox::<8>::new(1));
        let fetcher = {
            let mbox = Arc::clone(&mbox);
            std::thread::spawn(move || mbox.fetch(Timeout::Forever).map(|(m, _)| m.addr()))
        };
        while mbox.pending.waiters() == 0 {
            std::thread::yield_now();
        }
        assert_eq!(mbox.close(), 1);
        assert_eq!(fetcher.join().unwrap(), Err(WaitError::Aborted));
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn capacity_must_fit_the_queue() {
        let _ = Mailbox::<4>::new(5);
    }
}
