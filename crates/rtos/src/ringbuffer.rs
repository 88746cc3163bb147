use core::mem::MaybeUninit;

/// Fixed-capacity FIFO of `Copy` values.
///
/// Not synchronized; callers keep it behind a lock that is shared with the
/// interrupt handler (see [`crate::sync::InterruptSpinLock`]). `head` and
/// `tail` are free-running counters, so all `N` slots are usable.
pub struct RingBuffer<T: Copy, const N: usize> {
    head: u32,
    tail: u32,
    elems: [MaybeUninit<T>; N],
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    const _ASSERT: () = const { assert!(N.next_power_of_two() == N) };

    pub const fn new() -> Self {
        let () = Self::_ASSERT;
        RingBuffer {
            head: 0,
            tail: 0,
            elems: [const { MaybeUninit::uninit() }; N],
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Append `value`; returns `false` and drops it if the buffer is full.
    #[must_use]
    pub fn push(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        let idx = (self.head as usize) % N;
        self.elems[idx].write(value);
        self.head = self.head.wrapping_add(1);
        true
    }

    /// Remove the oldest element.
    ///
    /// Panics if the buffer is empty; callers only pop after a successful
    /// wait on the matching counting semaphore.
    #[track_caller]
    pub fn pop(&mut self) -> T {
        match self.try_pop() {
            Some(value) => value,
            None => panic!("pop from empty ring buffer"),
        }
    }

    pub fn try_pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let idx = (self.tail as usize) % N;
        // Safety: every slot in tail..head was written by `push`.
        let value = unsafe { self.elems[idx].assume_init() };
        self.tail = self.tail.wrapping_add(1);
        Some(value)
    }
}

impl<T: Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + core::fmt::Debug, const N: usize> core::fmt::Debug for RingBuffer<T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len())
            .field("capacity", &N)
            .finish()
    }
}
