use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, Ordering};

use super::interrupts::{disable_interrupts, restore_interrupts, InterruptsState};

pub trait LockImpl {
    const DEFAULT: Self;
    fn lock(&self);
    fn try_lock(&self) -> bool;
    fn unlock(&self);
}

pub struct Lock<T: ?Sized, L> {
    pub(super) inner: L,
    value: UnsafeCell<T>,
}

pub struct LockGuard<'a, T: ?Sized, L: LockImpl> {
    pub(super) lock: &'a Lock<T, L>,
    marker: PhantomData<*mut ()>,
}

impl<T, L: LockImpl> Lock<T, L> {
    pub const fn new(value: T) -> Self {
        Lock {
            inner: L::DEFAULT,
            value: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized, L: LockImpl> Lock<T, L> {
    pub fn lock(&self) -> LockGuard<'_, T, L> {
        self.inner.lock();
        LockGuard {
            lock: self,
            marker: PhantomData,
        }
    }
    pub fn try_lock(&self) -> Option<LockGuard<'_, T, L>> {
        self.inner.try_lock().then(|| LockGuard {
            lock: self,
            marker: PhantomData,
        })
    }
    /// Run `f` with the lock held, keeping the critical section to the
    /// closure body.
    pub fn with<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&mut T) -> O,
    {
        let mut guard = self.lock();
        f(&mut *guard)
    }
}

impl<T: Default, L: LockImpl> Default for Lock<T, L> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

unsafe impl<T: Send + ?Sized, L: Send> Send for Lock<T, L> {}
unsafe impl<T: Send + ?Sized, L: Sync> Sync for Lock<T, L> {}

unsafe impl<T: Sync + ?Sized, L: LockImpl + Sync> Sync for LockGuard<'_, T, L> {}

impl<T: ?Sized, L: LockImpl> core::ops::Deref for LockGuard<'_, T, L> {
    type Target = T;
    fn deref(&self) -> &T {
        let ptr = self.lock.value.get();
        unsafe { &*ptr }
    }
}
impl<T: ?Sized, L: LockImpl> core::ops::DerefMut for LockGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        let ptr = self.lock.value.get();
        unsafe { &mut *ptr }
    }
}
impl<T: ?Sized, L: LockImpl> core::ops::Drop for LockGuard<'_, T, L> {
    fn drop(&mut self) {
        self.lock.inner.unlock();
    }
}

pub struct SpinLockInner {
    flag: AtomicBool,
}

impl SpinLockInner {
    pub const fn new() -> Self {
        SpinLockInner {
            flag: AtomicBool::new(false),
        }
    }
    pub fn try_acquire(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
    pub fn lock(&self) {
        while !self.try_acquire() {
            while self.flag.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }
    pub fn unlock(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl LockImpl for SpinLockInner {
    const DEFAULT: Self = Self::new();
    fn lock(&self) {
        self.lock()
    }
    fn try_lock(&self) -> bool {
        self.try_acquire()
    }
    fn unlock(&self) {
        self.unlock()
    }
}

pub type SpinLock<T> = Lock<T, SpinLockInner>;
pub type SpinLockGuard<'a, T> = LockGuard<'a, T, SpinLockInner>;

/// Masks interrupts for as long as the flag is held, so the same lock can
/// be shared between task code and interrupt handlers.
pub struct InterruptSpinLockInner {
    flag: AtomicBool,
    state: UnsafeCell<Option<InterruptsState>>,
}

impl InterruptSpinLockInner {
    pub const fn new() -> Self {
        InterruptSpinLockInner {
            flag: AtomicBool::new(false),
            state: UnsafeCell::new(None),
        }
    }
    fn try_acquire(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
    pub fn try_lock(&self) -> bool {
        let state = disable_interrupts();
        if self.try_acquire() {
            // Safety: the flag is held, nobody else touches `state`.
            unsafe { self.state.get().write(Some(state)) };
            true
        } else {
            restore_interrupts(state);
            false
        }
    }
    pub fn lock(&self) {
        let mut state = disable_interrupts();
        while !self.try_acquire() {
            restore_interrupts(state);
            while self.flag.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
            state = disable_interrupts();
        }
        unsafe { self.state.get().write(Some(state)) };
    }
    pub fn unlock(&self) {
        let state = unsafe { (*self.state.get()).take() };
        self.flag.store(false, Ordering::Release);
        if let Some(state) = state {
            restore_interrupts(state);
        }
    }
}

impl LockImpl for InterruptSpinLockInner {
    const DEFAULT: Self = Self::new();
    fn lock(&self) {
        self.lock()
    }
    fn try_lock(&self) -> bool {
        self.try_lock()
    }
    fn unlock(&self) {
        self.unlock()
    }
}

pub type InterruptSpinLock<T> = Lock<T, InterruptSpinLockInner>;
pub type InterruptSpinLockGuard<'a, T> = LockGuard<'a, T, InterruptSpinLockInner>;

unsafe impl Send for InterruptSpinLockInner {}
unsafe impl Sync for InterruptSpinLockInner {}
