//! The operating-system layer the TCP/IP stack is built against.
//!
//! Status codes and sentinel values follow the stack's `sys_arch`
//! conventions exactly; objects live in fixed pools and are named by small
//! copyable handles.

use std::sync::Arc;

use crate::config::{MAX_MAILBOXES, MAX_SEMAPHORES, MBOX_SIZE};
use crate::error::SysError;
use crate::sync::{time, Mailbox, Semaphore, SpinLock, Timeout, WaitError};
use crate::thread::{self, RoleSpec, ThreadHandle, ThreadTable};

pub const ERR_OK: i8 = 0;

/// Returned by the timed waits instead of an elapsed time.
pub const SYS_ARCH_TIMEOUT: u32 = 0xFFFF_FFFF;
pub const SYS_MBOX_EMPTY: u32 = SYS_ARCH_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(i8)]
pub enum ErrT {
    #[error("out of memory")]
    Mem = -1,
    #[error("timeout")]
    Timeout = -3,
    #[error("illegal value")]
    Val = -6,
}

impl ErrT {
    pub fn code(self) -> i8 {
        self as i8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysSem(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysMbox(usize);

struct Pool<T> {
    slots: SpinLock<Vec<Option<Arc<T>>>>,
}

impl<T> Pool<T> {
    fn new(size: usize) -> Self {
        Pool {
            slots: SpinLock::new((0..size).map(|_| None).collect()),
        }
    }

    fn insert(&self, value: T) -> Option<usize> {
        let mut slots = self.slots.lock();
        let idx = slots.iter().position(Option::is_none)?;
        slots[idx] = Some(Arc::new(value));
        Some(idx)
    }

    #[track_caller]
    fn get(&self, idx: usize) -> Arc<T> {
        match self.slots.lock().get(idx) {
            Some(Some(value)) => Arc::clone(value),
            _ => panic!("stale handle {idx}"),
        }
    }

    #[track_caller]
    fn remove(&self, idx: usize) -> Arc<T> {
        match self.slots.lock().get_mut(idx).and_then(Option::take) {
            Some(value) => value,
            None => panic!("stale handle {idx}"),
        }
    }

    fn in_use(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }
}

pub struct SysArch {
    sems: Pool<Semaphore>,
    mboxes: Pool<Mailbox>,
    threads: ThreadTable,
}

impl SysArch {
    pub fn new(roles: &'static [RoleSpec]) -> Result<Self, SysError> {
        Ok(SysArch {
            sems: Pool::new(MAX_SEMAPHORES),
            mboxes: Pool::new(MAX_MAILBOXES),
            threads: ThreadTable::new(roles)?,
        })
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn sem_new(&self, count: u8) -> Result<SysSem, ErrT> {
        match self.sems.insert(Semaphore::new(count.into())) {
            Some(idx) => Ok(SysSem(idx)),
            None => {
                log::error!("semaphore pool exhausted");
                Err(ErrT::Mem)
            }
        }
    }

    /// Return the semaphore to the pool; tasks still blocked on it are
    /// aborted.
    pub fn sem_free(&self, sem: SysSem) {
        let sem = self.sems.remove(sem.0);
        sem.abort();
    }

    pub fn sem_signal(&self, sem: SysSem) {
        self.sems.get(sem.0).signal();
    }

    /// Wait up to `timeout_ms` (0 = forever). Returns the milliseconds
    /// spent waiting, or [`SYS_ARCH_TIMEOUT`].
    pub fn arch_sem_wait(&self, sem: SysSem, timeout_ms: u32) -> u32 {
        let sem = self.sems.get(sem.0);
        match sem.wait(Timeout::from_ms(timeout_ms)) {
            Ok(elapsed) => elapsed.min(SYS_ARCH_TIMEOUT - 1),
            Err(WaitError::Timeout) => SYS_ARCH_TIMEOUT,
            Err(WaitError::Aborted) => thread::exit(),
        }
    }

    pub fn sem_try_wait(&self, sem: SysSem) -> bool {
        self.sems.get(sem.0).try_wait()
    }

    /// A size outside `1..=MBOX_SIZE` is a configuration error and halts.
    pub fn mbox_new(&self, size: usize) -> Result<SysMbox, ErrT> {
        assert!(
            size > 0 && size <= MBOX_SIZE,
            "mailbox size {size} outside 1..={MBOX_SIZE}"
        );
        match self.mboxes.insert(Mailbox::new(size)) {
            Some(idx) => Ok(SysMbox(idx)),
            None => {
                log::error!("mailbox pool exhausted");
                Err(ErrT::Mem)
            }
        }
    }

    pub fn mbox_free(&self, mbox: SysMbox) {
        let mbox = self.mboxes.remove(mbox.0);
        if !mbox.is_empty() {
            log::warn!("freeing mailbox with {} messages queued", mbox.len());
        }
        mbox.close();
    }

    pub fn mbox_post(&self, mbox: SysMbox, msg: *mut ()) {
        self.mboxes.get(mbox.0).post(msg);
    }

    pub fn mbox_trypost(&self, mbox: SysMbox, msg: *mut ()) -> Result<(), ErrT> {
        self.mboxes.get(mbox.0).try_post(msg).map_err(|_| ErrT::Mem)
    }

    pub fn arch_mbox_fetch(&self, mbox: SysMbox, msg: &mut *mut (), timeout_ms: u32) -> u32 {
        let mbox = self.mboxes.get(mbox.0);
        match mbox.fetch(Timeout::from_ms(timeout_ms)) {
            Ok((fetched, elapsed)) => {
                *msg = fetched;
                elapsed.min(SYS_ARCH_TIMEOUT - 1)
            }
            Err(WaitError::Timeout) => {
                *msg = core::ptr::null_mut();
                SYS_ARCH_TIMEOUT
            }
            Err(WaitError::Aborted) => thread::exit(),
        }
    }

    pub fn arch_mbox_tryfetch(&self, mbox: SysMbox, msg: &mut *mut ()) -> u32 {
        match self.mboxes.get(mbox.0).try_fetch() {
            Some(fetched) => {
                *msg = fetched;
                0
            }
            None => SYS_MBOX_EMPTY,
        }
    }

    /// Start a stack task. The priority picks the role; an unregistered
    /// priority is a configuration error and halts.
    pub fn thread_new<F>(&self, name: &str, entry: F, prio: u8) -> ThreadHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let spawned = self
            .threads
            .role_for_priority(prio)
            .and_then(|role| self.threads.spawn(role, entry));
        match spawned {
            Ok(handle) => {
                log::debug!("sys thread {name} started at priority {prio}");
                handle
            }
            Err(err) => panic!("cannot start thread {name}: {err}"),
        }
    }

    /// Stop a task and wait for it, or exit if it is the caller.
    pub fn thread_free(&self, handle: ThreadHandle) -> Result<(), SysError> {
        self.threads.terminate(handle)?;
        self.threads.join(handle)
    }

    /// Tasks blocked in [`SysArch::arch_sem_wait`] on `sem`.
    pub fn sem_waiters(&self, sem: SysSem) -> usize {
        self.sems.get(sem.0).waiters()
    }

    /// Tasks blocked in [`SysArch::arch_mbox_fetch`] on `mbox`.
    pub fn mbox_fetchers(&self, mbox: SysMbox) -> usize {
        self.mboxes.get(mbox.0).fetchers()
    }

    pub fn sems_in_use(&self) -> usize {
        self.sems.in_use()
    }

    pub fn mboxes_in_use(&self) -> usize {
        self.mboxes.in_use()
    }
}

/// Milliseconds since boot.
pub fn now() -> u32 {
    time::now_ms()
}

pub fn jiffies() -> u32 {
    time::now_ticks()
}
