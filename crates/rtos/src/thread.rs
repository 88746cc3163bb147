//! Fixed-priority task registry.
//!
//! Every task belongs to one [`Role`] from a small table fixed at build time
//! ([`crate::config::ROLES`]). The role's priority doubles as the task's
//! identity: at most one live thread per role.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};

use crate::config::LOWEST_PRIO;
use crate::error::SysError;
use crate::sync::{assert_may_block, SpinLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The TCP/IP stack's own task.
    TcpIp,
    /// Services a point-to-point session; respawned for every connection.
    Link,
    /// Runs the modem dial loop.
    Dial,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    pub role: Role,
    pub name: &'static str,
    pub priority: u8,
    pub stack_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(u8);

impl ThreadHandle {
    pub fn priority(self) -> u8 {
        self.0
    }
}

// Unwind payload used by `exit`; never escapes the spawn wrapper.
struct Terminated;

struct ThreadCtl {
    handle: ThreadHandle,
    terminate: AtomicBool,
}

std::thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadCtl>>> = const { RefCell::new(None) };
}

/// The calling task, if it was started through a [`ThreadTable`].
pub fn current() -> Option<ThreadHandle> {
    CURRENT.with_borrow(|ctl| ctl.as_ref().map(|ctl| ctl.handle))
}

/// Checked at every blocking point; a set flag makes the task exit there.
pub(crate) fn termination_requested() -> bool {
    CURRENT.with_borrow(|ctl| {
        ctl.as_ref()
            .is_some_and(|ctl| ctl.terminate.load(Ordering::Acquire))
    })
}

/// Terminate the calling task. Locals are dropped on the way out.
pub fn exit() -> ! {
    log::debug!("task {:?} exiting", current());
    panic::resume_unwind(Box::new(Terminated))
}

struct Slot {
    ctl: Arc<ThreadCtl>,
    join: JoinHandle<()>,
}

pub struct ThreadTable {
    specs: &'static [RoleSpec],
    slots: SpinLock<Vec<Option<Slot>>>,
}

impl ThreadTable {
    /// Validate the role registry and build an empty table for it.
    pub fn new(specs: &'static [RoleSpec]) -> Result<Self, SysError> {
        for (i, spec) in specs.iter().enumerate() {
            if spec.priority == 0 || spec.priority >= LOWEST_PRIO {
                return Err(SysError::InvalidPriority(spec.priority));
            }
            for earlier in &specs[..i] {
                if earlier.role == spec.role {
                    return Err(SysError::DuplicateRole(spec.role));
                }
                if earlier.priority == spec.priority {
                    return Err(SysError::InvalidPriority(spec.priority));
                }
            }
        }
        Ok(ThreadTable {
            specs,
            slots: SpinLock::new(specs.iter().map(|_| None).collect()),
        })
    }

    fn index_of(&self, role: Role) -> Result<usize, SysError> {
        self.specs
            .iter()
            .position(|spec| spec.role == role)
            .ok_or(SysError::InvalidRole(role))
    }

    pub fn role_for_priority(&self, priority: u8) -> Result<Role, SysError> {
        self.specs
            .iter()
            .find(|spec| spec.priority == priority)
            .map(|spec| spec.role)
            .ok_or(SysError::InvalidPriority(priority))
    }

    /// Start `entry` on the thread reserved for `role`.
    ///
    /// A previous occupant that has already finished is reaped first.
    pub fn spawn<F>(&self, role: Role, entry: F) -> Result<ThreadHandle, SysError>
    where
        F: FnOnce() + Send + 'static,
    {
        let idx = self.index_of(role)?;
        let spec = &self.specs[idx];
        let handle = ThreadHandle(spec.priority);

        let mut slots = self.slots.lock();
        if let Some(slot) = &slots[idx] {
            if !slot.join.is_finished() {
                return Err(SysError::RoleBusy(role));
            }
        }
        if let Some(old) = slots[idx].take() {
            if let Err(payload) = old.join.join() {
                panic::resume_unwind(payload);
            }
        }

        let ctl = Arc::new(ThreadCtl {
            handle,
            terminate: AtomicBool::new(false),
        });
        let task_ctl = Arc::clone(&ctl);
        let join = Builder::new()
            .name(spec.name.into())
            .stack_size(spec.stack_size)
            .spawn(move || {
                CURRENT.set(Some(task_ctl));
                let result = panic::catch_unwind(AssertUnwindSafe(entry));
                CURRENT.take();
                match result {
                    Ok(()) => log::debug!("task {handle:?} returned"),
                    Err(payload) if payload.is::<Terminated>() => {
                        log::debug!("task {handle:?} terminated")
                    }
                    Err(payload) => panic::resume_unwind(payload),
                }
            })
            .map_err(|err| {
                log::error!("cannot start {}: {err}", spec.name);
                SysError::ResourceExhausted
            })?;

        slots[idx] = Some(Slot { ctl, join });
        log::debug!("spawned {} at priority {}", spec.name, spec.priority);
        Ok(handle)
    }

    /// Stop a task.
    ///
    /// When `handle` is the caller this is [`exit`]. Any other task exits
    /// at its next blocking point.
    pub fn terminate(&self, handle: ThreadHandle) -> Result<(), SysError> {
        if current() == Some(handle) {
            exit();
        }
        let slots = self.slots.lock();
        let slot = slots
            .iter()
            .flatten()
            .find(|slot| slot.ctl.handle == handle)
            .ok_or(SysError::UnknownThread(handle.0))?;
        slot.ctl.terminate.store(true, Ordering::Release);
        slot.join.thread().unpark();
        Ok(())
    }

    /// Wait for a task to finish and release its role.
    ///
    /// A task that died from a panic brings the caller down with it.
    pub fn join(&self, handle: ThreadHandle) -> Result<(), SysError> {
        assert_ne!(current(), Some(handle), "task cannot join itself");
        assert_may_block();
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|s| s.ctl.handle == handle))
                .and_then(Option::take)
        };
        let slot = slot.ok_or(SysError::UnknownThread(handle.0))?;
        if let Err(payload) = slot.join.join() {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// The thread occupying `role`, finished or not, until it is joined.
    pub fn handle(&self, role: Role) -> Option<ThreadHandle> {
        let idx = self.index_of(role).ok()?;
        self.slots.lock()[idx].as_ref().map(|slot| slot.ctl.handle)
    }

    pub fn is_running(&self, handle: ThreadHandle) -> bool {
        self.slots
            .lock()
            .iter()
            .flatten()
            .any(|slot| slot.ctl.handle == handle && !slot.join.is_finished())
    }
}

impl core::fmt::Debug for ThreadTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadTable")
            .field("specs", &self.specs)
            .finish_non_exhaustive()
    }
}
