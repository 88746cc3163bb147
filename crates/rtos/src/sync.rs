pub mod condvar;
pub mod interrupts;
pub mod lock;
pub mod mailbox;
pub mod semaphore;
pub mod time;

pub use condvar::{CondVar, Wake};
pub use interrupts::{assert_may_block, enter_interrupt, in_interrupt, InterruptScope};
pub use interrupts::{disable_interrupts, interrupts_disabled, restore_interrupts, InterruptsState};
pub use lock::{InterruptSpinLock, InterruptSpinLockGuard, InterruptSpinLockInner};
pub use lock::{Lock, LockGuard, LockImpl};
pub use lock::{SpinLock, SpinLockGuard, SpinLockInner};
pub use mailbox::{Full, IrqMailbox, Mailbox};
pub use semaphore::{IrqSemaphore, Semaphore, WaitError};
pub use time::{delay, delay_ms, Timeout};
