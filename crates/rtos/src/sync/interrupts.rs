//! Interrupt masking for the hosted port.
//!
//! On the target these would be `cpsid`/`cpsie` around a saved PRIMASK. Here
//! every execution context (task thread, or a thread acting as the UART
//! interrupt) tracks its own mask depth, so that the "never block with
//! interrupts masked" and "never block in interrupt context" rules can be
//! checked at runtime.

use core::cell::Cell;
use core::marker::PhantomData;

pub struct InterruptsState(u32);

impl core::fmt::Debug for InterruptsState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("InterruptsState")
            .field(&format_args!("depth {}", self.0))
            .finish()
    }
}

std::thread_local! {
    static MASK_DEPTH: Cell<u32> = const { Cell::new(0) };
    static IRQ_DEPTH: Cell<u32> = const { Cell::new(0) };
}

pub fn disable_interrupts() -> InterruptsState {
    let depth = MASK_DEPTH.get();
    MASK_DEPTH.set(depth + 1);
    InterruptsState(depth)
}

pub fn restore_interrupts(state: InterruptsState) {
    MASK_DEPTH.set(state.0);
}

pub fn interrupts_disabled() -> bool {
    MASK_DEPTH.get() > 0
}

/// Marks the current context as interrupt context until dropped.
pub struct InterruptScope {
    marker: PhantomData<*mut ()>,
}

pub fn enter_interrupt() -> InterruptScope {
    IRQ_DEPTH.set(IRQ_DEPTH.get() + 1);
    InterruptScope {
        marker: PhantomData,
    }
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        IRQ_DEPTH.set(IRQ_DEPTH.get() - 1);
    }
}

pub fn in_interrupt() -> bool {
    IRQ_DEPTH.get() > 0
}

#[track_caller]
pub fn assert_may_block() {
    assert!(!in_interrupt(), "blocking call from interrupt context");
    assert!(
        !interrupts_disabled(),
        "blocking call with interrupts masked"
    );
}
