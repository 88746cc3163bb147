use crate::thread::{Role, RoleSpec};

/// Scheduler tick rate.
pub const TICKS_PER_SEC: u32 = 100;

/// Longest timeout the scheduler can represent; longer waits are clamped to it.
pub const MAX_TIMEOUT_TICKS: u32 = 65535;

/// Priority of the idle task. Every other task must sit strictly below it
/// (numerically), and priority 0 is reserved.
pub const LOWEST_PRIO: u8 = 63;

pub const MAX_SEMAPHORES: usize = 16;
pub const MAX_MAILBOXES: usize = 8;

/// Slots per mailbox; the largest of the stack's mailbox sizes.
pub const MBOX_SIZE: usize = 8;

pub const TCPIP_THREAD_PRIO: u8 = 4;
pub const LINK_THREAD_PRIO: u8 = 5;
pub const DIAL_THREAD_PRIO: u8 = 6;

// Host threads need far more than the 512-word stacks of the target.
const HOSTED_STACK: usize = 256 * 1024;

pub static ROLES: &[RoleSpec] = &[
    RoleSpec {
        role: Role::TcpIp,
        name: "tcpip",
        priority: TCPIP_THREAD_PRIO,
        stack_size: HOSTED_STACK,
    },
    RoleSpec {
        role: Role::Link,
        name: "ppp",
        priority: LINK_THREAD_PRIO,
        stack_size: HOSTED_STACK,
    },
    RoleSpec {
        role: Role::Dial,
        name: "modem",
        priority: DIAL_THREAD_PRIO,
        stack_size: HOSTED_STACK,
    },
];
