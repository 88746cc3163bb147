use crate::thread::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SysError {
    #[error("resource pool exhausted")]
    ResourceExhausted,
    #[error("role {0:?} has no entry in the thread registry")]
    InvalidRole(Role),
    #[error("invalid task priority {0}")]
    InvalidPriority(u8),
    #[error("role {0:?} is registered twice")]
    DuplicateRole(Role),
    #[error("role {0:?} already has a live thread")]
    RoleBusy(Role),
    #[error("no thread with priority {0}")]
    UnknownThread(u8),
}
