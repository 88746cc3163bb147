#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod ringbuffer;
pub mod sync;
pub mod sys;
pub mod thread;

pub use error::SysError;
pub use thread::{Role, RoleSpec, ThreadHandle, ThreadTable};
