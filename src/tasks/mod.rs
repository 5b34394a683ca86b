//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired entries from the memory tier

mod cleanup;

pub use cleanup::spawn_cleanup_task;
