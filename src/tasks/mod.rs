//! Background Tasks Module
//!
//! Periodic work that runs alongside the HTTP server.
//!
//! # Tasks
//! - TTL sweep: drops expired entries from the in-process cache backend.
//!   Redis expires keys itself, so the sweep only runs for [`MemoryCache`].
//!
//! [`MemoryCache`]: crate::cache::MemoryCache

mod cleanup;

pub use cleanup::spawn_cleanup_task;
