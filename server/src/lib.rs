//! The Blade II Online backend services.
//!
//! Two long-lived services share this crate: the matchmaking service, which
//! queues authenticated players and pairs them through a ready check, and
//! the game service, which runs every active match's authoritative state
//! machine to completion. Both follow the same shape: all mutable state is
//! owned by a single serializer task, fed through bounded channels and
//! driven by a 250 ms poll tick, while every client connection runs a pair
//! of read/write pump tasks.

pub mod connection;
pub mod game;
pub mod gatekeeper;
pub mod matchmaking;
pub mod persistence;
pub mod stats;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;


use std::time::Duration;

/// Capacity of each service-level channel.
pub const SERVICE_BUFFER_SIZE: usize = 2048;

/// Minimum wait between serializer iterations.
pub const POLL_TIME: Duration = Duration::from_millis(250);
