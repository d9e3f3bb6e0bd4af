//! Shared utilities for lessord
//!
//! This crate provides:
//! - ID types (AccountId, OwnerId, ClientId)
//! - Clock helpers (wall-clock `now()` with a debug mock override)
//! - Default paths for socket, data, and config

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
