//! Protocol types for lessord IPC
//!
//! This crate defines the stable API between lessord and its clients
//! (the admin UI and the marketplace bridge):
//! - Commands (requests from clients)
//! - Responses
//! - Events (daemon -> subscribed clients)
//! - Marketplace events fed into the daemon

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
