//! Rental lifecycle engine for lessord
//!
//! This crate is the heart of lessord, containing:
//! - Allocation engine (allocate, extend, release, manual assign)
//! - Order matcher (free-text order to inventory name)
//! - Guard code generator (time-based two-factor codes)
//! - Credential rotator and expiry sweeper
//! - Marketplace worker (orders, chat commands, reviews)
//!
//! Correctness under concurrent workers rests on the store's atomic
//! conditional updates; nothing in here holds a lock across calls.

mod engine;
mod error;
mod events;
mod guard;
mod marketplace;
mod matcher;
mod notices;
mod rotator;
mod sweeper;

pub use engine::*;
pub use error::*;
pub use events::*;
pub use guard::*;
pub use marketplace::*;
pub use matcher::*;
pub use rotator::*;
pub use sweeper::*;
