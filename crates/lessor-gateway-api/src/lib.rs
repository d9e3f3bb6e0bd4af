//! Gateway trait interfaces for lessord
//!
//! This crate defines the boundary between the leasing core and the outside
//! world: the renter/administrator messaging channel, the account provider
//! where secrets are changed, the time source used for guard codes, and the
//! marketplace event feed. It contains no network code itself; concrete
//! adapters live in `lessor-gateway`, and `mock` provides in-memory doubles
//! for tests.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
