//! Concrete gateway adapters for lessord
//!
//! Provides:
//! - Clock skew against the provider's time endpoint (HTTP)
//! - Secret changes through an external helper process
//! - Webhook and log-only notifiers
//! - Shared secrets read from per-account credential files
//! - An in-process queue feeding marketplace events to the worker

mod changer;
mod credentials;
mod feed;
mod notifier;
mod skew;

pub use changer::*;
pub use credentials::*;
pub use feed::*;
pub use notifier::*;
pub use skew::*;
