//! Matching engine for HelpNet.
//!
//! Ranks nearby helpers for a need, watches for clusters of urgent requests
//! and takes in new requests. Storage and geospatial lookups go through the
//! collaborator traits in `helpnet-core`.

#![allow(async_fn_in_trait)]

pub mod classify;
pub mod desk;
pub mod error;
pub mod matcher;
pub mod urgency;

pub use desk::HelpDesk;
pub use error::{Error, Result};
pub use matcher::GeoMatcher;
pub use urgency::{UrgencyMonitor, UrgencyState};
