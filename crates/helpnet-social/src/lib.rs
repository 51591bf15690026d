//! Social-import pipeline for HelpNet.
//!
//! Authenticates users against external networks, pages through their
//! contacts under per-provider rate limits, anonymises what comes back and
//! sends invitations behind consent and anti-spam checks.
//!
//! Every component is constructed explicitly and shared by the host
//! application; nothing here is a process-global.

// Native `async fn` in traits, as in `helpnet-core`.
#![allow(async_fn_in_trait)]

pub mod anonymize;
pub mod antispam;
pub mod cancel;
pub mod connector;
pub mod consent;
pub mod error;
pub mod importer;
pub mod rate_limit;
pub mod registry;
pub mod vault;

pub use error::{Error, Result};
pub use importer::SocialImporter;
