//! Core types and trait definitions for HelpNet.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the domain model shared by the social-import pipeline and the matching
//! engine, the pure scoring and anti-spam policies, and the collaborator
//! traits that storage and transport backends implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod collab;
pub mod consent;
pub mod error;
pub mod friend;
pub mod geo;
pub mod help;
pub mod matching;
pub mod metrics;
pub mod provider;
pub mod store;
pub mod token;

pub use error::{Error, Result};
