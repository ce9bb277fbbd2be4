//! Core types and decision logic for the WePool membership service.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! qualification engine, override ledger, assignment matcher and referral
//! graph builder are written against the [`store::MemberStore`] abstraction;
//! concrete backends live in their own crates.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod account;
pub mod assignment;
pub mod error;
pub mod ledger;
pub mod member;
pub mod notify;
pub mod qualification;
pub mod referral;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
