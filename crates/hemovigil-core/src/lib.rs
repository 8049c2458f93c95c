//! Core types and trait definitions for the hemovigil reserve monitor.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod delivery;
pub mod event;
pub mod region;
pub mod reserve;
pub mod rules;
pub mod snapshot;
pub mod store;
pub mod subscription;
pub mod threshold;
