//! Turnstile - Admission Control for API Handlers
//!
//! This crate decides whether a request may reach its handler. It layers a
//! per-endpoint rate limit (fixed window or sliding log), a global
//! per-identity limit and a ban check against a user store, and reports
//! the first rejection as a structured, client-facing error.

pub mod ban;
pub mod clock;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod ratelimit;
pub mod simulate;
pub mod store;
