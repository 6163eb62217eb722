//! Floodgate - Per-Identity Admission Control
//!
//! This crate decides, per request, whether a client identity (usually an IP
//! address) may proceed. Each identity gets its own token bucket; identities
//! that go idle are expired by a background sweep so memory stays bounded.
//! An HTTP adapter and a small gateway binary are included.

pub mod config;
pub mod error;
pub mod gateway;
pub mod ratelimit;

pub use ratelimit::{AdmissionControl, Limiter, LimiterOptions};
