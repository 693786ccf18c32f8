//! # Middleware Stack
//!
//! - [`metrics`]: request counters and latency histograms.
//!
//! Request tracing uses `tower_http::trace::TraceLayer` directly and
//! authentication lives in [`crate::auth`].

pub mod metrics;
