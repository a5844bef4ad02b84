#![forbid(unsafe_code)]

//! Step-weighted progress estimation streamed over server-sent events.
//!
//! The [`producer`] runs declared steps on the server and streams a
//! `step` event before each one, weighted by historical durations kept in
//! a [`persistence::CounterStore`]. The [`consumer`] follows that stream,
//! feeding a [`tracker::ProgressTracker`] that turns step boundaries and
//! elapsed time into a smoothly increasing percentage.

pub mod config;
pub mod consumer;
pub mod deferred;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod producer;
pub mod tracker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
