//! Uptime monitoring engine.
//!
//! The binary runs the scheduler and retention loops; everything else is
//! exposed as a library so an embedding UI or HTTP layer can drive the
//! admin boundary ([`service::UptimerService`]) directly.

pub mod analytics;
pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod notify;
pub mod pool;
pub mod ratelimit;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod snapshots;
#[cfg(test)]
mod testutil;
