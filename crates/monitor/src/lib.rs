//! `laundry-monitor` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod notify;
pub mod sampler;
pub mod supervisor;
