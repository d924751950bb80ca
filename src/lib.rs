//! WLED Manager library - scheduled backups and preset synchronization for
//! WLED lighting controllers.
//!
//! This library exposes the core of the `wledm` CLI for use in tests and
//! other applications.
//!
//! # Modules
//!
//! - `backup`: Daily backup scheduler and backup pass
//! - `sync`: Preset synchronization and the preset patch algorithm
//! - `health`: Health-check reporting to an uptime monitor
//! - `device`: WLED HTTP client abstraction
//! - `config`: Settings file loading and live reload
//! - `server`: HTTP trigger endpoints
//! - `service`: Daemon wiring
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod health;
pub mod logging;
pub mod server;
pub mod service;
pub mod sync;
