//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`get`] - Single REST request through the engine
//! - [`tile`] - Single tile load through the disk cache
//! - [`cache`] - Cache management (clear, stats)
//! - [`config`] - Configuration management (path, show, init)

pub mod cache;
pub mod common;
pub mod config;
pub mod get;
pub mod tile;
