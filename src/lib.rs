//! Deploy Config MCP Server Library
//!
//! Versioned configuration templates, per-customer compilations and their
//! resolution, exported for the binary, the REST surface and tests.

pub mod api;
pub mod build;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod format;
pub mod lineage;
pub mod logging;
pub mod merge;
pub mod overrides;
pub mod resolve;
pub mod tools;
pub mod types;
pub mod validate;
pub mod versioning;
