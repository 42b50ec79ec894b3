//! Startup plumbing shared by the binary entry point: configuration loading
//! and tracing setup. Kept separate from [`crate::app`], which only wires up
//! the already-loaded configuration into running tasks.

pub mod config;
pub mod tracing;
