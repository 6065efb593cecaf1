//! pioe host library
//!
//! This module exports the host process components for the binary and for
//! testing purposes.

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
