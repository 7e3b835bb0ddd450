//! `tomoatt-prep` library crate.
//!
//! The binary (`pta`) is a thin wrapper around this library so that:
//!
//! - grid, model and catalog logic is testable without spawning processes
//! - the same pipelines can be driven from scripts or other tools
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod grid;
pub mod io;
pub mod logging;
pub mod math;
pub mod model;
