//! stereocam library crate.
//!
//! This module exposes the internal components for integration testing.

pub mod auto_exposure;
pub mod calibration;
pub mod camera;
pub mod cli;
pub mod config;
pub mod run_loop;
pub mod sink;
