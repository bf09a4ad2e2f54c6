//! Integration test utilities for the relay gateway
//!
//! This crate provides a mock gateway and fixtures for running end-to-end
//! tests of the client against a real WebSocket connection.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
