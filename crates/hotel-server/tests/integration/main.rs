//! Integration test entry point for hotel-server.
//!
//! Run with: cargo test --test integration

mod harness;
mod scenarios;
mod connections;
