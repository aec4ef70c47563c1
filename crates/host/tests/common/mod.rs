//! Common test utilities
#![allow(dead_code, unused_imports)] // Not every test file uses every helper

pub mod harness;

pub use harness::{TestHarness, WsClient};
