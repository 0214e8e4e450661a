//! YAML test scenarios
//!
//! Lets a UI test be written as a list of steps instead of Rust code. Each
//! scenario runs through the lifecycle controller like any other test.

mod config;
mod runner;

pub use config::*;
pub use runner::{load_all, ConsoleHooks, ScenarioTest};
