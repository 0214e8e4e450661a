//! Utilities shared by the harness core and the CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::{Config, Overrides};
pub use error::{Action, Error, ErrorKind, Result};
