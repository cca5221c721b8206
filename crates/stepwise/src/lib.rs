//! A ready-to-use agent that assembles the built-in tools and the
//! OpenAI-compatible model provider.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring agent functionality into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod session;
pub mod tools;

pub use config::{Config, ConfigError};
pub use session::{Session, SessionBuilder};

/// Re-exports of [`stepwise_core`] crate.
pub mod core {
    pub use stepwise_core::*;
}
