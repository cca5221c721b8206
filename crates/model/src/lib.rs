//! An abstraction layer for the language models the agent talks to.
//!
//! This crate establishes an unified protocol for the agent loop to
//! interact with various model services: the messages that form a
//! conversation, the request sent to the model, and the incremental
//! events a response produces.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Sequencing the
//! calls (when to call the model, when to run tools) is left to the
//! `stepwise-core` crate.

#![deny(missing_docs)]

mod error;
mod message;
mod provider;
mod request;
mod response;

pub use error::*;
pub use message::*;
pub use provider::*;
pub use request::*;
pub use response::*;
