//! Core logic of the agent: the run loop, model invocation, tool
//! dispatch, conversation state and progress notices.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod error;
pub mod event;
pub mod model_client;
pub mod tool;

pub use agent::{Agent, AgentBuilder, RunEvent, RunResult, RunStream};
pub use error::{AgentError, ModelError};
