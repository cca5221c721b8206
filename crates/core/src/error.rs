use std::fmt::{self, Display};
use std::time::Duration;

use stepwise_model::{ErrorKind, ModelProviderError};
use thiserror::Error;

/// An error reported by the model service.
///
/// This wraps the provider's own error type, so the agent doesn't need to
/// be generic over it.
#[derive(Debug)]
pub struct ModelError(Box<dyn ModelProviderError>);

impl ModelError {
    #[inline]
    pub(crate) fn new<E: ModelProviderError>(err: E) -> Self {
        Self(Box::new(err))
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    /// Returns the provider's original error.
    #[inline]
    pub fn into_inner(self) -> Box<dyn ModelProviderError> {
        self.0
    }
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ModelError {}

/// An error that terminates a run.
///
/// Problems with individual tool calls never show up here, they are
/// reported back to the model as tool messages instead.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model service was unreachable or rejected the request.
    #[error("model request failed: {0}")]
    Model(#[from] ModelError),
    /// The run didn't finish within the configured duration.
    #[error("run timed out after {0:?}")]
    Timeout(Duration),
}
