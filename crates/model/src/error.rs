use std::error::Error;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The model service could not be reached, or the connection broke
    /// while the response was streaming.
    Unreachable,
    /// The model service rejected the request.
    Rejected,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Moderated => "content moderated",
            ErrorKind::RateLimitExceeded => "rate limit exceeded",
            ErrorKind::Unreachable => "model service unreachable",
            ErrorKind::Rejected => "request rejected",
            ErrorKind::Other => "model error",
        };
        f.write_str(s)
    }
}

/// The error type of a model provider and its responses.
///
/// The agent only looks at the [`ErrorKind`], the rest is for display.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}
