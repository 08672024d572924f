//! Request-time errors.
//!
//! These are the errors a handler can observe while a request is in flight
//! (body reads, JSON binding, response encoding) and the ones middleware
//! record into the context's error list. Construction-time failures live
//! next to the code that constructs: `ConfigError`, `CorsError`,
//! `StartupError`.

/// Errors surfaced to handlers and accumulated in [`Context::errors`].
///
/// [`Context::errors`]: crate::http::Context::errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request body is larger than the configured ceiling.
    #[error("request body exceeds the limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The request body stream failed before it could be buffered.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// The buffered body is not valid JSON for the requested type.
    #[error("failed to decode request body: {0}")]
    Decode(#[source] serde_json::Error),

    /// A response value could not be serialized.
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    /// Writing to the response writer failed.
    #[error("response write failed: {0}")]
    Io(#[from] std::io::Error),

    /// A handler panicked and the panic was caught by the recovery middleware.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// Anything a handler wants to record that is not covered above.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary error for [`Context::add_error`].
    ///
    /// [`Context::add_error`]: crate::http::Context::add_error
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Other(Box::new(err))
    }

    /// True for input errors caused by the body-size ceiling.
    pub fn is_body_too_large(&self) -> bool {
        matches!(self, Error::BodyTooLarge { .. })
    }
}
