//! Link error types

use thiserror::Error;

/// Errors raised by a [`crate::MountDevice`] implementation.
///
/// The link itself never surfaces these to its callers; they are logged and
/// turned into absent results.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Not connected")]
    NotConnected,

    #[error("Command family {0} not supported by this driver")]
    Unsupported(crate::CommandFamily),

    #[error("Connection property {0} not exposed by this driver")]
    PropertyUnavailable(crate::ConnectionProperty),

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Device error: {0}")]
    Device(String),
}

impl LinkError {
    /// Create a transport error without an underlying cause
    pub fn transport(message: impl Into<String>) -> Self {
        LinkError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping the cause that produced it
    pub fn transport_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LinkError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Render the error followed by every nested cause, `a: b: c`
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(inner) = cause {
            out.push_str(": ");
            out.push_str(&inner.to_string());
            cause = inner.source();
        }
        out
    }
}
