use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong with a single action invocation.
///
/// None of these are fatal to the conversation: the worker captures them and
/// publishes them as failed results.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// Malformed action configuration (non-object schema root, bad secret...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported action type: {0}")]
    UnsupportedActionType(String),

    /// Parameters were rejected before anything was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Action timed out after {0:?}")]
    Timeout(Duration),

    /// Network failure or a non-2xx response from the remote endpoint.
    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        body: Option<String>,
        message: String,
    },

    /// The endpoint answered 2xx but the body was not the expected JSON.
    #[error("Invalid response: {0}")]
    ResponseFormat(String),

    /// Barge-in cancelled the invocation before it finished.
    #[error("Cancelled by interruption")]
    CancelledByInterruption,

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The action's own code panicked. Other invocations are unaffected.
    #[error("Action panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn transport(message: impl Into<String>) -> Self {
        ActionError::Transport {
            status: None,
            body: None,
            message: message.into(),
        }
    }

    /// HTTP status captured by a transport failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ActionError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_interruption(&self) -> bool {
        matches!(self, ActionError::CancelledByInterruption)
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::Serialization(err.to_string())
    }
}

/// Worker-level faults. Unlike [`ActionError`] these end the conversation.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Actions worker is no longer accepting input")]
    InputClosed,

    #[error("Action results consumer has gone away")]
    OutputClosed,

    /// A task ended without producing a result for reasons other than a panic.
    #[error("Action task failed to join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_status_is_exposed() {
        let err = ActionError::Transport {
            status: Some(500),
            body: Some("boom".to_string()),
            message: "HTTP 500".to_string(),
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(ActionError::transport("connection refused").status(), None);
        assert_eq!(ActionError::Timeout(Duration::from_secs(10)).status(), None);
    }

    #[test]
    fn test_interruption_is_distinguishable() {
        assert!(ActionError::CancelledByInterruption.is_interruption());
        assert!(!ActionError::Validation("bad".into()).is_interruption());
    }

    #[test]
    fn test_serde_error_converts() {
        let err: ActionError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ActionError::Serialization(_)));
    }
}
