use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("invalid arguments for {method}: {reason}")]
    CommandArgument { method: String, reason: String },
    #[error("malformed method call: {0}")]
    MalformedCall(String),
    #[error("session controller stopped")]
    ControllerClosed,
}

impl SessionError {
    /// Error code carried in a channel error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECT_ERROR",
            Self::Publish(_) => "PUBLISH_ERROR",
            Self::Subscribe(_) => "SUBSCRIBE_ERROR",
            Self::CommandArgument { .. } => "INVALID_ARGUMENTS",
            Self::MalformedCall(_) => "MALFORMED_CALL",
            Self::ControllerClosed => "CONTROLLER_CLOSED",
        }
    }
}
