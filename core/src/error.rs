use blockgate_abi::GatewayStatus;
use blockgate_signals::ConfigurationError;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures raised while constructing or dispatching a block
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed port signature or block declaration
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Null address, negative count or misuse of a buffer view
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    /// `work` / `general_work` called without an override
    #[error("{0} not implemented")]
    NotImplemented(&'static str),

    /// Error returned by block code
    #[error("block callback failed: {0:#}")]
    UserCallback(anyhow::Error),

    /// Block code panicked. `trace` is the stack at the panic site, when captured.
    #[error("block callback panicked: {message}")]
    Panic { message: String, trace: String },

    /// Unknown action tag or fields inconsistent with the block's ports
    #[error("invalid dispatch message: {0}")]
    InvalidMessage(String),

    /// A handler behind the C ABI reported a failure
    #[error("handler returned {status:?}: {message}")]
    Foreign { status: GatewayStatus, message: String },

    #[error("null handle passed across the gateway")]
    NullHandle,
}

impl GatewayError {
    /// Status code reported to a native caller
    pub fn status(&self) -> GatewayStatus {
        match self {
            GatewayError::Configuration(_) => GatewayStatus::Configuration,
            GatewayError::InvalidBuffer(_) => GatewayStatus::InvalidBuffer,
            GatewayError::NotImplemented(_) => GatewayStatus::NotImplemented,
            GatewayError::UserCallback(_) => GatewayStatus::UserCallback,
            GatewayError::Panic { .. } => GatewayStatus::Panic,
            GatewayError::InvalidMessage(_) => GatewayStatus::InvalidMessage,
            GatewayError::Foreign { status, .. } => *status,
            GatewayError::NullHandle => GatewayStatus::NullHandle,
        }
    }

    /// Classify an error coming back from block code.
    /// A `GatewayError` raised inside the block keeps its own tag.
    pub fn from_callback(err: anyhow::Error) -> Self {
        match err.downcast::<GatewayError>() {
            Ok(gateway_err) => gateway_err,
            Err(other) => GatewayError::UserCallback(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_errors_keep_gateway_tag() {
        let err = GatewayError::from_callback(GatewayError::NotImplemented("work").into());
        assert!(matches!(err, GatewayError::NotImplemented("work")));
        assert_eq!(err.status(), GatewayStatus::NotImplemented);
    }

    #[test]
    fn test_other_errors_become_user_callback() {
        let err = GatewayError::from_callback(anyhow::anyhow!("filter diverged"));
        assert!(matches!(err, GatewayError::UserCallback(_)));
        assert_eq!(err.status(), GatewayStatus::UserCallback);
        assert!(err.to_string().contains("filter diverged"));
    }
}
