use shared::domain::StepId;
use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong";
pub const BACKEND_UNREACHABLE_MESSAGE: &str = "Network error. Make sure the backend is running.";

/// Failure of a single backend call, already normalized to a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The backend answered with a non-success status.
    #[error("{message}")]
    Server { status: u16, message: String },
    /// No response was obtained.
    #[error("{}", BACKEND_UNREACHABLE_MESSAGE)]
    Unreachable { detail: String },
    /// A success response whose body did not match the expected shape.
    #[error("{}", GENERIC_FAILURE_MESSAGE)]
    Decode { detail: String },
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client-side precondition failures. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a website URL")]
    EmptyUrl,
    #[error("Please enter a valid URL (e.g., https://example.com)")]
    MalformedUrl,
    #[error("Please enter your email address")]
    EmptyEmail,
    #[error("Please enter the 6-digit code from your email")]
    InvalidCode,
    #[error("Please enter your name")]
    EmptyName,
    #[error("Please enter a message")]
    EmptyMessage,
    #[error("unknown improvement step {0}")]
    UnknownStep(StepId),
}
