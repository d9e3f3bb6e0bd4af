//! Lease error taxonomy

use lessor_api::ErrorCode;
use lessor_gateway_api::GatewayError;
use lessor_store::StoreError;
use lessor_util::AccountId;
use thiserror::Error;

/// Errors from lease operations
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Unknown inventory name or account id
    #[error("Not found: {0}")]
    NotFound(String),

    /// No free row of the lot (the claim raced and lost)
    #[error("No free account for '{0}'")]
    Conflict(String),

    #[error("Account {0} is already leased")]
    AlreadyLeased(AccountId),

    #[error("No active lease: {0}")]
    NotLeased(String),

    #[error("Rotation failed: {0}")]
    RotationFailed(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LeaseError {
    /// Protocol error code for IPC responses
    pub fn code(&self) -> ErrorCode {
        match self {
            LeaseError::NotFound(_) => ErrorCode::NotFound,
            LeaseError::Conflict(_) => ErrorCode::Conflict,
            LeaseError::AlreadyLeased(_) => ErrorCode::AlreadyLeased,
            LeaseError::NotLeased(_) => ErrorCode::NotLeased,
            LeaseError::RotationFailed(_) => ErrorCode::RotationFailed,
            LeaseError::TransientNetwork(_) => ErrorCode::TransientNetwork,
            LeaseError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            LeaseError::Store(_) => ErrorCode::InternalError,
        }
    }
}

impl From<GatewayError> for LeaseError {
    fn from(e: GatewayError) -> Self {
        if e.is_transient() {
            LeaseError::TransientNetwork(e.to_string())
        } else {
            LeaseError::RotationFailed(e.to_string())
        }
    }
}

pub type LeaseResult<T> = Result<T, LeaseError>;

/// Errors from guard code generation
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Invalid shared secret: {0}")]
    InvalidSecret(String),

    #[error("Credential lookup failed: {0}")]
    Credential(#[from] GatewayError),
}
