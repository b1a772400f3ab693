use crate::ids::{RequestId, UserId};
use crate::types::{RequestType, Role, WorkflowState};

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("user {0} is unknown to the directory")]
    UnknownUser(UserId),
    #[error("invalid transition for {request_type} request: {from} -> {to}")]
    InvalidTransition {
        request_type: RequestType,
        from: WorkflowState,
        to: WorkflowState,
    },
    #[error(
        "user {actor} is not authorized to move the request to {target}; this action must be performed by: {}",
        expected.as_deref().unwrap_or("unknown")
    )]
    Unauthorized {
        actor: UserId,
        target: WorkflowState,
        expected: Option<String>,
    },
    #[error("request {request} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        request: RequestId,
        expected: u64,
        found: u64,
    },
    #[error("history of request {request} is inconsistent: {reason}")]
    CorruptHistory { request: RequestId, reason: String },
    #[error(
        "catalogue holds circuit version {seeded}; refusing to seed version {requested} over it"
    )]
    CircuitMismatch { seeded: u32, requested: u32 },
    #[error("user {actor} cannot act as {claimed} on the move to {target}")]
    RoleMismatch {
        actor: UserId,
        claimed: Role,
        target: WorkflowState,
    },
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// True when the call failed without touching persisted state because of
    /// the caller's input rather than the store.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WorkflowError::NotFound(_)
                | WorkflowError::UnknownUser(_)
                | WorkflowError::InvalidTransition { .. }
                | WorkflowError::Unauthorized { .. }
                | WorkflowError::RoleMismatch { .. }
                | WorkflowError::Conflict { .. }
        )
    }
}
