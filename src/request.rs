//! The administrative request as persisted by the engine.
use chrono::Utc;

use crate::ids::{RequestId, UserId};
use crate::types::{RequestType, Role, TimeStamp, WorkflowState};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Request {
    #[n(0)]
    pub id: RequestId,
    #[n(1)]
    pub request_type: RequestType,
    #[n(2)]
    pub current_state: WorkflowState,
    #[n(3)]
    pub current_assignee_role: Option<Role>,
    #[n(4)]
    pub requester: UserId,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub updated_at: TimeStamp<Utc>,
    // number of committed transitions, checked on every write
    #[n(7)]
    pub version: u64,
    // digest of the latest audit entry
    #[n(8)]
    pub head_digest: Option<String>,
}

impl Request {
    /// A fresh request in `Draft`, not yet persisted.
    pub fn draft(request_type: RequestType, requester: UserId) -> Self {
        let now = TimeStamp::new();
        Self {
            id: RequestId::new(),
            request_type,
            current_state: WorkflowState::Draft,
            current_assignee_role: None,
            requester,
            created_at: now.clone(),
            updated_at: now,
            version: 0,
            head_digest: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    pub(crate) fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> crate::Result<Self> {
        Ok(minicbor::decode(bytes)?)
    }
}
