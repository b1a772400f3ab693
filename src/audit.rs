//! Append-only record of every committed transition.
//!
//! Entries are keyed `request_id ++ sequence` so a prefix scan returns one
//! request's history in commit order. Each entry carries the digest of its
//! predecessor; the request stores the digest of the latest one.
use chrono::Utc;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, abort};

use crate::catalogue::StepEdge;
use crate::error::{Result, WorkflowError};
use crate::ids::{AuditId, RequestId, UserId};
use crate::request::Request;
use crate::types::{Role, TimeStamp, WorkflowState};

pub const AUDIT_ENTRIES_TREE: &str = "audit_entries";

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AuditEntry {
    #[n(0)]
    pub id: AuditId,
    #[n(1)]
    pub request_id: RequestId,
    #[n(2)]
    pub sequence: u64, // 1-based position in the request's history
    #[n(3)]
    pub from_state: WorkflowState,
    #[n(4)]
    pub to_state: WorkflowState,
    #[n(5)]
    pub acted_by_user: UserId,
    #[n(6)]
    pub acted_by_role: Role,
    #[n(7)]
    pub comment: Option<String>,
    #[n(8)]
    pub acted_at: TimeStamp<Utc>,
    #[n(9)]
    pub previous_digest: Option<String>,
}

impl AuditEntry {
    /// Record of `edge` being taken on `request`, which is still in its
    /// pre-transition state.
    pub(crate) fn for_edge(
        request: &Request,
        edge: &StepEdge,
        actor: UserId,
        actor_role: Role,
        comment: Option<String>,
    ) -> Self {
        // never earlier than the commit that produced the current state
        let acted_at = TimeStamp::new().max(request.updated_at.clone());
        Self {
            id: AuditId::new(),
            request_id: request.id,
            sequence: request.version + 1,
            from_state: edge.from,
            to_state: edge.to,
            acted_by_user: actor,
            acted_by_role: actor_role,
            comment,
            acted_at,
            previous_digest: request.head_digest.clone(),
        }
    }

    pub fn key(&self) -> [u8; 24] {
        entry_key(&self.request_id, self.sequence)
    }

    /// CBOR encoding of the entry and its sha256 digest.
    pub fn build(&self) -> Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

fn entry_key(request_id: &RequestId, sequence: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(request_id.as_bytes());
    key[16..].copy_from_slice(&sequence.to_be_bytes());
    key
}

pub struct AuditTrail {
    tree: sled::Tree,
}

impl AuditTrail {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(AUDIT_ENTRIES_TREE)?,
        })
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    /// Write `entry` inside a transaction and return its digest. Refuses to
    /// overwrite: a sequence slot is written once.
    pub(crate) fn append(
        tx: &TransactionalTree,
        entry: &AuditEntry,
    ) -> ConflictableTransactionResult<String, WorkflowError> {
        let key = entry.key();
        if tx.get(key)?.is_some() {
            return abort(WorkflowError::CorruptHistory {
                request: entry.request_id,
                reason: format!("audit sequence {} already written", entry.sequence),
            });
        }
        let (digest, cbor) = match entry.build() {
            Ok(built) => built,
            Err(err) => return abort(err),
        };
        tx.insert(&key[..], cbor)?;
        Ok(digest)
    }

    /// Entries of one request in commit order. `acted_at` never decreases
    /// along it.
    pub fn history(&self, request_id: &RequestId) -> Result<Vec<AuditEntry>> {
        self.tree
            .scan_prefix(request_id.as_bytes())
            .map(|item| -> Result<AuditEntry> {
                let (_, value) = item?;
                Ok(minicbor::decode::<AuditEntry>(&value)?)
            })
            .collect()
    }

    pub fn len(&self, request_id: &RequestId) -> usize {
        self.tree.scan_prefix(request_id.as_bytes()).count()
    }

    /// Recompute every digest of the request's history and check that each
    /// entry links to its predecessor and the last one matches `head`.
    pub fn verify_chain(&self, request_id: &RequestId, head: Option<&str>) -> Result<()> {
        let entries = self.history(request_id)?;

        let mut previous: Option<String> = None;
        for (index, entry) in entries.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            if entry.sequence != expected_sequence {
                return Err(WorkflowError::CorruptHistory {
                    request: *request_id,
                    reason: format!(
                        "sequence gap: expected {expected_sequence}, found {}",
                        entry.sequence
                    ),
                });
            }
            if entry.previous_digest != previous {
                return Err(WorkflowError::CorruptHistory {
                    request: *request_id,
                    reason: format!("entry {} does not link to its predecessor", entry.sequence),
                });
            }
            let (digest, _) = entry.build()?;
            previous = Some(digest);
        }

        if previous.as_deref() != head {
            return Err(WorkflowError::CorruptHistory {
                request: *request_id,
                reason: "request head does not match the last audit entry".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestType;
    use tempfile::tempdir;

    fn edge(from: WorkflowState, to: WorkflowState, role: Role) -> StepEdge {
        StepEdge {
            request_type: RequestType::Leave,
            from,
            to,
            required_role: Some(role),
            order: 1,
        }
    }

    #[test]
    fn keys_group_by_request_and_sort_by_sequence() {
        let id = RequestId::new();
        let a = entry_key(&id, 1);
        let b = entry_key(&id, 2);
        let c = entry_key(&id, 256);

        assert!(a < b && b < c);
        assert_eq!(&a[..16], id.as_bytes());
    }

    #[test]
    fn append_links_entries_and_refuses_overwrite() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = sled::open(temp_dir.path().join("audit.db"))?;
        let trail = AuditTrail::open(&db)?;

        let mut request = Request::draft(RequestType::Leave, UserId::new());
        let first = AuditEntry::for_edge(
            &request,
            &edge(WorkflowState::Draft, WorkflowState::Submitted, Role::Requester),
            request.requester,
            Role::Requester,
            None,
        );
        let digest = trail
            .tree()
            .transaction(|tx| AuditTrail::append(tx, &first))
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        request.version = 1;
        request.head_digest = Some(digest.clone());

        let second = AuditEntry::for_edge(
            &request,
            &edge(WorkflowState::Submitted, WorkflowState::ValidationLevel1, Role::N1),
            UserId::new(),
            Role::N1,
            Some("ok".into()),
        );
        assert_eq!(second.sequence, 2);
        assert_eq!(second.previous_digest.as_deref(), Some(digest.as_str()));
        let head = trail
            .tree()
            .transaction(|tx| AuditTrail::append(tx, &second))
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;

        trail.verify_chain(&request.id, Some(head.as_str()))?;
        assert!(trail.verify_chain(&request.id, Some(digest.as_str())).is_err());

        // writing sequence 2 again is refused
        let replay = trail.tree().transaction(|tx| AuditTrail::append(tx, &second));
        assert!(replay.is_err());
        assert_eq!(trail.len(&request.id), 2);

        Ok(())
    }

    #[test]
    fn acted_at_never_precedes_the_last_commit() {
        let mut request = Request::draft(RequestType::Training, UserId::new());
        // the previous commit was stamped by a clock running ahead
        request.updated_at = TimeStamp::new_with(2100, 1, 1, 0, 0, 0);

        let entry = AuditEntry::for_edge(
            &request,
            &edge(WorkflowState::Draft, WorkflowState::Submitted, Role::Requester),
            request.requester,
            Role::Requester,
            None,
        );
        assert_eq!(entry.acted_at, request.updated_at);
    }

    #[test]
    fn history_follows_sequence_not_clock() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = sled::open(temp_dir.path().join("audit_order.db"))?;
        let trail = AuditTrail::open(&db)?;

        let mut request = Request::draft(RequestType::Leave, UserId::new());
        let steps = [
            edge(WorkflowState::Draft, WorkflowState::Submitted, Role::Requester),
            edge(WorkflowState::Submitted, WorkflowState::ValidationLevel1, Role::N1),
        ];
        let stamps = [
            TimeStamp::new_with(2024, 5, 2, 10, 0, 0),
            TimeStamp::new_with(2024, 5, 1, 10, 0, 0),
        ];
        for (step, stamp) in steps.iter().zip(stamps) {
            let mut entry = AuditEntry::for_edge(&request, step, request.requester, step.required_role.unwrap(), None);
            entry.acted_at = stamp;
            let digest = trail
                .tree()
                .transaction(|tx| AuditTrail::append(tx, &entry))
                .map_err(|e| anyhow::anyhow!("{e:?}"))?;
            request.version = entry.sequence;
            request.head_digest = Some(digest);
        }

        let history = trail.history(&request.id)?;
        assert_eq!(history[0].sequence, 1);
        assert_eq!(history[1].to_state, WorkflowState::ValidationLevel1);
        trail.verify_chain(&request.id, request.head_digest.as_deref())?;
        Ok(())
    }

    #[test]
    fn history_is_scoped_to_one_request() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = sled::open(temp_dir.path().join("audit_scope.db"))?;
        let trail = AuditTrail::open(&db)?;

        let mine = Request::draft(RequestType::Leave, UserId::new());
        let other = Request::draft(RequestType::Leave, UserId::new());
        let step = edge(WorkflowState::Draft, WorkflowState::Submitted, Role::Requester);
        for request in [&mine, &other] {
            let entry = AuditEntry::for_edge(request, &step, request.requester, Role::Requester, None);
            trail
                .tree()
                .transaction(|tx| AuditTrail::append(tx, &entry))
                .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        }

        let history = trail.history(&mine.id)?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].request_id, mine.id);
        Ok(())
    }
}
