//! Service layer API for request workflow operations
use std::sync::Arc;

use sled::Transactional;
use sled::transaction::TransactionError;

use crate::audit::{AuditEntry, AuditTrail};
use crate::authorizer::{HierarchyAuthorizer, Resolution};
use crate::catalogue::{Circuit, StepCatalogue, StepEdge};
use crate::config::CatalogueConfig;
use crate::directory::{Directory, Person};
use crate::error::{Result, WorkflowError};
use crate::ids::{RequestId, UserId};
use crate::request::Request;
use crate::store::RequestStore;
use crate::types::{RequestType, Role, WorkflowState};

/// A caller's demand to move a request to `target`.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub request_id: RequestId,
    pub target: WorkflowState,
    pub actor: UserId,
    pub actor_role: Role,
    pub comment: Option<String>,
    skip_hierarchy_check: bool,
}

impl TransitionRequest {
    pub fn new(request_id: RequestId, target: WorkflowState, actor: UserId, actor_role: Role) -> Self {
        Self {
            request_id,
            target,
            actor,
            actor_role,
            comment: None,
            skip_hierarchy_check: false,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Proceed on catalogue legality alone. For administrative tooling and
    /// trusted internal callers only; never derive this from end-user input.
    pub fn skip_hierarchy_check(mut self) -> Self {
        self.skip_hierarchy_check = true;
        self
    }

    pub fn skips_hierarchy_check(&self) -> bool {
        self.skip_hierarchy_check
    }
}

pub struct WorkflowService<D> {
    instance: Arc<sled::Db>,
    circuit: Circuit,
    catalogue: StepCatalogue,
    requests: RequestStore,
    audit: AuditTrail,
    authorizer: HierarchyAuthorizer<D>,
}

impl<D: Directory> WorkflowService<D> {
    pub fn new(instance: Arc<sled::Db>, directory: D, settings: &CatalogueConfig) -> Result<Self> {
        Ok(Self {
            catalogue: StepCatalogue::open(&instance, settings.cache_ttl())?,
            requests: RequestStore::open(&instance)?,
            audit: AuditTrail::open(&instance)?,
            authorizer: HierarchyAuthorizer::new(directory),
            circuit: settings.circuit,
            instance,
        })
    }

    /// Ensure the configured circuit is seeded. Safe on every start; fails
    /// with `CircuitMismatch` when the database holds another circuit.
    pub fn bootstrap(&self) -> Result<usize> {
        self.catalogue.seed_circuit(self.circuit)
    }

    pub fn catalogue(&self) -> &StepCatalogue {
        &self.catalogue
    }

    pub fn authorizer(&self) -> &HierarchyAuthorizer<D> {
        &self.authorizer
    }

    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    /// Open a new request in `Draft` on behalf of `requester`.
    pub fn create_request(&self, request_type: RequestType, requester: UserId) -> Result<Request> {
        if self.authorizer.directory().person(&requester)?.is_none() {
            return Err(WorkflowError::UnknownUser(requester));
        }

        let request = Request::draft(request_type, requester);
        self.requests.insert_new(&request)?;

        tracing::info!(
            request_id = %request.id,
            request_type = %request_type,
            requester = %requester,
            "request created"
        );
        Ok(request)
    }

    pub fn request(&self, request_id: &RequestId) -> Result<Request> {
        self.requests.load(request_id)
    }

    pub fn lookup_edge(&self, request_type: RequestType, from: WorkflowState) -> Result<Vec<StepEdge>> {
        self.catalogue.lookup_edge(request_type, from)
    }

    /// Moves open to the request from its current state, with steps nobody
    /// occupies for its requester folded away.
    pub fn next_states(&self, request_id: &RequestId) -> Result<Vec<StepEdge>> {
        let request = self.requests.load(request_id)?;
        self.route(&request)
    }

    /// Outgoing edges of the request once vacant steps are skipped.
    ///
    /// The forward edge runs from the current state to the end of the first
    /// catalogue step whose role someone occupies for the requester; skipped
    /// states are never entered. The rejection edge is decided by the
    /// catalogue's rejecting role when occupied, otherwise by whoever takes
    /// the forward edge. A request with no occupied role left ahead can only
    /// be archived.
    fn route(&self, request: &Request) -> Result<Vec<StepEdge>> {
        if request.is_terminal() {
            return Ok(Vec::new());
        }
        let hierarchy = self.authorizer.hierarchy(&request.requester)?;

        let mut state = request.current_state;
        let mut forward = None;
        for _ in 0..WorkflowState::ALL.len() {
            let Some(next) = self
                .catalogue
                .lookup_edge(request.request_type, state)?
                .into_iter()
                .find(|edge| !edge.is_rejection())
            else {
                break;
            };
            if hierarchy.is_occupied(next.required_role) {
                forward = Some(StepEdge {
                    from: request.current_state,
                    ..next
                });
                break;
            }
            tracing::debug!(
                request_id = %request.id,
                skipped = %next.to,
                role = ?next.required_role,
                "no validator occupies step"
            );
            state = next.to;
        }

        let mut edges = Vec::with_capacity(2);
        let rejection = self.catalogue.edge(
            request.request_type,
            request.current_state,
            WorkflowState::Rejected,
        )?;
        let decider = rejection.and_then(|edge| {
            edge.required_role
                .filter(|role| hierarchy.holder(*role).is_some())
                .or_else(|| forward.and_then(|f| f.required_role))
        });
        edges.extend(forward);
        if let (Some(edge), Some(role)) = (rejection, decider) {
            edges.push(StepEdge {
                required_role: Some(role),
                ..edge
            });
        }
        Ok(edges)
    }

    fn routed_edge(&self, request: &Request, target: WorkflowState) -> Result<Option<StepEdge>> {
        Ok(self.route(request)?.into_iter().find(|edge| edge.to == target))
    }

    pub fn history(&self, request_id: &RequestId) -> Result<Vec<AuditEntry>> {
        // unknown ids are an error, not an empty history
        self.requests.load(request_id)?;
        self.audit.history(request_id)
    }

    pub fn expected_validator(&self, request_id: &RequestId, target: WorkflowState) -> Result<Option<Person>> {
        let request = self.requests.load(request_id)?;
        match self.routed_edge(&request, target)? {
            Some(edge) => self.authorizer.expected_validator(&request, edge.required_role),
            None => Ok(None),
        }
    }

    pub fn can_validate(&self, actor: &UserId, request_id: &RequestId, target: WorkflowState) -> Result<bool> {
        let request = self.requests.load(request_id)?;
        match self.routed_edge(&request, target)? {
            Some(edge) => self.authorizer.can_validate(actor, &request, edge.required_role),
            None => Ok(false),
        }
    }

    /// Move a request along one edge of its route.
    ///
    /// The request update and its audit entry are written in one sled
    /// transaction, guarded by the version the checks ran against. Nothing is
    /// written when any check fails. With the hierarchy bypass any catalogue
    /// edge out of the current state is also accepted.
    #[tracing::instrument(
        skip(self, cmd),
        fields(request_id = %cmd.request_id, target = %cmd.target, actor = %cmd.actor)
    )]
    pub fn transition(&self, cmd: TransitionRequest) -> Result<Request> {
        let request = self.requests.load(&cmd.request_id)?;

        let catalogued = if cmd.skip_hierarchy_check {
            self.catalogue
                .edge(request.request_type, request.current_state, cmd.target)?
        } else {
            None
        };
        let edge = match catalogued {
            Some(edge) => Some(edge),
            None => self.routed_edge(&request, cmd.target)?,
        }
        .ok_or(WorkflowError::InvalidTransition {
            request_type: request.request_type,
            from: request.current_state,
            to: cmd.target,
        })?;

        if cmd.skip_hierarchy_check {
            tracing::info!(actor_role = %cmd.actor_role, "hierarchy check bypassed");
        } else if !self
            .authorizer
            .can_validate(&cmd.actor, &request, edge.required_role)?
        {
            let expected = self
                .authorizer
                .expected_validator(&request, edge.required_role)?;
            tracing::debug!(
                expected = ?expected.as_ref().map(|p| p.display_name.as_str()),
                "actor is not the expected validator"
            );
            return Err(WorkflowError::Unauthorized {
                actor: cmd.actor,
                target: cmd.target,
                expected: expected.map(|person| person.display_name),
            });
        } else if !self.claim_holds(&cmd, &request, &edge)? {
            return Err(WorkflowError::RoleMismatch {
                actor: cmd.actor,
                claimed: cmd.actor_role,
                target: cmd.target,
            });
        }

        let entry = AuditEntry::for_edge(&request, &edge, cmd.actor, cmd.actor_role, cmd.comment);
        let updated = self.commit(&request, &edge, &entry)?;

        tracing::info!(
            from = %edge.from,
            to = %edge.to,
            version = updated.version,
            "transition committed"
        );
        Ok(updated)
    }

    // The role written to the audit trail must be the edge's role, or on a
    // role-less edge one the actor occupies for this requester.
    fn claim_holds(&self, cmd: &TransitionRequest, request: &Request, edge: &StepEdge) -> Result<bool> {
        match edge.required_role {
            Some(required) => Ok(cmd.actor_role == required),
            None => self.authorizer.holds_role(&cmd.actor, request, cmd.actor_role),
        }
    }

    fn commit(&self, request: &Request, edge: &StepEdge, entry: &AuditEntry) -> Result<Request> {
        (self.requests.tree(), self.audit.tree())
            .transaction(|(requests, audit)| {
                RequestStore::expect_version(requests, &request.id, request.version)?;
                let digest = AuditTrail::append(audit, entry)?;

                let mut updated = request.clone();
                updated.current_state = edge.to;
                updated.current_assignee_role = edge.required_role;
                updated.updated_at = entry.acted_at.clone();
                updated.version = entry.sequence;
                updated.head_digest = Some(digest);
                RequestStore::write(requests, &updated)?;

                Ok(updated)
            })
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => WorkflowError::PersistenceFailure(err),
            })
    }

    /// Open requests whose next forward step on their route falls to `user`.
    pub fn pending_for(&self, user: &UserId) -> Result<Vec<Request>> {
        let mut pending = Vec::new();
        for request in self.requests.iter() {
            let request = request?;
            if request.is_terminal() {
                continue;
            }

            let edges = match self.route(&request) {
                Ok(edges) => edges,
                Err(WorkflowError::UnknownUser(requester)) => {
                    tracing::warn!(
                        request_id = %request.id,
                        requester = %requester,
                        "requester missing from directory"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };
            let Some(forward) = edges.iter().find(|edge| !edge.is_rejection()) else {
                continue;
            };
            // a role-less step waits on the requester
            let waits_on = match self.authorizer.resolve(&request, forward.required_role)? {
                Resolution::Person(person) => Some(person.id),
                Resolution::Anyone => Some(request.requester),
                Resolution::Vacant(_) => None,
            };
            if waits_on == Some(*user) {
                pending.push(request);
            }
        }
        Ok(pending)
    }

    /// Rebuild the current state from the audit trail.
    pub fn replay(&self, request_id: &RequestId) -> Result<WorkflowState> {
        let request = self.requests.load(request_id)?;
        let entries = self.audit.history(request_id)?;

        let corrupt = |reason: String| WorkflowError::CorruptHistory {
            request: *request_id,
            reason,
        };

        let state = entries
            .iter()
            .try_fold(WorkflowState::Draft, |state, entry| {
                if entry.from_state == state {
                    Ok(entry.to_state)
                } else {
                    Err(corrupt(format!(
                        "entry {} leaves {} but the request was in {}",
                        entry.sequence, entry.from_state, state
                    )))
                }
            })?;

        if state != request.current_state {
            return Err(corrupt(format!(
                "history ends in {state} but the request is in {}",
                request.current_state
            )));
        }
        if entries.len() as u64 != request.version {
            return Err(corrupt(format!(
                "{} entries recorded for version {}",
                entries.len(),
                request.version
            )));
        }
        Ok(state)
    }

    /// Replay plus digest chain verification.
    pub fn verify(&self, request_id: &RequestId) -> Result<()> {
        self.replay(request_id)?;
        let request = self.requests.load(request_id)?;
        self.audit
            .verify_chain(request_id, request.head_digest.as_deref())
    }
}
