//! Catalogue of legal workflow edges.
//!
//! Edges live in the `step_edges` tree keyed by `[type, from, to]`, so the
//! triple is unique by construction and a prefix scan on `[type, from]`
//! yields the outgoing edges of one state. Reads go through an in-memory
//! snapshot that expires after a TTL or on [`StepCatalogue::invalidate`].
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use sled::Transactional;
use sled::transaction::TransactionError;

use crate::error::{Result, WorkflowError};
use crate::types::{RequestType, Role, WorkflowState};

pub const STEP_EDGES_TREE: &str = "step_edges";
pub const CATALOGUE_META_TREE: &str = "catalogue_meta";

const CIRCUIT_KEY: &[u8] = b"circuit_version";

// rejection edges sort after every forward edge of the same state
const REJECTION_ORDER_OFFSET: u32 = 100;

/// One edge of a circuit, before it is bound to a request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStep {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub required_role: Option<Role>,
    pub order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub struct StepEdge {
    #[n(0)]
    pub request_type: RequestType,
    #[n(1)]
    pub from: WorkflowState,
    #[n(2)]
    pub to: WorkflowState,
    #[n(3)]
    pub required_role: Option<Role>,
    #[n(4)]
    pub order: u32,
}

/// Versioned circuit definitions. `Standard` is canonical; `Extended` adds a
/// general-director signature before the finance director signs. Permission
/// requests stop after the second level on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Circuit {
    #[default]
    Standard,
    Extended,
}

impl CircuitStep {
    pub fn new(from: WorkflowState, to: WorkflowState, required_role: Option<Role>, order: u32) -> Self {
        Self {
            from,
            to,
            required_role,
            order,
        }
    }

    fn bind(self, request_type: RequestType) -> StepEdge {
        StepEdge {
            request_type,
            from: self.from,
            to: self.to,
            required_role: self.required_role,
            order: self.order,
        }
    }
}

impl StepEdge {
    pub fn key(&self) -> [u8; 3] {
        edge_key(self.request_type, self.from, self.to)
    }

    pub fn is_rejection(&self) -> bool {
        self.to == WorkflowState::Rejected
    }
}

impl Circuit {
    pub const ALL: [Circuit; 2] = [Circuit::Standard, Circuit::Extended];

    pub fn version(self) -> u32 {
        match self {
            Circuit::Standard => 1,
            Circuit::Extended => 2,
        }
    }

    pub fn from_version(version: u32) -> Option<Circuit> {
        Circuit::ALL.into_iter().find(|c| c.version() == version)
    }

    /// Forward edges from `Draft` to `Archived` for `request_type`.
    pub fn forward_steps(self, request_type: RequestType) -> Vec<CircuitStep> {
        use WorkflowState::*;

        let mut steps = vec![
            CircuitStep::new(Draft, Submitted, Some(Role::Requester), 1),
            CircuitStep::new(Submitted, ValidationLevel1, Some(Role::N1), 2),
            CircuitStep::new(ValidationLevel1, ValidationLevel2, Some(Role::N2), 3),
        ];
        if request_type == RequestType::Permission {
            steps.push(CircuitStep::new(ValidationLevel2, Archived, None, 4));
            return steps;
        }

        steps.push(CircuitStep::new(
            ValidationLevel2,
            ValidationHR,
            Some(Role::HumanResources),
            4,
        ));
        match self {
            Circuit::Standard => steps.extend([
                CircuitStep::new(ValidationHR, SignatureAuthority1, Some(Role::FinanceDirector), 5),
                CircuitStep::new(SignatureAuthority1, Archived, None, 6),
            ]),
            Circuit::Extended => steps.extend([
                CircuitStep::new(ValidationHR, SignatureAuthority1, Some(Role::GeneralDirector), 5),
                CircuitStep::new(
                    SignatureAuthority1,
                    SignatureAuthority2,
                    Some(Role::FinanceDirector),
                    6,
                ),
                CircuitStep::new(SignatureAuthority2, Archived, None, 7),
            ]),
        }
        steps
    }

    /// Forward edges plus one rejection edge per non-terminal state. A
    /// rejection is decided by whoever acts next; when the next edge carries
    /// no role it falls to whoever produced the current state.
    pub fn steps(self, request_type: RequestType) -> Vec<CircuitStep> {
        let forward = self.forward_steps(request_type);
        let rejections: Vec<CircuitStep> = forward
            .iter()
            .map(|step| {
                let role = step.required_role.or_else(|| {
                    forward
                        .iter()
                        .find(|entering| entering.to == step.from)
                        .and_then(|entering| entering.required_role)
                });
                CircuitStep::new(
                    step.from,
                    WorkflowState::Rejected,
                    role,
                    REJECTION_ORDER_OFFSET + step.order,
                )
            })
            .collect();

        forward.into_iter().chain(rejections).collect()
    }
}

fn edge_key(request_type: RequestType, from: WorkflowState, to: WorkflowState) -> [u8; 3] {
    [request_type.code(), from.code(), to.code()]
}

type EdgeIndex = HashMap<(RequestType, WorkflowState), Vec<StepEdge>>;

struct Snapshot {
    loaded_at: Instant,
    edges: Arc<EdgeIndex>,
}

pub struct StepCatalogue {
    tree: sled::Tree,
    meta: sled::Tree,
    ttl: Duration,
    cache: RwLock<Option<Snapshot>>,
}

impl StepCatalogue {
    pub fn open(db: &sled::Db, ttl: Duration) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(STEP_EDGES_TREE)?,
            meta: db.open_tree(CATALOGUE_META_TREE)?,
            ttl,
            cache: RwLock::new(None),
        })
    }

    /// Circuit recorded by the last `seed_circuit` or `replace_circuit`.
    pub fn seeded_circuit(&self) -> Result<Option<Circuit>> {
        let Some(bytes) = self.meta.get(CIRCUIT_KEY)? else {
            return Ok(None);
        };
        let version: u32 = minicbor::decode(&bytes)?;
        Circuit::from_version(version)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("unknown circuit version {version} in catalogue").into())
    }

    /// Insert every step whose `(type, from, to)` triple is absent. Existing
    /// edges are left untouched, so seeding on every start is safe.
    pub fn seed(&self, request_type: RequestType, steps: &[CircuitStep]) -> Result<usize> {
        let mut inserted = 0;
        for step in steps {
            let edge = step.bind(request_type);
            let value = minicbor::to_vec(edge)?;
            match self
                .tree
                .compare_and_swap(edge.key(), None as Option<&[u8]>, Some(value))?
            {
                Ok(()) => inserted += 1,
                Err(_) => tracing::trace!(
                    request_type = %request_type,
                    from = %edge.from,
                    to = %edge.to,
                    "edge already seeded"
                ),
            }
        }

        if inserted > 0 {
            self.invalidate();
        }
        tracing::debug!(request_type = %request_type, inserted, "catalogue seeded");
        Ok(inserted)
    }

    /// Seed `circuit` for every request type and record it. Refuses a
    /// catalogue that already holds another circuit; see
    /// [`StepCatalogue::replace_circuit`].
    pub fn seed_circuit(&self, circuit: Circuit) -> Result<usize> {
        let requested = minicbor::to_vec(circuit.version())?;
        if let Err(cas) =
            self.meta
                .compare_and_swap(CIRCUIT_KEY, None as Option<&[u8]>, Some(requested.as_slice()))?
        {
            if cas.current.as_deref() != Some(requested.as_slice()) {
                let seeded = match cas.current {
                    Some(bytes) => minicbor::decode(&bytes)?,
                    None => 0,
                };
                return Err(WorkflowError::CircuitMismatch {
                    seeded,
                    requested: circuit.version(),
                });
            }
        }

        let mut inserted = 0;
        for request_type in RequestType::ALL {
            inserted += self.seed(request_type, &circuit.steps(request_type))?;
        }
        tracing::info!(
            circuit = ?circuit,
            version = circuit.version(),
            inserted,
            "workflow circuit ensured"
        );
        Ok(inserted)
    }

    /// Drop every edge and seed `circuit` in their place, in one transaction.
    /// Requests resting in a state the new circuit lacks can only move
    /// through the hierarchy bypass afterwards.
    pub fn replace_circuit(&self, circuit: Circuit) -> Result<usize> {
        let stale: Vec<sled::IVec> = self.tree.iter().keys().collect::<sled::Result<_>>()?;
        let mut fresh = Vec::new();
        for request_type in RequestType::ALL {
            for step in circuit.steps(request_type) {
                let edge = step.bind(request_type);
                fresh.push((edge.key(), minicbor::to_vec(edge)?));
            }
        }
        let version = minicbor::to_vec(circuit.version())?;

        (&self.tree, &self.meta)
            .transaction(|(edges, meta)| {
                for key in &stale {
                    edges.remove(key.clone())?;
                }
                for (key, value) in &fresh {
                    edges.insert(&key[..], value.as_slice())?;
                }
                meta.insert(CIRCUIT_KEY, version.as_slice())?;
                Ok(())
            })
            .map_err(|err: TransactionError<WorkflowError>| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => WorkflowError::PersistenceFailure(err),
            })?;
        self.invalidate();

        tracing::warn!(
            circuit = ?circuit,
            version = circuit.version(),
            removed = stale.len(),
            inserted = fresh.len(),
            "workflow circuit replaced"
        );
        Ok(fresh.len())
    }

    /// Edges leaving `from` for `request_type`, by ascending `order`.
    pub fn lookup_edge(&self, request_type: RequestType, from: WorkflowState) -> Result<Vec<StepEdge>> {
        let index = self.snapshot()?;
        Ok(index.get(&(request_type, from)).cloned().unwrap_or_default())
    }

    pub fn edge(
        &self,
        request_type: RequestType,
        from: WorkflowState,
        to: WorkflowState,
    ) -> Result<Option<StepEdge>> {
        Ok(self
            .lookup_edge(request_type, from)?
            .into_iter()
            .find(|edge| edge.to == to))
    }

    pub fn invalidate(&self) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn snapshot(&self) -> Result<Arc<EdgeIndex>> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(snapshot) = cache.as_ref() {
                if snapshot.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&snapshot.edges));
                }
            }
        }

        let edges = Arc::new(self.load()?);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Snapshot {
            loaded_at: Instant::now(),
            edges: Arc::clone(&edges),
        });
        Ok(edges)
    }

    fn load(&self) -> Result<EdgeIndex> {
        let mut index = EdgeIndex::new();
        for entry in self.tree.iter() {
            let (_, value) = entry?;
            let edge: StepEdge = minicbor::decode(&value)?;
            index.entry((edge.request_type, edge.from)).or_default().push(edge);
        }
        for edges in index.values_mut() {
            edges.sort_by_key(|edge| (edge.order, edge.to.code()));
        }
        tracing::debug!(groups = index.len(), "catalogue snapshot loaded");
        Ok(index)
    }
}
