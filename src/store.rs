//! Request repository over the `requests` tree.
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, abort};

use crate::error::{Result, WorkflowError};
use crate::ids::RequestId;
use crate::request::Request;

pub const REQUESTS_TREE: &str = "requests";

pub struct RequestStore {
    tree: sled::Tree,
}

impl RequestStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(REQUESTS_TREE)?,
        })
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    /// Persist a request that must not exist yet.
    pub fn insert_new(&self, request: &Request) -> Result<()> {
        let value = request.encode()?;
        if self
            .tree
            .compare_and_swap(request.id.as_bytes(), None as Option<&[u8]>, Some(value))?
            .is_err()
        {
            return Err(anyhow::anyhow!("request {} already exists", request.id).into());
        }
        Ok(())
    }

    pub fn get(&self, id: &RequestId) -> Result<Option<Request>> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Request::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn load(&self, id: &RequestId) -> Result<Request> {
        self.get(id)?.ok_or(WorkflowError::NotFound(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Request>> + '_ {
        self.tree.iter().map(|item| -> Result<Request> {
            let (_, value) = item?;
            Request::decode(&value)
        })
    }

    /// Abort the surrounding transaction unless the stored request is still
    /// at `expected_version`.
    pub(crate) fn expect_version(
        tx: &TransactionalTree,
        id: &RequestId,
        expected_version: u64,
    ) -> ConflictableTransactionResult<(), WorkflowError> {
        let Some(bytes) = tx.get(id.as_bytes())? else {
            return abort(WorkflowError::NotFound(*id));
        };
        let stored = match Request::decode(&bytes) {
            Ok(stored) => stored,
            Err(err) => return abort(err),
        };
        if stored.version != expected_version {
            return abort(WorkflowError::Conflict {
                request: *id,
                expected: expected_version,
                found: stored.version,
            });
        }
        Ok(())
    }

    pub(crate) fn write(
        tx: &TransactionalTree,
        request: &Request,
    ) -> ConflictableTransactionResult<(), WorkflowError> {
        let value = match request.encode() {
            Ok(value) => value,
            Err(err) => return abort(err),
        };
        tx.insert(&request.id.as_bytes()[..], value)?;
        Ok(())
    }
}
