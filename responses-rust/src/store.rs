use crate::{response::Response, ResponsesError};
use async_trait::async_trait;
use std::{collections::HashMap, sync::RwLock};

/// Persistence for terminal snapshots, keyed by response id.
///
/// `put` is gated by the snapshot's own store flag; `get` is idempotent and
/// returns the same snapshot on every call. No update-in-place is exposed:
/// chaining always creates a new id. The store is an injected dependency
/// with an explicit lifecycle, never an implicit singleton.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Persist a terminal snapshot. A no-op when the snapshot was created
    /// with `store = false`.
    async fn put(&self, response: Response) -> Result<(), ResponsesError>;
    async fn get(&self, id: &str) -> Result<Response, ResponsesError>;
    /// Evict a stored snapshot.
    async fn delete(&self, id: &str) -> Result<(), ResponsesError>;
}

/// A process-local store backed by a read-write locked map: one writer per
/// id, many readers.
#[derive(Debug, Default)]
pub struct InMemoryResponseStore {
    entries: RwLock<HashMap<String, Response>>,
}

impl InMemoryResponseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn put(&self, response: Response) -> Result<(), ResponsesError> {
        if !response.store {
            return Ok(());
        }
        if !response.status.is_terminal() {
            return Err(ResponsesError::Invariant(format!(
                "response {} cannot be stored before reaching a terminal status",
                response.id
            )));
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ResponsesError::Invariant("response store lock poisoned".to_string()))?;
        entries.insert(response.id.clone(), response);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Response, ResponsesError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ResponsesError::Invariant("response store lock poisoned".to_string()))?;
        entries
            .get(id)
            .cloned()
            .ok_or_else(|| ResponsesError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), ResponsesError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ResponsesError::Invariant("response store lock poisoned".to_string()))?;
        entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ResponsesError::NotFound(id.to_string()))
    }
}
