use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::info;

use invsync_core::{EntityKind, RemoteId};

use crate::api::{Payload, Query, RemoteApi, RemoteObject};
use crate::error::RemoteError;

/// Ids handed out for simulated creates start here, well above anything a
/// real server assigns.
const FIRST_SIMULATED_ID: u64 = 1 << 48;

/// Forwards reads to `inner` and only logs writes.
///
/// Simulated creates return fresh ids; reads that filter on such an id are
/// answered locally with "nothing found" since the inner server has never
/// seen it.
#[derive(Debug)]
pub struct DryRun<R> {
    inner: R,
    next_id: AtomicU64,
}

impl<R: RemoteApi> DryRun<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            next_id: AtomicU64::new(FIRST_SIMULATED_ID),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn mentions_simulated_id(query: &Query) -> bool {
        query
            .fields()
            .iter()
            .any(|(_, value)| matches!(value, Value::Number(n) if n.as_u64().is_some_and(|id| id >= FIRST_SIMULATED_ID)))
    }
}

impl<R: RemoteApi> RemoteApi for DryRun<R> {
    fn create(&self, kind: EntityKind, payload: &Payload) -> Result<RemoteId, RemoteError> {
        let id = RemoteId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let body = Value::Object(payload.clone());
        info!(%kind, simulated_id = %id, payload = %body, "dry run: would create");
        Ok(id)
    }

    fn list(&self, kind: EntityKind, query: &Query) -> Result<Vec<RemoteObject>, RemoteError> {
        if Self::mentions_simulated_id(query) {
            return Ok(Vec::new());
        }
        self.inner.list(kind, query)
    }

    fn find(&self, kind: EntityKind, query: &Query) -> Result<Option<RemoteId>, RemoteError> {
        if Self::mentions_simulated_id(query) {
            return Ok(None);
        }
        self.inner.find(kind, query)
    }

    fn update(&self, kind: EntityKind, id: RemoteId, payload: &Payload) -> Result<(), RemoteError> {
        let body = Value::Object(payload.clone());
        info!(%kind, %id, payload = %body, "dry run: would update");
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: RemoteId) -> Result<(), RemoteError> {
        info!(%kind, %id, "dry run: would delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::{InMemoryRemote, Op};
    use serde_json::json;

    #[test]
    fn writes_never_reach_the_inner_remote() {
        let inner = InMemoryRemote::new();
        inner.seed(EntityKind::Company, json!({"name": "Acme"}));
        let dry = DryRun::new(inner);

        let Value::Object(payload) = json!({"name": "Woodco"}) else {
            unreachable!()
        };
        let id = dry.create(EntityKind::Company, &payload).unwrap();
        assert!(id.get() >= FIRST_SIMULATED_ID);
        dry.delete(EntityKind::Company, RemoteId(1)).unwrap();

        assert!(dry.find(EntityKind::Company, &Query::new().with("name", "Acme")).unwrap().is_some());
        assert_eq!(
            dry.find(EntityKind::Part, &Query::new().with("category", id.get())).unwrap(),
            None
        );

        let inner = dry.inner();
        assert_eq!(inner.mutating_calls(), 0);
        assert_eq!(inner.calls(Op::Find), 1);
        assert_eq!(inner.count(EntityKind::Company), 1);
    }
}
