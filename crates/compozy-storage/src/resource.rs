//! Resource Store (spec §4.2): `ResourceKey -> (value, ETag)` with
//! optimistic-concurrency writes and a multi-subscriber watch stream.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use compozy_core::resource::{ETag, ResourceKey, ResourceType};

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub enum ResourceEvent {
    Put { key: ResourceKey, etag: ETag },
    Delete { key: ResourceKey, etag: ETag },
}

pub type ResourceEventStream = Pin<Box<dyn Stream<Item = ResourceEvent> + Send>>;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn put(&self, key: &ResourceKey, value: Value) -> Result<ETag, StoreError>;
    async fn put_if_match(&self, key: &ResourceKey, value: Value, expected: &ETag) -> Result<ETag, StoreError>;
    async fn get(&self, key: &ResourceKey) -> Result<(Value, ETag), StoreError>;
    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError>;
    async fn list_with_values(&self, project: &str, resource_type: ResourceType) -> Result<Vec<(ResourceKey, Value, ETag)>, StoreError>;
    async fn watch(&self, project: &str, resource_type: ResourceType) -> Result<ResourceEventStream, StoreError>;
}

pub mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio_stream::wrappers::BroadcastStream;

    struct Entry {
        value: Value,
        revision: u64,
    }

    struct Inner {
        entries: HashMap<ResourceKey, Entry>,
    }

    /// Single `Mutex`-guarded `HashMap`; every write takes the lock for its
    /// whole critical section, so `PutIfMatch` is trivially linearizable per
    /// key without a lock-free CAS loop's ABA hazards.
    pub struct InMemoryResourceStore {
        inner: Mutex<Inner>,
        sender: broadcast::Sender<ResourceEvent>,
    }

    impl InMemoryResourceStore {
        pub fn new() -> Self {
            let (sender, _) = broadcast::channel(1024);
            Self {
                inner: Mutex::new(Inner { entries: HashMap::new() }),
                sender,
            }
        }

        /// Spawns the background reconciliation loop (default ~1s) that
        /// re-broadcasts the current snapshot so a watcher that missed a
        /// notification (a lagged broadcast receiver) still converges.
        pub fn spawn_reconciliation(self: &std::sync::Arc<Self>, period: Duration) {
            let weak = std::sync::Arc::downgrade(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    let Some(store) = weak.upgrade() else { break };
                    let snapshot: Vec<(ResourceKey, u64)> = store
                        .inner
                        .lock()
                        .entries
                        .iter()
                        .map(|(k, e)| (k.clone(), e.revision))
                        .collect();
                    for (key, revision) in snapshot {
                        let _ = store.sender.send(ResourceEvent::Put { key, etag: ETag::from_revision(revision) });
                    }
                }
            });
        }
    }

    impl Default for InMemoryResourceStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ResourceStore for InMemoryResourceStore {
        async fn put(&self, key: &ResourceKey, value: Value) -> Result<ETag, StoreError> {
            let mut inner = self.inner.lock();
            let revision = inner.entries.get(key).map(|e| e.revision + 1).unwrap_or(1);
            inner.entries.insert(key.clone(), Entry { value, revision });
            let etag = ETag::from_revision(revision);
            let _ = self.sender.send(ResourceEvent::Put { key: key.clone(), etag: etag.clone() });
            Ok(etag)
        }

        async fn put_if_match(&self, key: &ResourceKey, value: Value, expected: &ETag) -> Result<ETag, StoreError> {
            let mut inner = self.inner.lock();
            let current_etag = inner
                .entries
                .get(key)
                .map(|e| ETag::from_revision(e.revision))
                .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;
            if &current_etag != expected {
                return Err(StoreError::EtagMismatch {
                    key: key.id.clone(),
                    expected: expected.to_string(),
                    actual: current_etag.to_string(),
                });
            }
            let revision = inner.entries.get(key).unwrap().revision + 1;
            inner.entries.insert(key.clone(), Entry { value, revision });
            let etag = ETag::from_revision(revision);
            let _ = self.sender.send(ResourceEvent::Put { key: key.clone(), etag: etag.clone() });
            Ok(etag)
        }

        async fn get(&self, key: &ResourceKey) -> Result<(Value, ETag), StoreError> {
            let inner = self.inner.lock();
            inner
                .entries
                .get(key)
                .map(|e| (e.value.clone(), ETag::from_revision(e.revision)))
                .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))
        }

        async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
            let mut inner = self.inner.lock();
            let entry = inner.entries.remove(key).ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;
            let etag = ETag::from_revision(entry.revision);
            drop(inner);
            let _ = self.sender.send(ResourceEvent::Delete { key: key.clone(), etag });
            Ok(())
        }

        async fn list_with_values(&self, project: &str, resource_type: ResourceType) -> Result<Vec<(ResourceKey, Value, ETag)>, StoreError> {
            let inner = self.inner.lock();
            Ok(inner
                .entries
                .iter()
                .filter(|(k, _)| k.project == project && k.resource_type == resource_type)
                .map(|(k, e)| (k.clone(), e.value.clone(), ETag::from_revision(e.revision)))
                .collect())
        }

        async fn watch(&self, project: &str, resource_type: ResourceType) -> Result<ResourceEventStream, StoreError> {
            let project = project.to_string();
            let (prime, receiver) = {
                let inner = self.inner.lock();
                let prime: Vec<ResourceEvent> = inner
                    .entries
                    .iter()
                    .filter(|(k, _)| k.project == project && k.resource_type == resource_type)
                    .map(|(k, e)| ResourceEvent::Put { key: k.clone(), etag: ETag::from_revision(e.revision) })
                    .collect();
                (prime, self.sender.subscribe())
            };

            let live = BroadcastStream::new(receiver).filter_map({
                let project = project.clone();
                move |result| {
                    let project = project.clone();
                    async move {
                        let event = result.ok()?;
                        let key = match &event {
                            ResourceEvent::Put { key, .. } | ResourceEvent::Delete { key, .. } => key,
                        };
                        (key.project == project && key.resource_type == resource_type).then_some(event)
                    }
                }
            });

            Ok(Box::pin(stream::iter(prime).chain(live)))
        }
    }
}

pub use memory::InMemoryResourceStore;

#[cfg(feature = "postgres")]
pub mod postgres {
    use super::*;
    use serde::{Deserialize, Serialize};
    use sqlx::postgres::PgListener;
    use sqlx::{PgPool, Row};
    use tokio::sync::broadcast;
    use tokio_stream::wrappers::BroadcastStream;
    use tracing::{error, warn};

    #[derive(Serialize, Deserialize)]
    struct NotifyPayload {
        project: String,
        resource_type: ResourceType,
        id: String,
        revision: u64,
        deleted: bool,
    }

    const NOTIFY_CHANNEL: &str = "compozy_resource_changes";

    /// `sqlx`-backed store. Writes `NOTIFY` the shared channel inside the
    /// same statement batch as the row mutation; `watch` keeps a
    /// `PgListener` open and republishes onto an in-process broadcast
    /// channel so multiple in-process subscribers share one connection.
    #[derive(Clone)]
    pub struct PostgresResourceStore {
        pool: PgPool,
        sender: broadcast::Sender<ResourceEvent>,
    }

    impl PostgresResourceStore {
        pub async fn new(pool: PgPool) -> Result<Self, StoreError> {
            let (sender, _) = broadcast::channel(1024);
            let store = Self { pool, sender };
            store.spawn_listener().await?;
            Ok(store)
        }

        async fn spawn_listener(&self) -> Result<(), StoreError> {
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            listener
                .listen(NOTIFY_CHANNEL)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let sender = self.sender.clone();
            tokio::spawn(async move {
                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            let Ok(payload) = serde_json::from_str::<NotifyPayload>(notification.payload()) else {
                                warn!("malformed resource change notification");
                                continue;
                            };
                            let key = ResourceKey::new(payload.project, payload.resource_type, payload.id);
                            let etag = ETag::from_revision(payload.revision);
                            let event = if payload.deleted {
                                ResourceEvent::Delete { key, etag }
                            } else {
                                ResourceEvent::Put { key, etag }
                            };
                            let _ = sender.send(event);
                        }
                        Err(e) => {
                            error!("resource change listener lost connection: {}", e);
                            break;
                        }
                    }
                }
            });
            Ok(())
        }

        async fn notify(&self, key: &ResourceKey, revision: u64, deleted: bool) -> Result<(), StoreError> {
            let payload = NotifyPayload {
                project: key.project.clone(),
                resource_type: key.resource_type,
                id: key.id.clone(),
                revision,
                deleted,
            };
            let payload = serde_json::to_string(&payload).map_err(|e| StoreError::Database(e.to_string()))?;
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(NOTIFY_CHANNEL)
                .bind(payload)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        }
    }

    #[async_trait]
    impl ResourceStore for PostgresResourceStore {
        async fn put(&self, key: &ResourceKey, value: Value) -> Result<ETag, StoreError> {
            let row = sqlx::query(
                r#"
                INSERT INTO resources (project, resource_type, id, value, revision)
                VALUES ($1, $2, $3, $4, 1)
                ON CONFLICT (project, resource_type, id) DO UPDATE SET
                    value = EXCLUDED.value,
                    revision = resources.revision + 1
                RETURNING revision
                "#,
            )
            .bind(&key.project)
            .bind(serde_json::to_value(key.resource_type).map_err(|e| StoreError::Database(e.to_string()))?)
            .bind(&key.id)
            .bind(&value)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

            let revision: i64 = row.get("revision");
            self.notify(key, revision as u64, false).await?;
            Ok(ETag::from_revision(revision as u64))
        }

        async fn put_if_match(&self, key: &ResourceKey, value: Value, expected: &ETag) -> Result<ETag, StoreError> {
            let (current_value, current_etag) = self.get(key).await?;
            let _ = current_value;
            if &current_etag != expected {
                return Err(StoreError::EtagMismatch {
                    key: key.id.clone(),
                    expected: expected.to_string(),
                    actual: current_etag.to_string(),
                });
            }

            let row = sqlx::query(
                r#"
                UPDATE resources SET value = $4, revision = revision + 1
                WHERE project = $1 AND resource_type = $2 AND id = $3
                RETURNING revision
                "#,
            )
            .bind(&key.project)
            .bind(serde_json::to_value(key.resource_type).map_err(|e| StoreError::Database(e.to_string()))?)
            .bind(&key.id)
            .bind(&value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;

            let revision: i64 = row.get("revision");
            self.notify(key, revision as u64, false).await?;
            Ok(ETag::from_revision(revision as u64))
        }

        async fn get(&self, key: &ResourceKey) -> Result<(Value, ETag), StoreError> {
            let row = sqlx::query(
                r#"SELECT value, revision FROM resources WHERE project = $1 AND resource_type = $2 AND id = $3"#,
            )
            .bind(&key.project)
            .bind(serde_json::to_value(key.resource_type).map_err(|e| StoreError::Database(e.to_string()))?)
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;

            let value: Value = row.get("value");
            let revision: i64 = row.get("revision");
            Ok((value, ETag::from_revision(revision as u64)))
        }

        async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
            let row = sqlx::query(
                r#"DELETE FROM resources WHERE project = $1 AND resource_type = $2 AND id = $3 RETURNING revision"#,
            )
            .bind(&key.project)
            .bind(serde_json::to_value(key.resource_type).map_err(|e| StoreError::Database(e.to_string()))?)
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;

            let revision: i64 = row.get("revision");
            self.notify(key, revision as u64, true).await
        }

        async fn list_with_values(&self, project: &str, resource_type: ResourceType) -> Result<Vec<(ResourceKey, Value, ETag)>, StoreError> {
            let rows = sqlx::query(r#"SELECT id, value, revision FROM resources WHERE project = $1 AND resource_type = $2"#)
                .bind(project)
                .bind(serde_json::to_value(resource_type).map_err(|e| StoreError::Database(e.to_string()))?)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|row| {
                    let id: String = row.get("id");
                    let value: Value = row.get("value");
                    let revision: i64 = row.get("revision");
                    (
                        ResourceKey::new(project, resource_type, id),
                        value,
                        ETag::from_revision(revision as u64),
                    )
                })
                .collect())
        }

        async fn watch(&self, project: &str, resource_type: ResourceType) -> Result<ResourceEventStream, StoreError> {
            let prime: Vec<ResourceEvent> = self
                .list_with_values(project, resource_type)
                .await?
                .into_iter()
                .map(|(key, _, etag)| ResourceEvent::Put { key, etag })
                .collect();

            let project = project.to_string();
            let receiver = self.sender.subscribe();
            let live = BroadcastStream::new(receiver).filter_map(move |result| {
                let project = project.clone();
                async move {
                    let event = result.ok()?;
                    let key = match &event {
                        ResourceEvent::Put { key, .. } | ResourceEvent::Delete { key, .. } => key,
                    };
                    (key.project == project && key.resource_type == resource_type).then_some(event)
                }
            });

            Ok(Box::pin(stream::iter(prime).chain(live)))
        }
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresResourceStore;

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ResourceKey {
        ResourceKey::new("proj", ResourceType::Workflow, "wf-1")
    }

    #[tokio::test]
    async fn put_if_match_fails_on_stale_etag() {
        let store = InMemoryResourceStore::new();
        let etag = store.put(&key(), serde_json::json!({"v": 1})).await.unwrap();
        store.put(&key(), serde_json::json!({"v": 2})).await.unwrap();

        let err = store.put_if_match(&key(), serde_json::json!({"v": 3}), &etag).await.unwrap_err();
        assert!(matches!(err, StoreError::EtagMismatch { .. }));
    }

    #[tokio::test]
    async fn etag_strictly_changes_on_every_write() {
        let store = InMemoryResourceStore::new();
        let first = store.put(&key(), serde_json::json!(1)).await.unwrap();
        let second = store.put(&key(), serde_json::json!(2)).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn list_with_values_etag_matches_a_subsequent_get() {
        let store = InMemoryResourceStore::new();
        store.put(&key(), serde_json::json!({"v": 1})).await.unwrap();

        let listed = store.list_with_values("proj", ResourceType::Workflow).await.unwrap();
        let (listed_key, _, listed_etag) = &listed[0];
        let (_, fetched_etag) = store.get(listed_key).await.unwrap();
        assert_eq!(*listed_etag, fetched_etag);
    }

    #[tokio::test]
    async fn delete_fires_a_watch_event() {
        let store = InMemoryResourceStore::new();
        store.put(&key(), serde_json::json!({"v": 1})).await.unwrap();

        let mut events = store.watch("proj", ResourceType::Workflow).await.unwrap();
        let _prime = events.next().await; // the Put prime event

        store.delete(&key()).await.unwrap();
        let delivered = events.next().await;
        assert!(matches!(delivered, Some(ResourceEvent::Delete { .. })));
    }

    /// Ten writers race `put_if_match` against the same stale etag; the
    /// `Mutex`-guarded critical section in `put_if_match` makes exactly one
    /// winner and the other nine observe `EtagMismatch`.
    #[tokio::test]
    async fn put_if_match_under_contention_admits_exactly_one_writer() {
        let store = std::sync::Arc::new(InMemoryResourceStore::new());
        let etag0 = store.put(&key(), serde_json::json!({"v": 0})).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = std::sync::Arc::clone(&store);
            let etag0 = etag0.clone();
            handles.push(tokio::spawn(async move {
                store.put_if_match(&key(), serde_json::json!({"v": i}), &etag0).await
            }));
        }

        let results: Vec<_> = futures::future::join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let mismatches = results.iter().filter(|r| matches!(r, Err(StoreError::EtagMismatch { .. }))).count();
        assert_eq!(successes, 1);
        assert_eq!(mismatches, 9);
    }
}
