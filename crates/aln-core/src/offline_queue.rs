//! Offline Queue (C7, spec.md §4.7). A persistent FIFO of deferred scans,
//! drained on reconnect with a drain-in-progress flag so concurrent drains
//! are impossible (spec.md §5).

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aln_protocol::{DeviceType, ScanRequest, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::CoreResult;
use crate::persistence::{Blob, PersistencePort, KEY_OFFLINE_QUEUE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineQueueItem {
    pub client_id: String,
    pub scan: ScanRequest,
    pub source: DeviceType,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineResult {
    pub transaction_id: Option<String>,
    pub status: String,
    pub token_id: TokenId,
    pub error: Option<String>,
}

pub struct OfflineQueue<S: PersistencePort> {
    store: Arc<S>,
    items: Mutex<VecDeque<OfflineQueueItem>>,
    draining: AtomicBool,
}

impl<S: PersistencePort> OfflineQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            items: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub async fn load(&self) -> CoreResult<()> {
        if let Some(blob) = self.store.get(KEY_OFFLINE_QUEUE).await? {
            let loaded: Vec<OfflineQueueItem> = blob.decode()?;
            *self.items.lock().await = loaded.into();
        }
        Ok(())
    }

    async fn persist(&self, items: &VecDeque<OfflineQueueItem>) -> CoreResult<()> {
        let as_vec: Vec<_> = items.iter().cloned().collect();
        self.store.put(KEY_OFFLINE_QUEUE, Blob::new(&as_vec)?).await
    }

    pub async fn enqueue(&self, scan: ScanRequest, source: DeviceType) -> CoreResult<()> {
        let client_id = scan
            .client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut items = self.items.lock().await;
        items.push_back(OfflineQueueItem {
            client_id,
            scan,
            source,
            queued_at: Utc::now(),
        });
        self.persist(&items).await
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drains the queue through `process`, which runs the normal scan
    /// pipeline and returns a per-entry outcome. Idempotent with respect
    /// to `clientId`: callers are expected to key their own dedup state by
    /// `clientId` (spec.md §8 invariant 10); this method does not retry
    /// failures automatically (spec.md §4.7).
    pub async fn drain<F, Fut>(&self, mut process: F) -> CoreResult<Vec<OfflineResult>>
    where
        F: FnMut(OfflineQueueItem) -> Fut,
        Fut: std::future::Future<Output = OfflineResult>,
    {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(Vec::new());
        }
        let drained: Vec<OfflineQueueItem> = {
            let mut items = self.items.lock().await;
            items.drain(..).collect()
        };
        self.persist(&VecDeque::new()).await?;

        let mut results = Vec::with_capacity(drained.len());
        for item in drained {
            results.push(process(item).await);
        }
        self.draining.store(false, Ordering::SeqCst);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::FilePersistence;
    use aln_protocol::DeviceType;

    fn sample_scan(token_id: &str, client_id: &str) -> ScanRequest {
        ScanRequest {
            token_id: token_id.into(),
            team_id: Some("001".into()),
            device_id: "dev-1".into(),
            device_type: DeviceType::Player,
            mode: None,
            timestamp: None,
            client_id: Some(client_id.into()),
        }
    }

    async fn store() -> Arc<FilePersistence> {
        let mut dir = std::env::temp_dir();
        dir.push(format!("aln-offline-test-{}", uuid::Uuid::new_v4()));
        Arc::new(FilePersistence::new(dir).await.unwrap())
    }

    #[tokio::test]
    async fn enqueue_then_drain_processes_in_order() {
        let queue = OfflineQueue::new(store().await);
        queue.enqueue(sample_scan("t1", "c1"), DeviceType::Player).await.unwrap();
        queue.enqueue(sample_scan("t2", "c2"), DeviceType::Player).await.unwrap();
        assert_eq!(queue.len().await, 2);

        let mut seen = Vec::new();
        let results = queue
            .drain(|item| {
                seen.push(item.scan.token_id.clone());
                async move {
                    OfflineResult {
                        transaction_id: None,
                        status: "accepted".into(),
                        token_id: item.scan.token_id,
                        error: None,
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(results.len(), 2);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_drain_is_a_no_op() {
        let queue = Arc::new(OfflineQueue::new(store().await));
        queue.enqueue(sample_scan("t1", "c1"), DeviceType::Player).await.unwrap();
        queue.draining.store(true, Ordering::SeqCst);
        let results = queue
            .drain(|item| async move {
                OfflineResult {
                    transaction_id: None,
                    status: "accepted".into(),
                    token_id: item.scan.token_id,
                    error: None,
                }
            })
            .await
            .unwrap();
        assert!(results.is_empty());
        queue.draining.store(false, Ordering::SeqCst);
    }
}
