//! State Projection (C11, spec.md §4.11). Assembles the single `GameState`
//! snapshot served by `/api/state` and sent as `sync:full` on GM connect.
//! Read-only: it never mutates any service, only calls their public getters.

use std::collections::BTreeMap;
use std::sync::Arc;

use aln_protocol::{
    DeviceId, DeviceInfo, DeviceType, GameStateDto, SystemStatusDto, VlcStatus,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::media_player::MediaPlayerPort;
use crate::persistence::PersistencePort;
use crate::pipeline::TransactionPipeline;
use crate::offline_queue::OfflineQueue;
use crate::session_service::SessionService;
use crate::video_fsm::VideoFsm;

/// How many entries `snapshot()` includes in `recentTransactions` by
/// default (spec.md §4.11).
pub const DEFAULT_RECENT_TRANSACTIONS: usize = 10;

/// Tracks connected GM/admin sockets for the `devices` projection field.
/// C9 (the gateway) is the only caller of `connect`/`disconnect`; this is
/// plain bookkeeping, not a domain service, so it lives alongside the
/// projection rather than behind its own port.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<DeviceId, DeviceInfo>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, device_id: DeviceId, device_type: DeviceType, ip: Option<String>) {
        let now = Utc::now();
        self.devices.write().await.insert(
            device_id.clone(),
            DeviceInfo {
                device_id,
                device_type,
                ip,
                connection_time: now,
                last_seen: now,
            },
        );
    }

    pub async fn touch(&self, device_id: &str) {
        if let Some(info) = self.devices.write().await.get_mut(device_id) {
            info.last_seen = Utc::now();
        }
    }

    pub async fn disconnect(&self, device_id: &str) -> Option<DeviceInfo> {
        self.devices.write().await.remove(device_id)
    }

    pub async fn snapshot(&self) -> Vec<DeviceInfo> {
        self.devices.read().await.values().cloned().collect()
    }
}

pub struct StateProjection<P: MediaPlayerPort, S: PersistencePort> {
    session_service: Arc<SessionService>,
    pipeline: Arc<TransactionPipeline<P, S>>,
    video_fsm: Arc<VideoFsm<P>>,
    media_player: Arc<P>,
    offline_queue: Arc<OfflineQueue<S>>,
    devices: Arc<DeviceRegistry>,
}

impl<P: MediaPlayerPort, S: PersistencePort> StateProjection<P, S> {
    pub fn new(
        session_service: Arc<SessionService>,
        pipeline: Arc<TransactionPipeline<P, S>>,
        video_fsm: Arc<VideoFsm<P>>,
        media_player: Arc<P>,
        offline_queue: Arc<OfflineQueue<S>>,
        devices: Arc<DeviceRegistry>,
    ) -> Self {
        Self {
            session_service,
            pipeline,
            video_fsm,
            media_player,
            offline_queue,
            devices,
        }
    }

    pub async fn snapshot(&self) -> GameStateDto {
        let session = self.session_service.get_current_session().await;
        let scores = self.session_service.get_team_scores().await;
        let recent_transactions = self
            .pipeline
            .recent_transactions(DEFAULT_RECENT_TRANSACTIONS)
            .await;
        let video_status = self.video_fsm.status().await.dto;
        let devices = self.devices.snapshot().await;

        let vlc_connected = self.media_player.is_connected().await;
        let system_status = SystemStatusDto {
            orchestrator_online: true,
            vlc: if vlc_connected {
                VlcStatus::Connected
            } else {
                VlcStatus::Disconnected
            },
            video_display_ready: vlc_connected,
            offline: !self.offline_queue.is_empty().await,
        };

        GameStateDto {
            session,
            scores,
            recent_transactions,
            video_status,
            devices,
            system_status,
        }
    }

    /// `hash(serialization)` per spec.md §4.11, used as the `/api/state`
    /// ETag. Not cryptographic; only needs to change whenever the snapshot
    /// does.
    pub async fn etag(&self) -> String {
        let dto = self.snapshot().await;
        etag_for(&dto)
    }
}

pub fn etag_for(dto: &GameStateDto) -> String {
    let bytes = serde_json::to_vec(dto).expect("GameStateDto is always JSON-serializable");
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    format!("\"{hex}\"")
}

/// Pairs a snapshot with the ETag computed from it, so callers don't
/// serialize twice to get both.
pub struct SnapshotWithEtag {
    pub state: GameStateDto,
    pub etag: String,
}

impl<P: MediaPlayerPort, S: PersistencePort> StateProjection<P, S> {
    pub async fn snapshot_with_etag(&self) -> SnapshotWithEtag {
        let state = self.snapshot().await;
        let etag = etag_for(&state);
        SnapshotWithEtag { state, etag }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreResult;
    use crate::media_player::{PlayerState, PlayerStatus};
    use crate::persistence::FilePersistence;
    use aln_protocol::TokenCatalogDocument;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FakePlayer {
        connected: bool,
    }

    #[async_trait]
    impl MediaPlayerPort for FakePlayer {
        async fn init(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            self.connected
        }
        async fn play(&self, _filename: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn pause(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn stop(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn status(&self) -> CoreResult<PlayerStatus> {
            Ok(PlayerStatus {
                state: PlayerState::Idle,
                current_file: None,
                position_sec: 0,
                length_sec: 0,
            })
        }
        async fn return_to_idle_loop(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    async fn store() -> Arc<FilePersistence> {
        let mut dir = std::env::temp_dir();
        dir.push(format!("aln-projection-test-{}", uuid::Uuid::new_v4()));
        Arc::new(FilePersistence::new(dir).await.unwrap())
    }

    async fn harness() -> StateProjection<FakePlayer, FilePersistence> {
        let (tx, _rx) = mpsc::channel(128);
        let catalog = Arc::new(crate::catalog::TokenCatalog::empty());
        catalog
            .load_from_document(TokenCatalogDocument {
                tokens: vec![],
                score_table: vec![],
                group_bonuses: vec![],
            })
            .unwrap();
        let session_service = Arc::new(SessionService::new(catalog.clone(), tx.clone()));
        let player = Arc::new(FakePlayer { connected: true });
        let video_fsm = Arc::new(VideoFsm::new(player.clone(), tx.clone()));
        let pipeline = Arc::new(TransactionPipeline::new(
            catalog,
            session_service.clone(),
            video_fsm.clone(),
            tx,
        ));
        let offline_queue = Arc::new(OfflineQueue::new(store().await));
        let devices = Arc::new(DeviceRegistry::new());
        StateProjection::new(session_service, pipeline, video_fsm, player, offline_queue, devices)
    }

    #[tokio::test]
    async fn snapshot_with_no_session_has_null_session_and_empty_scores() {
        let projection = harness().await;
        let snapshot = projection.snapshot().await;
        assert!(snapshot.session.is_none());
        assert!(snapshot.scores.is_empty());
        assert_eq!(snapshot.system_status.vlc, VlcStatus::Connected);
    }

    #[tokio::test]
    async fn etag_changes_when_session_is_created() {
        let projection = harness().await;
        let before = projection.etag().await;
        projection
            .session_service
            .create_session("Game".into(), vec!["001".into()])
            .await
            .unwrap();
        let after = projection.etag().await;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn device_registry_tracks_connect_and_disconnect() {
        let registry = DeviceRegistry::new();
        registry
            .connect("gm-1".into(), DeviceType::Gm, Some("127.0.0.1".into()))
            .await;
        assert_eq!(registry.snapshot().await.len(), 1);
        registry.disconnect("gm-1").await;
        assert!(registry.snapshot().await.is_empty());
    }
}
