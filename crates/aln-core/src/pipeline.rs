//! Transaction Pipeline (C5, spec.md §4.5). Owns the transaction history
//! for the current session; validates, deduplicates and scores scans.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use aln_protocol::{
    DeviceType, MemoryType, Mode, ScanRequest, TeamId, TokenId, Transaction, TransactionId,
    TransactionResult, TransactionStatus,
};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::catalog::TokenCatalog;
use crate::domain_event::DomainEvent;
use crate::media_player::MediaPlayerPort;
use crate::offline_queue::OfflineQueue;
use crate::persistence::PersistencePort;
use crate::session_service::SessionService;
use crate::video_fsm::VideoFsm;

struct History {
    transactions: Vec<Transaction>,
    accepted_tokens: HashSet<TokenId>,
    /// Tokens a team has claimed via blackmarket (scoring) scans, used for
    /// group-completion checks. Detective-mode claims do not count here.
    team_scored_tokens: HashMap<TeamId, HashSet<TokenId>>,
}

pub struct TransactionPipeline<P: MediaPlayerPort, S: PersistencePort> {
    history: Mutex<History>,
    catalog: Arc<TokenCatalog>,
    session_service: Arc<SessionService>,
    video_fsm: Arc<VideoFsm<P>>,
    offline_queue: Option<Arc<OfflineQueue<S>>>,
    events_tx: mpsc::Sender<DomainEvent>,
    video_playback_enabled: bool,
}

impl<P: MediaPlayerPort, S: PersistencePort> TransactionPipeline<P, S> {
    pub fn new(
        catalog: Arc<TokenCatalog>,
        session_service: Arc<SessionService>,
        video_fsm: Arc<VideoFsm<P>>,
        events_tx: mpsc::Sender<DomainEvent>,
    ) -> Self {
        Self::with_video_playback(catalog, session_service, video_fsm, events_tx, true)
    }

    /// `video_playback_enabled` is the server's feature flag (spec.md §6):
    /// when off, tokens with a video asset are still accepted but never
    /// reach the FSM.
    pub fn with_video_playback(
        catalog: Arc<TokenCatalog>,
        session_service: Arc<SessionService>,
        video_fsm: Arc<VideoFsm<P>>,
        events_tx: mpsc::Sender<DomainEvent>,
        video_playback_enabled: bool,
    ) -> Self {
        Self {
            history: Mutex::new(History {
                transactions: Vec::new(),
                accepted_tokens: HashSet::new(),
                team_scored_tokens: HashMap::new(),
            }),
            catalog,
            session_service,
            video_fsm,
            offline_queue: None,
            events_tx,
            video_playback_enabled,
        }
    }

    /// Attaches the offline queue (C7) this pipeline diverts player scans
    /// into when the session service or media player is unavailable
    /// (spec.md §4.7).
    pub fn with_offline_queue(mut self, offline_queue: Arc<OfflineQueue<S>>) -> Self {
        self.offline_queue = Some(offline_queue);
        self
    }

    pub async fn reset(&self) {
        let mut history = self.history.lock().await;
        history.transactions.clear();
        history.accepted_tokens.clear();
        history.team_scored_tokens.clear();
    }

    pub async fn recent_transactions(&self, n: usize) -> Vec<Transaction> {
        let history = self.history.lock().await;
        history
            .transactions
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    /// Runs a scan through the pipeline. `is_http_ingest` distinguishes the
    /// HTTP scan-ingest path (C8, which enforces the video-conflict 409)
    /// from the WebSocket `transaction:submit` path (C9), which does not.
    pub async fn submit(&self, scan: ScanRequest, is_http_ingest: bool) -> TransactionResult {
        let is_player = scan.device_type == DeviceType::Player;

        let Some(token) = self.catalog.lookup(&scan.token_id).await else {
            let _ = self
                .events_tx
                .send(DomainEvent::PlayerScan(scan.clone()))
                .await;
            return TransactionResult {
                status: TransactionStatus::Error,
                transaction: None,
                points: 0,
                message: "Invalid token".to_string(),
                video_queued: false,
                wait_time: None,
            };
        };

        let session_unavailable = self.session_service.session_gate_message().await;
        let player_unavailable =
            token.has_video() && self.video_fsm_is_usable().await && !self.video_fsm.player_connected().await;

        if is_player && (session_unavailable.is_some() || player_unavailable) {
            return self.queue_offline(scan).await;
        }

        if let Some(message) = session_unavailable {
            return TransactionResult {
                status: TransactionStatus::Error,
                transaction: None,
                points: 0,
                message,
                video_queued: false,
                wait_time: None,
            };
        }

        let team_id = scan.team_id.clone().unwrap_or_default();
        let mode = if is_player {
            None
        } else {
            Some(scan.mode.unwrap_or(Mode::Blackmarket))
        };

        let mut history = self.history.lock().await;
        let is_duplicate = !is_player && history.accepted_tokens.contains(&scan.token_id);
        if is_duplicate {
            drop(history);
            return TransactionResult {
                status: TransactionStatus::Duplicate,
                transaction: None,
                points: 0,
                message: "Token already claimed this session".to_string(),
                video_queued: false,
                wait_time: None,
            };
        }

        let points = match mode {
            Some(Mode::Blackmarket) | None if !is_player => {
                // Held across this call so the accepted-tokens check above
                // and the score effect below are atomic with respect to
                // other submits racing the same token id (spec.md §8
                // invariant 3). This is an in-memory lock hop, not I/O, so
                // it doesn't run afoul of the "never block on I/O while
                // holding the state lock" rule in spec.md §5.
                match self
                    .session_service
                    .apply_transaction_effect(&team_id, token.memory_type, token.value_rating)
                    .await
                {
                    Ok(effect) => effect.points,
                    Err(e) => {
                        return TransactionResult {
                            status: TransactionStatus::Error,
                            transaction: None,
                            points: 0,
                            message: e.to_string(),
                            video_queued: false,
                            wait_time: None,
                        };
                    }
                }
            }
            _ => 0,
        };

        let transaction = Transaction {
            id: TransactionId::new(),
            token_id: scan.token_id.clone(),
            team_id: team_id.clone(),
            device_id: scan.device_id.clone(),
            device_type: scan.device_type,
            mode: mode.unwrap_or(Mode::Blackmarket),
            timestamp: scan.timestamp.unwrap_or_else(Utc::now),
            points,
            memory_type: token.memory_type,
            value_rating: token.value_rating,
            summary: None,
        };

        if !is_player {
            history.accepted_tokens.insert(scan.token_id.clone());
            if matches!(mode, Some(Mode::Blackmarket) | None) {
                let claimed = history
                    .team_scored_tokens
                    .entry(team_id.clone())
                    .or_default();
                claimed.insert(scan.token_id.clone());
                if let Some(group) = &token.group {
                    let members = self.catalog.group_members(group).await;
                    if !members.is_empty() && members.is_subset(claimed) {
                        let _ = self
                            .session_service
                            .complete_group_if_new(&team_id, group)
                            .await;
                    }
                }
            }
        }
        history.transactions.push(transaction.clone());
        drop(history);

        let _ = self
            .events_tx
            .send(DomainEvent::TransactionNew(transaction.clone()))
            .await;
        if is_player {
            let _ = self
                .events_tx
                .send(DomainEvent::PlayerScan(scan.clone()))
                .await;
        }

        let mut video_queued = false;
        let mut message = "Transaction accepted".to_string();
        let mut status = TransactionStatus::Accepted;
        let mut wait_time = None;

        if token.has_video() {
            if self.video_fsm_is_usable().await {
                let (queued, reason, wait) = self
                    .video_fsm
                    .enqueue(
                        token.id.clone(),
                        token.media_assets.video.clone().unwrap_or_default(),
                        token.duration.unwrap_or(0),
                        !is_http_ingest,
                    )
                    .await;
                if queued {
                    video_queued = true;
                } else if is_http_ingest {
                    status = TransactionStatus::Rejected;
                    message = reason.unwrap_or_else(|| "Video already playing".to_string());
                    wait_time = wait;
                }
            }
        }

        TransactionResult {
            status,
            transaction: Some(transaction),
            points,
            message,
            video_queued,
            wait_time,
        }
    }

    async fn video_fsm_is_usable(&self) -> bool {
        self.video_playback_enabled
    }

    /// Diverts a player scan into the offline queue instead of processing
    /// it immediately (spec.md §4.7: "ingest paths when the session
    /// service or media player is unavailable"). Player scanners are
    /// fire-and-forget and ignore the response body, so this still answers
    /// with `Accepted` rather than an error.
    async fn queue_offline(&self, scan: ScanRequest) -> TransactionResult {
        let device_type = scan.device_type;
        if let Some(queue) = &self.offline_queue {
            if let Err(e) = queue.enqueue(scan.clone(), device_type).await {
                tracing::warn!(error = %e, "failed to persist offline queue entry");
            }
        }
        let _ = self
            .events_tx
            .send(DomainEvent::PlayerScan(scan))
            .await;
        TransactionResult {
            status: TransactionStatus::Accepted,
            transaction: None,
            points: 0,
            message: "Scan queued offline".to_string(),
            video_queued: false,
            wait_time: None,
        }
    }

    /// Direct history edit for `gm:command` `transaction:create` (spec.md
    /// §4.9 table): an admin override that skips the duplicate check and
    /// session gate `submit` applies. Scoring is left to `score:adjust`;
    /// this only records the transaction.
    pub async fn admin_create_transaction(&self, scan: ScanRequest) -> Transaction {
        let (memory_type, value_rating) = match self.catalog.lookup(&scan.token_id).await {
            Some(token) => (token.memory_type, token.value_rating),
            None => (MemoryType::Personal, 0),
        };
        let transaction = Transaction {
            id: TransactionId::new(),
            token_id: scan.token_id.clone(),
            team_id: scan.team_id.clone().unwrap_or_default(),
            device_id: scan.device_id.clone(),
            device_type: scan.device_type,
            mode: scan.mode.unwrap_or(Mode::Blackmarket),
            timestamp: scan.timestamp.unwrap_or_else(Utc::now),
            points: 0,
            memory_type,
            value_rating,
            summary: Some("admin-created".to_string()),
        };

        let mut history = self.history.lock().await;
        history.accepted_tokens.insert(scan.token_id.clone());
        history.transactions.push(transaction.clone());
        drop(history);

        let _ = self
            .events_tx
            .send(DomainEvent::TransactionNew(transaction.clone()))
            .await;
        transaction
    }

    /// Direct history edit for `gm:command` `transaction:delete`. Returns
    /// `false` if no transaction with that id was found.
    pub async fn admin_delete_transaction(&self, transaction_id: &str) -> bool {
        let mut history = self.history.lock().await;
        let before = history.transactions.len();
        history
            .transactions
            .retain(|t| t.id.0.to_string() != transaction_id);
        history.transactions.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_player::{PlayerStatus, PlayerState};
    use aln_protocol::{GroupBonus, MediaAssets, MemoryType, ScoreTableEntry, Token, TokenCatalogDocument};
    use async_trait::async_trait;
    use crate::error::CoreResult;
    use crate::persistence::FilePersistence;

    struct FakePlayer;

    #[async_trait]
    impl MediaPlayerPort for FakePlayer {
        async fn init(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
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
                state: PlayerState::Playing,
                current_file: None,
                position_sec: 0,
                length_sec: 0,
            })
        }
        async fn return_to_idle_loop(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    async fn harness() -> (
        TransactionPipeline<FakePlayer, FilePersistence>,
        Arc<SessionService>,
        mpsc::Receiver<DomainEvent>,
    ) {
        let (tx, rx) = mpsc::channel(128);
        let catalog = Arc::new(TokenCatalog::empty());
        catalog
            .load_from_document(TokenCatalogDocument {
                tokens: vec![
                    Token {
                        id: "534e2b03".into(),
                        memory_type: MemoryType::Technical,
                        value_rating: 3,
                        group: None,
                        media_assets: MediaAssets::default(),
                        duration: None,
                    },
                    Token {
                        id: "jaw001".into(),
                        memory_type: MemoryType::Personal,
                        value_rating: 1,
                        group: None,
                        media_assets: MediaAssets {
                            video: Some("jaw001.mp4".into()),
                            ..Default::default()
                        },
                        duration: Some(30),
                    },
                ],
                score_table: vec![ScoreTableEntry {
                    memory_type: MemoryType::Technical,
                    value_rating: 3,
                    points: 5000,
                }],
                group_bonuses: vec![],
            })
            .unwrap();
        let session_service = Arc::new(SessionService::new(catalog.clone(), tx.clone()));
        session_service
            .create_session("Test".into(), vec!["001".into(), "002".into()])
            .await
            .unwrap();
        let player = Arc::new(FakePlayer);
        let video_fsm = Arc::new(VideoFsm::new(player, tx.clone()));
        let pipeline = TransactionPipeline::new(catalog, session_service.clone(), video_fsm, tx);
        (pipeline, session_service, rx)
    }

    fn scan(token_id: &str, team_id: &str, device_type: DeviceType, mode: Option<Mode>) -> ScanRequest {
        ScanRequest {
            token_id: token_id.into(),
            team_id: Some(team_id.into()),
            device_id: "gm-1".into(),
            device_type,
            mode,
            timestamp: None,
            client_id: None,
        }
    }

    #[tokio::test]
    async fn s1_blackmarket_scoring() {
        let (pipeline, session_service, _rx) = harness().await;
        let result = pipeline
            .submit(
                scan("534e2b03", "001", DeviceType::Gm, Some(Mode::Blackmarket)),
                false,
            )
            .await;
        assert_eq!(result.status, TransactionStatus::Accepted);
        assert_eq!(result.points, 5000);
        let score = session_service.get_team_score("001").await.unwrap();
        assert_eq!(score.current_score, 5000);
        assert_eq!(score.tokens_scanned, 1);
    }

    #[tokio::test]
    async fn s2_detective_no_score() {
        let (pipeline, session_service, _rx) = harness().await;
        let result = pipeline
            .submit(
                scan("534e2b03", "002", DeviceType::Gm, Some(Mode::Detective)),
                false,
            )
            .await;
        assert_eq!(result.status, TransactionStatus::Accepted);
        assert_eq!(result.points, 0);
        let score = session_service.get_team_score("002").await.unwrap();
        assert_eq!(score.current_score, 0);
        assert_eq!(score.tokens_scanned, 0);
    }

    #[tokio::test]
    async fn s3_duplicate_within_team() {
        let (pipeline, _svc, _rx) = harness().await;
        pipeline
            .submit(
                scan("534e2b03", "001", DeviceType::Gm, Some(Mode::Blackmarket)),
                false,
            )
            .await;
        let result = pipeline
            .submit(
                scan("534e2b03", "001", DeviceType::Gm, Some(Mode::Blackmarket)),
                false,
            )
            .await;
        assert_eq!(result.status, TransactionStatus::Duplicate);
        assert_eq!(result.points, 0);
    }

    #[tokio::test]
    async fn s4_video_conflict_on_http_ingest() {
        let (pipeline, _svc, _rx) = harness().await;
        let first = pipeline
            .submit(scan("jaw001", "001", DeviceType::Player, None), true)
            .await;
        assert_eq!(first.status, TransactionStatus::Accepted);
        assert!(first.video_queued);

        let second = pipeline
            .submit(scan("jaw001", "002", DeviceType::Player, None), true)
            .await;
        assert_eq!(second.status, TransactionStatus::Rejected);
        assert_eq!(second.message, "Video already playing");
        assert!(!second.video_queued);
    }

    #[tokio::test]
    async fn s5_session_pause_blocks_scoring() {
        let (pipeline, session_service, _rx) = harness().await;
        session_service
            .update_session(Some(aln_protocol::SessionStatus::Paused), None)
            .await
            .unwrap();
        let result = pipeline
            .submit(
                scan("534e2b03", "001", DeviceType::Gm, Some(Mode::Blackmarket)),
                false,
            )
            .await;
        assert_eq!(result.status, TransactionStatus::Error);
        assert!(result.message.to_lowercase().contains("paused"));
        assert_eq!(result.points, 0);
    }

    #[tokio::test]
    async fn player_scan_without_active_session_is_queued_offline() {
        let (tx, _rx) = mpsc::channel(128);
        let catalog = Arc::new(TokenCatalog::empty());
        catalog
            .load_from_document(TokenCatalogDocument {
                tokens: vec![Token {
                    id: "534e2b03".into(),
                    memory_type: MemoryType::Technical,
                    value_rating: 3,
                    group: None,
                    media_assets: MediaAssets::default(),
                    duration: None,
                }],
                score_table: vec![],
                group_bonuses: vec![],
            })
            .unwrap();
        // No session created: session_gate_message() returns "No active session".
        let session_service = Arc::new(SessionService::new(catalog.clone(), tx.clone()));
        let player = Arc::new(FakePlayer);
        let video_fsm = Arc::new(VideoFsm::new(player, tx.clone()));

        let mut dir = std::env::temp_dir();
        dir.push(format!("aln-pipeline-offline-test-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(FilePersistence::new(dir).await.unwrap());
        let offline_queue = Arc::new(crate::offline_queue::OfflineQueue::new(store));

        let pipeline = TransactionPipeline::new(catalog, session_service, video_fsm, tx)
            .with_offline_queue(offline_queue.clone());

        let result = pipeline
            .submit(scan("534e2b03", "001", DeviceType::Player, None), true)
            .await;
        assert_eq!(result.status, TransactionStatus::Accepted);
        assert_eq!(result.message, "Scan queued offline");
        assert_eq!(offline_queue.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_token_is_error() {
        let (pipeline, _svc, _rx) = harness().await;
        let result = pipeline
            .submit(scan("nonexistent", "001", DeviceType::Gm, None), false)
            .await;
        assert_eq!(result.status, TransactionStatus::Error);
        assert_eq!(result.message, "Invalid token");
    }
}
