//! Shared application state for the HTTP and WebSocket surfaces, built once
//! at startup and handed to every handler behind `axum::extract::State`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aln_core::{
    BroadcastFabric, DeviceRegistry, DomainEvent, FilePersistence, MediaPlayerPort, OfflineQueue,
    OfflineResult, PersistencePort, PlayerEvent, PlayerState, SessionService, StateProjection,
    TokenCatalog, TransactionPipeline, VideoFsm, VlcMediaPlayer,
};
use aln_core::persistence::{KEY_SCORES_CURRENT, KEY_SESSION_CURRENT, KEY_TOKENS};
use aln_protocol::{TokenCatalogDocument, TransactionStatus};
use tokio::sync::mpsc;

use crate::auth::AdminAuth;
use crate::config::Config;
use crate::display::DisplayFsm;
use crate::log_capture::LogBuffer;

/// How often the C3 status-poll loop asks VLC for its current state
/// (spec.md §5 "media-player commands and status polls").
const PLAYER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How often the admin-token map is swept for expired entries.
const ADMIN_TOKEN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How often the offline queue is checked for a drain opportunity.
const OFFLINE_QUEUE_DRAIN_INTERVAL: Duration = Duration::from_secs(10);

pub type Pipeline = TransactionPipeline<VlcMediaPlayer, FilePersistence>;
pub type Video = VideoFsm<VlcMediaPlayer>;
pub type Projection = StateProjection<VlcMediaPlayer, FilePersistence>;

pub struct AppState {
    pub config: Config,
    pub catalog: Arc<TokenCatalog>,
    pub session_service: Arc<SessionService>,
    pub pipeline: Arc<Pipeline>,
    pub video_fsm: Arc<Video>,
    pub media_player: Arc<VlcMediaPlayer>,
    pub persistence: Arc<FilePersistence>,
    pub offline_queue: Arc<OfflineQueue<FilePersistence>>,
    pub devices: Arc<DeviceRegistry>,
    pub projection: Arc<Projection>,
    pub broadcast: Arc<BroadcastFabric>,
    pub admin_auth: Arc<AdminAuth>,
    pub display: Arc<DisplayFsm>,
    pub log_buffer: Arc<LogBuffer>,
    /// Lets the gateway (C9) emit `DeviceConnected`/`DeviceDisconnected`
    /// domain events itself; every other producer is a domain service that
    /// already holds its own clone of this sender.
    pub events_tx: mpsc::Sender<DomainEvent>,
    pub started_at: std::time::Instant,
}

/// Returned alongside [`AppState`] so the caller can spawn the background
/// tasks that keep consuming from channels the state doesn't own a receiver
/// for.
pub struct Bootstrap {
    pub state: Arc<AppState>,
    pub events_rx: mpsc::Receiver<DomainEvent>,
    pub player_events_rx: mpsc::Receiver<PlayerEvent>,
}

impl AppState {
    pub async fn bootstrap(config: Config, log_buffer: Arc<LogBuffer>) -> anyhow::Result<Bootstrap> {
        let (events_tx, events_rx) = mpsc::channel(1024);

        let persistence = Arc::new(FilePersistence::new(&config.state_dir).await?);

        let catalog = Arc::new(TokenCatalog::empty());
        match catalog.load_from_path(Path::new(&config.token_catalog_path)).await {
            Ok(()) => tracing::info!(path = %config.token_catalog_path, "loaded token catalog"),
            Err(e) => {
                tracing::warn!(error = %e, "token catalog load failed, falling back to last known-good");
                if let Some(blob) = persistence.get(KEY_TOKENS).await? {
                    let doc: TokenCatalogDocument = blob.decode()?;
                    catalog.load_from_document(doc)?;
                } else {
                    tracing::warn!("no fallback token catalog available, starting empty");
                }
            }
        }

        let session_service = Arc::new(SessionService::with_persistence(
            catalog.clone(),
            events_tx.clone(),
            persistence.clone(),
        ));
        if let Some(blob) = persistence.get(KEY_SESSION_CURRENT).await? {
            let session = blob.decode()?;
            let scores = match persistence.get(KEY_SCORES_CURRENT).await? {
                Some(scores_blob) => scores_blob.decode()?,
                None => Vec::new(),
            };
            session_service.restore(Some(session), scores).await;
        }

        let (player_events_tx, player_events_rx) = mpsc::channel(64);
        let media_player = Arc::new(VlcMediaPlayer::new(
            &config.vlc_host,
            config.vlc_port,
            &config.vlc_password,
            &config.idle_loop_file,
            player_events_tx,
        ));
        media_player.init().await.ok();

        let video_fsm = Arc::new(VideoFsm::new(media_player.clone(), events_tx.clone()));

        let offline_queue = Arc::new(OfflineQueue::new(persistence.clone()));
        offline_queue.load().await?;

        let pipeline = Arc::new(
            TransactionPipeline::with_video_playback(
                catalog.clone(),
                session_service.clone(),
                video_fsm.clone(),
                events_tx.clone(),
                config.video_playback_enabled,
            )
            .with_offline_queue(offline_queue.clone()),
        );

        let devices = Arc::new(DeviceRegistry::new());
        let projection = Arc::new(StateProjection::new(
            session_service.clone(),
            pipeline.clone(),
            video_fsm.clone(),
            media_player.clone(),
            offline_queue.clone(),
            devices.clone(),
        ));

        let broadcast = BroadcastFabric::new();
        let admin_auth = Arc::new(AdminAuth::new(
            config.admin_password.clone(),
            Duration::from_secs(config.admin_token_ttl_secs),
        ));
        let display = Arc::new(DisplayFsm::new());

        let state = Arc::new(Self {
            config,
            catalog,
            session_service,
            pipeline,
            video_fsm,
            media_player,
            persistence,
            offline_queue,
            devices,
            projection,
            broadcast,
            admin_auth,
            display,
            log_buffer,
            events_tx,
            started_at: std::time::Instant::now(),
        });

        Ok(Bootstrap {
            state,
            events_rx,
            player_events_rx,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Spawns the two background tasks the media player depends on: the
    /// disconnect listener and the C3 status-poll loop that feeds the video
    /// FSM's `on_player_reported_state` edge (spec.md §5).
    pub fn spawn_player_monitor(self: &Arc<Self>, mut player_events_rx: mpsc::Receiver<PlayerEvent>) {
        let video_fsm = self.video_fsm.clone();
        tokio::spawn(async move {
            while let Some(event) = player_events_rx.recv().await {
                match event {
                    PlayerEvent::Disconnected => video_fsm.on_player_disconnected().await,
                    PlayerEvent::Connected => {}
                    PlayerEvent::Error(message) => {
                        tracing::warn!(%message, "media player reported an error");
                    }
                }
            }
        });

        let media_player = self.media_player.clone();
        let video_fsm = self.video_fsm.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PLAYER_POLL_INTERVAL);
            loop {
                interval.tick().await;
                match media_player.status().await {
                    Ok(status) => video_fsm.on_player_reported_state(status.state).await,
                    Err(e) => {
                        tracing::debug!(error = %e, "media player status poll failed");
                        video_fsm
                            .on_player_reported_state(PlayerState::Stopped)
                            .await;
                    }
                }
            }
        });
    }

    /// Spawns the periodic sweep that drops expired admin tokens (same
    /// poll-loop shape as [`Self::spawn_player_monitor`]'s status poll).
    pub fn spawn_admin_auth_sweep(self: &Arc<Self>) {
        let admin_auth = self.admin_auth.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ADMIN_TOKEN_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                admin_auth.sweep_expired().await;
            }
        });
    }

    /// Spawns the C7 drainer: wakes on a timer, and once either the session
    /// service or media player looks usable again, drains the offline queue
    /// back through the normal pipeline and broadcasts one
    /// `offline:queue:processed` event summarizing the results (spec.md
    /// §4.7).
    pub fn spawn_offline_queue_drainer(self: &Arc<Self>) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(OFFLINE_QUEUE_DRAIN_INTERVAL);
            loop {
                interval.tick().await;
                if state.offline_queue.is_empty().await {
                    continue;
                }
                let session_ready = state.session_service.session_gate_message().await.is_none();
                let player_ready = state.video_fsm.player_connected().await;
                if !session_ready && !player_ready {
                    continue;
                }

                let pipeline = state.pipeline.clone();
                let drained = state
                    .offline_queue
                    .drain(|item| {
                        let pipeline = pipeline.clone();
                        async move {
                            let result = pipeline.submit(item.scan.clone(), true).await;
                            OfflineResult {
                                transaction_id: result.transaction.as_ref().map(|t| t.id.0.to_string()),
                                status: format!("{:?}", result.status).to_lowercase(),
                                token_id: item.scan.token_id.clone(),
                                error: matches!(result.status, TransactionStatus::Error)
                                    .then(|| result.message.clone()),
                            }
                        }
                    })
                    .await;

                match drained {
                    Ok(results) if !results.is_empty() => {
                        let queue_size = state.offline_queue.len().await;
                        let _ = state
                            .events_tx
                            .send(DomainEvent::OfflineQueueProcessed { queue_size, results })
                            .await;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "offline queue drain failed"),
                }
            }
        });
    }
}
