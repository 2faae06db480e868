//! The orchestrator core: session/scoring, transaction pipeline, video
//! playback FSM, offline queue, persistence and broadcast/projection
//! (C1-C7, C10, C11). Transport-free — no axum, no raw sockets; `aln-server`
//! is the only crate that owns a listener.

pub mod broadcast;
pub mod catalog;
pub mod domain_event;
pub mod error;
pub mod media_player;
pub mod offline_queue;
pub mod persistence;
pub mod pipeline;
pub mod projection;
pub mod session_service;
pub mod video_fsm;

pub use broadcast::BroadcastFabric;
pub use catalog::TokenCatalog;
pub use domain_event::DomainEvent;
pub use error::{CoreError, CoreResult};
pub use media_player::{MediaPlayerPort, PlayerEvent, PlayerState, PlayerStatus, VlcMediaPlayer};
pub use offline_queue::{OfflineQueue, OfflineQueueItem, OfflineResult};
pub use persistence::{Blob, FilePersistence, PersistencePort};
pub use pipeline::TransactionPipeline;
pub use projection::{DeviceRegistry, StateProjection};
pub use session_service::{ScoreEffect, SessionService};
pub use video_fsm::VideoFsm;
