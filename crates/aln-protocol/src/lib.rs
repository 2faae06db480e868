//! Wire and domain data types shared between `aln-core` and `aln-server`.
//!
//! This crate is intentionally transport-free: no tokio, no axum, no I/O.
//! It only describes what goes over the wire and the plain data the rest
//! of the system is built from.

pub mod error;
pub mod http;
pub mod ids;
pub mod session;
pub mod state;
pub mod token;
pub mod transaction;
pub mod validate;
pub mod video;
pub mod ws;

pub use error::{ApiError, ErrorCode};
pub use ids::{DeviceId, GroupId, SessionId, TeamId, TokenId, TransactionId, VideoItemId};
pub use session::{AdminAdjustment, Session, SessionMetadata, SessionStatus, TeamScore};
pub use state::{DeviceInfo, GameStateDto, SystemStatusDto, VlcStatus};
pub use token::{GroupBonus, MediaAssets, MemoryType, ScoreTableEntry, Token, TokenCatalogDocument};
pub use transaction::{
    DeviceType, Mode, ScanRequest, Transaction, TransactionResult, TransactionStatus,
};
pub use video::{EnqueueResult, VideoQueueItem, VideoState, VideoStatusDto};
pub use ws::{
    AuthHandshake, DeviceEventPayload, Envelope, GmCommandAction, GmIdentify,
    OfflineQueueProcessedPayload, OfflineResultEntry, ServerEventData, TransactionSubmit,
};
