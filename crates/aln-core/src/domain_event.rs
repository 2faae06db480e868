//! Domain events emitted by C4/C5/C6/C7. Only the broadcast fabric (C10,
//! [`crate::broadcast`]) is allowed to translate these into wire envelopes;
//! nothing in this module or in the emitting services knows a socket exists.

use aln_protocol::{DeviceId, DeviceType, GroupId, ScanRequest, Session, TeamScore, TeamId, Transaction};

use crate::video_fsm::VideoStatus;

/// What a service hands to the broadcast fabric. Field names here are
/// internal; C10 owns the wire rename (e.g. `group`/`bonusPoints` below).
#[derive(Debug, Clone)]
pub enum DomainEvent {
    SessionUpdated(Session),
    ScoreUpdated(TeamScore),
    GroupCompleted {
        group_id: GroupId,
        bonus: i64,
        team_id: TeamId,
    },
    TransactionNew(Transaction),
    /// A player scan was observed, whether or not it produced a transaction
    /// (e.g. unknown token, paused session). Mirrors `player:scan` (spec.md §4.9).
    PlayerScan(ScanRequest),
    VideoStatus(VideoStatus),
    OfflineQueueProcessed {
        queue_size: usize,
        results: Vec<crate::offline_queue::OfflineResult>,
    },
    DeviceConnected {
        device_id: DeviceId,
        device_type: DeviceType,
    },
    DeviceDisconnected {
        device_id: DeviceId,
        device_type: DeviceType,
    },
    /// A service-level failure that degrades operation but does not crash
    /// the orchestrator (spec.md §7, "Service unavailable").
    ServiceError {
        message: String,
        details: Option<serde_json::Value>,
    },
}
