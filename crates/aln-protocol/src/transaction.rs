//! Transaction pipeline wire types (C5, spec.md §3-4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, TeamId, TokenId, TransactionId};
use crate::token::MemoryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Player,
    Gm,
    Esp32,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Detective,
    Blackmarket,
}

/// The inbound shape for both `/api/scan` and `transaction:submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub token_id: TokenId,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    pub device_id: DeviceId,
    pub device_type: DeviceType,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Accepted,
    Duplicate,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub token_id: TokenId,
    pub team_id: TeamId,
    pub device_id: DeviceId,
    pub device_type: DeviceType,
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
    pub points: i64,
    pub memory_type: MemoryType,
    pub value_rating: u8,
    pub summary: Option<String>,
}

/// Outcome of running a `ScanRequest` through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub transaction: Option<Transaction>,
    pub points: i64,
    pub message: String,
    /// Set when the token carries a video and it was handed to the queue.
    pub video_queued: bool,
    /// Set on a video-conflict rejection (spec.md §4.8); seconds until the
    /// current item is expected to finish.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u32>,
}
