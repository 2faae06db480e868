//! Video queue and playback FSM wire types (C6, spec.md §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TokenId, VideoItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoState {
    Idle,
    Loading,
    Playing,
    Paused,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQueueItem {
    pub id: VideoItemId,
    pub token_id: TokenId,
    pub filename: String,
    pub duration_sec: u32,
    pub enqueue_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub status: VideoState,
    pub error: Option<String>,
}

/// The `video:status` broadcast payload / `status()` return value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusDto {
    pub status: VideoState,
    pub token_id: Option<TokenId>,
    pub duration_sec: Option<u32>,
    pub position_sec: Option<u32>,
    pub queue_length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResult {
    pub queued: bool,
    pub reason: Option<String>,
    pub wait_time: Option<u32>,
}
