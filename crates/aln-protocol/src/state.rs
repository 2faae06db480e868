//! The derived `GameState` snapshot (C11, spec.md §3, §4.11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DeviceId;
use crate::session::{Session, TeamScore};
use crate::transaction::{DeviceType, Transaction};
use crate::video::VideoStatusDto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VlcStatus {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatusDto {
    pub orchestrator_online: bool,
    pub vlc: VlcStatus,
    pub video_display_ready: bool,
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: DeviceId,
    pub device_type: DeviceType,
    pub ip: Option<String>,
    pub connection_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateDto {
    pub session: Option<Session>,
    pub scores: Vec<TeamScore>,
    pub recent_transactions: Vec<Transaction>,
    pub video_status: VideoStatusDto,
    pub devices: Vec<DeviceInfo>,
    pub system_status: SystemStatusDto,
}
