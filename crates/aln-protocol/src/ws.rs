//! WebSocket wire format (C9 gateway, spec.md §4.9) — the wrapped envelope,
//! the closed set of server->client events, and the client->server frames.
//!
//! This module is the only place on the wire side that names event strings;
//! `aln-core`'s broadcast fabric (C10) is the only place on the server side
//! that is allowed to construct a [`ServerEvent`] from a domain event, per
//! spec.md §4.10's layering rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::ids::{DeviceId, GroupId, TeamId, TokenId};
use crate::session::{Session, TeamScore};
use crate::state::GameStateDto;
use crate::transaction::{DeviceType, ScanRequest, Transaction, TransactionResult};
use crate::video::VideoStatusDto;

/// The fixed `{event, data, timestamp}` shape every WS message uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Handshake auth frame (spec.md §4.9 step 1), sent before any envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthHandshake {
    pub token: String,
    pub device_id: DeviceId,
    pub device_type: DeviceType,
    pub version: String,
}

/// Legacy identify frame, equivalent to a successful handshake auth.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmIdentify {
    pub token: String,
    pub device_id: DeviceId,
    pub device_type: DeviceType,
}

/// The closed action set for `gm:command` (spec.md §4.9 table).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum GmCommandAction {
    #[serde(rename = "session:create")]
    SessionCreate { name: String, teams: Vec<TeamId> },
    #[serde(rename = "session:pause")]
    SessionPause,
    #[serde(rename = "session:resume")]
    SessionResume,
    #[serde(rename = "session:end")]
    SessionEnd,
    #[serde(rename = "session:start")]
    SessionStart,
    #[serde(rename = "video:play")]
    VideoPlay,
    #[serde(rename = "video:pause")]
    VideoPause,
    #[serde(rename = "video:stop")]
    VideoStop,
    #[serde(rename = "video:skip")]
    VideoSkip,
    #[serde(rename = "video:queue:add")]
    VideoQueueAdd { filename: String },
    #[serde(rename = "video:queue:reorder")]
    VideoQueueReorder { order: Vec<String> },
    #[serde(rename = "video:queue:clear")]
    VideoQueueClear,
    #[serde(rename = "score:adjust")]
    ScoreAdjust {
        team_id: TeamId,
        delta: i64,
        reason: String,
    },
    #[serde(rename = "transaction:create")]
    TransactionCreate(Box<ScanRequest>),
    #[serde(rename = "transaction:delete")]
    TransactionDelete { transaction_id: String },
    #[serde(rename = "display:idle-loop")]
    DisplayIdleLoop,
    #[serde(rename = "display:scoreboard")]
    DisplayScoreboard,
    #[serde(rename = "display:toggle")]
    DisplayToggle,
    #[serde(rename = "display:status")]
    DisplayStatus,
    #[serde(rename = "system:reset")]
    SystemReset,
}

impl GmCommandAction {
    /// The `action` string as it appears on the wire, used for the ack.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionCreate { .. } => "session:create",
            Self::SessionPause => "session:pause",
            Self::SessionResume => "session:resume",
            Self::SessionEnd => "session:end",
            Self::SessionStart => "session:start",
            Self::VideoPlay => "video:play",
            Self::VideoPause => "video:pause",
            Self::VideoStop => "video:stop",
            Self::VideoSkip => "video:skip",
            Self::VideoQueueAdd { .. } => "video:queue:add",
            Self::VideoQueueReorder { .. } => "video:queue:reorder",
            Self::VideoQueueClear => "video:queue:clear",
            Self::ScoreAdjust { .. } => "score:adjust",
            Self::TransactionCreate(_) => "transaction:create",
            Self::TransactionDelete { .. } => "transaction:delete",
            Self::DisplayIdleLoop => "display:idle-loop",
            Self::DisplayScoreboard => "display:scoreboard",
            Self::DisplayToggle => "display:toggle",
            Self::DisplayStatus => "display:status",
            Self::SystemReset => "system:reset",
        }
    }
}

/// Payload of `transaction:submit`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionSubmit(pub ScanRequest);

/// Every server->client event this gateway can emit, tagged with its wire
/// name. Audience routing lives in the gateway, not here.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerEventData {
    TransactionResult(TransactionResult),
    TransactionNew(Transaction),
    ScoreUpdated(TeamScore),
    GroupCompleted {
        #[serde(rename = "group")]
        group: GroupId,
        #[serde(rename = "bonusPoints")]
        bonus_points: i64,
        #[serde(rename = "teamId")]
        team_id: TeamId,
    },
    SessionUpdate(Session),
    VideoStatus(VideoStatusDto),
    DeviceConnected(DeviceEventPayload),
    DeviceDisconnected(DeviceEventPayload),
    OfflineQueueProcessed(OfflineQueueProcessedPayload),
    SyncFull(Box<GameStateDto>),
    GmCommandAck {
        action: String,
        success: bool,
        message: String,
    },
    Error(ApiError),
    PlayerScan(ScanRequest),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEventPayload {
    pub device_id: DeviceId,
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfflineResultEntry {
    pub transaction_id: Option<String>,
    pub status: String,
    pub token_id: TokenId,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineQueueProcessedPayload {
    pub queue_size: usize,
    pub results: Vec<OfflineResultEntry>,
}

/// The wire event name for each payload, per spec.md §4.9's table.
pub fn event_name(data: &ServerEventData) -> &'static str {
    match data {
        ServerEventData::TransactionResult(_) => "transaction:result",
        ServerEventData::TransactionNew(_) => "transaction:new",
        ServerEventData::ScoreUpdated(_) => "score:updated",
        ServerEventData::GroupCompleted { .. } => "group:completed",
        ServerEventData::SessionUpdate(_) => "session:update",
        ServerEventData::VideoStatus(_) => "video:status",
        ServerEventData::DeviceConnected(_) => "device:connected",
        ServerEventData::DeviceDisconnected(_) => "device:disconnected",
        ServerEventData::OfflineQueueProcessed(_) => "offline:queue:processed",
        ServerEventData::SyncFull(_) => "sync:full",
        ServerEventData::GmCommandAck { .. } => "gm:command:ack",
        ServerEventData::Error(_) => "error",
        ServerEventData::PlayerScan(_) => "player:scan",
    }
}

impl ServerEventData {
    pub fn into_envelope(self) -> Envelope {
        let name = event_name(&self);
        let data = serde_json::to_value(&self)
            .expect("ServerEventData variants are always JSON-serializable");
        Envelope::new(name, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_fixed_shape() {
        let env = ServerEventData::GmCommandAck {
            action: "session:pause".into(),
            success: true,
            message: "Session paused".into(),
        }
        .into_envelope();
        assert_eq!(env.event, "gm:command:ack");
        assert!(env.data.get("success").unwrap().as_bool().unwrap());
    }

    #[test]
    fn gm_command_action_roundtrips() {
        let json = serde_json::json!({
            "action": "score:adjust",
            "payload": { "teamId": "001", "delta": -500, "reason": "penalty" }
        });
        let action: GmCommandAction = serde_json::from_value(json).unwrap();
        assert_eq!(action.name(), "score:adjust");
        match action {
            GmCommandAction::ScoreAdjust { team_id, delta, .. } => {
                assert_eq!(team_id, "001");
                assert_eq!(delta, -500);
            }
            _ => panic!("wrong variant"),
        }
    }
}
