//! Session and per-team score data model (C4, spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::{DeviceId, GroupId, SessionId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub gm_stations: u32,
    pub player_devices: u32,
    pub total_scans: u64,
    pub unique_tokens_scanned: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub teams: BTreeSet<TeamId>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAdjustment {
    pub delta: i64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub gm_device_id: DeviceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
    pub team_id: TeamId,
    pub current_score: i64,
    pub base_score: i64,
    pub bonus_points: i64,
    pub tokens_scanned: u64,
    pub completed_groups: BTreeSet<GroupId>,
    pub admin_adjustments: Vec<AdminAdjustment>,
    pub last_update: DateTime<Utc>,
}

impl TeamScore {
    pub fn new(team_id: TeamId, now: DateTime<Utc>) -> Self {
        Self {
            team_id,
            current_score: 0,
            base_score: 0,
            bonus_points: 0,
            tokens_scanned: 0,
            completed_groups: BTreeSet::new(),
            admin_adjustments: Vec::new(),
            last_update: now,
        }
    }

    /// Recomputes `current_score` from its parts. Invariant 2 of spec.md §8.
    pub fn recompute(&mut self) {
        let adjustments: i64 = self.admin_adjustments.iter().map(|a| a.delta).sum();
        self.current_score = self.base_score + self.bonus_points + adjustments;
    }
}
