//! Token catalog data model (C1). Loaded once, immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, TokenId};

/// Categorical "memory type" carried by a token, used by the score table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryType {
    Personal,
    Business,
    Technical,
}

/// Media asset references carried by a token, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAssets {
    pub video: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub processing_image: Option<String>,
}

/// A single token's immutable metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub memory_type: MemoryType,
    /// 1-5 inclusive.
    pub value_rating: u8,
    pub group: Option<GroupId>,
    #[serde(default)]
    pub media_assets: MediaAssets,
    /// Seconds, only meaningful when `media_assets.video` is set.
    pub duration: Option<u32>,
}

impl Token {
    pub fn has_video(&self) -> bool {
        self.media_assets.video.is_some()
    }
}

/// A bonus awarded once a team owns every token in a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBonus {
    pub group: GroupId,
    pub bonus_points: i64,
}

/// The document loaded at startup: tokens plus the score table and group
/// bonus table that travel with them (see spec.md §4.5, §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCatalogDocument {
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub score_table: Vec<ScoreTableEntry>,
    #[serde(default)]
    pub group_bonuses: Vec<GroupBonus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreTableEntry {
    pub memory_type: MemoryType,
    pub value_rating: u8,
    pub points: i64,
}
