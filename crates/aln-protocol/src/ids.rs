//! Opaque identifiers shared across the wire.
//!
//! Tokens, teams and devices are free-form strings chosen by game content
//! and scanner hardware respectively; sessions/transactions/queue entries are
//! server-minted UUIDs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TokenId = String;
pub type TeamId = String;
pub type DeviceId = String;
pub type GroupId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoItemId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VideoItemId {
    fn default() -> Self {
        Self::new()
    }
}
