//! Request/response bodies for the HTTP surface (C8, spec.md §6) that are
//! not already covered by `transaction`/`session`/`state`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TokenId;
use crate::token::Token;
use crate::transaction::{ScanRequest, TransactionStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct AdminAuthRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminAuthResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsQuery {
    pub lines: usize,
    pub level: Option<String>,
}

impl Default for LogsQuery {
    fn default() -> Self {
        Self {
            lines: 100,
            level: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokensResponse {
    pub tokens: Vec<Token>,
    pub count: usize,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHttpResponse {
    pub status: TransactionStatus,
    pub message: String,
    pub token_id: TokenId,
    pub video_queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanRequest {
    pub batch_id: String,
    pub transactions: Vec<ScanRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchScanEntryResult {
    pub status: TransactionStatus,
    pub token_id: TokenId,
    pub message: String,
    pub video_queued: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchScanResponse {
    pub results: Vec<BatchScanEntryResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime: u64,
    pub timestamp: DateTime<Utc>,
}
