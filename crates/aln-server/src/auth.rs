//! Admin bearer-token issuance (spec.md §6 `/api/admin/auth`). A deliberately
//! small in-memory port: tokens are opaque UUIDs with a TTL, checked on every
//! bearer-protected route. Not a domain service, so it lives in the server
//! crate rather than `aln-core`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct AdminAuth {
    admin_password: String,
    ttl: Duration,
    tokens: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl AdminAuth {
    pub fn new(admin_password: String, ttl: Duration) -> Self {
        Self {
            admin_password,
            ttl,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `(token, expiresInSecs)` on a correct password.
    pub async fn issue(&self, password: &str) -> Option<(String, u64)> {
        if password != self.admin_password {
            return None;
        }
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_default();
        self.tokens.write().await.insert(token.clone(), expires_at);
        Some((token, self.ttl.as_secs()))
    }

    pub async fn is_valid(&self, token: &str) -> bool {
        let tokens = self.tokens.read().await;
        match tokens.get(token) {
            Some(expires_at) => *expires_at > Utc::now(),
            None => false,
        }
    }

    /// Drops expired tokens. Called periodically off a background task so
    /// the token map doesn't grow for the life of the process.
    pub async fn sweep_expired(&self) {
        let now = Utc::now();
        self.tokens.write().await.retain(|_, expires_at| *expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn correct_password_issues_a_valid_token() {
        let auth = AdminAuth::new("secret".into(), Duration::from_secs(3600));
        let (token, expires_in) = auth.issue("secret").await.unwrap();
        assert_eq!(expires_in, 3600);
        assert!(auth.is_valid(&token).await);
    }

    #[tokio::test]
    async fn wrong_password_issues_nothing() {
        let auth = AdminAuth::new("secret".into(), Duration::from_secs(3600));
        assert!(auth.issue("wrong").await.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let auth = AdminAuth::new("secret".into(), Duration::from_millis(1));
        let (token, _) = auth.issue("secret").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!auth.is_valid(&token).await);
    }
}
