//! Short-lived one-time tokens kept in memory
//!
//! Used for password-reset links and OAuth `state` values. Tokens do not
//! survive a restart; holders simply request a new one.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use udulib_common::security::random_token;

/// Entropy of issued tokens in bytes
const TOKEN_BYTES: usize = 32;

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// Map of random token to payload with a fixed time-to-live
#[derive(Clone)]
pub struct EphemeralTokens<T> {
    entries: Arc<RwLock<HashMap<String, Entry<T>>>>,
    ttl: Duration,
}

impl<T: Clone + Send + Sync + 'static> EphemeralTokens<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under a fresh token
    pub async fn issue(&self, value: T) -> String {
        let token = random_token(TOKEN_BYTES);
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            token.clone(),
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Payload of a live token, leaving it in place
    pub async fn peek(&self, token: &str) -> Option<T> {
        let entries = self.entries.read().await;
        entries
            .get(token)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value.clone())
    }

    /// Remove a token and return its payload if it had not expired
    pub async fn consume(&self, token: &str) -> Option<T> {
        let entry = self.entries.write().await.remove(token)?;
        (entry.expires_at > Utc::now()).then_some(entry.value)
    }

    /// Drop every token whose payload matches `predicate`
    pub async fn revoke_where(&self, predicate: impl Fn(&T) -> bool) {
        self.entries.write().await.retain(|_, entry| !predicate(&entry.value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_peek_consume() {
        let tokens = EphemeralTokens::new(Duration::minutes(5));
        let token = tokens.issue(7_i64).await;

        assert_eq!(tokens.peek(&token).await, Some(7));
        assert_eq!(tokens.peek(&token).await, Some(7));
        assert_eq!(tokens.consume(&token).await, Some(7));
        assert_eq!(tokens.consume(&token).await, None);
        assert_eq!(tokens.peek("unknown").await, None);
    }

    #[tokio::test]
    async fn test_expired_tokens_are_invalid() {
        let tokens = EphemeralTokens::new(Duration::seconds(-1));
        let token = tokens.issue("state".to_string()).await;
        assert_eq!(tokens.peek(&token).await, None);
        assert_eq!(tokens.consume(&token).await, None);
    }

    #[tokio::test]
    async fn test_revoke_where() {
        let tokens = EphemeralTokens::new(Duration::minutes(5));
        let a = tokens.issue(1_i64).await;
        let b = tokens.issue(2_i64).await;
        tokens.revoke_where(|user| *user == 1).await;
        assert_eq!(tokens.peek(&a).await, None);
        assert_eq!(tokens.peek(&b).await, Some(2));
    }
}
