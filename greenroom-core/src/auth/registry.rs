use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::PrimaryKey;

/// The revocable set of valid refresh tokens, one expiring collection per
/// user. A token is redeemable only while present and unexpired; rotation
/// removes it, so a captured token is usable at most once.
///
/// Every operation takes the user's entry lock for exactly one mutation,
/// which avoids check-then-act races without additional locking.
#[derive(Default)]
pub struct RefreshTokenRegistry {
    entries: DashMap<PrimaryKey, Vec<TokenEntry>>,
}

#[derive(Debug, Clone)]
struct TokenEntry {
    token: String,
    /// Absolute expiry as epoch milliseconds
    expires_at_ms: i64,
}

impl RefreshTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a user. Expired members are pruned on the way
    /// in, so the set never outlives its longest-lived member.
    pub fn add(&self, user_id: PrimaryKey, token: &str, ttl: Duration) {
        let now = Utc::now().timestamp_millis();
        let mut entry = self.entries.entry(user_id).or_default();

        entry.retain(|t| t.expires_at_ms > now);
        entry.push(TokenEntry {
            token: token.to_string(),
            expires_at_ms: now + ttl.num_milliseconds(),
        });
        entry.sort_by_key(|t| t.expires_at_ms);
    }

    /// True iff the token is present and its expiry is in the future
    pub fn validate(&self, user_id: PrimaryKey, token: &str) -> bool {
        let now = Utc::now().timestamp_millis();

        self.entries
            .get(&user_id)
            .map(|entry| {
                entry
                    .iter()
                    .any(|t| t.token == token && t.expires_at_ms > now)
            })
            .unwrap_or(false)
    }

    /// Revokes a single token. Idempotent.
    pub fn remove(&self, user_id: PrimaryKey, token: &str) {
        let emptied = match self.entries.get_mut(&user_id) {
            Some(mut entry) => {
                entry.retain(|t| t.token != token);
                entry.is_empty()
            }
            None => false,
        };

        if emptied {
            self.entries.remove_if(&user_id, |_, tokens| tokens.is_empty());
        }
    }

    /// Revokes every token of a user (all-devices logout). Idempotent.
    pub fn remove_all(&self, user_id: PrimaryKey) {
        self.entries.remove(&user_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokens_validate_until_removed() {
        let registry = RefreshTokenRegistry::new();

        registry.add(1, "first", Duration::days(7));
        registry.add(1, "second", Duration::days(7));

        assert!(registry.validate(1, "first"));
        assert!(registry.validate(1, "second"));
        assert!(!registry.validate(1, "unknown"));
        assert!(!registry.validate(2, "first"));

        registry.remove(1, "first");
        assert!(!registry.validate(1, "first"));
        assert!(registry.validate(1, "second"));
    }

    #[test]
    fn expired_tokens_do_not_validate() {
        let registry = RefreshTokenRegistry::new();

        registry.add(1, "stale", Duration::seconds(-1));
        assert!(!registry.validate(1, "stale"));
    }

    #[test]
    fn remove_all_revokes_every_device() {
        let registry = RefreshTokenRegistry::new();

        registry.add(1, "laptop", Duration::days(7));
        registry.add(1, "phone", Duration::days(7));
        registry.remove_all(1);

        assert!(!registry.validate(1, "laptop"));
        assert!(!registry.validate(1, "phone"));
    }

    #[test]
    fn removal_is_idempotent() {
        let registry = RefreshTokenRegistry::new();

        registry.remove(1, "never-added");
        registry.remove_all(1);

        registry.add(1, "token", Duration::days(7));
        registry.remove(1, "token");
        registry.remove(1, "token");

        assert!(!registry.validate(1, "token"));
    }
}
