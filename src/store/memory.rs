use super::{ChallengeStore, ChallengeUpdate};
use crate::error::app_error::AppError;
use crate::models::otp::{Challenge, VerifyTransition};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Process-local challenge table.
///
/// Every operation takes the table lock once and completes without
/// suspending, so each is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    entries: Mutex<HashMap<String, Challenge>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn get(&self, email: &str) -> Result<Option<Challenge>, AppError> {
        Ok(self.entries.lock().await.get(email).cloned())
    }

    async fn put(&self, email: &str, challenge: Challenge) -> Result<(), AppError> {
        self.entries.lock().await.insert(email.to_string(), challenge);
        Ok(())
    }

    async fn delete(&self, email: &str) -> Result<(), AppError> {
        self.entries.lock().await.remove(email);
        Ok(())
    }

    async fn update(&self, email: &str, update: ChallengeUpdate) -> Result<VerifyTransition, AppError> {
        let mut entries = self.entries.lock().await;
        let (next, transition) = update(entries.remove(email));
        if let Some(challenge) = next {
            entries.insert(email.to_string(), challenge);
        }
        Ok(transition)
    }

    async fn purge_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, challenge| challenge.expires_at >= now);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge(code: &str, expires_in_seconds: i64) -> Challenge {
        let now = Utc::now();
        Challenge {
            code: code.to_string(),
            issued_at: now,
            expires_at: now + Duration::seconds(expires_in_seconds),
            attempts: 0,
        }
    }

    #[rocket::async_test]
    async fn put_then_get_round_trips() {
        let store = MemoryChallengeStore::new();
        store.put("a@x.com", challenge("111111", 300)).await.unwrap();

        let stored = store.get("a@x.com").await.unwrap().expect("entry stored");
        assert_eq!(stored.code, "111111");
        assert_eq!(stored.attempts, 0);
    }

    #[rocket::async_test]
    async fn put_replaces_existing_entry() {
        let store = MemoryChallengeStore::new();
        store.put("a@x.com", challenge("111111", 300)).await.unwrap();
        store.put("a@x.com", challenge("222222", 300)).await.unwrap();

        let stored = store.get("a@x.com").await.unwrap().expect("entry stored");
        assert_eq!(stored.code, "222222");
    }

    #[rocket::async_test]
    async fn delete_removes_entry() {
        let store = MemoryChallengeStore::new();
        store.put("a@x.com", challenge("111111", 300)).await.unwrap();
        store.delete("a@x.com").await.unwrap();

        assert!(store.get("a@x.com").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn update_can_delete_or_keep_the_entry() {
        let store = MemoryChallengeStore::new();
        store.put("a@x.com", challenge("111111", 300)).await.unwrap();

        let transition = store
            .update(
                "a@x.com",
                Box::new(|entry| {
                    let mut challenge = entry.expect("entry present");
                    challenge.attempts += 1;
                    (Some(challenge), VerifyTransition::Mismatch { remaining: 2 })
                }),
            )
            .await
            .unwrap();
        assert_eq!(transition, VerifyTransition::Mismatch { remaining: 2 });
        assert_eq!(store.get("a@x.com").await.unwrap().unwrap().attempts, 1);

        let transition = store
            .update("a@x.com", Box::new(|_| (None, VerifyTransition::Verified)))
            .await
            .unwrap();
        assert_eq!(transition, VerifyTransition::Verified);
        assert!(store.get("a@x.com").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn purge_expired_removes_only_stale_entries() {
        let store = MemoryChallengeStore::new();
        store.put("old@x.com", challenge("111111", -10)).await.unwrap();
        store.put("new@x.com", challenge("222222", 300)).await.unwrap();

        let removed = store.purge_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("old@x.com").await.unwrap().is_none());
        assert!(store.get("new@x.com").await.unwrap().is_some());
    }
}
