use crate::config::OtpConfig;
use crate::error::app_error::AppError;
use crate::models::otp::{Challenge, VerifyOutcome, VerifyTransition};
use crate::store::ChallengeStore;
use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A freshly generated code, returned to the caller so it can be handed to
/// email dispatch. The code itself never appears in an HTTP response.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// The verification core: owns the challenge table and enforces its
/// invariants. Never performs network I/O; email dispatch happens in the
/// caller after `issue`/`resend` return.
///
/// Per email address the lifecycle is: absent, pending after `issue`, then
/// back to absent on success, expiry, or attempt exhaustion. Mismatched
/// attempts keep the entry pending until the retry budget runs out.
pub struct OtpService {
    store: Arc<dyn ChallengeStore>,
    config: OtpConfig,
}

fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn outcome_for(transition: VerifyTransition) -> VerifyOutcome {
    let (success, message) = match transition {
        VerifyTransition::NotFound => (false, "No OTP found for this email. Please request a new OTP.".to_string()),
        VerifyTransition::Expired => (false, "OTP has expired. Please request a new OTP.".to_string()),
        VerifyTransition::Exhausted => (false, "Too many failed attempts. Please request a new OTP.".to_string()),
        VerifyTransition::Mismatch { remaining } => (false, format!("Invalid OTP. {} attempts remaining.", remaining)),
        VerifyTransition::Verified => (true, "OTP verified successfully!".to_string()),
    };
    VerifyOutcome { success, message }
}

impl OtpService {
    pub fn new(store: Arc<dyn ChallengeStore>, config: OtpConfig) -> Self {
        Self { store, config }
    }

    /// Generate and store a fresh code for this email, replacing any pending
    /// challenge and resetting its attempts and expiry.
    pub async fn issue(&self, email: &str) -> Result<IssuedOtp, AppError> {
        let email = normalize_email(email);
        let code = generate_code();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.code_ttl_seconds);

        self.store
            .put(
                &email,
                Challenge {
                    code: code.clone(),
                    issued_at: now,
                    expires_at,
                    attempts: 0,
                },
            )
            .await?;

        debug!(email = %email, "issued verification code");
        Ok(IssuedOtp { code, expires_at })
    }

    /// Reissue a code, discarding any pending challenge. Unlike `issue`, this
    /// refuses while the cooldown since the last issuance is still running;
    /// an expired pending challenge never blocks a resend.
    pub async fn resend(&self, email: &str) -> Result<IssuedOtp, AppError> {
        let email = normalize_email(email);

        if self.config.resend_cooldown_seconds > 0 {
            if let Some(pending) = self.store.get(&email).await? {
                if !pending.is_expired() {
                    let elapsed = (Utc::now() - pending.issued_at).num_seconds();
                    let cooldown = self.config.resend_cooldown_seconds;
                    if elapsed < cooldown {
                        return Err(AppError::ResendCooldown {
                            retry_after_secs: (cooldown - elapsed).max(1) as u64,
                        });
                    }
                }
            }
        }

        self.issue(&email).await
    }

    /// Check a submitted code against the pending challenge.
    ///
    /// The stored entry mutates or disappears as a side effect: a mismatch
    /// increments the attempt counter, while success, expiry, and exhaustion
    /// all delete the entry. The whole decision runs as one atomic store
    /// update, so concurrent attempts against the same email serialize.
    pub async fn verify(&self, email: &str, submitted_code: &str) -> Result<VerifyOutcome, AppError> {
        let email = normalize_email(email);
        let submitted = submitted_code.trim().to_string();
        let max_attempts = self.config.max_attempts;

        let transition = self
            .store
            .update(
                &email,
                Box::new(move |entry| {
                    let Some(mut challenge) = entry else {
                        return (None, VerifyTransition::NotFound);
                    };
                    if challenge.is_expired() {
                        return (None, VerifyTransition::Expired);
                    }
                    if challenge.attempts >= max_attempts {
                        return (None, VerifyTransition::Exhausted);
                    }
                    if challenge.code != submitted {
                        challenge.attempts += 1;
                        if challenge.attempts >= max_attempts {
                            return (None, VerifyTransition::Exhausted);
                        }
                        let remaining = max_attempts - challenge.attempts;
                        return (Some(challenge), VerifyTransition::Mismatch { remaining });
                    }
                    (None, VerifyTransition::Verified)
                }),
            )
            .await?;

        match &transition {
            VerifyTransition::Verified => info!(email = %email, "email verified"),
            other => debug!(email = %email, transition = ?other, "verification attempt rejected"),
        }

        Ok(outcome_for(transition))
    }

    /// Whether an unexpired challenge is pending for this email. An expired
    /// entry found here is deleted on the spot.
    pub async fn has_valid_otp(&self, email: &str) -> Result<bool, AppError> {
        let email = normalize_email(email);
        match self.store.get(&email).await? {
            Some(challenge) if challenge.is_expired() => {
                self.store.delete(&email).await?;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    /// Whole seconds until the pending challenge expires, 0 when absent or
    /// already expired.
    pub async fn remaining_seconds(&self, email: &str) -> Result<i64, AppError> {
        let email = normalize_email(email);
        let remaining = self.store.get(&email).await?.map(|challenge| challenge.remaining_seconds()).unwrap_or(0);
        Ok(remaining)
    }

    /// Drop expired entries to bound memory. Correctness does not depend on
    /// this running: every read path checks expiry itself.
    pub async fn cleanup(&self) -> Result<usize, AppError> {
        let removed = self.store.purge_expired().await?;
        if removed > 0 {
            debug!(removed, "swept expired verification codes");
        }
        Ok(removed)
    }

    /// Periodic sweep loop, started on liftoff and stopped by `shutdown`.
    pub async fn run_cleanup_loop(self: Arc<Self>, shutdown: rocket::Shutdown) {
        let interval = std::time::Duration::from_secs(self.config.cleanup_interval_seconds.max(1));
        let mut ticker = tokio::time::interval(interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(error) = self.cleanup().await {
                        warn!(?error, "cleanup sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryChallengeStore;
    use proptest::prelude::*;

    fn service_with(config: OtpConfig) -> (OtpService, Arc<MemoryChallengeStore>) {
        let store = Arc::new(MemoryChallengeStore::new());
        (OtpService::new(store.clone(), config), store)
    }

    fn no_cooldown() -> OtpConfig {
        OtpConfig {
            resend_cooldown_seconds: 0,
            ..OtpConfig::default()
        }
    }

    /// Stores a challenge whose deadline is `seconds` from now, bypassing the
    /// service so tests can control expiry directly.
    async fn put_challenge(store: &MemoryChallengeStore, email: &str, code: &str, seconds: i64, attempts: u32) {
        let now = Utc::now();
        store
            .put(
                email,
                Challenge {
                    code: code.to_string(),
                    issued_at: now,
                    expires_at: now + Duration::seconds(seconds),
                    attempts,
                },
            )
            .await
            .unwrap();
    }

    #[rocket::async_test]
    async fn issued_code_verifies_exactly_once() {
        let (service, _) = service_with(no_cooldown());

        let issued = service.issue("a@x.com").await.unwrap();
        assert!(issued.expires_at > Utc::now());

        let outcome = service.verify("a@x.com", &issued.code).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "OTP verified successfully!");

        let outcome = service.verify("a@x.com", &issued.code).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "No OTP found for this email. Please request a new OTP.");
    }

    #[rocket::async_test]
    async fn three_wrong_codes_exhaust_the_challenge() {
        let (service, _) = service_with(no_cooldown());
        service.issue("a@x.com").await.unwrap();

        let outcome = service.verify("a@x.com", "000000").await.unwrap();
        assert_eq!(outcome.message, "Invalid OTP. 2 attempts remaining.");

        let outcome = service.verify("a@x.com", "000000").await.unwrap();
        assert_eq!(outcome.message, "Invalid OTP. 1 attempts remaining.");

        let outcome = service.verify("a@x.com", "000000").await.unwrap();
        assert_eq!(outcome.message, "Too many failed attempts. Please request a new OTP.");

        // The entry is gone until reissued
        let outcome = service.verify("a@x.com", "000000").await.unwrap();
        assert_eq!(outcome.message, "No OTP found for this email. Please request a new OTP.");

        let issued = service.issue("a@x.com").await.unwrap();
        let outcome = service.verify("a@x.com", &issued.code).await.unwrap();
        assert!(outcome.success);
    }

    #[rocket::async_test]
    async fn right_code_after_failed_attempts_still_verifies() {
        let (service, _) = service_with(no_cooldown());
        let issued = service.issue("a@x.com").await.unwrap();

        let outcome = service.verify("a@x.com", "000000").await.unwrap();
        assert!(!outcome.success);

        let outcome = service.verify("a@x.com", &issued.code).await.unwrap();
        assert!(outcome.success);
    }

    #[rocket::async_test]
    async fn challenge_near_deadline_still_verifies() {
        let (service, store) = service_with(no_cooldown());
        put_challenge(&store, "a@x.com", "482913", 2, 0).await;

        let outcome = service.verify("a@x.com", "482913").await.unwrap();
        assert!(outcome.success);
    }

    #[rocket::async_test]
    async fn challenge_past_deadline_is_rejected_and_deleted() {
        let (service, store) = service_with(no_cooldown());
        put_challenge(&store, "a@x.com", "482913", -2, 0).await;

        let outcome = service.verify("a@x.com", "482913").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "OTP has expired. Please request a new OTP.");
        assert!(store.get("a@x.com").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn resend_invalidates_the_previous_code() {
        let (service, _) = service_with(no_cooldown());
        let first = service.issue("a@x.com").await.unwrap();
        let second = service.resend("a@x.com").await.unwrap();
        assert_ne!(first.code, second.code, "regenerated code must differ for this test");

        // The slot is occupied by the new code, so the old one is a mismatch
        // rather than not-found
        let outcome = service.verify("a@x.com", &first.code).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Invalid OTP. 2 attempts remaining.");

        let outcome = service.verify("a@x.com", &second.code).await.unwrap();
        assert!(outcome.success);
    }

    #[rocket::async_test]
    async fn resend_within_cooldown_is_refused() {
        let (service, _) = service_with(OtpConfig {
            resend_cooldown_seconds: 60,
            ..OtpConfig::default()
        });

        service.issue("a@x.com").await.unwrap();
        let error = service.resend("a@x.com").await.unwrap_err();
        match error {
            AppError::ResendCooldown { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected cooldown error, got {:?}", other),
        }
    }

    #[rocket::async_test]
    async fn expired_challenge_never_blocks_resend() {
        let (service, store) = service_with(OtpConfig {
            resend_cooldown_seconds: 60,
            ..OtpConfig::default()
        });
        put_challenge(&store, "a@x.com", "482913", -2, 0).await;

        let issued = service.resend("a@x.com").await.unwrap();
        let outcome = service.verify("a@x.com", &issued.code).await.unwrap();
        assert!(outcome.success);
    }

    #[rocket::async_test]
    async fn concurrent_attempts_cannot_pass_the_limit() {
        let (service, store) = service_with(no_cooldown());
        let service = Arc::new(service);
        put_challenge(&store, "a@x.com", "482913", 300, 2).await;

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.verify("a@x.com", "000000").await.unwrap() }
        });
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.verify("a@x.com", "000000").await.unwrap() }
        });

        let mut messages = vec![first.await.unwrap().message, second.await.unwrap().message];
        messages.sort();

        // Exactly one attempt observes exhaustion; the loser finds the entry
        // already gone
        assert_eq!(
            messages,
            vec![
                "No OTP found for this email. Please request a new OTP.".to_string(),
                "Too many failed attempts. Please request a new OTP.".to_string(),
            ]
        );
        assert!(store.get("a@x.com").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn identifiers_are_case_insensitive() {
        let (service, _) = service_with(no_cooldown());
        let issued = service.issue("  Donor@BloodLink.ORG ").await.unwrap();

        assert!(service.has_valid_otp("donor@bloodlink.org").await.unwrap());
        let outcome = service.verify("DONOR@bloodlink.org", &issued.code).await.unwrap();
        assert!(outcome.success);
    }

    #[rocket::async_test]
    async fn status_reports_pending_window() {
        let (service, store) = service_with(no_cooldown());

        assert!(!service.has_valid_otp("a@x.com").await.unwrap());
        assert_eq!(service.remaining_seconds("a@x.com").await.unwrap(), 0);

        service.issue("a@x.com").await.unwrap();
        assert!(service.has_valid_otp("a@x.com").await.unwrap());
        let remaining = service.remaining_seconds("a@x.com").await.unwrap();
        assert!(remaining > 290 && remaining <= 300);

        // An expired entry reads as absent and is dropped lazily
        put_challenge(&store, "b@x.com", "111111", -2, 0).await;
        assert!(!service.has_valid_otp("b@x.com").await.unwrap());
        assert!(store.get("b@x.com").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn cleanup_removes_only_expired_entries() {
        let (service, store) = service_with(no_cooldown());
        put_challenge(&store, "old@x.com", "111111", -2, 0).await;
        put_challenge(&store, "new@x.com", "222222", 300, 0).await;

        assert_eq!(service.cleanup().await.unwrap(), 1);

        let outcome = service.verify("new@x.com", "222222").await.unwrap();
        assert!(outcome.success, "unexpired entries must survive the sweep");
    }

    #[test]
    fn generated_codes_are_six_digit_numbers() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().expect("numeric code");
            assert!((100_000..=999_999).contains(&value));
        }
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(email in "[A-Za-z0-9._%+-]{1,16}@[A-Za-z0-9.-]{1,16}") {
            let once = normalize_email(&email);
            prop_assert_eq!(once.clone(), normalize_email(&once));
            prop_assert_eq!(once.clone(), normalize_email(&email.to_ascii_uppercase()));
        }
    }
}
