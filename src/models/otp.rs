use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use validator::Validate;

/// Pending verification state for one email address
#[derive(Debug, Clone)]
pub struct Challenge {
    /// 6-digit numeric code, generated in [100000, 999999]
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Failed verification tries so far
    pub attempts: u32,
}

impl Challenge {
    /// Check if the code has passed its deadline
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Whole seconds until expiry, 0 once expired
    pub fn remaining_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// Result of applying one verification attempt to a stored challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyTransition {
    /// Never issued, already consumed, expired-and-swept, or exhausted
    NotFound,
    /// Entry existed but its deadline had passed
    Expired,
    /// Retry budget is spent
    Exhausted,
    /// Wrong code; the entry stays with `remaining` tries left
    Mismatch { remaining: u32 },
    /// Code matched and the entry was consumed
    Verified,
}

/// Request to send a verification code (sent by user)
#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SendOtpRequest {
    #[validate(email)]
    pub email: String,
}

/// Request to verify a previously sent code
#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct VerifyOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub code: String,
}

/// Response after a code was generated and handed to email dispatch
#[derive(Debug, Serialize, JsonSchema)]
pub struct SendOtpResponse {
    pub message: String,
    pub expires_in_seconds: i64,
}

/// Outcome of a verification attempt, surfaced to the user as-is
#[derive(Debug, Serialize, JsonSchema)]
pub struct VerifyOutcome {
    pub success: bool,
    pub message: String,
}

/// Whether an email currently has a pending code and for how long
#[derive(Debug, Serialize, JsonSchema)]
pub struct OtpStatusResponse {
    pub pending: bool,
    pub remaining_seconds: i64,
}
