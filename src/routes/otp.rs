use crate::config::Config;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::{SendRateLimit, VerifyRateLimit};
use crate::models::otp::{OtpStatusResponse, SendOtpRequest, SendOtpResponse, VerifyOtpRequest, VerifyOutcome};
use crate::service::email::EmailService;
use crate::service::otp::OtpService;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use std::sync::Arc;
use validator::Validate;

/// Hand a freshly issued code to email dispatch. Delivery failures are logged
/// rather than failing the request; the user can always ask for a resend.
async fn dispatch_code(config: &Config, email: &str, code: &str) {
    let email_service = EmailService::new(config.email.clone());
    let valid_minutes = (config.otp.code_ttl_seconds / 60).max(1);

    if let Err(error) = email_service.send_verification_code(email, code, valid_minutes).await {
        tracing::error!(email = %email, ?error, "failed to send verification email");
    }
}

/// Generate a verification code and email it to the address (Step 1)
#[openapi(tag = "Verification")]
#[post("/send", data = "<payload>")]
pub async fn send_otp(
    otp: &State<Arc<OtpService>>,
    config: &State<Config>,
    _rate_limit: SendRateLimit,
    payload: Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, AppError> {
    payload.validate()?;

    let issued = otp.issue(&payload.email).await?;
    dispatch_code(config, &payload.email, &issued.code).await;

    Ok(Json(SendOtpResponse {
        message: "OTP sent successfully to your email!".to_string(),
        expires_in_seconds: config.otp.code_ttl_seconds,
    }))
}

/// Check a submitted code (Step 2). Wrong or missing codes are reported in
/// the body with `success: false`, never as an HTTP error.
#[openapi(tag = "Verification")]
#[post("/verify", data = "<payload>")]
pub async fn verify_otp(
    otp: &State<Arc<OtpService>>,
    _rate_limit: VerifyRateLimit,
    payload: Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOutcome>, AppError> {
    payload.validate()?;

    let outcome = otp.verify(&payload.email, &payload.code).await?;
    Ok(Json(outcome))
}

/// Regenerate and email a fresh code, discarding the pending one. Refused
/// with 429 while the resend cooldown is running.
#[openapi(tag = "Verification")]
#[post("/resend", data = "<payload>")]
pub async fn resend_otp(
    otp: &State<Arc<OtpService>>,
    config: &State<Config>,
    _rate_limit: SendRateLimit,
    payload: Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, AppError> {
    payload.validate()?;

    let issued = otp.resend(&payload.email).await?;
    dispatch_code(config, &payload.email, &issued.code).await;

    Ok(Json(SendOtpResponse {
        message: "OTP resent successfully!".to_string(),
        expires_in_seconds: config.otp.code_ttl_seconds,
    }))
}

/// Whether a code is currently pending for this address, and for how long.
/// Backs the front-end resend countdown.
#[openapi(tag = "Verification")]
#[get("/status/<email>")]
pub async fn otp_status(otp: &State<Arc<OtpService>>, _rate_limit: VerifyRateLimit, email: &str) -> Result<Json<OtpStatusResponse>, AppError> {
    Ok(Json(OtpStatusResponse {
        pending: otp.has_valid_otp(email).await?,
        remaining_seconds: otp.remaining_seconds(email).await?,
    }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![send_otp, verify_otp, resend_otp, otp_status]
}
