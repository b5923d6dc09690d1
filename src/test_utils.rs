use crate::Config;

/// Base configuration for tests: email delivery off, resend cooldown off, and
/// generous rate limits so unrelated tests never trip the limiter.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.email.enabled = false;
    config.otp.resend_cooldown_seconds = 0;
    config.rate_limit.send_limit = 1000;
    config.rate_limit.verify_limit = 1000;
    config
}
