use rocket::figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub cors: CorsConfig,
    pub otp: OtpConfig,
    pub email: EmailConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Policy knobs for the verification core
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OtpConfig {
    /// Seconds a code stays valid after (re)issuance
    pub code_ttl_seconds: i64,
    /// Failed tries allowed before the challenge is discarded
    pub max_attempts: u32,
    /// Minimum seconds between resends for one email, 0 disables the check
    pub resend_cooldown_seconds: i64,
    /// Cadence of the expired-entry sweep
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    /// Per-IP issue/resend requests per window
    pub send_limit: u32,
    /// Per-IP verify/status requests per window
    pub verify_limit: u32,
    pub window_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub require_client_ip: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: "/api/v1".to_string(),
            enable_swagger: true,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Vite dev server of the BloodLink front-end
            allowed_origins: vec!["http://localhost:5173".to_string()],
            allow_credentials: false,
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_ttl_seconds: 300,
            max_attempts: 3,
            resend_cooldown_seconds: 60,
            cleanup_interval_seconds: 60,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "no-reply@bloodlink.org".to_string(),
            from_name: "BloodLink".to_string(),
            enabled: false,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            send_limit: 5,
            verify_limit: 30,
            window_seconds: 60,
            cleanup_interval_seconds: 60,
            require_client_ip: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            api: ApiConfig::default(),
            cors: CorsConfig::default(),
            otp: OtpConfig::default(),
            email: EmailConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. BloodLink.toml (base configuration file)
    /// 2. Environment variables (prefixed with BLOODLINK_)
    pub fn load() -> Result<Self, figment::Error> {
        let figment = Figment::new()
            // Start with defaults
            .merge(Toml::string(&toml::to_string(&Config::default()).unwrap()))
            // Layer on BloodLink.toml if it exists
            .merge(Toml::file("BloodLink.toml"))
            // Layer on environment variables (e.g., BLOODLINK_EMAIL_ENABLED)
            .merge(Env::prefixed("BLOODLINK_").split("_"));

        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_verification_policy() {
        let config = Config::default();
        assert_eq!(config.otp.code_ttl_seconds, 300);
        assert_eq!(config.otp.max_attempts, 3);
        assert_eq!(config.otp.resend_cooldown_seconds, 60);
        assert!(!config.email.enabled);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let serialized = toml::to_string(&Config::default()).expect("serializable defaults");
        assert!(serialized.contains("code_ttl_seconds"));
        assert!(serialized.contains("base_path"));
    }
}
