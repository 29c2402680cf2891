//! Process-wide configuration, loaded from the environment once at
//! startup — same plain `std::env::var` style as the teacher's
//! `distributed_main.rs::load_config`.

use echopad_sync_core::token::DEV_DEFAULT_SECRET;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub s3_bucket: String,
    pub s3_endpoint: Option<String>,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using development-only default secret");
            DEV_DEFAULT_SECRET.to_string()
        });

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/echopad".to_string()),
            jwt_secret,
            s3_bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "echopad-sync".to_string()),
            s3_endpoint: std::env::var("S3_ENDPOINT").ok(),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}
