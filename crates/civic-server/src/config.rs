use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// The placeholder secret shipped in the defaults. Fine for local work,
/// never for a deployment.
const DEV_JWT_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub media_dir: PathBuf,
    pub public_url: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read the `CIVIC_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let port: u16 = var_or("CIVIC_PORT", "3000")
            .parse()
            .context("CIVIC_PORT must be a port number")?;
        let max_upload_mb: usize = var_or("CIVIC_MAX_UPLOAD_MB", "50")
            .parse()
            .context("CIVIC_MAX_UPLOAD_MB must be a whole number")?;

        let jwt_secret = var_or("CIVIC_JWT_SECRET", DEV_JWT_SECRET);
        if jwt_secret == DEV_JWT_SECRET {
            warn!("CIVIC_JWT_SECRET is unset; using the development placeholder");
        }

        Ok(Self {
            host: var_or("CIVIC_HOST", "0.0.0.0"),
            port,
            db_path: var_or("CIVIC_DB_PATH", "civic.db").into(),
            jwt_secret,
            media_dir: var_or("CIVIC_MEDIA_DIR", "./media").into(),
            public_url: var_or("CIVIC_PUBLIC_URL", &format!("http://localhost:{}", port)),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}
