use std::path::PathBuf;

use anyhow::{Context, bail};

use chatline_api::attachment::AttachmentPolicy;
use chatline_gateway::PusherConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEFAULT_IMAGES: &str = "png,jpg,jpeg,gif,webp";
const DEFAULT_FILES: &str = "zip,rar,txt,pdf,doc,docx,mp3,wav,ogg,m4a,aac,opus";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub policy: AttachmentPolicy,
    pub per_page: u32,
    pub customer_fcm_credentials: Option<PathBuf>,
    pub driver_fcm_credentials: Option<PathBuf>,
    pub pusher: Option<PusherConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("CHATLINE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CHATLINE_JWT_SECRET is unset or still a placeholder");
        }

        let port: u16 = match var("CHATLINE_PORT") {
            Some(p) => p.parse().context("CHATLINE_PORT must be a port number")?,
            None => 3000,
        };
        let max_upload_mb: u64 = match var("CHATLINE_MAX_UPLOAD_MB") {
            Some(v) => v.parse().context("CHATLINE_MAX_UPLOAD_MB must be a number")?,
            None => 150,
        };
        let per_page: u32 = match var("CHATLINE_PER_PAGE") {
            Some(v) => v.parse().context("CHATLINE_PER_PAGE must be a number")?,
            None => 30,
        };
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .context("CHATLINE_MAX_UPLOAD_MB is too large")?;
        if per_page == 0 {
            bail!("CHATLINE_PER_PAGE must be at least 1");
        }

        let policy = AttachmentPolicy {
            allowed_images: extension_list(&var("CHATLINE_ALLOWED_IMAGES").unwrap_or_else(|| DEFAULT_IMAGES.into())),
            allowed_files: extension_list(&var("CHATLINE_ALLOWED_FILES").unwrap_or_else(|| DEFAULT_FILES.into())),
            max_upload_bytes,
        };

        let pusher = match (
            var("PUSHER_APP_ID"),
            var("PUSHER_KEY"),
            var("PUSHER_SECRET"),
        ) {
            (Some(app_id), Some(key), Some(secret)) => Some(PusherConfig {
                app_id,
                key,
                secret,
                cluster: var("PUSHER_CLUSTER").unwrap_or_else(|| "mt1".into()),
            }),
            (None, None, None) => None,
            _ => bail!("PUSHER_APP_ID, PUSHER_KEY and PUSHER_SECRET must be set together"),
        };

        Ok(Self {
            host: var("CHATLINE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("CHATLINE_DB_PATH").unwrap_or_else(|| "chatline.db".into()).into(),
            jwt_secret,
            storage_dir: var("CHATLINE_STORAGE_DIR").unwrap_or_else(|| "./storage".into()).into(),
            public_url: var("CHATLINE_PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:3000/storage".into()),
            policy,
            per_page,
            customer_fcm_credentials: var("CHATLINE_CUSTOMER_FCM_CREDENTIALS").map(PathBuf::from),
            driver_fcm_credentials: var("CHATLINE_DRIVER_FCM_CREDENTIALS").map(PathBuf::from),
            pusher,
        })
    }
}

/// Comma-separated extensions, lower-cased, with any leading dot dropped.
fn extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
