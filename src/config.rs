use rand::seq::IndexedRandom;
use std::path::PathBuf;
use std::time::Duration;

type ConfigError = Box<dyn std::error::Error + Send + Sync>;

/// Non-empty set of provider API keys; each request uses a random one.
#[derive(Clone)]
pub struct ApiKeyPool {
    keys: Vec<String>,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Option<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::new(raw.split(',').map(str::to_string).collect())
    }

    pub fn pick(&self) -> &str {
        self.keys
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

#[derive(Clone)]
pub enum StoreBackend {
    Memory,
    Postgres {
        database_url: String,
    },
    Sheets {
        spreadsheet_id: String,
        sheet_name: String,
        access_token: String,
    },
}

#[derive(Clone)]
pub enum StorageBackend {
    Local {
        upload_folder: PathBuf,
        public_base_url: String,
    },
    Gcs {
        bucket: String,
        access_token: String,
    },
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub poll_interval: Duration,
    pub session_idle_ttl: Duration,
    pub openai_keys: ApiKeyPool,
    pub openai_base_url: String,
    pub rewrite_model: String,
    pub image_model: String,
    pub regenerate_image_model: String,
    pub regenerate_image_quality: Option<String>,
    pub image_size: String,
    pub store: StoreBackend,
    pub storage: StorageBackend,
}

pub const DEFAULT_POLL_SECS: u64 = 10;
pub const MIN_POLL_SECS: u64 = 1;
pub const MAX_POLL_SECS: u64 = 60;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 600;

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String, ConfigError> {
    var(name).ok_or_else(|| format!("{} must be set", name).into())
}

pub fn clamp_poll_secs(secs: u64) -> u64 {
    secs.clamp(MIN_POLL_SECS, MAX_POLL_SECS)
}

/// A session must outlive at least one full poll interval.
pub fn session_idle_secs(secs: u64) -> u64 {
    secs.max(MAX_POLL_SECS)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = var("PORT")
            .unwrap_or_else(|| "5001".to_string())
            .parse()
            .unwrap_or(5001);

        let poll_secs = var("POLL_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_SECS);
        let idle_secs = var("SESSION_IDLE_TTL_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SESSION_IDLE_SECS);

        let openai_keys = var("OPENAI_API_KEYS")
            .or_else(|| var("OPENAI_API_KEY"))
            .and_then(|raw| ApiKeyPool::parse(&raw))
            .ok_or("OPENAI_API_KEYS or OPENAI_API_KEY must be set")?;

        let image_model = var("IMAGE_MODEL").unwrap_or_else(|| "gpt-image-1".to_string());

        let store = match var("RECORD_STORE").as_deref().unwrap_or("memory") {
            "memory" => StoreBackend::Memory,
            "postgres" => StoreBackend::Postgres {
                database_url: required("DATABASE_URL")?,
            },
            "sheets" => StoreBackend::Sheets {
                spreadsheet_id: required("GOOGLE_SHEETS_ID")?,
                sheet_name: var("GOOGLE_SHEET_NAME").unwrap_or_else(|| "Sheet1".to_string()),
                access_token: required("GOOGLE_ACCESS_TOKEN")?,
            },
            other => return Err(format!("Unknown RECORD_STORE: {}", other).into()),
        };

        let storage = match var("IMAGE_STORAGE").as_deref().unwrap_or("local") {
            "local" => {
                let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                StorageBackend::Local {
                    upload_folder: base_dir
                        .join(var("UPLOAD_FOLDER").unwrap_or_else(|| "uploads".to_string())),
                    public_base_url: var("PUBLIC_BASE_URL")
                        .unwrap_or_else(|| format!("http://localhost:{}", port)),
                }
            }
            "gcs" => StorageBackend::Gcs {
                bucket: required("GCS_BUCKET")?,
                access_token: var("GCS_ACCESS_TOKEN")
                    .or_else(|| var("GOOGLE_ACCESS_TOKEN"))
                    .ok_or("GCS_ACCESS_TOKEN or GOOGLE_ACCESS_TOKEN must be set")?,
            },
            other => return Err(format!("Unknown IMAGE_STORAGE: {}", other).into()),
        };

        Ok(Self {
            host,
            port,
            poll_interval: Duration::from_secs(clamp_poll_secs(poll_secs)),
            session_idle_ttl: Duration::from_secs(session_idle_secs(idle_secs)),
            openai_keys,
            openai_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            rewrite_model: var("REWRITE_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            regenerate_image_model: var("REGENERATE_IMAGE_MODEL")
                .unwrap_or_else(|| image_model.clone()),
            image_model,
            regenerate_image_quality: var("REGENERATE_IMAGE_QUALITY"),
            image_size: var("IMAGE_SIZE").unwrap_or_else(|| "1024x1024".to_string()),
            store,
            storage,
        })
    }
}
