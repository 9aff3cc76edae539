use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::schema::SheetSchema;

pub const DEFAULT_DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DEFAULT_SHEETS_API: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_file_size: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub drive_api: String,
    pub upload_api: String,
    pub sheets_api: String,
    pub userinfo_url: String,
    #[serde(default)]
    pub request_timeout_secs: u64, // 0 = transport default
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub schema: SheetSchema,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreferencesConfig {
    #[serde(default)]
    pub path: Option<String>, // None = in-memory only
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub google: GoogleConfig,
    pub upload: UploadConfig,
    pub preferences: Option<PreferencesConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub max_file_size: u64,
    pub log_level: String,
    pub google: GoogleConfig,
    pub schema: SheetSchema,
    pub preferences_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."));

        // Try to load config file
        let config_path = base_dir.join("config.toml");
        let config_file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Some(toml::from_str::<ConfigFile>(&content)?)
        } else {
            None
        };

        Ok(Self::resolve(config_file, &base_dir, |key| std::env::var(key).ok()))
    }

    /// Merges file values and environment overrides over the defaults.
    /// `env` is injected so tests don't touch the process environment.
    pub fn resolve(
        config_file: Option<ConfigFile>,
        base_dir: &std::path::Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let defaults = Self::default();

        let port = env("PORT")
            .and_then(|p| p.parse().ok())
            .or_else(|| config_file.as_ref().map(|c| c.server.port))
            .unwrap_or(defaults.port);

        let max_file_size = env("MAX_FILE_SIZE")
            .and_then(|v| v.parse().ok())
            .or_else(|| config_file.as_ref().map(|c| c.server.max_file_size))
            .unwrap_or(defaults.max_file_size);

        let log_level = env("LOG_LEVEL")
            .or_else(|| config_file.as_ref().map(|c| c.server.log_level.clone()))
            .unwrap_or(defaults.log_level);

        let file_google = config_file.as_ref().map(|c| c.google.clone());
        let google_base = file_google.unwrap_or(defaults.google);
        let google = GoogleConfig {
            drive_api: env("GOOGLE_DRIVE_API").unwrap_or(google_base.drive_api),
            upload_api: env("GOOGLE_UPLOAD_API").unwrap_or(google_base.upload_api),
            sheets_api: env("GOOGLE_SHEETS_API").unwrap_or(google_base.sheets_api),
            userinfo_url: env("GOOGLE_USERINFO_URL").unwrap_or(google_base.userinfo_url),
            request_timeout_secs: env("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(google_base.request_timeout_secs),
        };

        let schema = env("SHEET_SCHEMA")
            .and_then(|v| v.parse().ok())
            .or_else(|| config_file.as_ref().map(|c| c.upload.schema))
            .unwrap_or(defaults.schema);

        let preferences_path = env("PREFERENCES_PATH")
            .or_else(|| {
                config_file
                    .as_ref()
                    .and_then(|c| c.preferences.as_ref())
                    .and_then(|p| p.path.clone())
            })
            .map(|p| {
                if p.starts_with('/') {
                    PathBuf::from(p)
                } else {
                    base_dir.join(p)
                }
            });

        Self {
            port,
            max_file_size,
            log_level,
            google,
            schema,
            preferences_path,
        }
    }

    // Backward compatibility
    pub fn from_env() -> Self {
        Self::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            max_file_size: 500 * 1024 * 1024,
            log_level: default_log_level(),
            google: GoogleConfig {
                drive_api: DEFAULT_DRIVE_API.to_string(),
                upload_api: DEFAULT_UPLOAD_API.to_string(),
                sheets_api: DEFAULT_SHEETS_API.to_string(),
                userinfo_url: DEFAULT_USERINFO_URL.to_string(),
                request_timeout_secs: 0,
            },
            schema: SheetSchema::default(),
            preferences_path: None,
        }
    }
}
