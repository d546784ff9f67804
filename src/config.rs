use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine config directory")]
    NoConfigDir,
    #[error("created example config at {0}; edit it and run again")]
    MissingConfigFile(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub user_agent: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub api: Api,
    #[serde(default)]
    pub download: Download,
    #[serde(default)]
    pub player: Player,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Api {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_cmd: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// Hand the signed URL to the desktop opener.
    #[default]
    Open,
    /// Stream the signed URL into `download.dir`.
    Save,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Download {
    #[serde(default)]
    pub mode: DownloadMode,
    pub dir: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub ffprobe_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub file: String,
}

fn default_page_size() -> u32 {
    20
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Download {
    fn default() -> Self {
        Self {
            mode: DownloadMode::Open,
            dir: "~/Downloads/sessionrec".to_string(),
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: "~/.config/sessionrec/sessionrec.log".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            page_size: default_page_size(),
            api: Api {
                base_url: "http://127.0.0.1:8000/api".to_string(),
                token: None,
                token_cmd: None,
                timeout_secs: default_timeout_secs(),
            },
            download: Download::default(),
            player: Player::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Load the config from its default location, writing a default file first
    /// when none exists yet (reported as `MissingConfigFile`).
    pub async fn load_or_init() -> Result<Config, ConfigError> {
        let paths = ConfigPaths::default()?;
        if !tokio::fs::try_exists(&paths.config_file).await? {
            let mut cfg = Config::default();
            cfg.logging.file = paths
                .config_dir
                .join("sessionrec.log")
                .to_string_lossy()
                .to_string();
            save_config_to_path(&cfg, &paths.config_file).await?;
            return Err(ConfigError::MissingConfigFile(
                paths.config_file.display().to_string(),
            ));
        }
        let mut cfg = load_config_from_path(&paths.config_file).await?;
        cfg.expand_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Expand tildes in path-like fields. No-op if expansion fails.
    pub fn expand_paths(&mut self) {
        if let Some(home) = dirs_next::home_dir() {
            self.download.dir = expand_tilde(&self.download.dir, &home);
            self.logging.file = expand_tilde(&self.logging.file, &home);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "api.base_url is not a valid URL: {}",
                self.api.base_url
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".into()));
        }
        Ok(())
    }
}

fn expand_tilde(input: &str, home: &Path) -> String {
    if let Some(stripped) = input.strip_prefix("~/") {
        let mut p = PathBuf::from(home);
        p.push(stripped);
        return p.to_string_lossy().to_string();
    }
    input.to_string()
}

#[derive(Clone, Debug)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl ConfigPaths {
    pub fn default() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("", "", "sessionrec").ok_or(ConfigError::NoConfigDir)?;
        let dir = proj.config_dir().to_path_buf();
        let file = dir.join("config.toml");
        Ok(ConfigPaths {
            config_dir: dir,
            config_file: file,
        })
    }
}

pub async fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    let cfg: Config = toml::from_str(&text)?;
    Ok(cfg)
}

/// Config to modify and save back: the file at `path`, or defaults when there
/// is none yet. A file that fails to parse is an error, never replaced.
pub async fn load_config_for_update(path: &Path) -> Result<Config, ConfigError> {
    if tokio::fs::try_exists(path).await? {
        load_config_from_path(path).await
    } else {
        Ok(Config::default())
    }
}

pub async fn save_config_to_path(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let toml_text = toml::to_string_pretty(cfg)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // The file may hold a bearer token: write 0600 temp, then rename.
    let tmp = path.with_extension("toml.part");
    tokio::fs::write(&tmp, toml_text.as_bytes()).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perm = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&tmp, perm)?;
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
