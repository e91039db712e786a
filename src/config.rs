use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::matching::scorer::ScorerKind;
use crate::placement::PlacementMode;
use crate::services::spotify::auth::SpotifyAuthMode;

/// Problems with the arguments, paths or config file. The process exits with
/// code 2 on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Library folder not found: {}", .0.display())]
    LibraryNotFound(PathBuf),
    #[error("--headers is required for ytmusic source")]
    MissingHeadersFlag,
    #[error("headers file not found: {}", .0.display())]
    HeadersNotFound(PathBuf),
    #[error("Invalid headers file {}: {reason}", .path.display())]
    InvalidHeaders { path: PathBuf, reason: String },
    #[error(
        "A Spotify client ID is required: pass --spotify-client-id, set SPOTIFY_CLIENT_ID, or add a [spotify] section to the config file"
    )]
    MissingSpotifyClientId,
    #[error(
        "--spotify-auth app needs a client secret: pass --spotify-client-secret, set SPOTIFY_CLIENT_SECRET, or add client_secret to the [spotify] section"
    )]
    MissingSpotifyClientSecret,
    #[error("Invalid Spotify redirect URI {uri}: {reason}")]
    InvalidRedirectUri { uri: String, reason: String },
    #[error("min_score must be between 0 and 100, got {0}")]
    MinScoreOutOfRange(u8),
    #[error("Failed to read config file {}: {error_message}", .path.display())]
    ReadConfig { path: PathBuf, error_message: String },
    #[error("Failed to parse config file {}: {error_message}", .path.display())]
    ParseConfig { path: PathBuf, error_message: String },
}

/// Optional defaults read from `config.toml`. Command line flags and
/// environment variables take precedence.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub min_score: Option<u8>,
    pub mode: Option<PlacementMode>,
    pub scorer: Option<ScorerKind>,
    pub ytmusic_headers: Option<String>,
    pub spotify: Option<SpotifyConfig>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    /// Only needed for app tokens
    pub client_secret: Option<String>,
    pub auth: Option<SpotifyAuthMode>,
    pub redirect_uri: Option<String>,
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigurationError::ReadConfig {
                path: path.to_path_buf(),
                error_message: e.to_string(),
            })?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigurationError::ParseConfig {
                path: path.to_path_buf(),
                error_message: e.to_string(),
            })?;

        if let Some(min_score) = config.min_score
            && min_score > 100
        {
            return Err(ConfigurationError::MinScoreOutOfRange(min_score));
        }

        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("playlist-to-folder").join("config.toml"))
    }

    /// Load the default config file, falling back to an empty config when
    /// there is none
    pub fn load() -> Result<Self, ConfigurationError> {
        match Self::config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Get expanded YouTube Music headers path
    pub fn ytmusic_headers_path(&self) -> Option<PathBuf> {
        self.ytmusic_headers.as_deref().map(expand_path)
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
