/// Runtime configuration, read from the environment with sensible defaults.
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StorageError;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_FETCH_LIMIT: u32 = 10_000;
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default map centre (Sagamihara city hall area).
pub const DEFAULT_CENTER: (f64, f64) = (35.5732, 139.3704);
pub const DEFAULT_ZOOM: f32 = 13.0;

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Base URL of the damage API, without a trailing slash
    pub api_base: String,
    /// Page size requested from `/damages`
    pub fetch_limit: u32,
    pub http_timeout: Duration,
    /// Directory holding `viewer.db`; `None` means the platform data dir
    pub data_dir: Option<PathBuf>,
    pub map_center: (f64, f64),
    pub map_zoom: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_URL.to_string(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            data_dir: None,
            map_center: DEFAULT_CENTER,
            map_zoom: DEFAULT_ZOOM,
        }
    }
}

impl ViewerConfig {
    /// Build the configuration from `DAMAGE_*` environment variables.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());

        let api_base = lookup("DAMAGE_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.api_base);
        let fetch_limit = lookup("DAMAGE_FETCH_LIMIT")
            .and_then(|v| v.trim().parse().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(defaults.fetch_limit);
        let http_timeout = lookup("DAMAGE_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);
        let data_dir = lookup("DAMAGE_VIEWER_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let map_center = (
            parsed("DAMAGE_MAP_LAT").unwrap_or(defaults.map_center.0),
            parsed("DAMAGE_MAP_LON").unwrap_or(defaults.map_center.1),
        );
        let map_zoom = parsed("DAMAGE_MAP_ZOOM")
            .map(|z| z as f32)
            .unwrap_or(defaults.map_zoom);

        Self {
            api_base,
            fetch_limit,
            http_timeout,
            data_dir,
            map_center,
            map_zoom,
        }
    }

    /// Path of the local key/value database.
    ///
    /// - Linux: ~/.local/share/road-damage-viewer/viewer.db
    /// - macOS: ~/Library/Application Support/road-damage-viewer/viewer.db
    /// - Windows: %APPDATA%\road-damage-viewer\viewer.db
    pub fn storage_path(&self) -> Result<PathBuf, StorageError> {
        let mut path = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => {
                let mut base = dirs::data_dir()
                    .or_else(dirs::home_dir)
                    .ok_or(StorageError::NoDataDir)?;
                base.push("road-damage-viewer");
                base
            }
        };
        path.push("viewer.db");
        Ok(path)
    }

    /// URL of the damage list endpoint
    pub fn damages_url(&self) -> String {
        format!("{}/damages?limit={}", self.api_base, self.fetch_limit)
    }
}
