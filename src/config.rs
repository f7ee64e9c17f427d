//! Application-level configuration: the optional JSON file plus environment switches.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::ExerciseSettingsEntity;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TABLETOP_BACK_CONFIG_PATH";
/// Environment variable selecting the storage backend.
const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

const DEFAULT_ACCESS_CODE_LENGTH: usize = 6;
const MIN_ACCESS_CODE_LENGTH: usize = 4;
const MAX_ACCESS_CODE_LENGTH: usize = 12;
const DEFAULT_MAX_PARTICIPANTS: u32 = 50;
const DEFAULT_ROOM_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    access_code_length: usize,
    default_max_participants: u32,
    room_capacity: usize,
    default_settings: ExerciseSettingsEntity,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        access_code_length = app_config.access_code_length,
                        room_capacity = app_config.room_capacity,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Number of characters in generated access codes.
    pub fn access_code_length(&self) -> usize {
        self.access_code_length
    }

    /// Participant cap applied when an exercise is created without one.
    pub fn default_max_participants(&self) -> u32 {
        self.default_max_participants
    }

    /// Buffered events per realtime room before slow sockets start skipping.
    pub fn room_capacity(&self) -> usize {
        self.room_capacity
    }

    /// Settings applied when an exercise is created without explicit ones.
    pub fn default_settings(&self) -> ExerciseSettingsEntity {
        self.default_settings
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            access_code_length: DEFAULT_ACCESS_CODE_LENGTH,
            default_max_participants: DEFAULT_MAX_PARTICIPANTS,
            room_capacity: DEFAULT_ROOM_CAPACITY,
            default_settings: ExerciseSettingsEntity::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    access_code_length: Option<usize>,
    default_max_participants: Option<u32>,
    room_capacity: Option<usize>,
    default_settings: Option<RawSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    scoring_enabled: bool,
    auto_release: bool,
    show_scores: bool,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            access_code_length: value
                .access_code_length
                .map(|len| len.clamp(MIN_ACCESS_CODE_LENGTH, MAX_ACCESS_CODE_LENGTH))
                .unwrap_or(defaults.access_code_length),
            default_max_participants: value
                .default_max_participants
                .filter(|max| *max > 0)
                .unwrap_or(defaults.default_max_participants),
            room_capacity: value
                .room_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.room_capacity),
            default_settings: value
                .default_settings
                .map(|raw| ExerciseSettingsEntity {
                    scoring_enabled: raw.scoring_enabled,
                    auto_release: raw.auto_release,
                    show_scores: raw.show_scores,
                })
                .unwrap_or(defaults.default_settings),
        }
    }
}

/// Which [`ExerciseStore`](crate::dao::exercise_store::ExerciseStore) implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// MongoDB, supervised in the background.
    Mongo,
    /// Process-local maps; data is lost on restart.
    Memory,
}

impl StorageBackend {
    /// Read the backend from `STORAGE_BACKEND`, defaulting to MongoDB.
    pub fn from_env() -> Self {
        match env::var(STORAGE_BACKEND_ENV) {
            Ok(value) => Self::parse(&value).unwrap_or_else(|| {
                warn!(value = %value, "unknown storage backend; using mongo");
                Self::Mongo
            }),
            Err(_) => Self::Mongo,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Some(Self::Mongo),
            "memory" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"roomCapacity": 8}"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.room_capacity(), 8);
        assert_eq!(config.access_code_length(), DEFAULT_ACCESS_CODE_LENGTH);
        assert_eq!(config.default_max_participants(), DEFAULT_MAX_PARTICIPANTS);
        assert_eq!(config.default_settings(), ExerciseSettingsEntity::default());
    }

    #[test]
    fn out_of_range_values_are_corrected() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"accessCodeLength": 40, "defaultMaxParticipants": 0, "roomCapacity": 0}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.access_code_length(), MAX_ACCESS_CODE_LENGTH);
        assert_eq!(config.default_max_participants(), DEFAULT_MAX_PARTICIPANTS);
        assert_eq!(config.room_capacity(), DEFAULT_ROOM_CAPACITY);
    }

    #[test]
    fn storage_backend_names() {
        assert_eq!(StorageBackend::parse("memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse(" MongoDB "), Some(StorageBackend::Mongo));
        assert_eq!(StorageBackend::parse("sqlite"), None);
    }
}
