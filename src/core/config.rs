use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::constants::APP_UNIX_NAME;

/// Interval with which the movie position is saved while playing.
pub const CONFIG_SAVING_INTERVAL: Duration = Duration::from_secs(60);

/// Time after which a movie's saved position is forgotten.
const LAST_POS_LIFETIME: i64 = 4 * 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the player binary; resolved via $PATH by default.
    pub player_path: PathBuf,
    /// Key name -> action string (e.g. "Space" -> "pause", "ArrowRight" ->
    /// "seek+3").
    pub hotkeys: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut hotkeys = HashMap::new();

        hotkeys.insert("O".to_string(), "osd_toggle".to_string());
        hotkeys.insert("Space".to_string(), "pause".to_string());
        hotkeys.insert("ArrowLeft".to_string(), "seek-3".to_string());
        hotkeys.insert("ArrowRight".to_string(), "seek+3".to_string());
        hotkeys.insert("ArrowUp".to_string(), "volume+10".to_string());
        hotkeys.insert("ArrowDown".to_string(), "volume-10".to_string());
        hotkeys.insert("Tab".to_string(), "switch_alternative".to_string());
        hotkeys.insert("N".to_string(), "next_alternative".to_string());
        hotkeys.insert("P".to_string(), "previous_alternative".to_string());
        hotkeys.insert("Q".to_string(), "quit".to_string());
        hotkeys.insert("Escape".to_string(), "quit".to_string());

        Self {
            player_path: PathBuf::from("mplayer"),
            hotkeys,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!("Failed to read config file at {}: {}", config_path.display(), e)
            })?;

            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!(
                        "Config file exists but has issues ({}), recreating it with defaults",
                        e
                    );
                    let config = Self::default();
                    config.save()?;
                    Ok(config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn config_path() -> PathBuf {
        config_dir().join("config.json")
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_UNIX_NAME)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LastPosEntry {
    file_name: String,
    position: i64,
    last_update: i64,
}

/// Stores each movie's last playing position, keyed by full path with a
/// file-name fallback so moved files keep their position. Stale entries are
/// pruned on load.
pub struct PositionStore {
    path: PathBuf,
    entries: HashMap<String, LastPosEntry>,
}

impl PositionStore {
    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(config_dir().join("positions.json"))
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let mut entries: HashMap<String, LastPosEntry> = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!("Failed to read position store at {}: {}", path.display(), e)
            })?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Position store has issues ({}), starting from scratch", e);
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        let oldest_kept = chrono::Utc::now().timestamp() - LAST_POS_LIFETIME;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_update > oldest_kept);

        let store = Self { path, entries };
        if store.entries.len() != before {
            store.persist()?;
        }

        Ok(store)
    }

    /// Returns a movie's last position in milliseconds, or 0 if unknown.
    pub fn movie_last_pos(&self, movie_path: &Path) -> i64 {
        if let Some(entry) = self.entries.get(&key_for(movie_path)) {
            return entry.position;
        }

        let file_name = file_name_of(movie_path);
        self.entries
            .values()
            .find(|entry| entry.file_name == file_name)
            .map(|entry| entry.position)
            .unwrap_or(0)
    }

    /// Saves the last position for a movie.
    pub fn save_movie_last_position(
        &mut self,
        movie_path: &Path,
        position: i64,
    ) -> anyhow::Result<()> {
        log::debug!(
            "Saving last position ({}) for movie '{}'.",
            position,
            movie_path.display()
        );

        self.entries.insert(
            key_for(movie_path),
            LastPosEntry {
                file_name: file_name_of(movie_path),
                position,
                last_update: chrono::Utc::now().timestamp(),
            },
        );
        self.persist()
    }

    /// Marks a movie as watched (forgets its last position).
    pub fn mark_movie_as_watched(&mut self, movie_path: &Path) -> anyhow::Result<()> {
        log::debug!("Marking movie '{}' as watched.", movie_path.display());

        // Drop the file-name fallback entries too, or a moved copy would
        // keep resuming the movie.
        let file_name = file_name_of(movie_path);
        self.entries.remove(&key_for(movie_path));
        self.entries.retain(|_, entry| entry.file_name != file_name);
        self.persist()
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn key_for(movie_path: &Path) -> String {
    movie_path.to_string_lossy().into_owned()
}

fn file_name_of(movie_path: &Path) -> String {
    movie_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
