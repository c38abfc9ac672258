//! Stage settings: global display options and per-chat exclusions.
//!
//! Global settings persist as JSON through a [`SettingsStore`]. Missing or
//! unknown fields fall back to defaults so older files keep loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize};
use tableau_seating::{parse_exclude_list, JoinPolicy, SeatingConfig};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::SettingsError;
use crate::renderer::StageStyle;

/// Settings file name inside the config directory.
const SETTINGS_FILE: &str = "settings.json";

/// Expression shown when none is configured or the configured one is unknown.
pub const DEFAULT_EXPRESSION: &str = "joy";

/// Supported expression ids, in the order hosts list them.
pub const EXPRESSIONS: [&str; 28] = [
    "admiration",
    "amusement",
    "anger",
    "annoyance",
    "approval",
    "caring",
    "confusion",
    "curiosity",
    "desire",
    "disappointment",
    "disapproval",
    "disgust",
    "embarrassment",
    "excitement",
    "fear",
    "gratitude",
    "grief",
    "joy",
    "love",
    "nervousness",
    "neutral",
    "optimism",
    "pride",
    "realization",
    "relief",
    "remorse",
    "sadness",
    "surprise",
];

/// Global stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Whether the stage runs at all.
    pub is_enabled: bool,

    /// Left side capacity, negative for unlimited.
    pub num_left: i64,

    /// Right side capacity, negative for unlimited.
    pub num_right: i64,

    /// Current speaker scale, in percent.
    pub scale_speaker: u32,

    /// Horizontal offset between side slots, in percent.
    pub offset: u32,

    /// Transition length in milliseconds.
    pub transition: u64,

    /// Expression used to look up portraits.
    pub expression: String,

    /// Scale reduction per slot away from center, in percent.
    pub scale_dropoff: i32,

    /// Image extensions probed in order.
    pub extensions: Vec<String>,

    /// Horizontal stage position, 0 to 100.
    #[serde(deserialize_with = "clamped_percent")]
    pub position: u8,

    /// What happens when someone joins a full stage.
    pub join_policy: JoinPolicy,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            num_left: -1,
            num_right: 2,
            scale_speaker: 120,
            offset: 25,
            transition: 400,
            expression: DEFAULT_EXPRESSION.to_string(),
            scale_dropoff: 3,
            extensions: vec!["png".to_string()],
            position: 0,
            join_policy: JoinPolicy::default(),
        }
    }
}

fn clamped_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = i64::deserialize(deserializer)?;
    Ok(value.clamp(0, 100) as u8)
}

impl StageSettings {
    /// Fix up values that deserialized but are not usable.
    pub fn normalize(&mut self) {
        if !EXPRESSIONS.contains(&self.expression.as_str()) {
            warn!(
                expression = %self.expression,
                fallback = DEFAULT_EXPRESSION,
                "Unknown expression, using fallback"
            );
            self.expression = DEFAULT_EXPRESSION.to_string();
        }

        let extensions = normalize_extensions(&self.extensions);
        self.extensions = if extensions.is_empty() {
            vec!["png".to_string()]
        } else {
            extensions
        };
        self.position = self.position.min(100);
    }

    /// Apply a partial JSON object on top of these settings.
    ///
    /// Keys not present in `patch` keep their current value.
    pub fn merge_json(&mut self, patch: serde_json::Value) -> Result<(), SettingsError> {
        let mut current = serde_json::to_value(&*self)?;
        if let (Some(target), serde_json::Value::Object(fields)) = (current.as_object_mut(), patch)
        {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        let mut merged: StageSettings = serde_json::from_value(current)?;
        merged.normalize();
        *self = merged;
        Ok(())
    }

    /// Seating configuration for a chat.
    pub fn seating_config(&self, chat: &ChatSettings) -> SeatingConfig {
        SeatingConfig::new(self.num_left, self.num_right)
            .with_exclude(&chat.exclude)
            .with_join_policy(self.join_policy)
    }

    /// Numeric style parameters for the renderer.
    pub fn style(&self) -> StageStyle {
        StageStyle {
            scale_speaker: self.scale_speaker,
            offset: self.offset,
            scale_dropoff: self.scale_dropoff,
            transition_ms: self.transition,
            position: self.position,
        }
    }

    /// Configured transition length.
    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition)
    }

    /// How long to wait after an exit so its transition can finish.
    pub fn exit_settle(&self) -> Duration {
        self.transition() + Duration::from_millis(150)
    }

    /// Interval between poll loop ticks.
    pub fn poll_interval(&self) -> Duration {
        (self.transition() + Duration::from_millis(100)).max(Duration::from_millis(500))
    }

    /// Pause between teardown and start during a rebuild.
    pub fn rebuild_delay(&self) -> Duration {
        self.exit_settle().max(Duration::from_millis(550))
    }

    /// Returns true if changing from `self` to `next` needs a full rebuild.
    ///
    /// Portraits are resolved once per participant, so anything that changes
    /// which file is shown forces one.
    pub fn needs_restart(&self, next: &StageSettings) -> bool {
        self.is_enabled != next.is_enabled
            || self.expression != next.expression
            || self.extensions != next.extensions
    }
}

/// Parse a comma-separated extension list such as `"png, .gif,webp"`.
pub fn parse_extensions(text: &str) -> Vec<String> {
    normalize_extensions(text.split(','))
}

fn normalize_extensions<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let ext = item.as_ref().trim().trim_start_matches('.');
        if !ext.is_empty() && !out.iter().any(|e| e == ext) {
            out.push(ext.to_string());
        }
    }
    out
}

/// Per-chat settings carried in the host's chat metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Names never shown in this chat, compared case-insensitively.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ChatSettings {
    /// Build from the comma-separated text a user types.
    pub fn from_exclude_text(text: &str) -> Self {
        Self {
            exclude: parse_exclude_list(text),
        }
    }

    /// The exclusion list as comma-separated text.
    pub fn exclude_text(&self) -> String {
        self.exclude.join(", ")
    }
}

/// Persistence for [`StageSettings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load settings, or defaults when nothing is stored yet.
    async fn load(&self) -> Result<StageSettings, SettingsError>;

    /// Persist settings.
    async fn save(&self, settings: &StageSettings) -> Result<(), SettingsError>;
}

/// Settings stored as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<config dir>/settings.json` for this platform.
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    ProjectDirs::from("dev", "tableau", "stage")
        .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
        .ok_or(SettingsError::NoConfigDir)
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self) -> Result<StageSettings, SettingsError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file, using defaults");
                return Ok(StageSettings::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut settings: StageSettings = serde_json::from_str(&contents)?;
        settings.normalize();
        Ok(settings)
    }

    async fn save(&self, settings: &StageSettings) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
        }
        let contents = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(write_err)?;

        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// In-memory store, used when settings should not outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: RwLock<Option<StageSettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved settings, if any.
    pub async fn saved(&self) -> Option<StageSettings> {
        self.settings.read().await.clone()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<StageSettings, SettingsError> {
        Ok(self.settings.read().await.clone().unwrap_or_default())
    }

    async fn save(&self, settings: &StageSettings) -> Result<(), SettingsError> {
        *self.settings.write().await = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tableau_seating::Capacity;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: StageSettings = serde_json::from_str(r#"{"num_left": 3}"#).unwrap();
        assert_eq!(settings.num_left, 3);
        assert_eq!(settings.num_right, 2);
        assert_eq!(settings.expression, "joy");
        assert_eq!(settings.extensions, vec!["png"]);
        assert!(settings.is_enabled);
    }

    #[test]
    fn test_position_is_clamped() {
        let settings: StageSettings = serde_json::from_str(r#"{"position": 250}"#).unwrap();
        assert_eq!(settings.position, 100);
        let settings: StageSettings = serde_json::from_str(r#"{"position": -5}"#).unwrap();
        assert_eq!(settings.position, 0);
    }

    #[test]
    fn test_normalize_rejects_unknown_expression() {
        let mut settings = StageSettings {
            expression: "smug".to_string(),
            extensions: vec![" .gif".to_string(), String::new()],
            ..Default::default()
        };
        settings.normalize();
        assert_eq!(settings.expression, "joy");
        assert_eq!(settings.extensions, vec!["gif"]);

        settings.extensions.clear();
        settings.normalize();
        assert_eq!(settings.extensions, vec!["png"]);
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(
            parse_extensions("png, gif,webp, .png"),
            vec!["png", "gif", "webp"]
        );
        assert!(parse_extensions(" , ").is_empty());
    }

    #[test]
    fn test_merge_json_keeps_unpatched_fields() {
        let mut settings = StageSettings::default();
        settings
            .merge_json(serde_json::json!({"num_right": 1, "expression": "anger"}))
            .unwrap();
        assert_eq!(settings.num_right, 1);
        assert_eq!(settings.expression, "anger");
        assert_eq!(settings.num_left, -1);

        assert!(settings
            .merge_json(serde_json::json!({"num_left": "many"}))
            .is_err());
        assert_eq!(settings.num_left, -1);
    }

    #[test]
    fn test_timing_derived_from_transition() {
        let fast = StageSettings {
            transition: 100,
            ..Default::default()
        };
        assert_eq!(fast.poll_interval(), Duration::from_millis(500));
        assert_eq!(fast.rebuild_delay(), Duration::from_millis(550));
        assert_eq!(fast.exit_settle(), Duration::from_millis(250));

        let slow = StageSettings {
            transition: 1000,
            ..Default::default()
        };
        assert_eq!(slow.poll_interval(), Duration::from_millis(1100));
        assert_eq!(slow.rebuild_delay(), Duration::from_millis(1150));
    }

    #[test]
    fn test_seating_config_from_settings() {
        let settings = StageSettings::default();
        let chat = ChatSettings::from_exclude_text("Carol, Dave");
        let config = settings.seating_config(&chat);

        assert_eq!(config.capacity_left, Capacity::Unlimited);
        assert_eq!(config.capacity_right, Capacity::Limited(2));
        assert!(config.is_excluded("carol"));
        assert!(config.is_excluded(" DAVE "));
        assert_eq!(chat.exclude_text(), "carol, dave");
    }

    #[test]
    fn test_needs_restart() {
        let base = StageSettings::default();
        let styled = StageSettings {
            offset: 40,
            ..Default::default()
        };
        let extended = StageSettings {
            extensions: vec!["webp".to_string()],
            ..Default::default()
        };
        assert!(!base.needs_restart(&styled));
        assert!(base.needs_restart(&extended));
    }

    #[tokio::test]
    async fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("settings.json"));

        assert_eq!(store.load().await.unwrap(), StageSettings::default());

        let settings = StageSettings {
            num_left: 1,
            expression: "surprise".to_string(),
            ..Default::default()
        };
        store.save(&settings).await.unwrap();
        assert_eq!(store.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }
}
