//! Settings loading, saving, and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.datalyst/settings.toml`
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - Atomic file writes with temp file + rename
//! - First-run template generation

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use super::schema::DatalystSettings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".datalyst")
        .join("settings.toml")
}

/// Manages settings loading, interpolation, and persistence.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: RwLock<DatalystSettings>,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager, loading from disk if available.
    pub async fn new() -> Result<Self> {
        Self::from_path(settings_path()).await
    }

    /// Create a SettingsManager backed by a specific file path.
    pub async fn from_path(path: PathBuf) -> Result<Self> {
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    /// Load settings from a specific path.
    async fn load_from_path(path: &PathBuf) -> Result<DatalystSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(DatalystSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")?;

        let mut settings: DatalystSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        Self::resolve_env_vars(&mut settings);

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references in string fields.
    fn resolve_env_vars(settings: &mut DatalystSettings) {
        fn resolve_opt(value: &mut Option<String>) {
            if let Some(v) = value {
                if let Some(resolved) = resolve_env_ref(v) {
                    *v = resolved;
                }
            }
        }

        resolve_opt(&mut settings.llm.api_key);
        resolve_opt(&mut settings.llm.base_url);
    }

    /// Get the current settings (read-only).
    pub async fn get(&self) -> DatalystSettings {
        self.settings.read().await.clone()
    }

    /// Update settings and persist to disk.
    pub async fn update(&self, new_settings: DatalystSettings) -> Result<()> {
        *self.settings.write().await = new_settings.clone();

        let toml_string =
            toml::to_string_pretty(&new_settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, &toml_string).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::info!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Reset to defaults and persist.
    pub async fn reset(&self) -> Result<()> {
        self.update(DatalystSettings::default()).await
    }

    /// Check if settings file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Get the settings file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();

    if trimmed.starts_with('$') {
        let var_name = if trimmed.starts_with("${") && trimmed.ends_with('}') {
            &trimmed[2..trimmed.len() - 1]
        } else {
            &trimmed[1..]
        };

        return std::env::var(var_name).ok();
    }

    None
}

/// Get a setting value with environment variable fallback.
///
/// Priority order:
/// 1. Settings value (if set and non-empty)
/// 2. Environment variable (first match from list)
/// 3. Default value
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    if let Some(v) = setting {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }

    for env_var in env_vars {
        if let Ok(v) = std::env::var(env_var) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }

    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_env_ref_dollar_format() {
        std::env::set_var("DATALYST_TEST_VAR_1", "test_value_1");

        assert_eq!(
            resolve_env_ref("$DATALYST_TEST_VAR_1"),
            Some("test_value_1".to_string())
        );

        std::env::remove_var("DATALYST_TEST_VAR_1");
    }

    #[test]
    fn test_resolve_env_ref_braces_format() {
        std::env::set_var("DATALYST_TEST_VAR_2", "test_value_2");

        assert_eq!(
            resolve_env_ref("${DATALYST_TEST_VAR_2}"),
            Some("test_value_2".to_string())
        );

        std::env::remove_var("DATALYST_TEST_VAR_2");
    }

    #[test]
    fn test_resolve_env_ref_no_reference() {
        assert_eq!(resolve_env_ref("plain-value"), None);
    }

    #[test]
    fn test_resolve_env_ref_missing_var() {
        assert_eq!(resolve_env_ref("$DATALYST_TEST_VAR_MISSING"), None);
    }

    #[test]
    fn test_get_with_env_fallback_prefers_setting() {
        std::env::set_var("DATALYST_TEST_VAR_3", "from_env");

        let result = get_with_env_fallback(
            &Some("from_settings".to_string()),
            &["DATALYST_TEST_VAR_3"],
            None,
        );
        assert_eq!(result, Some("from_settings".to_string()));

        std::env::remove_var("DATALYST_TEST_VAR_3");
    }

    #[test]
    fn test_get_with_env_fallback_empty_setting_falls_through() {
        let result = get_with_env_fallback(
            &Some(String::new()),
            &["DATALYST_TEST_VAR_ABSENT"],
            Some("default".to_string()),
        );
        assert_eq!(result, Some("default".to_string()));
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::from_path(dir.path().join("settings.toml"))
            .await
            .unwrap();

        let settings = manager.get().await;
        assert_eq!(settings.version, 1);
        assert!(!manager.exists());
    }

    #[tokio::test]
    async fn test_update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let manager = SettingsManager::from_path(path.clone()).await.unwrap();

        let mut settings = manager.get().await;
        settings.session.ttl_secs = 1234;
        manager.update(settings).await.unwrap();
        assert!(path.exists());

        let reopened = SettingsManager::from_path(path).await.unwrap();
        assert_eq!(reopened.get().await.session.ttl_secs, 1234);
    }

    #[tokio::test]
    async fn test_ensure_settings_file_writes_template() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::from_path(dir.path().join("settings.toml"))
            .await
            .unwrap();

        assert!(manager.ensure_settings_file().await.unwrap());
        // Second call is a no-op
        assert!(!manager.ensure_settings_file().await.unwrap());

        let contents = tokio::fs::read_to_string(manager.path()).await.unwrap();
        assert!(contents.contains("[session]"));
    }
}
