use crate::models::PrepareSettings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the settings file inside the configuration directory
pub const SETTINGS_FILE: &str = "cppstats-prepare.yaml";

/// Prefix of environment variables overriding settings
pub const ENV_PREFIX: &str = "CPPSTATS";

/// Configuration manager for loading and saving the YAML settings file.
///
/// Effective settings are layered: built-in defaults, then the YAML file,
/// then `CPPSTATS_*` environment variables. Nested keys use a double
/// underscore, e.g. `CPPSTATS_TOOLS__SRCML=/opt/srcml/bin/srcml`.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `cppstats-prepare.yaml` (e.g., ".cppstats")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load the settings file with overrides from the process environment.
    ///
    /// # Returns
    /// The effective settings; defaults when the file doesn't exist
    pub fn load_settings(&self) -> Result<PrepareSettings> {
        self.load_settings_with_env(None)
    }

    /// Load the settings file, taking overrides from `env` instead of the
    /// process environment when given.
    pub fn load_settings_with_env(
        &self,
        env: Option<::config::Map<String, String>>,
    ) -> Result<PrepareSettings> {
        let file_settings = self.read_settings_file()?;

        let layered = ::config::Config::builder()
            .add_source(
                ::config::Config::try_from(&file_settings)
                    .context("Failed to convert settings file into a configuration layer")?,
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to layer settings")?;

        layered
            .try_deserialize()
            .context("Failed to apply environment overrides to settings")
    }

    /// Save settings to the YAML file.
    pub fn save_settings(&self, settings: &PrepareSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    fn read_settings_file(&self) -> Result<PrepareSettings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Ok(PrepareSettings::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        // An empty file is valid and means "all defaults".
        if file_contents.trim().is_empty() {
            return Ok(PrepareSettings::default());
        }

        serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings YAML: {}", self.settings_path))
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Path of the settings file.
    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
