//! Per-output subscriber settings.
use std::path::Path;

use tracing::level_filters::LevelFilter;

pub mod console;
pub use console::*;

pub mod file;
pub use file::*;

/// The environment variable consulted when no other one is configured.
pub const DEFAULT_ENVIRONMENT_VARIABLE: &str = "RUST_LOG";

/// Settings shared by every output.
#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    /// The environment variable used to override [`Self::default_level`].
    pub environment_variable: &'static str,

    /// The [`LevelFilter`] used if [`Self::environment_variable`] is unset.
    pub default_level: LevelFilter,
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }
}

impl Default for Settings {
    fn default() -> Self {
        SettingsBuilder::default().build()
    }
}

/// Whether an output is switched on.
pub trait SettingsToggle {
    fn is_enabled(&self) -> bool;

    fn is_disabled(&self) -> bool {
        !self.is_enabled()
    }
}

/// For building [`Settings`], and from there the output specific settings.
pub struct SettingsBuilder {
    environment_variable: &'static str,
    default_level: LevelFilter,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self {
            environment_variable: DEFAULT_ENVIRONMENT_VARIABLE,
            default_level: LevelFilter::OFF,
        }
    }
}

impl SettingsBuilder {
    pub fn with_environment_variable(mut self, name: &'static str) -> Self {
        self.environment_variable = name;
        self
    }

    pub fn with_default_level(mut self, level: impl Into<LevelFilter>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn build(self) -> Settings {
        Settings {
            environment_variable: self.environment_variable,
            default_level: self.default_level,
        }
    }

    /// Continues with console specific settings.
    pub fn console_log_settings_builder(self) -> ConsoleLogSettingsBuilder {
        ConsoleLogSettingsBuilder {
            common_settings: self.build(),
            log_format: ConsoleLogFormat::default(),
        }
    }

    /// Continues with settings for log files written into `file_log_dir`.
    pub fn file_log_settings_builder(
        self,
        file_log_dir: impl AsRef<Path>,
        filename_suffix: impl Into<String>,
    ) -> FileLogSettingsBuilder {
        FileLogSettingsBuilder {
            common_settings: self.build(),
            file_log_dir: file_log_dir.as_ref().to_path_buf(),
            filename_suffix: filename_suffix.into(),
            rotation_period: Rotation::NEVER,
            max_log_files: None,
        }
    }
}
