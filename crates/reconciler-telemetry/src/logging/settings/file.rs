use std::path::PathBuf;

pub use tracing_appender::rolling::Rotation;

use super::{Settings, SettingsToggle};

#[derive(Debug, Default, PartialEq, Eq)]
pub enum FileLogSettings {
    #[default]
    Disabled,

    /// JSON events written into rolling files inside `file_log_dir`.
    Enabled {
        common_settings: Settings,
        file_log_dir: PathBuf,
        rotation_period: Rotation,
        filename_suffix: String,

        /// Older files are removed once there are more than this.
        max_log_files: Option<usize>,
    },
}

impl SettingsToggle for FileLogSettings {
    fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

pub struct FileLogSettingsBuilder {
    pub(crate) common_settings: Settings,
    pub(crate) file_log_dir: PathBuf,
    pub(crate) filename_suffix: String,
    pub(crate) rotation_period: Rotation,
    pub(crate) max_log_files: Option<usize>,
}

impl FileLogSettingsBuilder {
    pub fn with_rotation_period(mut self, rotation_period: impl Into<Rotation>) -> Self {
        self.rotation_period = rotation_period.into();
        self
    }

    pub fn with_max_log_files(mut self, max_log_files: usize) -> Self {
        self.max_log_files = Some(max_log_files);
        self
    }

    pub fn build(self) -> FileLogSettings {
        FileLogSettings::Enabled {
            common_settings: self.common_settings,
            file_log_dir: self.file_log_dir,
            rotation_period: self.rotation_period,
            filename_suffix: self.filename_suffix,
            max_log_files: self.max_log_files,
        }
    }
}

impl From<FileLogSettingsBuilder> for FileLogSettings {
    fn from(builder: FileLogSettingsBuilder) -> Self {
        builder.build()
    }
}

impl<T> From<Option<T>> for FileLogSettings
where
    T: Into<Self>,
{
    fn from(settings: Option<T>) -> Self {
        settings.map_or_else(Self::default, Into::into)
    }
}
