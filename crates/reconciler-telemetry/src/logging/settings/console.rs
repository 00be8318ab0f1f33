use tracing::level_filters::LevelFilter;

use super::{Settings, SettingsBuilder, SettingsToggle};

#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConsoleLogSettings {
    #[default]
    Disabled,

    Enabled {
        common_settings: Settings,
        log_format: ConsoleLogFormat,
    },
}

impl SettingsToggle for ConsoleLogSettings {
    fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// How events are rendered on the console.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsoleLogFormat {
    /// Human readable lines. ANSI colors can be disabled by setting `NO_COLOR`.
    #[default]
    Plain,

    /// One JSON object per event, for tools whose output is collected.
    Json,
}

pub struct ConsoleLogSettingsBuilder {
    pub(crate) common_settings: Settings,
    pub(crate) log_format: ConsoleLogFormat,
}

impl ConsoleLogSettingsBuilder {
    pub fn with_log_format(mut self, format: ConsoleLogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn build(self) -> ConsoleLogSettings {
        ConsoleLogSettings::Enabled {
            common_settings: self.common_settings,
            log_format: self.log_format,
        }
    }
}

impl From<ConsoleLogSettingsBuilder> for ConsoleLogSettings {
    fn from(builder: ConsoleLogSettingsBuilder) -> Self {
        builder.build()
    }
}

impl From<Settings> for ConsoleLogSettings {
    fn from(common_settings: Settings) -> Self {
        Self::Enabled {
            common_settings,
            log_format: ConsoleLogFormat::default(),
        }
    }
}

impl From<(&'static str, LevelFilter)> for ConsoleLogSettings {
    fn from((environment_variable, default_level): (&'static str, LevelFilter)) -> Self {
        SettingsBuilder::default()
            .with_environment_variable(environment_variable)
            .with_default_level(default_level)
            .build()
            .into()
    }
}

impl From<(&'static str, LevelFilter, bool)> for ConsoleLogSettings {
    fn from(
        (environment_variable, default_level, enabled): (&'static str, LevelFilter, bool),
    ) -> Self {
        if enabled {
            (environment_variable, default_level).into()
        } else {
            Self::Disabled
        }
    }
}

impl<T> From<Option<T>> for ConsoleLogSettings
where
    T: Into<Self>,
{
    fn from(settings: Option<T>) -> Self {
        settings.map_or_else(Self::default, Into::into)
    }
}
