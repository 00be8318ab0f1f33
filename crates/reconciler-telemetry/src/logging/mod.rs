//! Installs the global [`tracing`] subscriber.
//!
//! Two outputs are supported, each with its own level filter that can be
//! overridden through an environment variable:
//!
//! - console output, either plain or JSON.
//! - JSON events in rolling files below a directory.
//!
//! Most tools should use [`Logging::pre_configured`] together with
//! [`LoggingOptions`]:
//!
//! ```no_run
//! use reconciler_telemetry::{Logging, LoggingOptions};
//!
//! # fn main() -> Result<(), reconciler_telemetry::logging::Error> {
//! let _logging = Logging::pre_configured("host-record-sync", LoggingOptions::default()).init()?;
//! # Ok(())
//! # }
//! ```
use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::rolling::{InitError, RollingFileAppender};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::Directive, layer::SubscriberExt};

use crate::logging::settings::*;

pub mod settings;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender { source: InitError },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

/// Configured log outputs, see [`Logging::builder`] and
/// [`Logging::pre_configured`].
///
/// Nothing is installed until [`Logging::init`] is called.
#[derive(Debug)]
pub struct Logging {
    service_name: &'static str,
    console_log_settings: ConsoleLogSettings,
    file_log_settings: FileLogSettings,
}

impl Logging {
    /// The environment variable used to set the console log level filter.
    pub const CONSOLE_LOG_LEVEL: &str = "RECONCILER_CONSOLE_LOG_LEVEL";
    /// The environment variable used to set the rolling file log level filter.
    pub const FILE_LOG_LEVEL: &str = "RECONCILER_FILE_LOG_LEVEL";
    /// Appended to the service name to form log file names.
    pub const FILE_LOG_SUFFIX: &str = "reconciler.json";

    pub fn builder() -> LoggingBuilder<builder_state::PreServiceName> {
        LoggingBuilder::default()
    }

    /// Console logs at INFO unless disabled, and file logs at INFO if a
    /// directory was given. Files are never rotated unless a period is set.
    pub fn pre_configured(service_name: &'static str, options: LoggingOptions) -> Self {
        let LoggingOptions {
            console_log_disabled,
            console_log_json,
            file_log_directory,
            file_log_rotation_period,
            file_log_max_files,
        } = options;

        let console_log_format = if console_log_json {
            ConsoleLogFormat::Json
        } else {
            ConsoleLogFormat::Plain
        };

        Self::builder()
            .service_name(service_name)
            .with_console_output((!console_log_disabled).then(|| {
                Settings::builder()
                    .with_environment_variable(Self::CONSOLE_LOG_LEVEL)
                    .with_default_level(LevelFilter::INFO)
                    .console_log_settings_builder()
                    .with_log_format(console_log_format)
            }))
            .with_file_output(file_log_directory.map(|log_directory| {
                let builder = Settings::builder()
                    .with_environment_variable(Self::FILE_LOG_LEVEL)
                    .with_default_level(LevelFilter::INFO)
                    .file_log_settings_builder(log_directory, Self::FILE_LOG_SUFFIX)
                    .with_rotation_period(file_log_rotation_period.unwrap_or_default());

                match file_log_max_files {
                    Some(max_log_files) => builder.with_max_log_files(max_log_files),
                    None => builder,
                }
            }))
            .build()
    }

    /// Installs the configured outputs as the global default subscriber.
    ///
    /// This can only succeed once per process.
    pub fn init(self) -> Result<Self> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

        if let ConsoleLogSettings::Enabled {
            common_settings,
            log_format,
        } = &self.console_log_settings
        {
            let env_filter = env_filter_builder(
                common_settings.environment_variable,
                common_settings.default_level,
            );

            let layer = match log_format {
                ConsoleLogFormat::Plain => tracing_subscriber::fmt::layer()
                    .with_filter(env_filter)
                    .boxed(),
                ConsoleLogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_filter(env_filter)
                    .boxed(),
            };
            layers.push(layer);
        }

        if let FileLogSettings::Enabled {
            common_settings,
            file_log_dir,
            rotation_period,
            filename_suffix,
            max_log_files,
        } = &self.file_log_settings
        {
            let env_filter = env_filter_builder(
                common_settings.environment_variable,
                common_settings.default_level,
            );

            let mut file_appender = RollingFileAppender::builder()
                .rotation(rotation_period.clone())
                .filename_prefix(self.service_name)
                .filename_suffix(filename_suffix);
            if let Some(max_log_files) = max_log_files {
                file_appender = file_appender.max_log_files(*max_log_files);
            }
            let file_appender = file_appender
                .build(file_log_dir)
                .context(InitRollingFileAppenderSnafu)?;

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(file_appender)
                    .with_filter(env_filter)
                    .boxed(),
            );
        }

        let subscriber = tracing_subscriber::registry().with(layers);
        tracing::subscriber::set_global_default(subscriber)
            .context(SetGlobalDefaultSubscriberSnafu)?;

        tracing::debug!(
            service_name = self.service_name,
            console_log = self.console_log_settings.is_enabled(),
            file_log = self.file_log_settings.is_enabled(),
            "logging initialized"
        );

        Ok(self)
    }
}

/// Seals [`BuilderState`] so it cannot be implemented outside of this crate.
mod private {
    pub trait Sealed {}

    impl Sealed for super::builder_state::PreServiceName {}
    impl Sealed for super::builder_state::Config {}
}

#[doc(hidden)]
pub trait BuilderState: private::Sealed {}

/// The states of a [`LoggingBuilder`].
pub mod builder_state {
    /// Before the service name is set.
    #[derive(Debug, Default)]
    pub struct PreServiceName;

    /// The outputs can be configured.
    #[derive(Debug)]
    pub struct Config {
        pub(super) service_name: &'static str,
    }
}

impl BuilderState for builder_state::PreServiceName {}
impl BuilderState for builder_state::Config {}

/// Builds a [`Logging`]. The service name must be set first, it prefixes log
/// file names.
#[derive(Debug, Default)]
pub struct LoggingBuilder<S: BuilderState> {
    state: S,
    console_log_settings: ConsoleLogSettings,
    file_log_settings: FileLogSettings,
}

impl LoggingBuilder<builder_state::PreServiceName> {
    pub fn service_name(self, service_name: &'static str) -> LoggingBuilder<builder_state::Config> {
        LoggingBuilder {
            state: builder_state::Config { service_name },
            console_log_settings: self.console_log_settings,
            file_log_settings: self.file_log_settings,
        }
    }
}

impl LoggingBuilder<builder_state::Config> {
    pub fn with_console_output(mut self, settings: impl Into<ConsoleLogSettings>) -> Self {
        self.console_log_settings = settings.into();
        self
    }

    pub fn with_file_output(mut self, settings: impl Into<FileLogSettings>) -> Self {
        self.file_log_settings = settings.into();
        self
    }

    pub fn build(self) -> Logging {
        Logging {
            service_name: self.state.service_name,
            console_log_settings: self.console_log_settings,
            file_log_settings: self.file_log_settings,
        }
    }
}

fn env_filter_builder(env_var: &str, default_directive: impl Into<Directive>) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(env_var)
        .with_default_directive(default_directive.into())
        .from_env_lossy()
}

/// Options for [`Logging::pre_configured`].
///
/// With the `clap` feature these can be flattened into a CLI:
///
/// ```ignore
/// #[derive(clap::Parser)]
/// struct Cli {
///     #[clap(flatten)]
///     logging: reconciler_telemetry::LoggingOptions,
/// }
/// ```
#[cfg_attr(
    feature = "clap",
    derive(clap::Args),
    command(next_help_heading = "Logging Options")
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Disable console logs.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub console_log_disabled: bool,

    /// Write console logs as JSON instead of plain text.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub console_log_json: bool,

    /// Enable logging to files located in the specified DIRECTORY.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "DIRECTORY", group = "file_log")
    )]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "PERIOD", requires = "file_log")
    )]
    pub file_log_rotation_period: Option<RotationPeriod>,

    /// Keep at most COUNT log files.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "COUNT", requires = "file_log")
    )]
    pub file_log_max_files: Option<usize>,
}

/// Supported periods after which the log file is rolled over.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}
