//! Logging setup for tools built on the `reconciler` crate.
//!
//! The engine itself only emits [`tracing`] events and spans. Binaries which
//! drive it install a subscriber with [`logging::Logging`], which supports
//! plain console output and JSON output into rolling log files.
//!
//! ## Crate Features
//!
//! - `clap` enables clap support on [`logging::LoggingOptions`].
pub mod logging;

pub use logging::{Logging, LoggingOptions};
