//! ## Crate Features
//!
//! - `clap` enables clap support on [`identity::LookupScope`] and
//!   [`reconcile::EngineOptions`], so they can be embedded in clap-based CLIs.
//! - `telemetry` re-exports the `reconciler-telemetry` crate as [`telemetry`].
//!
//! ## Overview
//!
//! `reconciler` converts between a user-authored desired-state configuration
//! and the native objects of a remote management API, in both directions and
//! without losing state the configuration does not own.
//!
//! - [`value`] holds the tri-state value tree every conversion works on.
//! - [`schema`] describes resource types. Each field's conversion behavior is
//!   determined by its schema entry alone.
//! - [`codec`] converts single values, [`convert`] whole (nested) resources.
//! - [`attributes`] reconciles free-form attribute sets that are only partly
//!   owned by the configuration.
//! - [`identity`] resolves and records which remote resource is managed.
//! - [`validation`] checks cross-field rules before anything is written.
//! - [`drift`] and [`reconcile`] tie everything together with a
//!   [`client::RemoteClient`].
pub mod attributes;
pub mod client;
pub mod codec;
pub mod convert;
pub mod drift;
pub mod identity;
pub mod path;
pub mod reconcile;
pub mod schema;
pub mod validation;
pub mod value;

#[cfg(feature = "telemetry")]
pub use reconciler_telemetry as telemetry;
