use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::identity::ResourceIdentity;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum IdentityError {
    #[snafu(display(
        "resource identity is immutable, it is {recorded:?} and cannot become {requested:?}"
    ))]
    IdentityChanged { recorded: String, requested: String },

    #[snafu(display("the resource was released from management"))]
    Released,
}

/// Whether the local state still manages a remote resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    #[default]
    Managed,

    /// Local identity was dropped, for example after deleting a resource that
    /// lives and dies with its parent.
    Released,
}

/// Records that a resource was adopted from the remote system rather than
/// created by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMarker {
    /// The reference the resource was imported with.
    pub reference: String,
}

/// The persisted bookkeeping of one managed resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<ResourceIdentity>,

    /// Write-once, see [`ManagedState::import`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    import_marker: Option<ImportMarker>,

    /// The attribute keys last written, per attribute field path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    declared_attributes: BTreeMap<String, BTreeSet<String>>,

    #[serde(default)]
    lifecycle: Lifecycle,
}

impl ManagedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&ResourceIdentity> {
        self.identity.as_ref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|identity| identity.reference.as_str())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_released(&self) -> bool {
        self.lifecycle == Lifecycle::Released
    }

    pub fn import_marker(&self) -> Option<&ImportMarker> {
        self.import_marker.as_ref()
    }

    pub fn is_imported(&self) -> bool {
        self.import_marker.is_some()
    }

    /// Records the identity of the managed resource.
    ///
    /// Recording the identity that is already recorded is a no-op, a
    /// different one is rejected.
    pub fn record_identity(&mut self, identity: ResourceIdentity) -> Result<(), IdentityError> {
        snafu::ensure!(self.lifecycle == Lifecycle::Managed, ReleasedSnafu);

        match &self.identity {
            Some(recorded) if recorded.reference == identity.reference => Ok(()),
            Some(recorded) => IdentityChangedSnafu {
                recorded: &recorded.reference,
                requested: identity.reference,
            }
            .fail(),
            None => {
                tracing::debug!(reference = %identity.reference, "recording resource identity");
                self.identity = Some(identity);
                Ok(())
            }
        }
    }

    /// Adopts an existing remote resource.
    ///
    /// The import marker is only set if no identity was recorded before, and
    /// is never set again or cleared afterwards. Returns whether this call set
    /// the marker.
    pub fn import(&mut self, identity: ResourceIdentity) -> Result<bool, IdentityError> {
        let first_import = self.identity.is_none() && self.import_marker.is_none();
        let reference = identity.reference.clone();
        self.record_identity(identity)?;

        if first_import {
            tracing::info!(%reference, "imported existing remote resource");
            self.import_marker = Some(ImportMarker { reference });
        }
        Ok(first_import)
    }

    /// The attribute keys last written for the attribute field at `path`.
    pub fn declared_attribute_keys(&self, path: &str) -> Option<&BTreeSet<String>> {
        self.declared_attributes.get(path)
    }

    /// Replaces the attribute keys last written for the attribute field at
    /// `path`.
    pub fn set_declared_attribute_keys(&mut self, path: impl Into<String>, keys: BTreeSet<String>) {
        self.declared_attributes.insert(path.into(), keys);
    }

    /// Drops the local identity without touching the remote resource.
    pub fn release(&mut self) {
        if let Some(identity) = self.identity.take() {
            tracing::debug!(reference = %identity.reference, "releasing resource identity");
        }
        self.declared_attributes.clear();
        self.lifecycle = Lifecycle::Released;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_immutable() {
        let mut state = ManagedState::new();
        state.record_identity(ResourceIdentity::new("a")).unwrap();
        state.record_identity(ResourceIdentity::new("a")).unwrap();

        assert_eq!(
            state.record_identity(ResourceIdentity::new("b")),
            Err(IdentityError::IdentityChanged {
                recorded: "a".to_owned(),
                requested: "b".to_owned(),
            })
        );
        assert_eq!(state.reference(), Some("a"));
    }

    #[test]
    fn import_marker_is_set_exactly_once() {
        let mut state = ManagedState::new();

        assert_eq!(state.import(ResourceIdentity::new("a")), Ok(true));
        assert!(state.is_imported());

        // A second pass must neither set nor clear it
        assert_eq!(state.import(ResourceIdentity::new("a")), Ok(false));
        assert_eq!(
            state.import_marker(),
            Some(&ImportMarker {
                reference: "a".to_owned()
            })
        );
    }

    #[test]
    fn created_resources_are_not_imported() {
        let mut state = ManagedState::new();
        state.record_identity(ResourceIdentity::new("a")).unwrap();

        assert_eq!(state.import(ResourceIdentity::new("a")), Ok(false));
        assert!(!state.is_imported());
    }

    #[test]
    fn released_state() {
        let mut state = ManagedState::new();
        state.import(ResourceIdentity::new("a")).unwrap();
        state.set_declared_attribute_keys("extattrs", BTreeSet::from(["Site".to_owned()]));

        state.release();

        assert_eq!(state.identity(), None);
        assert_eq!(state.lifecycle(), Lifecycle::Released);
        assert_eq!(state.declared_attribute_keys("extattrs"), None);
        assert!(state.is_imported());
        assert_eq!(
            state.record_identity(ResourceIdentity::new("a")),
            Err(IdentityError::Released)
        );
    }

    #[test]
    fn serde_round_trip_keeps_marker() {
        let mut state = ManagedState::new();
        state.import(ResourceIdentity::new("a")).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(
            json,
            r#"{"identity":{"reference":"a"},"importMarker":{"reference":"a"},"lifecycle":"managed"}"#
        );
        assert_eq!(serde_json::from_str::<ManagedState>(&json).unwrap(), state);
    }
}
