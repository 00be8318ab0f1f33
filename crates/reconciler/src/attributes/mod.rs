//! Reconciliation of extensible attribute sets.
//!
//! An attribute set is a free-form key/value map that is only partially owned
//! by the configuration. The remote system (or other tools) may add keys the
//! user never declared. Those keys must survive every write and must not show
//! up as drift in the user's view of the resource.
//!
//! The user's view is the *declared* part, the remote view is the *observed*
//! superset:
//!
//! - [`compute_write_delta`] returns exactly the declared attributes. The
//!   remote API merges them into the stored set, so observed-only keys are
//!   never removed.
//! - [`replace_payload`] is used for APIs that can only replace the whole set.
//!   It overlays the declared attributes onto the observed ones.
//! - [`merge_on_read`] splits an observed set into the declared view and the
//!   full view and reports declared keys that vanished remotely.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A key/value attribute map.
pub type AttributeSet = BTreeMap<String, serde_json::Value>;

/// The result of reading an attribute set back from the remote system.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledAttributes {
    /// The observed set restricted to the declared keys. This is what the user
    /// sees as the value of the field.
    pub declared_view: AttributeSet,

    /// The observed set, verbatim.
    pub full_view: AttributeSet,

    /// Declared keys that are not present remotely.
    pub missing_declared: BTreeSet<String>,
}

impl ReconciledAttributes {
    /// Whether every declared key was found remotely.
    pub fn is_complete(&self) -> bool {
        self.missing_declared.is_empty()
    }

    /// Keys that exist remotely but were never declared.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &String> {
        self.full_view
            .keys()
            .filter(|key| !self.declared_view.contains_key(*key))
    }
}

/// Returns the attributes to send on a write.
///
/// This is exactly `declared`. Observed-only keys are left alone on the remote
/// side.
pub fn compute_write_delta(declared: &AttributeSet) -> AttributeSet {
    declared.clone()
}

/// Returns a full replacement set that keeps every observed key and overrides
/// the declared ones.
pub fn replace_payload(declared: &AttributeSet, observed: &AttributeSet) -> AttributeSet {
    let mut payload = observed.clone();
    payload.extend(
        declared
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    payload
}

/// Splits `observed` into the view restricted to `declared_keys` and the full
/// view.
pub fn merge_on_read<'a>(
    declared_keys: impl IntoIterator<Item = &'a String>,
    observed: &AttributeSet,
) -> ReconciledAttributes {
    let mut declared_view = AttributeSet::new();
    let mut missing_declared = BTreeSet::new();

    for key in declared_keys {
        match observed.get(key) {
            Some(value) => {
                declared_view.insert(key.clone(), value.clone());
            }
            None => {
                tracing::debug!(attribute.key = %key, "declared attribute is missing remotely");
                missing_declared.insert(key.clone());
            }
        }
    }

    ReconciledAttributes {
        declared_view,
        full_view: observed.clone(),
        missing_declared,
    }
}

/// Reads `observed` back against the full `declared` set.
///
/// Shorthand for [`merge_on_read`] with the keys of `declared`.
pub fn reconcile_attributes(
    declared: &AttributeSet,
    observed: &AttributeSet,
) -> ReconciledAttributes {
    merge_on_read(declared.keys(), observed)
}

/// Returns the declared keys whose observed value differs from the declared
/// one. Keys missing remotely are not included, see
/// [`ReconciledAttributes::missing_declared`].
pub fn changed_keys(declared: &AttributeSet, observed: &AttributeSet) -> BTreeSet<String> {
    declared
        .iter()
        .filter_map(|(key, value)| match observed.get(key) {
            Some(observed) if observed != value => Some(key.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attributes(value: serde_json::Value) -> AttributeSet {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn write_delta_is_exactly_declared() {
        let declared = attributes(json!({"Site": "HQ"}));
        assert_eq!(compute_write_delta(&declared), declared);
    }

    #[test]
    fn read_keeps_foreign_attributes_out_of_declared_view() {
        let declared = attributes(json!({"Site": "HQ"}));
        let observed = attributes(json!({"Site": "HQ", "Owner": "netops"}));

        let reconciled = reconcile_attributes(&declared, &observed);

        assert_eq!(reconciled.declared_view, declared);
        assert_eq!(reconciled.full_view, observed);
        assert!(reconciled.is_complete());
        assert_eq!(reconciled.foreign_keys().collect::<Vec<_>>(), ["Owner"]);

        // The next write must not remove the foreign attribute
        assert!(!compute_write_delta(&declared).contains_key("Owner"));
    }

    #[test]
    fn declared_view_is_subset_of_full_view() {
        let declared = attributes(json!({"Site": "HQ", "Rack": 4}));
        let observed = attributes(json!({"Site": "Branch", "Owner": "netops"}));

        let reconciled = reconcile_attributes(&declared, &observed);

        for (key, value) in &reconciled.declared_view {
            assert_eq!(reconciled.full_view.get(key), Some(value));
        }
        assert_eq!(
            reconciled.missing_declared,
            BTreeSet::from(["Rack".to_owned()])
        );
        assert_eq!(
            changed_keys(&declared, &observed),
            BTreeSet::from(["Site".to_owned()])
        );
    }

    #[test]
    fn replace_payload_keeps_foreign_keys() {
        let declared = attributes(json!({"Site": "HQ"}));
        let observed = attributes(json!({"Site": "Branch", "Owner": "netops"}));

        assert_eq!(
            replace_payload(&declared, &observed),
            attributes(json!({"Site": "HQ", "Owner": "netops"}))
        );
    }
}
