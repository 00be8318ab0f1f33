//! Detection of differences between the declared and the observed state.
//!
//! Only what the configuration owns is compared. Computed fields and values
//! that are not known yet never drift, at any depth. Unordered collections
//! are compared as multisets and attribute sets only on their declared keys.
//! A collection is reported as a whole when any of its elements differs.
use std::fmt::Display;

use serde::Serialize;

use crate::{
    attributes,
    identity::ManagedState,
    path::FieldPath,
    reconcile::EngineOptions,
    schema::{Access, CollectionOrdering, CollectionSchema, FieldKind, FieldSchema, ObjectSchema},
    value::{ModelValue, ResourceModel, Scalar},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DriftKind {
    /// The remote value differs from the declared one.
    Changed,

    /// A declared value is absent remotely.
    Missing,

    /// A value is present remotely although the configuration leaves it null.
    Unexpected,

    /// A declared attribute is absent remotely.
    AttributeMissing { key: String },

    /// A declared attribute has a different value remotely.
    AttributeChanged { key: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Drift {
    #[serde(serialize_with = "serialize_display")]
    pub path: FieldPath,

    #[serde(flatten)]
    pub kind: DriftKind,
}

impl Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            DriftKind::Changed => write!(f, "{} changed", self.path),
            DriftKind::Missing => write!(f, "{} is missing", self.path),
            DriftKind::Unexpected => write!(f, "{} is set unexpectedly", self.path),
            DriftKind::AttributeMissing { key } => {
                write!(f, "attribute {key:?} of {} is missing", self.path)
            }
            DriftKind::AttributeChanged { key } => {
                write!(f, "attribute {key:?} of {} changed", self.path)
            }
        }
    }
}

fn serialize_display<S: serde::Serializer>(
    value: &impl Display,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Compares `declared` against `observed`.
///
/// Passthrough fields the user never declared are not reported while the
/// resource carries an import marker, or at all when
/// [`EngineOptions::ignore_passthrough_drift`] is set.
pub fn detect_drift(
    declared: &ResourceModel,
    observed: &ResourceModel,
    schema: &ObjectSchema,
    state: &ManagedState,
    options: &EngineOptions,
) -> Vec<Drift> {
    let mut detector = Detector {
        tolerate_passthrough: state.is_imported() || options.ignore_passthrough_drift,
        drifts: Vec::new(),
    };
    detector.compare_object(declared, observed, schema, &FieldPath::root());

    for drift in &detector.drifts {
        tracing::debug!(%drift, "detected drift");
    }
    detector.drifts
}

struct Detector {
    tolerate_passthrough: bool,
    drifts: Vec<Drift>,
}

impl Detector {
    fn push(&mut self, path: &FieldPath, kind: DriftKind) {
        self.drifts.push(Drift {
            path: path.clone(),
            kind,
        });
    }

    fn compare_object(
        &mut self,
        declared: &ResourceModel,
        observed: &ResourceModel,
        schema: &ObjectSchema,
        path: &FieldPath,
    ) {
        for field in &schema.fields {
            if field.access == Access::Computed {
                continue;
            }

            let path = path.field(&field.name);
            let declared = declared.get(&field.name);
            let observed = observed.get(&field.name);
            self.compare_field(field, declared, observed, &path);
        }
    }

    fn compare_field(
        &mut self,
        field: &FieldSchema,
        declared: Option<&ModelValue>,
        observed: Option<&ModelValue>,
        path: &FieldPath,
    ) {
        let observed_known = observed.is_some_and(ModelValue::is_known);

        let Some(declared) = declared.filter(|value| !value.is_null()) else {
            if observed_known && !self.tolerates_unset(field) {
                self.push(path, DriftKind::Unexpected);
            }
            return;
        };

        if declared.is_unknown() {
            return;
        }

        let Some(observed) = observed.filter(|_| observed_known) else {
            match declared.as_attributes() {
                Some(attributes) => {
                    for key in attributes.keys() {
                        self.push(path, DriftKind::AttributeMissing { key: key.clone() });
                    }
                }
                None => self.push(path, DriftKind::Missing),
            }
            return;
        };

        match (&field.kind, declared, observed) {
            (FieldKind::Object(object), ModelValue::Object(_), ModelValue::Object(_)) => {
                if let (Some(declared), Some(observed)) = (declared.as_object(), observed.as_object())
                {
                    self.compare_object(declared, observed, object, path);
                }
            }
            (FieldKind::Attributes, _, _) => {
                if let (Some(declared), Some(observed)) =
                    (declared.as_attributes(), observed.as_attributes())
                {
                    let reconciled = attributes::reconcile_attributes(declared, observed);
                    for key in reconciled.missing_declared {
                        self.push(path, DriftKind::AttributeMissing { key });
                    }
                    for key in attributes::changed_keys(declared, observed) {
                        self.push(path, DriftKind::AttributeChanged { key });
                    }
                }
            }
            (kind, _, _) => {
                if !self.values_match(declared, observed, kind) {
                    self.push(path, DriftKind::Changed);
                }
            }
        }
    }

    /// Whether a field the configuration leaves null may carry a remote value.
    fn tolerates_unset(&self, field: &FieldSchema) -> bool {
        field.access == Access::OptionalComputed
            || field.kind == FieldKind::Attributes
            || (field.passthrough && self.tolerate_passthrough)
    }

    /// The non-reporting counterpart of [`Self::compare_field`], used for the
    /// contents of collection elements.
    fn field_matches(
        &self,
        field: &FieldSchema,
        declared: Option<&ModelValue>,
        observed: Option<&ModelValue>,
    ) -> bool {
        let observed = observed.filter(|value| value.is_known());

        match declared.filter(|value| !value.is_null()) {
            None => observed.is_none() || self.tolerates_unset(field),
            Some(declared) if declared.is_unknown() => true,
            Some(declared) => {
                observed.is_some_and(|observed| self.values_match(declared, observed, &field.kind))
            }
        }
    }

    fn values_match(&self, declared: &ModelValue, observed: &ModelValue, kind: &FieldKind) -> bool {
        if declared.is_unknown() {
            return true;
        }

        match kind {
            FieldKind::Object(object) => match (declared.as_object(), observed.as_object()) {
                (Some(declared), Some(observed)) => object
                    .fields
                    .iter()
                    .filter(|field| field.access != Access::Computed)
                    .all(|field| {
                        self.field_matches(
                            field,
                            declared.get(&field.name),
                            observed.get(&field.name),
                        )
                    }),
                _ => declared == observed,
            },
            FieldKind::List(collection) => match (declared.as_items(), observed.as_items()) {
                (Some(declared), Some(observed)) => {
                    self.items_match(declared, observed, collection)
                }
                _ => declared == observed,
            },
            FieldKind::Attributes => match (declared.as_attributes(), observed.as_attributes()) {
                (Some(declared), Some(observed)) => {
                    attributes::reconcile_attributes(declared, observed)
                        .missing_declared
                        .is_empty()
                        && attributes::changed_keys(declared, observed).is_empty()
                }
                _ => declared == observed,
            },
            FieldKind::Timestamp => same_instant(declared.as_scalar(), observed.as_scalar()),
            _ => declared == observed,
        }
    }

    fn items_match(
        &self,
        declared: &[ModelValue],
        observed: &[ModelValue],
        collection: &CollectionSchema,
    ) -> bool {
        if declared.len() != observed.len() {
            return false;
        }

        match collection.ordering {
            CollectionOrdering::Ordered => declared
                .iter()
                .zip(observed)
                .all(|(declared, observed)| {
                    self.values_match(declared, observed, &collection.element)
                }),
            CollectionOrdering::Unordered => {
                let mut taken = vec![false; observed.len()];
                self.assign(declared, observed, &collection.element, &mut taken)
            }
        }
    }

    /// Searches a one-to-one pairing of declared and observed elements. A pick
    /// is undone when the remaining elements cannot be paired.
    fn assign(
        &self,
        declared: &[ModelValue],
        observed: &[ModelValue],
        element: &FieldKind,
        taken: &mut [bool],
    ) -> bool {
        let Some((first, rest)) = declared.split_first() else {
            return true;
        };

        for (index, candidate) in observed.iter().enumerate() {
            if taken[index] || !self.values_match(first, candidate, element) {
                continue;
            }
            taken[index] = true;
            if self.assign(rest, observed, element, taken) {
                return true;
            }
            taken[index] = false;
        }
        false
    }
}

/// Timestamps are equal if they denote the same instant, regardless of the
/// offset they were written with.
fn same_instant(declared: Option<&Scalar>, observed: Option<&Scalar>) -> bool {
    let parse = |scalar: Option<&Scalar>| {
        scalar
            .and_then(Scalar::as_str)
            .and_then(|input| input.trim().parse::<jiff::Timestamp>().ok())
    };

    match (parse(declared), parse(observed)) {
        (Some(declared), Some(observed)) => declared == observed,
        _ => declared == observed,
    }
}
