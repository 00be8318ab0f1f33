//! Recursive, schema-driven conversion between [`ResourceModel`]s and
//! [`RemoteObject`]s.
//!
//! Every field is converted according to its [`FieldSchema`] alone. Composite
//! fields recurse, collections convert element by element and keep (ordered)
//! or drop (unordered) the significance of element positions, attribute sets
//! are written through [`attributes::compute_write_delta`].
//!
//! A failing field never stops the conversion of its siblings. All failures
//! are collected, each with the [`FieldPath`] it happened at, and returned
//! together as [`ConversionErrors`].
use std::fmt::Display;

use serde_json::Value;
use snafu::Snafu;

use crate::{
    attributes::{self, AttributeSet},
    codec::{self, ConversionError, FieldCodec, ScalarCodec, json_type_name},
    path::FieldPath,
    schema::{Access, CollectionOrdering, CollectionSchema, FieldKind, FieldSchema, ObjectSchema},
    value::{ModelValue, RemoteObject, ResourceModel, Scalar, ScalarKind, TriState},
};

/// A conversion failure of a single field.
#[derive(Debug, PartialEq, Snafu)]
#[snafu(display("{path}: {problem}"))]
pub struct FieldConversionError {
    pub path: FieldPath,

    #[snafu(source)]
    pub problem: ConversionError,
}

/// All conversion failures of one resource.
#[derive(Debug, PartialEq)]
pub struct ConversionErrors(Vec<FieldConversionError>);

impl ConversionErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, FieldConversionError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the error reported for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&ConversionError> {
        self.0
            .iter()
            .find(|error| error.path.to_string() == path)
            .map(|error| &error.problem)
    }
}

impl Display for ConversionErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}
impl std::error::Error for ConversionErrors {}

impl IntoIterator for ConversionErrors {
    type IntoIter = std::vec::IntoIter<FieldConversionError>;
    type Item = FieldConversionError;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Converts a model into the remote payload for a write.
///
/// [`TriState::Null`] fields are left out and computed fields are never
/// written. A [`TriState::Unknown`] value is left out for fields the remote
/// system may fill in ([`Access::OptionalComputed`]) and is an error anywhere
/// else, as is a null collection element.
pub fn to_remote(
    model: &ResourceModel,
    schema: &ObjectSchema,
) -> Result<RemoteObject, ConversionErrors> {
    let mut converter = Converter::default();
    let object = converter.write_object(model, schema, &FieldPath::root());
    converter.finish(object)
}

/// Flattens a remote object into a model.
///
/// Absent keys and JSON `null` become [`TriState::Null`]. Remote keys the
/// schema does not know about are ignored.
pub fn from_remote(
    object: &RemoteObject,
    schema: &ObjectSchema,
) -> Result<ResourceModel, ConversionErrors> {
    let mut converter = Converter::default();
    let model = converter.read_object(object, schema, Source::Remote, &FieldPath::root());
    converter.finish(model)
}

/// Parses a user-authored configuration tree into a model.
///
/// The tree uses the configuration identifiers of the schema. A missing key
/// is [`TriState::Null`] for fields only the user sets, and
/// [`TriState::Unknown`] for fields the remote system may compute.
pub fn from_config(
    config: &RemoteObject,
    schema: &ObjectSchema,
) -> Result<ResourceModel, ConversionErrors> {
    let mut converter = Converter::default();
    let model = converter.read_object(config, schema, Source::Config, &FieldPath::root());
    converter.finish(model)
}

/// Which side a tree being read comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Remote,
    Config,
}

impl Source {
    fn key(self, field: &FieldSchema) -> &str {
        match self {
            Self::Remote => field.remote_name(),
            Self::Config => &field.name,
        }
    }
}

#[derive(Debug, Default)]
struct Converter {
    errors: Vec<FieldConversionError>,
}

impl Converter {
    fn finish<T>(self, value: T) -> Result<T, ConversionErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            tracing::debug!(errors = self.errors.len(), "conversion failed");
            Err(ConversionErrors(self.errors))
        }
    }

    fn push(&mut self, path: &FieldPath, problem: ConversionError) {
        self.errors.push(FieldConversionError {
            path: path.clone(),
            problem,
        });
    }

    fn record<T>(&mut self, path: &FieldPath, result: Result<T, ConversionError>) -> Option<T> {
        result.map_err(|problem| self.push(path, problem)).ok()
    }

    fn write_object(
        &mut self,
        model: &ResourceModel,
        schema: &ObjectSchema,
        path: &FieldPath,
    ) -> RemoteObject {
        for key in model.keys() {
            if schema.field(key).is_none() {
                self.push(
                    &path.field(key),
                    ConversionError::type_mismatch("a field of the schema", "undeclared field"),
                );
            }
        }

        let mut object = RemoteObject::new();
        for field in &schema.fields {
            if !field.access.is_settable() {
                continue;
            }

            let Some(value) = model.get(&field.name) else {
                continue;
            };
            if field.access == Access::OptionalComputed && value.is_unknown() {
                continue;
            }
            if let Some(value) = self.write_value(value, &field.kind, &path.field(&field.name)) {
                object.insert(field.remote_name().to_owned(), value);
            }
        }
        object
    }

    fn write_value(
        &mut self,
        value: &ModelValue,
        kind: &FieldKind,
        path: &FieldPath,
    ) -> Option<Value> {
        if let (Some(scalar_kind), ModelValue::Scalar(state)) = (kind.scalar_kind(), value) {
            let result = ScalarCodec::new(scalar_kind).to_remote(state.clone());
            return self.record(path, result).flatten();
        }

        if value.is_null() {
            return None;
        }
        if value.is_unknown() {
            self.push(path, ConversionError::UnknownNotWritable);
            return None;
        }

        match (kind, value) {
            (FieldKind::Object(object), ModelValue::Object(TriState::Known(nested))) => {
                Some(Value::Object(self.write_object(nested, object, path)))
            }
            (FieldKind::List(collection), ModelValue::List(TriState::Known(items)))
                if collection.ordering == CollectionOrdering::Ordered =>
            {
                Some(self.write_items(items, collection, path))
            }
            (FieldKind::List(collection), ModelValue::Set(TriState::Known(items)))
                if collection.ordering == CollectionOrdering::Unordered =>
            {
                Some(self.write_items(items, collection, path))
            }
            (FieldKind::Attributes, ModelValue::Attributes(TriState::Known(declared))) => Some(
                Value::Object(attributes::compute_write_delta(declared).into_iter().collect()),
            ),
            (kind, value) => {
                self.push(
                    path,
                    ConversionError::type_mismatch(kind, value.variant_name()),
                );
                None
            }
        }
    }

    fn write_items(
        &mut self,
        items: &[ModelValue],
        collection: &CollectionSchema,
        path: &FieldPath,
    ) -> Value {
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let path = path.index(index);
                if item.is_null() {
                    self.push(&path, ConversionError::NullElement);
                    return None;
                }
                self.write_value(item, &collection.element, &path)
            })
            .collect()
    }

    fn read_object(
        &mut self,
        object: &RemoteObject,
        schema: &ObjectSchema,
        source: Source,
        path: &FieldPath,
    ) -> ResourceModel {
        for key in object.keys() {
            if schema.fields.iter().all(|field| source.key(field) != key) {
                match source {
                    Source::Remote => {
                        tracing::trace!(field.path = %path.field(key), "ignoring remote field missing from schema");
                    }
                    Source::Config => self.push(
                        &path.field(key),
                        ConversionError::type_mismatch("a field of the schema", "undeclared field"),
                    ),
                }
            }
        }

        schema
            .fields
            .iter()
            .map(|field| {
                let path = path.field(&field.name);
                let value = match object.get(source.key(field)) {
                    Some(value) if source == Source::Config && !field.access.is_settable() => {
                        self.push(
                            &path,
                            ConversionError::type_mismatch(
                                "no value for a computed field",
                                json_type_name(value),
                            ),
                        );
                        absent(&field.kind, TriState::Unknown)
                    }
                    Some(value) => self.read_value(value, &field.kind, source, &path),
                    None if source == Source::Config && field.access.is_computed() => {
                        absent(&field.kind, TriState::Unknown)
                    }
                    None => absent(&field.kind, TriState::Null),
                };
                (field.name.clone(), value)
            })
            .collect()
    }

    fn read_value(
        &mut self,
        value: &Value,
        kind: &FieldKind,
        source: Source,
        path: &FieldPath,
    ) -> ModelValue {
        if value.is_null() {
            return absent(kind, TriState::Null);
        }

        match (kind, value) {
            (FieldKind::Object(object), Value::Object(nested)) => ModelValue::Object(
                TriState::Known(self.read_object(nested, object, source, path)),
            ),
            (FieldKind::List(collection), Value::Array(items)) => {
                let items = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.read_value(item, &collection.element, source, &path.index(index))
                    })
                    .collect();
                match collection.ordering {
                    CollectionOrdering::Ordered => ModelValue::List(TriState::Known(items)),
                    CollectionOrdering::Unordered => ModelValue::Set(TriState::Known(items)),
                }
            }
            (FieldKind::Attributes, Value::Object(observed)) => {
                let observed: AttributeSet = observed
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                ModelValue::Attributes(TriState::Known(observed))
            }
            (kind, value) => match kind.scalar_kind() {
                Some(scalar_kind) => {
                    let scalar = match source {
                        Source::Remote => ScalarCodec::new(scalar_kind).decode(value.clone()),
                        Source::Config => read_config_scalar(scalar_kind, value),
                    };
                    match self.record(path, scalar) {
                        Some(scalar) => ModelValue::Scalar(codec::from_remote(Some(scalar))),
                        None => absent(kind, TriState::Null),
                    }
                }
                None => {
                    self.push(
                        path,
                        ConversionError::type_mismatch(kind, json_type_name(value)),
                    );
                    absent(kind, TriState::Null)
                }
            },
        }
    }
}

/// Configuration values use their natural JSON form, timestamps stay RFC 3339
/// strings.
fn read_config_scalar(kind: ScalarKind, value: &Value) -> Result<Scalar, ConversionError> {
    let scalar = serde_json::from_value::<Scalar>(value.clone())
        .ok()
        .filter(|scalar| kind.accepts(scalar));

    match scalar {
        Some(Scalar::Integer(value)) if kind == ScalarKind::Float => Ok(Scalar::Float(value as f64)),
        Some(scalar) => Ok(scalar),
        None if kind == ScalarKind::Timestamp && value.is_string() => {
            let input = value.as_str().unwrap_or_default().to_owned();
            Err(ConversionError::BadTimestamp {
                reason: "not an RFC 3339 timestamp".to_owned(),
                input,
            })
        }
        None => Err(ConversionError::type_mismatch(kind, json_type_name(value))),
    }
}

/// A [`TriState::Null`] or [`TriState::Unknown`] value of the variant that
/// matches `kind`.
fn absent(kind: &FieldKind, state: TriState<()>) -> ModelValue {
    fn cast<T>(state: TriState<()>) -> TriState<T> {
        match state {
            TriState::Unknown => TriState::Unknown,
            TriState::Null | TriState::Known(()) => TriState::Null,
        }
    }

    match kind {
        FieldKind::Object(_) => ModelValue::Object(cast(state)),
        FieldKind::List(collection) => match collection.ordering {
            CollectionOrdering::Ordered => ModelValue::List(cast(state)),
            CollectionOrdering::Unordered => ModelValue::Set(cast(state)),
        },
        FieldKind::Attributes => ModelValue::Attributes(cast(state)),
        _ => ModelValue::Scalar(cast(state)),
    }
}
