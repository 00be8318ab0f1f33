use std::collections::{BTreeMap, btree_map};

use crate::{
    attributes::AttributeSet,
    value::{Scalar, TriState},
};

/// One node of a [`ResourceModel`].
///
/// Collections come in two flavours: [`ModelValue::List`] is order
/// significant, [`ModelValue::Set`] is not. Two sets are equal if they contain
/// the same elements the same number of times, in any order.
#[derive(Clone, Debug)]
pub enum ModelValue {
    Scalar(TriState<Scalar>),
    Object(TriState<ResourceModel>),
    List(TriState<Vec<ModelValue>>),
    Set(TriState<Vec<ModelValue>>),
    Attributes(TriState<AttributeSet>),
}

impl ModelValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(TriState::Known(Scalar::String(value.into())))
    }

    pub fn integer(value: i64) -> Self {
        Self::Scalar(TriState::Known(Scalar::Integer(value)))
    }

    pub fn float(value: f64) -> Self {
        Self::Scalar(TriState::Known(Scalar::Float(value)))
    }

    pub fn bool(value: bool) -> Self {
        Self::Scalar(TriState::Known(Scalar::Bool(value)))
    }

    pub fn null() -> Self {
        Self::Scalar(TriState::Null)
    }

    pub fn unknown() -> Self {
        Self::Scalar(TriState::Unknown)
    }

    pub fn object(model: ResourceModel) -> Self {
        Self::Object(TriState::Known(model))
    }

    pub fn list(items: impl IntoIterator<Item = ModelValue>) -> Self {
        Self::List(TriState::Known(items.into_iter().collect()))
    }

    pub fn set(items: impl IntoIterator<Item = ModelValue>) -> Self {
        Self::Set(TriState::Known(items.into_iter().collect()))
    }

    pub fn attributes(attributes: AttributeSet) -> Self {
        Self::Attributes(TriState::Known(attributes))
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Scalar(value) => value.is_null(),
            Self::Object(value) => value.is_null(),
            Self::List(value) | Self::Set(value) => value.is_null(),
            Self::Attributes(value) => value.is_null(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        match self {
            Self::Scalar(value) => value.is_unknown(),
            Self::Object(value) => value.is_unknown(),
            Self::List(value) | Self::Set(value) => value.is_unknown(),
            Self::Attributes(value) => value.is_unknown(),
        }
    }

    pub fn is_known(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    /// Returns the scalar if this is a known [`ModelValue::Scalar`].
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(value) => value.known(),
            _ => None,
        }
    }

    /// Returns the nested model if this is a known [`ModelValue::Object`].
    pub fn as_object(&self) -> Option<&ResourceModel> {
        match self {
            Self::Object(value) => value.known(),
            _ => None,
        }
    }

    /// Returns the elements if this is a known [`ModelValue::List`] or [`ModelValue::Set`].
    pub fn as_items(&self) -> Option<&[ModelValue]> {
        match self {
            Self::List(value) | Self::Set(value) => value.known().map(Vec::as_slice),
            _ => None,
        }
    }

    pub fn as_attributes(&self) -> Option<&AttributeSet> {
        match self {
            Self::Attributes(value) => value.known(),
            _ => None,
        }
    }

    /// A short name of the variant, used in error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Attributes(_) => "attributes",
        }
    }
}

impl PartialEq for ModelValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => left == right,
            (Self::Object(left), Self::Object(right)) => left == right,
            (Self::List(left), Self::List(right)) => left == right,
            (Self::Set(left), Self::Set(right)) => match (left, right) {
                (TriState::Known(left), TriState::Known(right)) => multiset_eq(left, right),
                (left, right) => {
                    left.is_null() == right.is_null() && left.is_unknown() == right.is_unknown()
                }
            },
            (Self::Attributes(left), Self::Attributes(right)) => left == right,
            _ => false,
        }
    }
}

/// Compares two slices ignoring order, but counting duplicates.
fn multiset_eq(left: &[ModelValue], right: &[ModelValue]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let mut matched = vec![false; right.len()];
    left.iter().all(|item| {
        let position = (0..right.len()).find(|&index| !matched[index] && right[index] == *item);
        match position {
            Some(index) => {
                matched[index] = true;
                true
            }
            None => false,
        }
    })
}

/// One resource instance's desired or observed state.
///
/// Fields are keyed by their configuration identifier. A field that is not
/// present in the map is treated as [`TriState::Null`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceModel {
    fields: BTreeMap<String, ModelValue>,
}

impl ResourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style version of [`ResourceModel::insert`].
    pub fn with(mut self, name: impl Into<String>, value: ModelValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ModelValue) -> Option<ModelValue> {
        self.fields.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ModelValue> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModelValue> {
        self.fields.get_mut(name)
    }

    /// Looks up a dotted path like `settings.ntp.enabled` through nested objects.
    ///
    /// Returns [`None`] if any segment is missing or is not a known object.
    pub fn lookup(&self, path: &str) -> Option<&ModelValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.get(first)?;

        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }

        Some(current)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ModelValue> {
        self.fields.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, String, ModelValue> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, ModelValue)> for ResourceModel {
    fn from_iter<T: IntoIterator<Item = (String, ModelValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ResourceModel {
    type IntoIter = btree_map::Iter<'a, String, ModelValue>;
    type Item = (&'a String, &'a ModelValue);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
