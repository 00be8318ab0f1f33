//! Static schema metadata that drives every conversion.
//!
//! A [`ResourceSchema`] describes one resource type: its name, whether its
//! lifecycle is tied to a parent entity, and the root [`ObjectSchema`]. Each
//! [`FieldSchema`] determines exactly one conversion behavior for its field,
//! there is no per-field conversion code anywhere in the engine.
//!
//! Schemas can be assembled in code or loaded from YAML:
//!
//! ```
//! # use reconciler::schema::{FieldKind, ResourceSchema};
//! let schema = ResourceSchema::from_yaml_str(
//!     r#"
//! name: member-dns-settings
//! lifecycle: dependentOnParent
//! fields:
//!   - name: hostName
//!     remoteName: host_name
//!     type: string
//!     access: required
//!   - name: forwarders
//!     type: list
//!     ordering: ordered
//!     element:
//!       type: string
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(schema.root.field("hostName").unwrap().remote_name(), "host_name");
//! ```
use std::{collections::BTreeSet, fmt::Display};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub use crate::value::ScalarKind;

#[derive(Debug, Snafu)]
pub enum SchemaError {
    #[snafu(display("failed to deserialize resource schema from YAML"))]
    DeserializeYaml { source: serde_yaml::Error },

    #[snafu(display("field {name:?} is declared more than once"))]
    DuplicateField { name: String },

    #[snafu(display("remote name {remote_name:?} is used by more than one field"))]
    DuplicateRemoteName { remote_name: String },
}

/// Whether the position of a collection element is part of its identity.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CollectionOrdering {
    Ordered,

    #[default]
    Unordered,
}

/// Who may set a field.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Access {
    /// User settable, must not be null.
    Required,

    /// User settable, may be null.
    #[default]
    Optional,

    /// Only ever set by the remote system. Never written.
    Computed,

    /// User settable, the remote system fills it in when the user does not.
    OptionalComputed,
}

impl Access {
    pub fn is_settable(self) -> bool {
        !matches!(self, Self::Computed)
    }

    /// Whether the remote system may decide the value of the field.
    pub fn is_computed(self) -> bool {
        matches!(self, Self::Computed | Self::OptionalComputed)
    }
}

/// Whether a resource can be destroyed on its own, or lives and dies with a
/// parent entity (for example per-host settings objects).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceLifecycle {
    #[default]
    Independent,
    DependentOnParent,
}

/// The kind of a field, tagged by `type` in the serialized form.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Bool,
    Timestamp,
    Object(ObjectSchema),
    List(CollectionSchema),
    Attributes,
}

impl FieldKind {
    /// Returns the [`ScalarKind`] for leaf kinds.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Self::String => Some(ScalarKind::String),
            Self::Integer => Some(ScalarKind::Integer),
            Self::Float => Some(ScalarKind::Float),
            Self::Bool => Some(ScalarKind::Bool),
            Self::Timestamp => Some(ScalarKind::Timestamp),
            Self::Object(_) | Self::List(_) | Self::Attributes => None,
        }
    }
}

impl From<ScalarKind> for FieldKind {
    fn from(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::String => Self::String,
            ScalarKind::Integer => Self::Integer,
            ScalarKind::Float => Self::Float,
            ScalarKind::Bool => Self::Bool,
            ScalarKind::Timestamp => Self::Timestamp,
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(_) => f.write_str("object"),
            Self::List(collection) => write!(f, "{} list", collection.ordering),
            Self::Attributes => f.write_str("attributes"),
            scalar => match scalar.scalar_kind() {
                Some(kind) => write!(f, "{kind}"),
                None => Ok(()),
            },
        }
    }
}

/// Metadata of a collection field.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    #[serde(default)]
    pub ordering: CollectionOrdering,

    /// Minimum number of elements when the collection is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,

    pub element: Box<FieldKind>,
}

impl CollectionSchema {
    pub fn new(ordering: CollectionOrdering, element: impl Into<FieldKind>) -> Self {
        Self {
            ordering,
            min_items: None,
            element: Box::new(element.into()),
        }
    }

    pub fn with_min_items(mut self, min_items: usize) -> Self {
        self.min_items = Some(min_items);
        self
    }
}

/// Metadata of a single field.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// The identifier used in the configuration tree.
    pub name: String,

    /// The key used in the remote object, defaults to [`Self::name`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_name: Option<String>,

    #[serde(flatten)]
    pub kind: FieldKind,

    #[serde(default)]
    pub access: Access,

    /// Informational field the remote system usually fills in. Values the
    /// user never declared are not drift on imported resources.
    #[serde(default)]
    pub passthrough: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: impl Into<FieldKind>) -> Self {
        Self {
            name: name.into(),
            remote_name: None,
            kind: kind.into(),
            access: Access::default(),
            passthrough: false,
        }
    }

    pub fn with_remote_name(mut self, remote_name: impl Into<String>) -> Self {
        self.remote_name = Some(remote_name.into());
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn required(self) -> Self {
        self.with_access(Access::Required)
    }

    pub fn computed(self) -> Self {
        self.with_access(Access::Computed)
    }

    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    pub fn remote_name(&self) -> &str {
        self.remote_name.as_deref().unwrap_or(&self.name)
    }
}

/// The ordered set of fields of a composite value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ObjectSchema {
    pub fields: Vec<FieldSchema>,
}

impl ObjectSchema {
    pub fn new(fields: impl IntoIterator<Item = FieldSchema>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Checks that field names and remote names are unique at every level.
    pub fn check(&self) -> Result<(), SchemaError> {
        let mut names = BTreeSet::new();
        let mut remote_names = BTreeSet::new();

        for field in &self.fields {
            snafu::ensure!(
                names.insert(field.name.as_str()),
                DuplicateFieldSnafu { name: &field.name }
            );
            snafu::ensure!(
                remote_names.insert(field.remote_name()),
                DuplicateRemoteNameSnafu {
                    remote_name: field.remote_name()
                }
            );

            check_kind(&field.kind)?;
        }

        Ok(())
    }
}

fn check_kind(kind: &FieldKind) -> Result<(), SchemaError> {
    match kind {
        FieldKind::Object(object) => object.check(),
        FieldKind::List(collection) => check_kind(&collection.element),
        _ => Ok(()),
    }
}

impl From<ObjectSchema> for FieldKind {
    fn from(object: ObjectSchema) -> Self {
        Self::Object(object)
    }
}

impl From<CollectionSchema> for FieldKind {
    fn from(collection: CollectionSchema) -> Self {
        Self::List(collection)
    }
}

/// The schema of one resource type.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSchema {
    /// The resource type, such as `member-dns-settings`.
    pub name: String,

    #[serde(default)]
    pub lifecycle: ResourceLifecycle,

    #[serde(flatten)]
    pub root: ObjectSchema,
}

impl ResourceSchema {
    pub fn new(name: impl Into<String>, root: ObjectSchema) -> Self {
        Self {
            name: name.into(),
            lifecycle: ResourceLifecycle::default(),
            root,
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: ResourceLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Deserializes and checks a schema.
    pub fn from_yaml_str(input: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_yaml::from_str(input).context(DeserializeYamlSnafu)?;
        schema.root.check()?;
        Ok(schema)
    }
}
