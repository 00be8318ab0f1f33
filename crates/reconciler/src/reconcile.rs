//! Orchestration of the write, read, import and delete flows of one resource.
//!
//! - On write, [`plan_write`] validates the desired model before converting
//!   it into a remote payload, and [`apply`] sends the payload and records the
//!   resource identity.
//! - On read, [`refresh`] flattens the remote object back into a model and
//!   narrows attribute fields to the keys that were last written.
//! - [`import`] adopts a pre-existing resource, [`delete`] removes a resource
//!   or, if its lifecycle is tied to a parent, only releases it locally.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    attributes::{self, AttributeSet, ReconciledAttributes},
    client::{RemoteClient, RemoteError, TransportError},
    convert::{self, ConversionErrors},
    identity::{
        self, IdentityError, IdentityTarget, Lookup, LookupScope, ManagedState, ResolutionError,
        ResourceIdentity,
    },
    path::FieldPath,
    schema::{FieldKind, ObjectSchema, ResourceLifecycle, ResourceSchema},
    validation::{self, RuleSet, ValidationErrors},
    value::{ModelValue, RemoteObject, ResourceModel, TriState},
};

#[derive(Debug, Snafu)]
pub enum PlanError {
    #[snafu(display("desired state is invalid"))]
    Validation { source: ValidationErrors },

    #[snafu(display("failed to convert desired state into a remote payload"))]
    Conversion { source: ConversionErrors },
}

#[derive(Debug, Snafu)]
pub enum ApplyError {
    #[snafu(display("failed to create remote resource"))]
    Create { source: RemoteError },

    #[snafu(display("failed to read remote resource {reference:?} before replacing attributes"))]
    ReadCurrent {
        source: RemoteError,
        reference: String,
    },

    #[snafu(display("failed to update remote resource {reference:?}"))]
    Update {
        source: RemoteError,
        reference: String,
    },

    #[snafu(display("failed to record the identity of the created resource"))]
    RecordIdentity { source: IdentityError },

    #[snafu(display("the resource was released from management"))]
    ApplyReleased,
}

#[derive(Debug, Snafu)]
pub enum RefreshError {
    #[snafu(display("no identity is recorded for the resource"))]
    NoIdentity,

    #[snafu(display("failed to read remote resource {reference:?}"))]
    Read {
        source: TransportError,
        reference: String,
    },

    #[snafu(display("failed to convert remote resource {reference:?}"))]
    ConvertRemote {
        source: ConversionErrors,
        reference: String,
    },
}

#[derive(Debug, Snafu)]
pub enum ImportError {
    #[snafu(display("failed to resolve the resource to import"))]
    Resolve { source: ResolutionError },

    #[snafu(display("failed to record the imported identity"))]
    RecordImport { source: IdentityError },

    #[snafu(display("failed to read the imported resource"))]
    ReadImported { source: RefreshError },
}

#[derive(Debug, Snafu)]
pub enum DeleteError {
    #[snafu(display("failed to delete remote resource {reference:?}"))]
    Delete {
        source: TransportError,
        reference: String,
    },
}

/// Behavior toggles of the engine.
#[cfg_attr(
    feature = "clap",
    derive(clap::Args),
    command(next_help_heading = "Engine Options")
)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    /// Never report drift on passthrough fields the configuration leaves
    /// unset, not only on imported resources.
    #[cfg_attr(feature = "clap", arg(long, env))]
    #[serde(default)]
    pub ignore_passthrough_drift: bool,

    /// Write attribute sets as full replacements that keep every attribute
    /// observed remotely. Needed for remote APIs that cannot merge attribute
    /// updates.
    #[cfg_attr(feature = "clap", arg(long, env))]
    #[serde(default)]
    pub replace_attributes: bool,
}

/// A validated and converted write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WritePlan {
    pub payload: RemoteObject,

    /// The declared attribute keys per attribute field path.
    pub declared_attributes: BTreeMap<String, BTreeSet<String>>,
}

/// The result of reading a resource.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    Observed(Observation),

    /// The resource was deleted out of band. The local state was reset.
    Gone,
}

impl ReadOutcome {
    pub fn observed(self) -> Option<Observation> {
        match self {
            Self::Observed(observation) => Some(observation),
            Self::Gone => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// The remote object as model. Attribute fields only contain the
    /// declared keys if any were recorded.
    pub model: ResourceModel,

    /// The reconciled views of every attribute field with recorded keys.
    pub attributes: BTreeMap<String, ReconciledAttributes>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote resource was deleted, or was already gone.
    Deleted,

    /// The resource lives and dies with its parent. Only local identity was
    /// dropped.
    Released,
}

/// An attribute field reachable from the root through nested objects.
struct AttributeField {
    path: String,
    config_path: Vec<String>,
    remote_path: Vec<String>,
}

fn attribute_fields(schema: &ObjectSchema) -> Vec<AttributeField> {
    fn walk(
        schema: &ObjectSchema,
        path: &FieldPath,
        config_path: &[String],
        remote_path: &[String],
        fields: &mut Vec<AttributeField>,
    ) {
        for field in &schema.fields {
            let path = path.field(&field.name);
            let mut config_path = config_path.to_vec();
            config_path.push(field.name.clone());
            let mut remote_path = remote_path.to_vec();
            remote_path.push(field.remote_name().to_owned());

            match &field.kind {
                FieldKind::Attributes => fields.push(AttributeField {
                    path: path.to_string(),
                    config_path,
                    remote_path,
                }),
                FieldKind::Object(object) => {
                    walk(object, &path, &config_path, &remote_path, fields);
                }
                _ => {}
            }
        }
    }

    let mut fields = Vec::new();
    walk(schema, &FieldPath::root(), &[], &[], &mut fields);
    fields
}

fn model_value<'a>(model: &'a ResourceModel, path: &[String]) -> Option<&'a ModelValue> {
    let (last, parents) = path.split_last()?;
    let mut current = model;
    for segment in parents {
        current = current.get(segment)?.as_object()?;
    }
    current.get(last)
}

fn model_value_mut<'a>(model: &'a mut ResourceModel, path: &[String]) -> Option<&'a mut ModelValue> {
    let (last, parents) = path.split_last()?;
    let mut current = model;
    for segment in parents {
        match current.get_mut(segment)? {
            ModelValue::Object(TriState::Known(nested)) => current = nested,
            _ => return None,
        }
    }
    current.get_mut(last)
}

fn remote_attributes<'a>(object: &'a RemoteObject, path: &[String]) -> Option<&'a RemoteObject> {
    let (last, parents) = path.split_last()?;
    let mut current = object;
    for segment in parents {
        current = current.get(segment)?.as_object()?;
    }
    current.get(last)?.as_object()
}

fn remote_attributes_mut<'a>(
    object: &'a mut RemoteObject,
    path: &[String],
) -> Option<&'a mut RemoteObject> {
    let (last, parents) = path.split_last()?;
    let mut current = object;
    for segment in parents {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    current.get_mut(last)?.as_object_mut()
}

fn to_attribute_set(object: &RemoteObject) -> AttributeSet {
    object
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Validates `desired` and converts it into a remote payload.
///
/// Validation runs first, a model that fails validation is never converted.
#[tracing::instrument(skip_all, fields(resource_type = %schema.name))]
pub fn plan_write(
    desired: &ResourceModel,
    schema: &ResourceSchema,
    rules: &RuleSet,
) -> Result<WritePlan, PlanError> {
    validation::validate(desired, &schema.root, rules).context(ValidationSnafu)?;
    let payload = convert::to_remote(desired, &schema.root).context(ConversionSnafu)?;

    let declared_attributes = attribute_fields(&schema.root)
        .into_iter()
        .filter_map(|field| {
            let declared = model_value(desired, &field.config_path)?.as_attributes()?;
            Some((field.path, declared.keys().cloned().collect()))
        })
        .collect();

    tracing::debug!(fields = payload.len(), "planned write");
    Ok(WritePlan {
        payload,
        declared_attributes,
    })
}

/// Plans the writes of several resources of one type.
///
/// A failing resource does not affect the others, there is one result per
/// input in input order.
pub fn plan_writes<'a>(
    desired: impl IntoIterator<Item = &'a ResourceModel>,
    schema: &ResourceSchema,
    rules: &RuleSet,
) -> Vec<Result<WritePlan, PlanError>> {
    desired
        .into_iter()
        .map(|model| plan_write(model, schema, rules))
        .collect()
}

/// Creates the resource if no identity is recorded yet, updates it otherwise.
///
/// Returns the remote object as reported by the remote system.
#[tracing::instrument(skip_all, fields(resource_type = %schema.name, reference = tracing::field::Empty))]
pub fn apply<C: RemoteClient + ?Sized>(
    client: &C,
    schema: &ResourceSchema,
    state: &mut ManagedState,
    plan: WritePlan,
    options: &EngineOptions,
) -> Result<RemoteObject, ApplyError> {
    snafu::ensure!(!state.is_released(), ApplyReleasedSnafu);

    let WritePlan {
        mut payload,
        declared_attributes,
    } = plan;

    let object = match state.reference().map(str::to_owned) {
        Some(reference) => {
            tracing::Span::current().record("reference", reference.as_str());

            if options.replace_attributes {
                let current = client
                    .read(&reference)
                    .context(ReadCurrentSnafu { reference: &reference })?;
                overlay_observed_attributes(&mut payload, &current, &schema.root);
            }

            client
                .update(&reference, &payload)
                .context(UpdateSnafu { reference: &reference })?
        }
        None => {
            let created = client
                .create(&schema.name, &payload)
                .context(CreateSnafu)?;
            tracing::Span::current().record("reference", created.reference.as_str());
            tracing::info!("created remote resource");

            state
                .record_identity(ResourceIdentity::new(created.reference))
                .context(RecordIdentitySnafu)?;
            created.object
        }
    };

    for (path, keys) in declared_attributes {
        state.set_declared_attribute_keys(path, keys);
    }
    Ok(object)
}

fn overlay_observed_attributes(
    payload: &mut RemoteObject,
    current: &RemoteObject,
    schema: &ObjectSchema,
) {
    for field in attribute_fields(schema) {
        let Some(observed) = remote_attributes(current, &field.remote_path) else {
            continue;
        };
        let Some(declared) = remote_attributes_mut(payload, &field.remote_path) else {
            continue;
        };

        let replacement =
            attributes::replace_payload(&to_attribute_set(declared), &to_attribute_set(observed));
        *declared = replacement.into_iter().collect();
    }
}

/// Reads the resource back.
///
/// A resource that no longer exists remotely is reported as
/// [`ReadOutcome::Gone`] and the local state is reset, so that the caller
/// plans a create on the next write.
#[tracing::instrument(skip_all, fields(resource_type = %schema.name, reference = tracing::field::Empty))]
pub fn refresh<C: RemoteClient + ?Sized>(
    client: &C,
    schema: &ResourceSchema,
    state: &mut ManagedState,
) -> Result<ReadOutcome, RefreshError> {
    let reference = state.reference().context(NoIdentitySnafu)?.to_owned();
    tracing::Span::current().record("reference", reference.as_str());

    let object = match client.read(&reference) {
        Ok(object) => object,
        Err(RemoteError::NotFound { .. }) => {
            tracing::info!("remote resource was deleted out of band");
            *state = ManagedState::default();
            return Ok(ReadOutcome::Gone);
        }
        Err(RemoteError::Transport { source }) => {
            return Err(source).context(ReadSnafu { reference });
        }
    };

    let mut model = convert::from_remote(&object, &schema.root)
        .context(ConvertRemoteSnafu { reference: &reference })?;

    let mut reconciled = BTreeMap::new();
    for field in attribute_fields(&schema.root) {
        let Some(declared_keys) = state.declared_attribute_keys(&field.path) else {
            continue;
        };
        let Some(value) = model_value_mut(&mut model, &field.config_path) else {
            continue;
        };

        let observed = value.as_attributes().cloned().unwrap_or_default();
        let merged = attributes::merge_on_read(declared_keys, &observed);
        if value.is_known() {
            *value = ModelValue::attributes(merged.declared_view.clone());
        }
        reconciled.insert(field.path, merged);
    }

    Ok(ReadOutcome::Observed(Observation {
        model,
        attributes: reconciled,
    }))
}

/// Adopts a pre-existing remote resource into `state` and reads it.
#[tracing::instrument(skip_all, fields(resource_type = %schema.name))]
pub fn import<C: RemoteClient + ?Sized>(
    client: &C,
    lookup: &impl Lookup,
    schema: &ResourceSchema,
    target: IdentityTarget,
    scope: &LookupScope,
    state: &mut ManagedState,
) -> Result<ReadOutcome, ImportError> {
    let identity = identity::resolve_identity(target, lookup, scope).context(ResolveSnafu)?;
    state.import(identity).context(RecordImportSnafu)?;
    refresh(client, schema, state).context(ReadImportedSnafu)
}

/// Deletes the resource.
///
/// A resource whose lifecycle is tied to its parent cannot be deleted on its
/// own. No remote call is issued, the local identity is released and the call
/// succeeds.
#[tracing::instrument(skip_all, fields(resource_type = %schema.name, reference = tracing::field::Empty))]
pub fn delete<C: RemoteClient + ?Sized>(
    client: &C,
    schema: &ResourceSchema,
    state: &mut ManagedState,
) -> Result<DeleteOutcome, DeleteError> {
    if schema.lifecycle == ResourceLifecycle::DependentOnParent {
        tracing::info!("releasing resource that is owned by its parent");
        state.release();
        return Ok(DeleteOutcome::Released);
    }

    let Some(reference) = state.reference().map(str::to_owned) else {
        state.release();
        return Ok(DeleteOutcome::Deleted);
    };
    tracing::Span::current().record("reference", reference.as_str());

    match client.delete(&reference) {
        Ok(()) => tracing::info!("deleted remote resource"),
        Err(RemoteError::NotFound { .. }) => {
            tracing::debug!("remote resource was already deleted");
        }
        Err(RemoteError::Transport { source }) => {
            return Err(source).context(DeleteSnafu { reference });
        }
    }

    state.release();
    Ok(DeleteOutcome::Deleted)
}
