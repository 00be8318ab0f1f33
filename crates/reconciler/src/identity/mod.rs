//! Resolution of remote resource identities.
//!
//! A resource's identity is the opaque reference the remote system returned
//! when it was created. When a pre-existing resource is brought under
//! management the user may only know a secondary key, such as its name. In
//! that case the remote system is searched within an explicit
//! [`LookupScope`], and exactly one match is required: the resolver never
//! picks one of several candidates.
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::client::{RemoteClient, RemoteResource, TransportError};

mod state;

pub use state::*;

#[derive(Debug, Snafu)]
pub enum ResolutionError {
    #[snafu(display("no remote resource matches {key}"))]
    NotFound { key: SecondaryKey },

    #[snafu(display(
        "{key} matches {} remote resources ({references:?}), refusing to pick one",
        references.len()
    ))]
    Ambiguous {
        key: SecondaryKey,
        references: Vec<String>,
    },

    #[snafu(display("resource reference must not be empty"))]
    EmptyReference,

    #[snafu(display("failed to search remote resources for {key}"))]
    Transport {
        source: TransportError,
        key: SecondaryKey,
    },
}

/// A user-supplied field/value pair identifying a remote resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SecondaryKey {
    pub field: String,
    pub value: String,
}

impl SecondaryKey {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl Display for SecondaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?}", self.field, self.value)
    }
}

/// What the user supplied to identify a resource.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityTarget {
    Reference(String),
    SecondaryKey(SecondaryKey),
}

/// The identity of a managed resource.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    /// The opaque reference, stored verbatim.
    pub reference: String,

    /// The secondary key the reference was resolved from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_from: Option<SecondaryKey>,
}

impl ResourceIdentity {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            resolved_from: None,
        }
    }
}

/// Where to search when resolving a secondary key.
///
/// The scope is always passed explicitly. There is no process wide default.
#[cfg_attr(
    feature = "clap",
    derive(clap::Args),
    command(next_help_heading = "Lookup Options")
)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupScope {
    /// Restrict lookups to this view (for example a DNS view or network
    /// partition) of the remote system.
    #[cfg_attr(feature = "clap", arg(long = "lookup-view", env = "LOOKUP_VIEW"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    /// Restrict lookups to resources owned by this tenant.
    #[cfg_attr(feature = "clap", arg(long = "lookup-tenant", env = "LOOKUP_TENANT"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl LookupScope {
    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// Searches the remote system by secondary key.
pub trait Lookup {
    fn search(
        &self,
        scope: &LookupScope,
        key: &SecondaryKey,
    ) -> Result<Vec<RemoteResource>, TransportError>;
}

/// A [`Lookup`] for one resource type backed by a [`RemoteClient`].
pub struct ClientLookup<'a, C: ?Sized> {
    client: &'a C,
    resource_type: &'a str,
}

impl<'a, C: RemoteClient + ?Sized> ClientLookup<'a, C> {
    pub fn new(client: &'a C, resource_type: &'a str) -> Self {
        Self {
            client,
            resource_type,
        }
    }
}

impl<C: RemoteClient + ?Sized> Lookup for ClientLookup<'_, C> {
    fn search(
        &self,
        scope: &LookupScope,
        key: &SecondaryKey,
    ) -> Result<Vec<RemoteResource>, TransportError> {
        self.client.list(self.resource_type, scope, key)
    }
}

/// Resolves what the user supplied into a [`ResourceIdentity`].
///
/// A reference is taken verbatim. A secondary key must match exactly one
/// remote resource within `scope`.
#[tracing::instrument(skip(lookup))]
pub fn resolve_identity(
    target: IdentityTarget,
    lookup: &impl Lookup,
    scope: &LookupScope,
) -> Result<ResourceIdentity, ResolutionError> {
    let key = match target {
        IdentityTarget::Reference(reference) => {
            snafu::ensure!(!reference.trim().is_empty(), EmptyReferenceSnafu);
            return Ok(ResourceIdentity::new(reference));
        }
        IdentityTarget::SecondaryKey(key) => key,
    };

    let matches = lookup
        .search(scope, &key)
        .context(TransportSnafu { key: key.clone() })?;

    let mut references: Vec<String> = matches.into_iter().map(|m| m.reference).collect();
    references.sort();
    references.dedup();

    match references.len() {
        0 => NotFoundSnafu { key }.fail(),
        1 => {
            let reference = references.remove(0);
            tracing::debug!(%reference, "resolved secondary key");
            Ok(ResourceIdentity {
                reference,
                resolved_from: Some(key),
            })
        }
        _ => AmbiguousSnafu { key, references }.fail(),
    }
}
