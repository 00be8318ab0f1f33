//! Drives whole resource lifecycles against an in-memory remote system.
use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use indoc::indoc;
use reconciler::{
    client::{RemoteClient, RemoteError, RemoteResource, TransportError},
    convert,
    drift::{self, DriftKind},
    identity::{
        ClientLookup, IdentityTarget, LookupScope, ManagedState, ResolutionError, SecondaryKey,
    },
    reconcile::{self, DeleteOutcome, EngineOptions, ImportError, ReadOutcome},
    schema::{ResourceLifecycle, ResourceSchema},
    validation::RuleSet,
    value::{RemoteObject, ResourceModel},
};
use serde_json::{Value, json};

const LAST_MODIFIED: i64 = 1_709_294_400;

/// Replaces whole top-level fields on update, like most REST APIs do.
#[derive(Default)]
struct InMemoryRemote {
    objects: Mutex<BTreeMap<String, RemoteObject>>,
    next_id: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryRemote {
    fn seed(&self, resource_type: &str, object: Value) -> String {
        let reference = format!(
            "{resource_type}/{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        self.objects
            .lock()
            .unwrap()
            .insert(reference.clone(), object_of(object));
        reference
    }

    fn object(&self, reference: &str) -> RemoteObject {
        self.objects.lock().unwrap()[reference].clone()
    }

    fn edit(&self, reference: &str, edit: impl FnOnce(&mut RemoteObject)) {
        edit(self.objects.lock().unwrap().get_mut(reference).unwrap());
    }

    fn remove(&self, reference: &str) {
        self.objects.lock().unwrap().remove(reference);
    }
}

impl RemoteClient for InMemoryRemote {
    fn create(
        &self,
        resource_type: &str,
        payload: &RemoteObject,
    ) -> Result<RemoteResource, RemoteError> {
        let mut object = payload.clone();
        object.insert("last_modified".to_owned(), json!(LAST_MODIFIED));
        let reference = self.seed(resource_type, Value::Object(object.clone()));
        Ok(RemoteResource { reference, object })
    }

    fn read(&self, reference: &str) -> Result<RemoteObject, RemoteError> {
        self.objects
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                reference: reference.to_owned(),
            })
    }

    fn update(
        &self,
        reference: &str,
        payload: &RemoteObject,
    ) -> Result<RemoteObject, RemoteError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(reference)
            .ok_or_else(|| RemoteError::NotFound {
                reference: reference.to_owned(),
            })?;
        for (key, value) in payload {
            object.insert(key.clone(), value.clone());
        }
        Ok(object.clone())
    }

    fn delete(&self, reference: &str) -> Result<(), RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        match self.objects.lock().unwrap().remove(reference) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound {
                reference: reference.to_owned(),
            }),
        }
    }

    fn list(
        &self,
        resource_type: &str,
        scope: &LookupScope,
        key: &SecondaryKey,
    ) -> Result<Vec<RemoteResource>, TransportError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(reference, _)| reference.starts_with(&format!("{resource_type}/")))
            .filter(|(_, object)| object.get(&key.field) == Some(&json!(key.value)))
            .filter(|(_, object)| {
                scope
                    .view
                    .as_ref()
                    .is_none_or(|view| object.get("view") == Some(&json!(view)))
            })
            .map(|(reference, object)| RemoteResource {
                reference: reference.clone(),
                object: object.clone(),
            })
            .collect())
    }
}

fn object_of(value: Value) -> RemoteObject {
    match value {
        Value::Object(object) => object,
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn host_record_schema() -> ResourceSchema {
    ResourceSchema::from_yaml_str(indoc! {"
        name: record:host
        fields:
          - name: name
            type: string
            access: required
          - name: comment
            type: string
            passthrough: true
          - name: addresses
            type: list
            minItems: 1
            element:
              type: string
          - name: expiresAt
            remoteName: expires_at
            type: timestamp
          - name: extattrs
            type: attributes
          - name: lastModified
            remoteName: last_modified
            type: timestamp
            access: computed
    "})
    .unwrap()
}

fn desired(config: Value) -> ResourceModel {
    convert::from_config(&object_of(config), &host_record_schema().root).unwrap()
}

fn mail_config() -> Value {
    json!({
        "name": "mail.example.com",
        "addresses": ["10.0.0.1", "10.0.0.2"],
        "expiresAt": "2030-01-01T00:00:00Z",
        "extattrs": {"Site": "HQ"},
    })
}

/// Plans and applies `config`.
fn write(
    remote: &InMemoryRemote,
    state: &mut ManagedState,
    config: Value,
    options: &EngineOptions,
) -> RemoteObject {
    let schema = host_record_schema();
    let plan = reconcile::plan_write(&desired(config), &schema, &RuleSet::default()).unwrap();
    reconcile::apply(remote, &schema, state, plan, options).unwrap()
}

fn observe(remote: &InMemoryRemote, state: &mut ManagedState) -> reconcile::Observation {
    reconcile::refresh(remote, &host_record_schema(), state)
        .unwrap()
        .observed()
        .expect("resource must still exist")
}

#[test]
fn create_and_read_back_without_drift() {
    let remote = InMemoryRemote::default();
    let mut state = ManagedState::new();

    let created = write(&remote, &mut state, mail_config(), &EngineOptions::default());

    let reference = state.reference().unwrap().to_owned();
    assert_eq!(reference, "record:host/0");
    assert_eq!(created["expires_at"], json!(1_893_456_000));
    assert_eq!(created["last_modified"], json!(LAST_MODIFIED));
    assert!(!created.contains_key("comment"));
    assert!(!state.is_imported());

    let observation = observe(&remote, &mut state);
    assert_eq!(
        observation.model.lookup("lastModified").unwrap().as_scalar(),
        Some(&"2024-03-01T12:00:00Z".into())
    );

    let drifts = drift::detect_drift(
        &desired(mail_config()),
        &observation.model,
        &host_record_schema().root,
        &state,
        &EngineOptions::default(),
    );
    assert!(drifts.is_empty(), "unexpected drift: {drifts:?}");
}

#[test]
fn foreign_attributes_survive_reads_and_writes() {
    let remote = InMemoryRemote::default();
    let mut state = ManagedState::new();
    write(&remote, &mut state, mail_config(), &EngineOptions::default());
    let reference = state.reference().unwrap().to_owned();

    // Another tool tags the record
    remote.edit(&reference, |object| {
        object["extattrs"]["Owner"] = json!("netops");
    });

    let observation = observe(&remote, &mut state);
    assert_eq!(
        observation.model.lookup("extattrs").unwrap().as_attributes(),
        Some(&BTreeMap::from([("Site".to_owned(), json!("HQ"))]))
    );
    let extattrs = &observation.attributes["extattrs"];
    assert!(extattrs.is_complete());
    assert_eq!(extattrs.foreign_keys().collect::<Vec<_>>(), ["Owner"]);
    assert!(
        drift::detect_drift(
            &desired(mail_config()),
            &observation.model,
            &host_record_schema().root,
            &state,
            &EngineOptions::default(),
        )
        .is_empty()
    );

    let mut config = mail_config();
    config["extattrs"]["Site"] = json!("Branch");
    let options = EngineOptions {
        replace_attributes: true,
        ..EngineOptions::default()
    };
    write(&remote, &mut state, config, &options);

    assert_eq!(
        remote.object(&reference)["extattrs"],
        json!({"Owner": "netops", "Site": "Branch"})
    );
}

#[test]
fn out_of_band_changes_are_drift() {
    let remote = InMemoryRemote::default();
    let mut state = ManagedState::new();
    write(&remote, &mut state, mail_config(), &EngineOptions::default());
    let reference = state.reference().unwrap().to_owned();

    remote.edit(&reference, |object| {
        object["addresses"] = json!(["10.0.0.2", "10.0.0.9"]);
        object["comment"] = json!("edited by hand");
        object["extattrs"].as_object_mut().unwrap().remove("Site");
    });

    let observation = observe(&remote, &mut state);
    let drifts: Vec<_> = drift::detect_drift(
        &desired(mail_config()),
        &observation.model,
        &host_record_schema().root,
        &state,
        &EngineOptions::default(),
    )
    .into_iter()
    .map(|drift| (drift.path.to_string(), drift.kind))
    .collect();

    assert_eq!(drifts, [
        ("comment".to_owned(), DriftKind::Unexpected),
        ("addresses".to_owned(), DriftKind::Changed),
        ("extattrs".to_owned(), DriftKind::AttributeMissing {
            key: "Site".to_owned()
        }),
    ]);
}

#[test]
fn import_by_name_sets_marker_once() {
    let remote = InMemoryRemote::default();
    let schema = host_record_schema();
    let reference = remote.seed(
        "record:host",
        json!({
            "name": "mail.example.com",
            "comment": "created by the installer",
            "addresses": ["10.0.0.1"],
            "view": "internal",
            "extattrs": {"Site": "HQ", "Owner": "netops"},
        }),
    );
    let lookup = ClientLookup::new(&remote, &schema.name);
    let target = IdentityTarget::SecondaryKey(SecondaryKey::new("name", "mail.example.com"));
    let scope = LookupScope::default().with_view("internal");
    let mut state = ManagedState::new();

    let outcome =
        reconcile::import(&remote, &lookup, &schema, target.clone(), &scope, &mut state).unwrap();

    let ReadOutcome::Observed(observation) = outcome else {
        panic!("imported resource must be observed");
    };
    assert_eq!(state.reference(), Some(reference.as_str()));
    assert_eq!(state.import_marker().unwrap().reference, reference);

    // The user never declared the informational comment
    let declared = desired(json!({
        "name": "mail.example.com",
        "addresses": ["10.0.0.1"],
    }));
    assert!(
        drift::detect_drift(
            &declared,
            &observation.model,
            &schema.root,
            &state,
            &EngineOptions::default(),
        )
        .iter()
        .all(|drift| drift.path.to_string() != "comment")
    );

    reconcile::import(&remote, &lookup, &schema, target, &scope, &mut state).unwrap();
    assert_eq!(state.import_marker().unwrap().reference, reference);
}

#[test]
fn ambiguous_import_is_rejected() {
    let remote = InMemoryRemote::default();
    let schema = host_record_schema();
    for view in ["internal", "external"] {
        remote.seed(
            "record:host",
            json!({"name": "mail.example.com", "view": view}),
        );
    }
    let lookup = ClientLookup::new(&remote, &schema.name);
    let target = IdentityTarget::SecondaryKey(SecondaryKey::new("name", "mail.example.com"));
    let mut state = ManagedState::new();

    let err = reconcile::import(
        &remote,
        &lookup,
        &schema,
        target.clone(),
        &LookupScope::default(),
        &mut state,
    )
    .unwrap_err();

    let ImportError::Resolve {
        source: ResolutionError::Ambiguous { references, .. },
    } = &err
    else {
        panic!("expected an ambiguous lookup, got {err:?}");
    };
    assert_eq!(references, &["record:host/0", "record:host/1"]);
    assert_eq!(state, ManagedState::new());

    // Narrowing the scope makes the key unique
    reconcile::import(
        &remote,
        &lookup,
        &schema,
        target,
        &LookupScope::default().with_view("external"),
        &mut state,
    )
    .unwrap();
    assert_eq!(state.reference(), Some("record:host/1"));
}

#[test]
fn out_of_band_deletion_resets_state() {
    let remote = InMemoryRemote::default();
    let mut state = ManagedState::new();
    write(&remote, &mut state, mail_config(), &EngineOptions::default());
    remote.remove("record:host/0");

    let outcome = reconcile::refresh(&remote, &host_record_schema(), &mut state).unwrap();

    assert_eq!(outcome, ReadOutcome::Gone);
    assert_eq!(state.identity(), None);

    // The next write creates a new resource
    write(&remote, &mut state, mail_config(), &EngineOptions::default());
    assert_eq!(state.reference(), Some("record:host/1"));
}

#[test]
fn delete_independent_resource() {
    let remote = InMemoryRemote::default();
    let mut state = ManagedState::new();
    write(&remote, &mut state, mail_config(), &EngineOptions::default());

    let outcome = reconcile::delete(&remote, &host_record_schema(), &mut state).unwrap();

    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(remote.delete_calls.load(Ordering::SeqCst), 1);
    assert!(remote.objects.lock().unwrap().is_empty());
    assert!(state.is_released());
}

#[test]
fn dependent_resources_are_only_released() {
    let remote = InMemoryRemote::default();
    let schema = ResourceSchema::from_yaml_str(indoc! {"
        name: member:dns
        lifecycle: dependentOnParent
        fields:
          - name: hostName
            remoteName: host_name
            type: string
            access: required
          - name: allowRecursion
            remoteName: allow_recursion
            type: bool
    "})
    .unwrap();
    assert_eq!(schema.lifecycle, ResourceLifecycle::DependentOnParent);
    let reference = remote.seed(
        "member:dns",
        json!({"host_name": "ns1.example.com", "allow_recursion": true}),
    );
    let mut state = ManagedState::new();
    reconcile::import(
        &remote,
        &ClientLookup::new(&remote, &schema.name),
        &schema,
        IdentityTarget::Reference(reference.clone()),
        &LookupScope::default(),
        &mut state,
    )
    .unwrap();

    let outcome = reconcile::delete(&remote, &schema, &mut state).unwrap();

    assert_eq!(outcome, DeleteOutcome::Released);
    assert_eq!(remote.delete_calls.load(Ordering::SeqCst), 0);
    assert!(remote.objects.lock().unwrap().contains_key(&reference));
    assert_eq!(state.identity(), None);
    assert!(state.is_imported());
}

#[test]
fn one_invalid_resource_does_not_block_others() {
    let schema = host_record_schema();
    let models = [
        desired(mail_config()),
        desired(json!({"name": "www.example.com", "addresses": []})),
    ];

    let plans = reconcile::plan_writes(&models, &schema, &RuleSet::default());

    assert!(plans[0].is_ok());
    let err = plans[1].as_ref().unwrap_err();
    assert_eq!(err.to_string(), "desired state is invalid");
}
