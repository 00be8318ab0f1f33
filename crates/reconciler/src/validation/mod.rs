//! Cross-field validation of a [`ResourceModel`] before it is written.
//!
//! Validation runs in three passes and reports every violation at once:
//!
//! 1. Preconditions derived from the schema: [`Access::Required`] fields must
//!    not be null and collections must honour their `minItems`.
//! 2. Declarative [`Rule`]s of the form `when <field> <predicate>, then
//!    <constraint>`. A rule only fires once its controlling field is known,
//!    and constrained fields that are not known yet are skipped.
//! 3. Imperative [`CustomCheck`]s registered on the [`RuleSet`] for conditions
//!    the declarative rules cannot express.
//!
//! Rule sets are usually written in YAML next to the resource schema:
//!
//! ```
//! # use reconciler::validation::RuleSet;
//! let rules = RuleSet::from_yaml_str(
//!     r#"
//! rules:
//!   - id: integerDefault
//!     when: { field: type, equals: INTEGER }
//!     then: { parsesAs: { field: default, kind: integer } }
//!   - id: boundsNeedIntegerOrString
//!     when: { field: type, notOneOf: [INTEGER, STRING] }
//!     then: { absent: [lowBound, highBound] }
//! "#,
//! )
//! .unwrap();
//! assert_eq!(rules.rules.len(), 2);
//! ```
use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    path::FieldPath,
    schema::{Access, CollectionSchema, FieldKind, ObjectSchema},
    value::{ModelValue, ResourceModel, Scalar, ScalarKind},
};

/// The rule id reported for null [`Access::Required`] fields.
pub const REQUIRED_RULE_ID: &str = "required";

/// The rule id reported for collections below their minimum size.
pub const MIN_ITEMS_RULE_ID: &str = "minItems";

#[derive(Debug, Snafu)]
pub enum RuleSetError {
    #[snafu(display("failed to deserialize rule set from YAML"))]
    DeserializeYaml { source: serde_yaml::Error },
}

/// A single violation.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ValidationError {
    #[snafu(display("rule {rule_id:?} is violated by {fields:?}"))]
    ConstraintViolated { rule_id: String, fields: Vec<String> },
}

impl ValidationError {
    pub fn rule_id(&self) -> &str {
        match self {
            Self::ConstraintViolated { rule_id, .. } => rule_id,
        }
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Self::ConstraintViolated { fields, .. } => fields,
        }
    }
}

/// All violations of one resource.
#[derive(Debug, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the violation reported by `rule_id`, if any.
    pub fn get(&self, rule_id: &str) -> Option<&ValidationError> {
        self.0.iter().find(|error| error.rule_id() == rule_id)
    }
}

impl Display for ValidationErrors {
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
impl std::error::Error for ValidationErrors {}

/// A condition on the value of a single scalar field.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    Equals(Scalar),
    OneOf(Vec<Scalar>),
    NotOneOf(Vec<Scalar>),
}

impl Predicate {
    pub fn matches(&self, value: &Scalar) -> bool {
        match self {
            Self::Equals(expected) => expected == value,
            Self::OneOf(candidates) => candidates.contains(value),
            Self::NotOneOf(candidates) => !candidates.contains(value),
        }
    }
}

/// The `when` part of a [`Rule`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Condition {
    /// Dotted path of the controlling field, such as `settings.mode`.
    pub field: String,

    #[serde(flatten)]
    pub predicate: Predicate,
}

/// The `then` part of a [`Rule`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Constraint {
    /// The fields must be null.
    Absent(Vec<String>),

    /// The fields must not be null.
    Present(Vec<String>),

    /// The field, usually a free-form string, must parse as `kind`.
    ParsesAs { field: String, kind: ScalarKind },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Rule {
    pub id: String,
    pub when: Condition,
    pub then: Constraint,
}

impl Rule {
    pub fn new(id: impl Into<String>, when: Condition, then: Constraint) -> Self {
        Self {
            id: id.into(),
            when,
            then,
        }
    }

    /// Returns the fields violating this rule, [`None`] if the rule does not
    /// apply or holds.
    fn evaluate(&self, model: &ResourceModel) -> Option<Vec<String>> {
        let controlling = model.lookup(&self.when.field)?.as_scalar()?;
        if !self.when.predicate.matches(controlling) {
            return None;
        }

        let violating: Vec<String> = match &self.then {
            Constraint::Absent(fields) => fields
                .iter()
                .filter(|field| model.lookup(field).is_some_and(ModelValue::is_known))
                .cloned()
                .collect(),
            Constraint::Present(fields) => fields
                .iter()
                .filter(|field| model.lookup(field).is_none_or(ModelValue::is_null))
                .cloned()
                .collect(),
            Constraint::ParsesAs { field, kind } => model
                .lookup(field)
                .and_then(ModelValue::as_scalar)
                .filter(|value| !parses_as(value, *kind))
                .map(|_| field.clone())
                .into_iter()
                .collect(),
        };

        (!violating.is_empty()).then_some(violating)
    }
}

fn parses_as(value: &Scalar, kind: ScalarKind) -> bool {
    match value {
        Scalar::String(input) => kind.parse(input).is_some(),
        other => kind.accepts(other),
    }
}

/// An imperative validation step.
pub trait CustomCheck: Send + Sync {
    /// The rule id reported for violations.
    fn id(&self) -> &str;

    /// Returns the offending fields on failure.
    fn check(&self, model: &ResourceModel) -> Result<(), Vec<String>>;
}

/// A [`CustomCheck`] backed by a closure.
pub struct FnCheck<F> {
    id: String,
    check: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&ResourceModel) -> Result<(), Vec<String>> + Send + Sync,
{
    pub fn new(id: impl Into<String>, check: F) -> Self {
        Self {
            id: id.into(),
            check,
        }
    }
}

impl<F> CustomCheck for FnCheck<F>
where
    F: Fn(&ResourceModel) -> Result<(), Vec<String>> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn check(&self, model: &ResourceModel) -> Result<(), Vec<String>> {
        (self.check)(model)
    }
}

/// The validation rules of one resource type.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(skip)]
    checks: Vec<Arc<dyn CustomCheck>>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rules)
            .field(
                "checks",
                &self.checks.iter().map(|check| check.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RuleSet {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            checks: Vec::new(),
        }
    }

    /// Parses a rule set from YAML. Predicates and constraints are written
    /// as single-key maps, such as `then: { absent: [lowBound] }`.
    pub fn from_yaml_str(input: &str) -> Result<Self, RuleSetError> {
        let deserializer = serde_yaml::Deserializer::from_str(input);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer)
            .context(DeserializeYamlSnafu)
    }

    /// Registers an imperative check that runs after the declarative rules.
    pub fn with_check(mut self, check: impl CustomCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }
}

/// Validates `model` against the preconditions of `schema` and all rules of
/// `rules`.
pub fn validate(
    model: &ResourceModel,
    schema: &ObjectSchema,
    rules: &RuleSet,
) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    check_object(model, schema, &FieldPath::root(), &mut errors);

    for rule in &rules.rules {
        if let Some(fields) = rule.evaluate(model) {
            errors.push(ValidationError::ConstraintViolated {
                rule_id: rule.id.clone(),
                fields,
            });
        }
    }

    for check in &rules.checks {
        if let Err(fields) = check.check(model) {
            errors.push(ValidationError::ConstraintViolated {
                rule_id: check.id().to_owned(),
                fields,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        for error in &errors {
            tracing::debug!(%error, "validation failed");
        }
        Err(ValidationErrors(errors))
    }
}

fn check_object(
    model: &ResourceModel,
    schema: &ObjectSchema,
    path: &FieldPath,
    errors: &mut Vec<ValidationError>,
) {
    for field in &schema.fields {
        let path = path.field(&field.name);
        let value = model.get(&field.name);

        if field.access == Access::Required && value.is_none_or(ModelValue::is_null) {
            errors.push(ValidationError::ConstraintViolated {
                rule_id: REQUIRED_RULE_ID.to_owned(),
                fields: vec![path.to_string()],
            });
            continue;
        }

        if let Some(value) = value {
            check_value(value, &field.kind, &path, errors);
        }
    }
}

fn check_value(
    value: &ModelValue,
    kind: &FieldKind,
    path: &FieldPath,
    errors: &mut Vec<ValidationError>,
) {
    match kind {
        FieldKind::Object(object) => {
            if let Some(nested) = value.as_object() {
                check_object(nested, object, path, errors);
            }
        }
        FieldKind::List(collection) => {
            if let Some(items) = value.as_items() {
                check_items(items, collection, path, errors);
            }
        }
        _ => {}
    }
}

fn check_items(
    items: &[ModelValue],
    collection: &CollectionSchema,
    path: &FieldPath,
    errors: &mut Vec<ValidationError>,
) {
    if collection
        .min_items
        .is_some_and(|min_items| items.len() < min_items)
    {
        errors.push(ValidationError::ConstraintViolated {
            rule_id: MIN_ITEMS_RULE_ID.to_owned(),
            fields: vec![path.to_string()],
        });
    }

    for (index, item) in items.iter().enumerate() {
        check_value(item, &collection.element, &path.index(index), errors);
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::schema::{CollectionOrdering, FieldSchema, ResourceSchema};

    fn schema() -> ObjectSchema {
        ResourceSchema::from_yaml_str(indoc! {"
            name: extensible-attribute-definition
            fields:
              - name: name
                type: string
                access: required
              - name: type
                type: string
                access: required
              - name: default
                type: string
              - name: lowBound
                type: integer
              - name: highBound
                type: integer
              - name: listValues
                type: list
                minItems: 1
                element:
                  type: string
        "})
        .unwrap()
        .root
    }

    fn rules() -> RuleSet {
        RuleSet::from_yaml_str(indoc! {"
            rules:
              - id: integerDefault
                when: { field: type, equals: INTEGER }
                then: { parsesAs: { field: default, kind: integer } }
              - id: boundsNeedIntegerOrString
                when: { field: type, notOneOf: [INTEGER, STRING] }
                then: { absent: [lowBound, highBound] }
              - id: enumValues
                when: { field: type, equals: ENUM }
                then: { present: [listValues] }
        "})
        .unwrap()
    }

    fn definition(kind: &str) -> ResourceModel {
        ResourceModel::new()
            .with("name", ModelValue::string("Site"))
            .with("type", ModelValue::string(kind))
    }

    #[rstest]
    #[case::string_default(definition("STRING").with("default", ModelValue::string("7")))]
    #[case::integer_default(definition("INTEGER").with("default", ModelValue::string("7")))]
    #[case::integer_bounds(
        definition("INTEGER")
            .with("lowBound", ModelValue::integer(1))
            .with("highBound", ModelValue::integer(10))
    )]
    #[case::string_bounds(definition("STRING").with("lowBound", ModelValue::integer(1)))]
    #[case::enum_values(
        definition("ENUM").with("listValues", ModelValue::set([ModelValue::string("a")]))
    )]
    #[case::unknown_controlling_field(
        ResourceModel::new()
            .with("name", ModelValue::string("Site"))
            .with("type", ModelValue::unknown())
            .with("lowBound", ModelValue::integer(1))
    )]
    #[case::unknown_constrained_field(
        definition("STRING").with("lowBound", ModelValue::unknown())
    )]
    fn valid(#[case] model: ResourceModel) {
        validate(&model, &schema(), &rules()).unwrap();
    }

    #[test]
    fn rules_parse_from_single_key_maps() {
        let rules = rules();

        assert_eq!(rules.rules[0].when, Condition {
            field: "type".to_owned(),
            predicate: Predicate::Equals(Scalar::String("INTEGER".to_owned())),
        });
        assert_eq!(rules.rules[0].then, Constraint::ParsesAs {
            field: "default".to_owned(),
            kind: ScalarKind::Integer,
        });
        assert_eq!(
            rules.rules[1].then,
            Constraint::Absent(vec!["lowBound".to_owned(), "highBound".to_owned()])
        );
        assert_eq!(
            rules.rules[2].then,
            Constraint::Present(vec!["listValues".to_owned()])
        );
    }

    #[rstest]
    #[case::not_a_number("abc")]
    #[case::padded(" 7 ")]
    fn integer_default_must_parse(#[case] default: &str) {
        let model = definition("INTEGER").with("default", ModelValue::string(default));

        let errors = validate(&model, &schema(), &rules()).unwrap_err();

        assert_eq!(
            errors.iter().collect::<Vec<_>>(),
            [&ValidationError::ConstraintViolated {
                rule_id: "integerDefault".to_owned(),
                fields: vec!["default".to_owned()],
            }]
        );
    }

    #[test]
    fn bounds_are_rejected_for_enums() {
        let model = definition("ENUM")
            .with("listValues", ModelValue::set([ModelValue::string("a")]))
            .with("lowBound", ModelValue::integer(1));

        let errors = validate(&model, &schema(), &rules()).unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get("boundsNeedIntegerOrString").map(ValidationError::fields),
            Some(["lowBound".to_owned()].as_slice())
        );
    }

    #[test]
    fn all_violations_are_reported_together() {
        let model = ResourceModel::new()
            .with("type", ModelValue::string("ENUM"))
            .with("highBound", ModelValue::integer(3))
            .with("listValues", ModelValue::Set(crate::value::TriState::Known(Vec::new())));

        let errors = validate(&model, &schema(), &rules()).unwrap_err();

        assert_eq!(
            errors
                .iter()
                .map(|error| (error.rule_id(), error.fields().join(",")))
                .collect::<Vec<_>>(),
            [
                (REQUIRED_RULE_ID, "name".to_owned()),
                (MIN_ITEMS_RULE_ID, "listValues".to_owned()),
                ("boundsNeedIntegerOrString", "highBound".to_owned()),
            ]
        );
    }

    #[test]
    fn present_constraint() {
        let errors = validate(&definition("ENUM"), &schema(), &rules()).unwrap_err();
        assert_eq!(
            errors.to_string(),
            r#"rule "enumValues" is violated by ["listValues"]"#
        );
    }

    #[test]
    fn nested_preconditions_report_paths() {
        let schema = ObjectSchema::new([FieldSchema::new(
            "rules",
            CollectionSchema::new(
                CollectionOrdering::Ordered,
                ObjectSchema::new([FieldSchema::new("port", ScalarKind::Integer).required()]),
            ),
        )]);
        let model = ResourceModel::new().with(
            "rules",
            ModelValue::list([
                ModelValue::object(ResourceModel::new().with("port", ModelValue::integer(1))),
                ModelValue::object(ResourceModel::new()),
            ]),
        );

        let errors = validate(&model, &schema, &RuleSet::default()).unwrap_err();
        assert_eq!(
            errors.get(REQUIRED_RULE_ID).map(ValidationError::fields),
            Some(["rules[1].port".to_owned()].as_slice())
        );
    }

    #[test]
    fn custom_checks_run_alongside_rules() {
        let rules = rules().with_check(FnCheck::new("boundsOrdered", |model: &ResourceModel| {
            let bound = |name| model.get(name).and_then(ModelValue::as_scalar).and_then(Scalar::as_i64);
            match (bound("lowBound"), bound("highBound")) {
                (Some(low), Some(high)) if low > high => {
                    Err(vec!["lowBound".to_owned(), "highBound".to_owned()])
                }
                _ => Ok(()),
            }
        }));

        let model = definition("INTEGER")
            .with("lowBound", ModelValue::integer(10))
            .with("highBound", ModelValue::integer(1));

        let errors = validate(&model, &schema(), &rules).unwrap_err();
        assert_eq!(
            errors.get("boundsOrdered").map(ValidationError::fields),
            Some(["lowBound".to_owned(), "highBound".to_owned()].as_slice())
        );
    }
}
