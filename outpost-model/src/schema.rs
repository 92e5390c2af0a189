use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Describes a record type's structure for payload validation and sync.
///
/// Built once at startup and treated as immutable for the lifetime of a
/// sync session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSchema {
    pub model_type: String,
    pub fields: Vec<ModelField>,
    /// Name of the field holding the record's stable identifier.
    pub identity_field: String,
    /// Ownership/authorization metadata. Read-only; used to shape outgoing
    /// payloads, never to enforce access locally.
    pub auth_rules: Vec<AuthRule>,
}

impl ModelSchema {
    /// Creates a schema with the conventional `id` identity field.
    #[must_use]
    pub fn new(model_type: impl Into<String>, fields: Vec<ModelField>) -> Self {
        Self {
            model_type: model_type.into(),
            fields,
            identity_field: "id".to_string(),
            auth_rules: Vec::new(),
        }
    }

    /// Overrides the identity field name.
    #[must_use]
    pub fn with_identity(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    /// Adds an auth rule.
    #[must_use]
    pub fn with_auth_rule(mut self, rule: AuthRule) -> Self {
        self.auth_rules.push(rule);
        self
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&ModelField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks that an outgoing payload has the shape this schema declares.
    ///
    /// Every required field must be present and non-null, and present fields
    /// must match their declared kind. Unknown fields are allowed — newer
    /// clients may carry fields this device's schema predates.
    pub fn validate_payload(&self, payload: &serde_json::Value) -> crate::Result<()> {
        let object = payload.as_object().ok_or_else(|| ModelError::NotAnObject {
            model_type: self.model_type.clone(),
        })?;

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(serde_json::Value::Null) => {
                    if field.required {
                        return Err(ModelError::MissingField {
                            model_type: self.model_type.clone(),
                            field: field.name.clone(),
                        });
                    }
                }
                Some(value) => {
                    if !field.kind.matches(value) {
                        return Err(ModelError::WrongKind {
                            model_type: self.model_type.clone(),
                            field: field.name.clone(),
                            expected: field.kind.name(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// A single field of a record model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl ModelField {
    fn simple(name: &str, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
        }
    }

    /// Shorthand for a string field.
    pub fn string(name: &str, required: bool) -> Self {
        Self::simple(name, FieldKind::String, required)
    }

    /// Shorthand for a numeric field.
    pub fn number(name: &str, required: bool) -> Self {
        Self::simple(name, FieldKind::Number, required)
    }

    /// Shorthand for a boolean field.
    pub fn bool(name: &str, required: bool) -> Self {
        Self::simple(name, FieldKind::Bool, required)
    }

    /// Shorthand for an ISO-8601 date-time string field.
    pub fn datetime(name: &str, required: bool) -> Self {
        Self::simple(name, FieldKind::DateTime, required)
    }

    /// Shorthand for a nested JSON field.
    pub fn json(name: &str, required: bool) -> Self {
        Self::simple(name, FieldKind::Json, required)
    }

    /// Shorthand for a reference to another record (its id).
    pub fn reference(name: &str, required: bool) -> Self {
        Self::simple(name, FieldKind::Reference, required)
    }
}

/// The data type of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    DateTime,
    Json,
    Reference,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Reference => "reference",
        }
    }

    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String | Self::DateTime | Self::Reference => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Json => true,
        }
    }
}

/// Who may operate on records of a model, as declared by the backend schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRule {
    pub strategy: AuthStrategy,
    /// Field naming the owning principal, for owner-based rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_field: Option<String>,
}

impl AuthRule {
    /// Owner-based rule over the conventional `owner` field.
    #[must_use]
    pub fn owner() -> Self {
        Self {
            strategy: AuthStrategy::Owner,
            owner_field: Some("owner".to_string()),
        }
    }

    /// Rule allowing any signed-in principal.
    #[must_use]
    pub fn private() -> Self {
        Self {
            strategy: AuthStrategy::Private,
            owner_field: None,
        }
    }

    /// Rule allowing unauthenticated access.
    #[must_use]
    pub fn public() -> Self {
        Self {
            strategy: AuthStrategy::Public,
            owner_field: None,
        }
    }
}

/// Authorization strategy for an auth rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    Owner,
    Private,
    Public,
}

/// The set of model schemas registered for a session.
///
/// Cheap to clone; clones share the underlying registrations.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Arc<RwLock<HashMap<String, Arc<ModelSchema>>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous registration for the type.
    pub fn register(&self, schema: ModelSchema) {
        self.schemas
            .write()
            .expect("schema registry poisoned")
            .insert(schema.model_type.clone(), Arc::new(schema));
    }

    /// Looks up the schema for a model type.
    pub fn get(&self, model_type: &str) -> Option<Arc<ModelSchema>> {
        self.schemas
            .read()
            .expect("schema registry poisoned")
            .get(model_type)
            .cloned()
    }

    /// Returns all registered model type names.
    pub fn model_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .schemas
            .read()
            .expect("schema registry poisoned")
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Validates a payload against the registered schema for `model_type`.
    pub fn validate(&self, model_type: &str, payload: &serde_json::Value) -> crate::Result<()> {
        let schema = self
            .get(model_type)
            .ok_or_else(|| ModelError::UnknownModel(model_type.to_string()))?;
        schema.validate_payload(payload)
    }
}
