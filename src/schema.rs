//! Entity schemas - property and association declarations
//!
//! A schema maps a named entity type onto the two backing stores: each
//! property to a statement predicate and an index field, each association to
//! a target type plus the predicate or reverse index field that resolves it.
//!
//! Schemas are declared once through `SchemaBuilder` during a registration
//! phase, collected into an immutable `SchemaRegistry`, and read concurrently
//! thereafter. Nothing mutates a schema after `SchemaRegistry::build`.

use crate::entity::Entity;
use crate::session::Session;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Value type of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Uri,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Uri => "uri",
        }
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(ValueType::String),
            "integer" => Ok(ValueType::Integer),
            "float" => Ok(ValueType::Float),
            "boolean" => Ok(ValueType::Boolean),
            "uri" => Ok(ValueType::Uri),
            other => Err(Error::Schema(format!("unknown value type: {}", other))),
        }
    }
}

/// Mapping of one named property to a predicate and an index field.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub predicate: String,
    pub value_type: ValueType,
    pub index_field: String,
}

/// The two supported relationship shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    BelongsTo,
    HasMany,
}

/// Mapping of one named association to its target type and resolution keys.
///
/// Belongs-to resolves through `predicate` on the owning entity's graph;
/// has-many resolves through a reverse index query on `index_field`.
#[derive(Debug, Clone)]
pub struct AssociationSpec {
    pub name: String,
    pub kind: AssociationKind,
    pub target_type: String,
    pub predicate: Option<String>,
    pub index_field: String,
}

/// Shape of the entity on the repository side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityKind {
    /// A container resource holding only statements.
    #[default]
    Container,
    /// A binary resource: content plus a sidecar metadata graph.
    Binary,
}

/// Lifecycle points a hook can attach to. Hooks run synchronously, before
/// hooks ahead of the operation body and after hooks behind it, in
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeSave,
    AfterSave,
    BeforeDelete,
    AfterDelete,
    BeforeLoad,
    AfterLoad,
}

pub type Hook = Box<dyn Fn(&Session, &mut Entity) -> Result<()> + Send + Sync>;
pub type Validator = Box<dyn Fn(&Entity) -> std::result::Result<(), String> + Send + Sync>;

// Owned by the implicit containment hierarchy; declared associations may not
// shadow them.
const RESERVED_ASSOCIATION_NAMES: &[&str] = &["parent", "children"];

/// Immutable per-type schema: the complete mapping contract for one entity
/// type. Held behind an `Arc` by every entity instance of the type.
pub struct EntitySchema {
    pub type_name: String,
    pub class_uri: String,
    pub kind: EntityKind,
    properties: Vec<PropertySpec>,
    associations: Vec<AssociationSpec>,
    hooks: Vec<(HookPoint, Hook)>,
    validators: Vec<Validator>,
}

impl EntitySchema {
    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn associations(&self) -> &[AssociationSpec] {
        &self.associations
    }

    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn association(&self, name: &str) -> Option<&AssociationSpec> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn belongs_to_associations(&self) -> impl Iterator<Item = &AssociationSpec> {
        self.associations
            .iter()
            .filter(|a| a.kind == AssociationKind::BelongsTo)
    }

    /// Index field registered for a property name. This is the explicit
    /// finder map: `Session::find_by` looks fields up here by string key
    /// instead of deriving finder names at call time.
    pub fn index_field_for(&self, property_name: &str) -> Option<&str> {
        self.property(property_name).map(|p| p.index_field.as_str())
    }

    pub(crate) fn run_hooks(
        &self,
        point: HookPoint,
        session: &Session,
        entity: &mut Entity,
    ) -> Result<()> {
        for (p, hook) in &self.hooks {
            if *p == point {
                hook(session, entity)?;
            }
        }
        Ok(())
    }

    /// Run declared validators, collecting every message. Called before any
    /// create/update I/O.
    pub(crate) fn validate(&self, entity: &Entity) -> Result<()> {
        let messages: Vec<String> = self
            .validators
            .iter()
            .filter_map(|v| v(entity).err())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(messages.join("; ")))
        }
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("type_name", &self.type_name)
            .field("class_uri", &self.class_uri)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("associations", &self.associations)
            .field("hooks", &self.hooks.len())
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Builder for one entity type's schema. Declaration errors (blank options,
/// reserved association names, duplicate names) surface here, at definition
/// time, never at first use.
pub struct SchemaBuilder {
    type_name: String,
    class_uri: String,
    kind: EntityKind,
    properties: Vec<PropertySpec>,
    associations: Vec<AssociationSpec>,
    hooks: Vec<(HookPoint, Hook)>,
    validators: Vec<Validator>,
    error: Option<Error>,
}

impl SchemaBuilder {
    pub fn new(type_name: impl Into<String>, class_uri: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            class_uri: class_uri.into(),
            kind: EntityKind::Container,
            properties: Vec::new(),
            associations: Vec::new(),
            hooks: Vec::new(),
            validators: Vec::new(),
            error: None,
        }
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declare a property mapped to a predicate and an index field.
    pub fn property(
        mut self,
        name: &str,
        predicate: &str,
        value_type: ValueType,
        index_field: &str,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if name.is_empty() || predicate.is_empty() || index_field.is_empty() {
            self.fail(format!(
                "property declaration on {:?} is missing a required option",
                self.type_name
            ));
            return self;
        }
        if self.properties.iter().any(|p| p.name == name) {
            self.fail(format!("duplicate property {:?} on {:?}", name, self.type_name));
            return self;
        }
        if crate::vocab::is_managed(predicate) {
            self.fail(format!(
                "property {:?} maps a repository-managed predicate {:?}",
                name, predicate
            ));
            return self;
        }
        self.properties.push(PropertySpec {
            name: name.to_string(),
            predicate: predicate.to_string(),
            value_type,
            index_field: index_field.to_string(),
        });
        self
    }

    /// Declare a belongs-to association resolved through `predicate` and
    /// indexed (on this entity's documents) under `index_field`.
    pub fn belongs_to(
        mut self,
        name: &str,
        target_type: &str,
        predicate: &str,
        index_field: &str,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Err(e) = self.check_association(name, target_type) {
            self.error = Some(e);
            return self;
        }
        if predicate.is_empty() || index_field.is_empty() {
            self.fail(format!(
                "belongs_to {:?} on {:?} requires a predicate and an index field",
                name, self.type_name
            ));
            return self;
        }
        if crate::vocab::is_managed(predicate) {
            self.fail(format!(
                "belongs_to {:?} maps a repository-managed predicate {:?}",
                name, predicate
            ));
            return self;
        }
        self.associations.push(AssociationSpec {
            name: name.to_string(),
            kind: AssociationKind::BelongsTo,
            target_type: target_type.to_string(),
            predicate: Some(predicate.to_string()),
            index_field: index_field.to_string(),
        });
        self
    }

    /// Declare a has-many association resolved by a reverse index query on
    /// the target type's `index_field`.
    pub fn has_many(mut self, name: &str, target_type: &str, index_field: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Err(e) = self.check_association(name, target_type) {
            self.error = Some(e);
            return self;
        }
        if index_field.is_empty() {
            self.fail(format!(
                "has_many {:?} on {:?} requires an index field",
                name, self.type_name
            ));
            return self;
        }
        self.associations.push(AssociationSpec {
            name: name.to_string(),
            kind: AssociationKind::HasMany,
            target_type: target_type.to_string(),
            predicate: None,
            index_field: index_field.to_string(),
        });
        self
    }

    /// Attach a lifecycle hook.
    pub fn on<F>(mut self, point: HookPoint, hook: F) -> Self
    where
        F: Fn(&Session, &mut Entity) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push((point, Box::new(hook)));
        self
    }

    /// Attach a validation rule run before create/update I/O.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Entity) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn build(self) -> Result<EntitySchema> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.type_name.is_empty() || self.class_uri.is_empty() {
            return Err(Error::Schema(
                "schema requires a type name and a class URI".to_string(),
            ));
        }
        Ok(EntitySchema {
            type_name: self.type_name,
            class_uri: self.class_uri,
            kind: self.kind,
            properties: self.properties,
            associations: self.associations,
            hooks: self.hooks,
            validators: self.validators,
        })
    }

    fn check_association(&self, name: &str, target_type: &str) -> Result<()> {
        if name.is_empty() || target_type.is_empty() {
            return Err(Error::Schema(format!(
                "association declaration on {:?} is missing a required option",
                self.type_name
            )));
        }
        if RESERVED_ASSOCIATION_NAMES.contains(&name.to_lowercase().as_str()) {
            return Err(Error::Schema(format!(
                "cannot define an association named {:?}: the name is owned by the containment hierarchy",
                name
            )));
        }
        if self.associations.iter().any(|a| a.name == name) {
            return Err(Error::Schema(format!(
                "duplicate association {:?} on {:?}",
                name, self.type_name
            )));
        }
        Ok(())
    }

    fn fail(&mut self, message: String) {
        self.error = Some(Error::Schema(message));
    }
}

/// Immutable, process-wide registry of every declared entity schema, keyed by
/// type name and by class URI. Built once after the registration phase and
/// shared read-only.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_name: HashMap<String, Arc<EntitySchema>>,
    by_class_uri: HashMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Build the registry, checking cross-type consistency: unique names and
    /// class URIs, and every association target registered.
    pub fn build(schemas: Vec<EntitySchema>) -> Result<Self> {
        let mut registry = SchemaRegistry::default();
        for schema in schemas {
            let schema = Arc::new(schema);
            if registry
                .by_name
                .insert(schema.type_name.clone(), schema.clone())
                .is_some()
            {
                return Err(Error::Schema(format!(
                    "duplicate entity type {:?}",
                    schema.type_name
                )));
            }
            if registry
                .by_class_uri
                .insert(schema.class_uri.clone(), schema.clone())
                .is_some()
            {
                return Err(Error::Schema(format!(
                    "duplicate class URI {:?}",
                    schema.class_uri
                )));
            }
        }
        for schema in registry.by_name.values() {
            for assoc in schema.associations() {
                if !registry.by_name.contains_key(&assoc.target_type) {
                    return Err(Error::Schema(format!(
                        "association {:?} on {:?} targets unregistered type {:?}",
                        assoc.name, schema.type_name, assoc.target_type
                    )));
                }
            }
        }
        Ok(registry)
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<EntitySchema>> {
        self.by_name.get(type_name).cloned()
    }

    /// Schema whose class URI matches, used to resolve the concrete type of
    /// a fetched resource or index document.
    pub fn schema_for_class(&self, class_uri: &str) -> Option<Arc<EntitySchema>> {
        self.by_class_uri.get(class_uri).cloned()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|s| s.as_str())
    }
}
