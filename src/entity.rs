//! Persistable entity
//!
//! `Entity` is the one concrete persistable value: a schema handle plus
//! identity state, typed property values, and the owned statement graph.
//! Entity types are composed by pairing this struct with a per-type
//! `EntitySchema` rather than by subclassing; all behavior that differs by
//! type flows from the schema.
//!
//! Lifecycle: constructed transient, persisted after a successful create or
//! load, destroyed is terminal. Every mutator checks the destroyed marker
//! and fails instead of touching a destroyed entity.

use crate::repository::BinaryContent;
use crate::schema::{EntityKind, EntitySchema, ValueType};
use crate::statement::{Object, Statement, StatementGraph};
use crate::vocab;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uri(String),
}

impl PropertyValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            PropertyValue::String(_) => ValueType::String,
            PropertyValue::Integer(_) => ValueType::Integer,
            PropertyValue::Float(_) => ValueType::Float,
            PropertyValue::Boolean(_) => ValueType::Boolean,
            PropertyValue::Uri(_) => ValueType::Uri,
        }
    }

    /// Lexical form written to the graph.
    pub fn lexical(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Boolean(b) => b.to_string(),
            PropertyValue::Uri(u) => u.clone(),
        }
    }

    /// True for values that should not be asserted at all (empty strings).
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::String(s) => s.is_empty(),
            PropertyValue::Uri(u) => u.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            PropertyValue::Uri(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

/// One in-memory entity instance, exclusively owning its statement graph.
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<EntitySchema>,
    url: Option<String>,
    transaction_url: Option<String>,
    parent_url: Option<String>,
    requested_slug: Option<String>,
    persisted: bool,
    destroyed: bool,
    graph: StatementGraph,
    properties: HashMap<String, PropertyValue>,
    /// Memoized belongs-to targets, by association name.
    pub(crate) resolved_associations: HashMap<String, Box<Entity>>,
    /// Binary entities queued for save after this entity's next save.
    pub(crate) attachments: Vec<Entity>,
    /// Staged content for an unsaved binary entity.
    upload: Option<BinaryContent>,
    /// Relevance score populated in query results; never persisted.
    pub(crate) score: Option<f64>,
}

impl Entity {
    /// Construct a transient entity, pre-seeding the graph with the
    /// class-type statement the repository schema requires.
    pub fn new(schema: Arc<EntitySchema>, class_predicate: &str) -> Self {
        let mut graph = StatementGraph::new();
        graph.add(Statement::reference(class_predicate, schema.class_uri.clone()));
        Self {
            schema,
            url: None,
            transaction_url: None,
            parent_url: None,
            requested_slug: None,
            persisted: false,
            destroyed: false,
            graph,
            properties: HashMap::new(),
            resolved_associations: HashMap::new(),
            attachments: Vec::new(),
            upload: None,
            score: None,
        }
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn type_name(&self) -> &str {
        &self.schema.type_name
    }

    /// Canonical repository address, once assigned.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn parent_url(&self) -> Option<&str> {
        self.parent_url.as_deref()
    }

    pub fn transaction_url(&self) -> Option<&str> {
        self.transaction_url.as_deref()
    }

    pub fn requested_slug(&self) -> Option<&str> {
        self.requested_slug.as_deref()
    }

    pub fn persisted(&self) -> bool {
        self.persisted && !self.destroyed
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed
    }

    /// Relevance score from the query that produced this instance, if any.
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn graph(&self) -> &StatementGraph {
        &self.graph
    }

    pub fn set_parent_url(&mut self, url: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.parent_url = Some(url.into());
        Ok(())
    }

    pub fn set_requested_slug(&mut self, slug: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.requested_slug = Some(slug.into());
        Ok(())
    }

    pub fn set_transaction_url(&mut self, url: Option<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.transaction_url = url;
        Ok(())
    }

    /// Current value of a declared property.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Set a declared property. The value's type must match the schema
    /// declaration; anything else is a caller bug.
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        self.ensure_mutable()?;
        let value = value.into();
        let spec = self
            .schema
            .property(name)
            .ok_or_else(|| Error::Invariant(format!("{} has no property {:?}", self.type_name(), name)))?;
        if spec.value_type != value.value_type() {
            return Err(Error::Invariant(format!(
                "property {:?} is declared {} but was assigned a {}",
                name,
                spec.value_type.as_str(),
                value.value_type().as_str()
            )));
        }
        self.properties.insert(name.to_string(), value);
        Ok(())
    }

    /// Clear a declared property; its statement is removed on the next save.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        self.ensure_mutable()?;
        self.properties.remove(name);
        Ok(())
    }

    /// Stage content for a binary entity's first save.
    pub fn set_upload(&mut self, content: BinaryContent) -> Result<()> {
        self.ensure_mutable()?;
        if self.schema.kind != EntityKind::Binary {
            return Err(Error::Invariant(format!(
                "{} is not a binary entity type",
                self.type_name()
            )));
        }
        self.upload = Some(content);
        Ok(())
    }

    pub fn upload(&self) -> Option<&BinaryContent> {
        self.upload.as_ref()
    }

    /// Repository-assigned opaque identifier, available once persisted.
    pub fn identifier(&self) -> Option<&str> {
        self.graph.value_of(vocab::IDENTIFIER).map(Object::as_str)
    }

    /// Repository-assigned creation timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_of(vocab::CREATED)
    }

    /// Repository-assigned last-modification timestamp.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_of(vocab::LAST_MODIFIED)
    }

    /// Content byte size asserted by the repository on binary resources.
    pub fn content_size(&self) -> Option<u64> {
        self.graph
            .value_of(vocab::HAS_SIZE)
            .and_then(|o| o.as_str().parse().ok())
    }

    /// Address of the resource's statement graph. For binaries the graph
    /// lives at a sidecar address next to the content.
    pub fn metadata_url(&self) -> Option<String> {
        self.url.as_ref().map(|url| match self.schema.kind {
            EntityKind::Container => url.clone(),
            EntityKind::Binary => format!("{}/metadata", url.trim_end_matches('/')),
        })
    }

    /// Queue a binary entity for save right after this entity's next save.
    pub(crate) fn queue_attachment(&mut self, attachment: Entity) -> Result<()> {
        self.ensure_mutable()?;
        self.attachments.push(attachment);
        Ok(())
    }

    pub(crate) fn take_attachments(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.attachments)
    }

    pub(crate) fn set_url(&mut self, url: String) {
        self.url = Some(url);
    }

    pub(crate) fn set_parent_url_internal(&mut self, url: Option<String>) {
        self.parent_url = url;
    }

    pub(crate) fn clear_requested_slug(&mut self) {
        self.requested_slug = None;
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    /// Destroyed is terminal: persisted drops with it and never comes back.
    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
        self.persisted = false;
    }

    /// Replace the owned graph wholesale (reload path).
    pub(crate) fn replace_graph(&mut self, graph: StatementGraph) {
        self.graph = graph;
    }

    pub(crate) fn graph_mut(&mut self) -> &mut StatementGraph {
        &mut self.graph
    }

    pub(crate) fn set_property_internal(&mut self, name: &str, value: PropertyValue) {
        self.properties.insert(name.to_string(), value);
    }

    pub(crate) fn clear_property_internal(&mut self, name: &str) {
        self.properties.remove(name);
    }

    pub(crate) fn ensure_mutable(&self) -> Result<()> {
        if self.destroyed {
            return Err(Error::Invariant(format!(
                "{} entity has been destroyed and can no longer be mutated",
                self.type_name()
            )));
        }
        Ok(())
    }

    fn timestamp_of(&self, predicate: &str) -> Option<DateTime<Utc>> {
        self.graph
            .value_of(predicate)
            .and_then(|o| DateTime::parse_from_rfc3339(o.as_str()).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    fn schema() -> Arc<EntitySchema> {
        Arc::new(
            SchemaBuilder::new("item", "http://example.org/Item")
                .property("title", "http://example.org/title", ValueType::String, "title_s")
                .property("pages", "http://example.org/pageCount", ValueType::Integer, "pages_i")
                .build()
                .unwrap(),
        )
    }

    fn class_predicate() -> &'static str {
        "http://example.org/ns#class"
    }

    #[test]
    fn test_new_entity_is_transient_and_seeded() {
        let entity = Entity::new(schema(), class_predicate());
        assert!(!entity.persisted());
        assert!(!entity.destroyed());
        assert_eq!(
            entity.graph().value_of(class_predicate()).unwrap().as_str(),
            "http://example.org/Item"
        );
    }

    #[test]
    fn test_set_checks_declaration_and_type() {
        let mut entity = Entity::new(schema(), class_predicate());
        entity.set("title", "A Title").unwrap();
        assert_eq!(entity.get("title").unwrap().as_str(), Some("A Title"));

        assert!(matches!(entity.set("missing", "x"), Err(Error::Invariant(_))));
        assert!(matches!(entity.set("pages", "ten"), Err(Error::Invariant(_))));
        entity.set("pages", 10i64).unwrap();
    }

    #[test]
    fn test_destroyed_is_terminal() {
        let mut entity = Entity::new(schema(), class_predicate());
        entity.mark_persisted();
        entity.mark_destroyed();

        assert!(entity.destroyed());
        assert!(!entity.persisted());
        assert!(entity.set("title", "x").is_err());
        assert!(entity.set_parent_url("http://repo.example.org/rest").is_err());
        assert!(entity.clear("title").is_err());
    }

    #[test]
    fn test_repository_assigned_fields() {
        let mut entity = Entity::new(schema(), class_predicate());
        entity.graph_mut().add(Statement::literal(vocab::CREATED, "2024-03-01T10:30:00Z"));
        entity.graph_mut().add(Statement::literal(vocab::HAS_SIZE, "2048"));
        entity.graph_mut().add(Statement::literal(vocab::IDENTIFIER, "ab12"));

        assert_eq!(entity.created_at().unwrap().to_rfc3339(), "2024-03-01T10:30:00+00:00");
        assert_eq!(entity.content_size(), Some(2048));
        assert_eq!(entity.identifier(), Some("ab12"));
        assert!(entity.updated_at().is_none());
    }

    #[test]
    fn test_metadata_url_by_kind() {
        let mut container = Entity::new(schema(), class_predicate());
        container.set_url("http://repo.example.org/rest/item1".to_string());
        assert_eq!(container.metadata_url().unwrap(), "http://repo.example.org/rest/item1");

        let binary_schema = Arc::new(
            SchemaBuilder::new("bytestream", "http://example.org/Bytestream")
                .kind(EntityKind::Binary)
                .build()
                .unwrap(),
        );
        let mut binary = Entity::new(binary_schema, class_predicate());
        binary.set_url("http://repo.example.org/rest/bs1".to_string());
        assert_eq!(binary.metadata_url().unwrap(), "http://repo.example.org/rest/bs1/metadata");
    }

    #[test]
    fn test_upload_only_on_binary_kind() {
        let mut container = Entity::new(schema(), class_predicate());
        let content = BinaryContent::External { url: "http://files.example.org/a.tif".to_string() };
        assert!(container.set_upload(content).is_err());
    }
}
