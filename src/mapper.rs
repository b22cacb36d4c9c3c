//! Entity mapper - statements to typed properties and back
//!
//! The load direction (`hydrate`) is best-effort: a malformed value coming
//! out of a possibly hand-edited repository degrades to a default instead of
//! failing the load. The save direction is caller-validated and emits at
//! most one statement per predicate.

use crate::entity::{Entity, PropertyValue};
use crate::schema::{PropertySpec, ValueType};
use crate::statement::{Object, Statement, StatementGraph, Subject};
use crate::vocab;
use crate::{Error, Result};

/// Literal tokens recognized as boolean true on the way in.
const TRUE_TOKENS: &[&str] = &["true", "1"];

/// Converts between a `StatementGraph` and an entity's typed properties.
pub struct EntityMapper;

impl EntityMapper {
    /// Populate the entity from a freshly fetched graph.
    ///
    /// Replaces the entity's graph wholesale (unknown predicates ride along
    /// for later round-tripping), extracts the contained-in statement into
    /// identity state, assigns every declared property via best-effort
    /// coercion, and marks the entity persisted.
    pub fn hydrate(entity: &mut Entity, graph: StatementGraph) {
        let parent = graph.value_of(vocab::HAS_PARENT).map(|o| o.as_str().to_string());
        entity.replace_graph(graph);
        entity.set_parent_url_internal(parent);

        let specs: Vec<PropertySpec> = entity.schema().properties().to_vec();
        for spec in specs {
            match coerce_in(&spec, entity.graph().value_of(&spec.predicate)) {
                Some(value) => entity.set_property_internal(&spec.name, value),
                None => entity.clear_property_internal(&spec.name),
            }
        }
        entity.mark_persisted();
    }

    /// Build the minimal set of statements the entity should assert: one per
    /// non-empty declared property, one per resolved belongs-to association.
    pub fn build_outgoing_diff(entity: &Entity) -> Result<StatementGraph> {
        let mut diff = StatementGraph::new();
        for spec in entity.schema().properties() {
            if let Some(value) = entity.get(&spec.name) {
                if let Some(object) = coerce_out(spec, value)? {
                    diff.add(Statement::new(Subject::This, spec.predicate.clone(), object));
                }
            }
        }
        for assoc in entity.schema().belongs_to_associations() {
            if let Some(target) = entity.resolved_associations.get(&assoc.name) {
                let target_url = target.url().ok_or_else(|| {
                    Error::Invariant(format!(
                        "belongs_to target for {:?} has no repository address; save it first",
                        assoc.name
                    ))
                })?;
                let Some(predicate) = assoc.predicate.as_deref() else { continue };
                diff.add(Statement::reference(predicate, target_url));
            }
        }
        Ok(diff)
    }

    /// Fold the outgoing diff into the entity's own graph, dropping any
    /// stale statement for each mapped predicate first. The resulting graph
    /// is what a full replace-style write submits.
    pub fn apply_outgoing(entity: &mut Entity) -> Result<()> {
        let diff = Self::build_outgoing_diff(entity)?;
        for spec in entity.schema().properties().to_vec() {
            entity.graph_mut().remove(None, Some(&spec.predicate), None);
        }
        let predicates: Vec<String> = entity
            .schema()
            .belongs_to_associations()
            .filter_map(|a| a.predicate.clone())
            .collect();
        for predicate in predicates {
            entity.graph_mut().remove(None, Some(&predicate), None);
        }
        entity.graph_mut().merge_from(&diff);
        Ok(())
    }

    /// Translate the outgoing diff into a delete/insert change-set: one
    /// wildcard delete per mapped predicate, one insert per asserted
    /// statement.
    pub fn change_set(entity: &Entity) -> Result<ChangeSet> {
        let diff = Self::build_outgoing_diff(entity)?;
        let mut change_set = ChangeSet::new();
        for spec in entity.schema().properties() {
            change_set.delete(&spec.predicate);
        }
        for assoc in entity.schema().belongs_to_associations() {
            if let Some(predicate) = &assoc.predicate {
                change_set.delete(predicate);
            }
        }
        for st in diff.iter() {
            change_set.insert(st.clone());
        }
        Ok(change_set)
    }
}

/// Best-effort inbound coercion. `None` means the property is absent.
/// Malformed numerics degrade to zero rather than failing the load.
fn coerce_in(spec: &PropertySpec, object: Option<&Object>) -> Option<PropertyValue> {
    let object = object?;
    let lexical = object.as_str();
    Some(match spec.value_type {
        ValueType::String => PropertyValue::String(lexical.to_string()),
        ValueType::Uri => PropertyValue::Uri(lexical.to_string()),
        ValueType::Boolean => PropertyValue::Boolean(TRUE_TOKENS.contains(&lexical)),
        ValueType::Integer => PropertyValue::Integer(lexical.parse().unwrap_or(0)),
        ValueType::Float => PropertyValue::Float(lexical.parse().unwrap_or(0.0)),
    })
}

/// Outbound coercion, the inverse of `coerce_in`. Empty values produce no
/// statement. A type mismatch here is a caller bug.
fn coerce_out(spec: &PropertySpec, value: &PropertyValue) -> Result<Option<Object>> {
    if value.is_empty() {
        return Ok(None);
    }
    if value.value_type() != spec.value_type {
        return Err(Error::Invariant(format!(
            "property {:?} is declared {} but holds a {}",
            spec.name,
            spec.value_type.as_str(),
            value.value_type().as_str()
        )));
    }
    Ok(Some(match spec.value_type {
        ValueType::Uri => Object::Uri(value.lexical()),
        ValueType::Boolean => Object::Literal(
            match value {
                PropertyValue::Boolean(true) => "true",
                _ => "false",
            }
            .to_string(),
        ),
        _ => Object::Literal(value.lexical()),
    }))
}

/// Builder for a delete/insert change-set in the repository's patch syntax.
/// Each delete is a wildcard clause for one predicate; inserts follow. Not a
/// general-purpose update language, just the subset the mapper emits.
#[derive(Debug, Default)]
pub struct ChangeSet {
    deletes: Vec<String>,
    inserts: Vec<Statement>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(&mut self, predicate: &str) -> &mut Self {
        if !self.deletes.iter().any(|p| p == predicate) {
            self.deletes.push(predicate.to_string());
        }
        self
    }

    pub fn insert(&mut self, statement: Statement) -> &mut Self {
        if !self.inserts.contains(&statement) {
            self.inserts.push(statement);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }

    /// Serialize into the patch wire form.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        for predicate in &self.deletes {
            out.push_str(&format!("DELETE WHERE {{ <> <{}> ?change }};\n", predicate));
        }
        out.push_str("INSERT {\n");
        let inserts: Vec<String> = self
            .inserts
            .iter()
            .map(|st| format!("  {} <{}> {}", st.subject, st.predicate, st.object))
            .collect();
        out.push_str(&inserts.join(" .\n"));
        out.push_str(" .\n}\nWHERE { }");
        out
    }
}
