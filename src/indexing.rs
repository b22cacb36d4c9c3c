//! Index document projection
//!
//! Flattens an entity into the JSON document the search index stores:
//! identity fields (address, class, parent, identifier) plus one field per
//! declared property and per belongs-to association. `register` wires the
//! projection into a schema's lifecycle so every save reindexes and every
//! delete de-indexes; with the index eventually consistent, a failed hook
//! surfaces immediately instead of leaving silent drift.

use crate::entity::{Entity, PropertyValue};
use crate::schema::{HookPoint, SchemaBuilder};
use crate::session::Session;
use crate::vocab;
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Project a persisted entity into its index document.
pub fn document_for(session: &Session, entity: &Entity) -> Result<Value> {
    let config = session.config();
    let url = entity.url().ok_or_else(|| {
        Error::Invariant(format!(
            "cannot index an unsaved {} entity",
            entity.type_name()
        ))
    })?;

    let mut doc = Map::new();
    doc.insert(config.id_field.clone(), Value::String(url.to_string()));
    doc.insert(
        config.class_field.clone(),
        Value::String(entity.schema().class_uri.clone()),
    );
    if let Some(parent) = entity.graph().value_of(vocab::HAS_PARENT) {
        doc.insert(
            config.parent_field.clone(),
            Value::String(parent.as_str().to_string()),
        );
    }
    if let Some(identifier) = entity.identifier() {
        doc.insert(
            config.identifier_field.clone(),
            Value::String(identifier.to_string()),
        );
    }

    let mut searchall = Vec::new();
    for spec in entity.schema().properties() {
        let Some(value) = entity.get(&spec.name) else { continue };
        if value.is_empty() {
            continue;
        }
        doc.insert(spec.index_field.clone(), json_value(value));
        searchall.push(value.lexical());
    }
    if !searchall.is_empty() {
        doc.insert(
            config.default_search_field.clone(),
            Value::String(searchall.join(" ")),
        );
    }

    for assoc in entity.schema().belongs_to_associations() {
        let Some(predicate) = assoc.predicate.as_deref() else { continue };
        if let Some(target) = entity.graph().value_of(predicate) {
            doc.insert(
                assoc.index_field.clone(),
                Value::String(target.as_str().to_string()),
            );
        }
    }

    Ok(Value::Object(doc))
}

fn json_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::String(s) | PropertyValue::Uri(s) => Value::String(s.clone()),
        PropertyValue::Integer(i) => Value::from(*i),
        PropertyValue::Float(f) => Value::from(*f),
        PropertyValue::Boolean(b) => Value::Bool(*b),
    }
}

/// Wire index maintenance into a schema: reindex after every save, de-index
/// after every delete.
pub fn register(builder: SchemaBuilder) -> SchemaBuilder {
    builder
        .on(HookPoint::AfterSave, |session: &Session, entity: &mut Entity| {
            let doc = document_for(session, entity)?;
            session.index().add_document(&doc)
        })
        .on(HookPoint::AfterDelete, |session: &Session, entity: &mut Entity| {
            let url = entity.url().ok_or_else(|| {
                Error::Invariant("deleted entity carries no address to de-index".to_string())
            })?;
            session.index().delete_document(url)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Statement;
    use crate::testing;

    #[test]
    fn test_document_shape() {
        let session = testing::session();
        let mut item = session.new_entity("item").unwrap();
        item.set("title", "A Map of Places").unwrap();
        item.set("pages", 42i64).unwrap();
        item.set_url("http://repo.example.org/rest/item1".to_string());
        item.graph_mut()
            .add(Statement::reference(vocab::HAS_PARENT, "http://repo.example.org/rest"));
        item.graph_mut().add(Statement::literal(vocab::IDENTIFIER, "ab12cd"));
        item.graph_mut().add(Statement::reference(
            "http://example.org/isMemberOf",
            "http://repo.example.org/rest/col1",
        ));

        let doc = document_for(&session, &item).unwrap();
        assert_eq!(doc["id"], "http://repo.example.org/rest/item1");
        assert_eq!(doc["class_s"], testing::ITEM_CLASS);
        assert_eq!(doc["parent_uri_s"], "http://repo.example.org/rest");
        assert_eq!(doc["identifier_s"], "ab12cd");
        assert_eq!(doc["title_s"], "A Map of Places");
        assert_eq!(doc["pages_i"], 42);
        assert_eq!(doc["collection_uri_s"], "http://repo.example.org/rest/col1");
        assert!(doc["searchall_txt"]
            .as_str()
            .unwrap()
            .contains("A Map of Places"));
    }

    #[test]
    fn test_unset_and_empty_properties_omitted() {
        let session = testing::session();
        let mut item = session.new_entity("item").unwrap();
        item.set("title", "").unwrap();
        item.set_url("http://repo.example.org/rest/item1".to_string());

        let doc = document_for(&session, &item).unwrap();
        assert!(doc.get("title_s").is_none());
        assert!(doc.get("pages_i").is_none());
        assert!(doc.get("searchall_txt").is_none());
    }

    #[test]
    fn test_unsaved_entity_rejected() {
        let session = testing::session();
        let item = session.new_entity("item").unwrap();
        assert!(document_for(&session, &item).is_err());
    }
}
