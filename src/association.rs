//! Association resolution
//!
//! Belongs-to resolves through a statement on the owning entity's own graph:
//! the association's predicate points at the target's address, which is then
//! loaded from the repository and memoized per association name. Has-many is
//! the reverse view: a lazy query over the target type's index documents
//! whose reverse field holds this entity's address.
//!
//! Setting a belongs-to is an in-memory operation; the statement is written
//! on the owner's next save. A binary entity pointed at an unsaved target
//! additionally queues itself on that target, so saving the target saves the
//! binary right after it.

use crate::entity::Entity;
use crate::relation::Relation;
use crate::schema::{AssociationKind, AssociationSpec, EntityKind};
use crate::session::Session;
use crate::{Error, Result};

impl Session {
    /// Resolve a belongs-to association, loading the target from the
    /// repository on first access and memoizing it on the entity.
    /// `Ok(None)` when the association has never been set.
    pub fn belongs_to(&self, entity: &mut Entity, name: &str) -> Result<Option<Entity>> {
        let spec = association_of(entity, name, AssociationKind::BelongsTo)?.clone();

        if let Some(cached) = entity.resolved_associations.get(name) {
            return Ok(Some((**cached).clone()));
        }

        let predicate = spec
            .predicate
            .as_deref()
            .ok_or_else(|| Error::Schema(format!("belongs_to {:?} declares no predicate", name)))?;
        let Some(target_url) = entity.graph().value_of(predicate).map(|o| o.as_str().to_string())
        else {
            return Ok(None);
        };

        let target = self
            .find_by_url(&target_url)?
            .ok_or_else(|| Error::NotFound(target_url.clone()))?;
        if target.type_name() != spec.target_type {
            return Err(Error::Invariant(format!(
                "association {:?} expects a {} but {} is a {}",
                name,
                spec.target_type,
                target_url,
                target.type_name()
            )));
        }

        entity
            .resolved_associations
            .insert(name.to_string(), Box::new(target.clone()));
        Ok(Some(target))
    }

    /// Point a belongs-to association at `target`. In-memory only: the
    /// statement is written on the entity's next save. A binary entity
    /// pointed at an unsaved target is queued on that target and saved with
    /// it.
    pub fn set_belongs_to(
        &self,
        entity: &mut Entity,
        name: &str,
        target: &mut Entity,
    ) -> Result<()> {
        entity.ensure_mutable()?;
        let spec = association_of(entity, name, AssociationKind::BelongsTo)?.clone();
        if target.type_name() != spec.target_type {
            return Err(Error::Invariant(format!(
                "association {:?} expects a {} but was given a {}",
                name,
                spec.target_type,
                target.type_name()
            )));
        }

        entity
            .resolved_associations
            .insert(name.to_string(), Box::new(target.clone()));

        if entity.schema().kind == EntityKind::Binary && target.url().is_none() {
            target.queue_attachment(entity.clone())?;
        }
        Ok(())
    }

    /// Lazy has-many view: a relation over the target type pre-filtered on
    /// the reverse index field holding this entity's address. The entity
    /// must be persisted; an address-less entity has nothing to point back
    /// at.
    pub fn has_many<'a>(&'a self, entity: &Entity, name: &str) -> Result<Relation<'a>> {
        let spec = association_of(entity, name, AssociationKind::HasMany)?.clone();
        let url = entity.url().ok_or_else(|| {
            Error::Invariant(format!(
                "cannot resolve {:?} on an unsaved {}",
                name,
                entity.type_name()
            ))
        })?;

        let mut relation = self.query(&spec.target_type)?;
        relation.filter_field(&spec.index_field, url);
        Ok(relation)
    }

    /// Containing resource, read from the repository-asserted parent
    /// statement. `Ok(None)` for a root resource or an unsaved entity.
    pub fn parent_of(&self, entity: &Entity) -> Result<Option<Entity>> {
        let Some(parent_url) = entity
            .graph()
            .value_of(crate::vocab::HAS_PARENT)
            .map(|o| o.as_str().to_string())
        else {
            return Ok(None);
        };
        self.find_by_url(&parent_url)
    }

    /// Directly contained resources, read from the repository-asserted
    /// containment statements. Contained resources that assert no
    /// registered entity class are skipped.
    pub fn children_of(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let urls: Vec<String> = entity
            .graph()
            .statements_with(crate::vocab::CONTAINS)
            .iter()
            .map(|s| s.object.as_str().to_string())
            .collect();

        let mut children = Vec::new();
        for url in urls {
            match self.find_by_url(&url) {
                Ok(Some(child)) => children.push(child),
                Ok(None) => {}
                Err(Error::Schema(_)) => {
                    tracing::debug!(%url, "skipping contained resource of unregistered class");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(children)
    }
}

fn association_of<'e>(
    entity: &'e Entity,
    name: &str,
    kind: AssociationKind,
) -> Result<&'e AssociationSpec> {
    let spec = entity.schema().association(name).ok_or_else(|| {
        Error::Schema(format!(
            "{} has no association {:?}",
            entity.type_name(),
            name
        ))
    })?;
    if spec.kind != kind {
        return Err(Error::Schema(format!(
            "association {:?} on {} is not a {:?} association",
            name,
            entity.type_name(),
            kind
        )));
    }
    Ok(spec)
}
