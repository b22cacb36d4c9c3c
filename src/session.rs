//! Session - entity lifecycle controller and query entry points
//!
//! A `Session` bundles the immutable configuration, the schema registry, and
//! the two service clients, and orchestrates create/read/update/delete on
//! top of them. Operations are synchronous and blocking; the session holds
//! no internal locks or threads, and a single open transaction must stay on
//! one call stack.
//!
//! Entry points are explicit (`new_entity`, `query`, `find`, `get`,
//! `find_by`, ...) rather than derived: finder lookups go through the
//! schema's property-to-index-field map by string key.

use crate::config::Config;
use crate::entity::{Entity, PropertyValue};
use crate::index::{HttpSearchIndex, SearchClient};
use crate::mapper::EntityMapper;
use crate::relation::Relation;
use crate::repository::{HttpRepository, RepositoryClient};
use crate::schema::{EntityKind, HookPoint, SchemaRegistry};
use crate::transaction::{Transaction, TransactionManager};
use crate::{Error, Result};
use std::sync::Arc;

/// Handle onto the repository/index pair for one configured deployment.
pub struct Session {
    config: Config,
    registry: Arc<SchemaRegistry>,
    repository: Arc<dyn RepositoryClient>,
    index: Arc<dyn SearchClient>,
}

impl Session {
    pub fn new(
        config: Config,
        registry: Arc<SchemaRegistry>,
        repository: Arc<dyn RepositoryClient>,
        index: Arc<dyn SearchClient>,
    ) -> Self {
        Self {
            config,
            registry,
            repository,
            index,
        }
    }

    /// Session backed by the HTTP clients, wired from the configuration.
    pub fn connect(config: Config, registry: Arc<SchemaRegistry>) -> Self {
        let index = HttpSearchIndex::new(
            &config.index_url,
            &config.index_core,
            &config.more_like_this_endpoint,
        );
        Self::new(
            config,
            registry,
            Arc::new(HttpRepository::new()),
            Arc::new(index),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn repository(&self) -> &dyn RepositoryClient {
        self.repository.as_ref()
    }

    pub fn index(&self) -> &dyn SearchClient {
        self.index.as_ref()
    }

    /// Construct a transient entity of a registered type.
    pub fn new_entity(&self, type_name: &str) -> Result<Entity> {
        let schema = self
            .registry
            .get(type_name)
            .ok_or_else(|| Error::Schema(format!("unregistered entity type {:?}", type_name)))?;
        Ok(Entity::new(schema, &self.config.class_predicate))
    }

    /// Persist a transient entity. Equivalent to `save`; provided as an
    /// explicit entry point for the create flow.
    pub fn create(&self, entity: &mut Entity) -> Result<()> {
        if entity.persisted() {
            return Err(Error::Invariant(
                "create called on an already persisted entity".to_string(),
            ));
        }
        self.save(entity)
    }

    /// Persist the entity: create when it has a parent address, update when
    /// it has its own address. Having neither is a caller bug; the entity's
    /// state is ambiguous.
    pub fn save(&self, entity: &mut Entity) -> Result<()> {
        entity.ensure_mutable()?;
        let schema = entity.schema().clone();
        schema.run_hooks(HookPoint::BeforeSave, self, entity)?;

        if entity.url().is_some() {
            self.save_existing(entity)?;
        } else if entity.parent_url().is_some() {
            self.save_new(entity)?;
        } else {
            return Err(Error::Invariant(
                "entity has neither a repository address nor a parent address; \
                 cannot tell whether it is new or existing"
                    .to_string(),
            ));
        }

        // pick up repository-assigned statements
        self.reload(entity)?;
        self.save_attachments(entity)?;

        schema.run_hooks(HookPoint::AfterSave, self, entity)?;
        Ok(())
    }

    /// Apply a partial property set, then save.
    pub fn update(&self, entity: &mut Entity, properties: Vec<(&str, PropertyValue)>) -> Result<()> {
        for (name, value) in properties {
            entity.set(name, value)?;
        }
        self.save(entity)
    }

    /// Remove the entity's resource from the repository. Effective only on a
    /// persisted, not-yet-destroyed entity; otherwise a no-op returning
    /// `false` rather than an error.
    pub fn delete(&self, entity: &mut Entity) -> Result<bool> {
        self.delete_with(entity, false)
    }

    /// `delete`, optionally also removing the tombstone marker left behind.
    pub fn delete_with(&self, entity: &mut Entity, also_tombstone: bool) -> Result<bool> {
        if !entity.persisted() || entity.destroyed() {
            return Ok(false);
        }
        let schema = entity.schema().clone();
        schema.run_hooks(HookPoint::BeforeDelete, self, entity)?;

        let url = entity
            .url()
            .ok_or_else(|| Error::Invariant("persisted entity has no address".to_string()))?
            .to_string();
        let url = self.transactional(entity, url.trim_end_matches('/'));
        self.repository.delete(&url)?;
        if also_tombstone {
            self.repository.delete(&format!("{}/tombstone", url))?;
        }
        entity.mark_destroyed();

        schema.run_hooks(HookPoint::AfterDelete, self, entity)?;
        Ok(true)
    }

    /// Re-fetch the canonical graph and re-hydrate in place. No-op for an
    /// entity that was never persisted.
    pub fn reload(&self, entity: &mut Entity) -> Result<()> {
        let Some(metadata_url) = entity.metadata_url() else {
            return Ok(());
        };
        entity.ensure_mutable()?;
        let schema = entity.schema().clone();
        schema.run_hooks(HookPoint::BeforeLoad, self, entity)?;

        let url = self.transactional(entity, &metadata_url);
        let graph = self
            .repository
            .fetch_graph(&url)?
            .ok_or_else(|| Error::NotFound(url.clone()))?;
        EntityMapper::hydrate(entity, graph);

        schema.run_hooks(HookPoint::AfterLoad, self, entity)?;
        Ok(())
    }

    /// Load the entity at `url` straight from the repository, bypassing the
    /// index (read-your-writes). `Ok(None)` when the resource is absent.
    pub fn find_by_url(&self, url: &str) -> Result<Option<Entity>> {
        let url = url.trim_end_matches('/');
        let Some(graph) = self.repository.fetch_graph(url)? else {
            return Ok(None);
        };
        let class_uri = graph
            .value_of(&self.config.class_predicate)
            .map(|o| o.as_str().to_string())
            .ok_or_else(|| {
                Error::Schema(format!("resource {} asserts no entity class", url))
            })?;
        let schema = self.registry.schema_for_class(&class_uri).ok_or_else(|| {
            Error::Schema(format!("no entity type registered for class {:?}", class_uri))
        })?;

        let mut entity = Entity::new(schema.clone(), &self.config.class_predicate);
        entity.set_url(url.to_string());
        schema.run_hooks(HookPoint::BeforeLoad, self, &mut entity)?;
        EntityMapper::hydrate(&mut entity, graph);
        schema.run_hooks(HookPoint::AfterLoad, self, &mut entity)?;
        Ok(Some(entity))
    }

    /// Get-or-fail variant of `find_by_url`.
    pub fn get(&self, url: &str) -> Result<Entity> {
        self.find_by_url(url)?
            .ok_or_else(|| Error::NotFound(url.to_string()))
    }

    /// Find by repository-assigned identifier, through the index.
    pub fn find(&self, type_name: &str, identifier: &str) -> Result<Option<Entity>> {
        let field = self.config.identifier_field.clone();
        let mut relation = self.query(type_name)?;
        relation.filter_field(&field, identifier);
        relation.first()
    }

    /// Find by a declared property, through the schema's finder map.
    pub fn find_by(&self, type_name: &str, property: &str, value: &str) -> Result<Option<Entity>> {
        let schema = self
            .registry
            .get(type_name)
            .ok_or_else(|| Error::Schema(format!("unregistered entity type {:?}", type_name)))?;
        let field = schema
            .index_field_for(property)
            .ok_or_else(|| {
                Error::Invariant(format!("{} has no property {:?}", type_name, property))
            })?
            .to_string();
        let mut relation = self.query(type_name)?;
        relation.filter_field(&field, value);
        relation.first()
    }

    /// Query builder restricted to one entity type.
    pub fn query(&self, type_name: &str) -> Result<Relation<'_>> {
        if self.registry.get(type_name).is_none() {
            return Err(Error::Schema(format!("unregistered entity type {:?}", type_name)));
        }
        Ok(Relation::for_type(self, type_name))
    }

    /// Alias for `query`: all entities of a type, lazily.
    pub fn all(&self, type_name: &str) -> Result<Relation<'_>> {
        self.query(type_name)
    }

    /// Query builder across every registered type (the abstract root); no
    /// class-restriction clause is added.
    pub fn search(&self) -> Relation<'_> {
        Relation::across_types(self)
    }

    /// Similarity query seeded by a persisted entity.
    pub fn more_like_this<'a>(&'a self, entity: &Entity) -> Result<Relation<'a>> {
        let mut relation = Relation::for_entity(self, entity)?;
        relation.more_like_this()?;
        Ok(relation)
    }

    pub fn transactions(&self) -> TransactionManager<'_> {
        TransactionManager::new(self.repository.as_ref(), &self.config.repository_url)
    }

    /// Run a unit of work inside a repository transaction; errors roll back,
    /// success commits.
    pub fn in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        self.transactions().in_transaction(work)
    }

    fn save_existing(&self, entity: &mut Entity) -> Result<()> {
        let schema = entity.schema().clone();
        schema.run_hooks(HookPoint::BeforeUpdate, self, entity)?;
        schema.validate(entity)?;

        EntityMapper::apply_outgoing(entity)?;
        let metadata_url = entity
            .metadata_url()
            .ok_or_else(|| Error::Invariant("existing entity has no address".to_string()))?;
        let url = self.transactional(entity, &metadata_url);
        self.repository.replace_graph(&url, entity.graph())?;

        schema.run_hooks(HookPoint::AfterUpdate, self, entity)?;
        Ok(())
    }

    fn save_new(&self, entity: &mut Entity) -> Result<()> {
        let schema = entity.schema().clone();
        schema.run_hooks(HookPoint::BeforeCreate, self, entity)?;
        schema.validate(entity)?;

        let parent_url = entity
            .parent_url()
            .ok_or_else(|| Error::Invariant("new entity has no parent address".to_string()))?
            .to_string();
        let parent = self.transactional(entity, &parent_url);

        match schema.kind {
            EntityKind::Container => {
                EntityMapper::apply_outgoing(entity)?;
                let location = self.repository.create_resource(
                    &parent,
                    entity.graph(),
                    entity.requested_slug(),
                )?;
                entity.set_url(self.canonical(entity, &location));
            }
            EntityKind::Binary => {
                // statements staged before the first save are written in a
                // follow-up pass against the assigned metadata address; the
                // class assertion rides along since the repository only
                // stores what the sidecar is told
                let mut staged = EntityMapper::build_outgoing_diff(entity)?;
                staged.merge_from(&entity.graph().statements_with(&self.config.class_predicate));
                let content = entity.upload().cloned().ok_or_else(|| {
                    Error::Invariant(format!(
                        "binary entity {} has no content to upload",
                        entity.type_name()
                    ))
                })?;
                let location =
                    self.repository
                        .create_binary(&parent, &content, entity.requested_slug())?;
                entity.set_url(self.canonical(entity, &location));

                if !staged.is_empty() {
                    let metadata_url = entity.metadata_url().ok_or_else(|| {
                        Error::Invariant("binary entity has no address after create".to_string())
                    })?;
                    let url = self.transactional(entity, &metadata_url);
                    let mut graph = self
                        .repository
                        .fetch_graph(&url)?
                        .ok_or_else(|| Error::NotFound(url.clone()))?;
                    graph.merge_from(&staged);
                    self.repository.replace_graph(&url, &graph)?;
                }
            }
        }

        entity.clear_requested_slug();
        entity.mark_persisted();
        schema.run_hooks(HookPoint::AfterCreate, self, entity)?;
        Ok(())
    }

    /// Save binaries queued by `set_belongs_to` now that the owner has an
    /// address, re-pointing their association at the saved owner first.
    fn save_attachments(&self, entity: &mut Entity) -> Result<()> {
        let attachments = entity.take_attachments();
        if attachments.is_empty() {
            return Ok(());
        }
        let owner_url = entity
            .url()
            .ok_or_else(|| Error::Invariant("attachments require a saved owner".to_string()))?
            .to_string();
        for mut attachment in attachments {
            let names: Vec<String> = attachment
                .schema()
                .belongs_to_associations()
                .filter(|a| a.target_type == entity.type_name())
                .map(|a| a.name.clone())
                .collect();
            for name in names {
                attachment
                    .resolved_associations
                    .insert(name, Box::new(entity.clone()));
            }
            if attachment.parent_url().is_none() {
                attachment.set_parent_url(owner_url.clone())?;
            }
            self.save(&mut attachment)?;
        }
        Ok(())
    }

    /// Rewrite `url` under the entity's transaction namespace, if it is
    /// operating inside one.
    pub(crate) fn transactional(&self, entity: &Entity, url: &str) -> String {
        match entity.transaction_url() {
            Some(tx) => Transaction::for_urls(&self.config.repository_url, tx).transactional_url(url),
            None => url.to_string(),
        }
    }

    /// Inverse of `transactional`.
    pub(crate) fn canonical(&self, entity: &Entity, url: &str) -> String {
        match entity.transaction_url() {
            Some(tx) => Transaction::for_urls(&self.config.repository_url, tx).canonical_url(url),
            None => url.to_string(),
        }
    }
}
