//! Relation - lazy, chainable query builder
//!
//! A `Relation` accumulates index query clauses and compiles, on first
//! terminal access, into one index query plus one repository fetch per
//! matching document. Results are memoized; every mutator invalidates the
//! memo, so a mutated relation re-executes on its next terminal access.
//!
//! The index is only eventually consistent with the repository: a document
//! whose backing resource has gone missing is dropped from the results and
//! logged, never surfaced as an error.

use crate::entity::Entity;
use crate::facet::{facets_from_response, Facet};
use crate::index::{IndexQuery, IndexResponse};
use crate::mapper::EntityMapper;
use crate::schema::HookPoint;
use crate::session::Session;
use crate::{Error, Result};
use tracing::{error, warn};

/// Ordered page of hydrated entities plus the unpaginated match count and
/// any requested facets.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    entities: Vec<Entity>,
    total_count: usize,
    facets: Vec<Facet>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Total matches in the index, independent of the requested page size.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn first(&self) -> Option<&Entity> {
        self.entities.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }
}

/// Lazy query descriptor bound to a session.
pub struct Relation<'a> {
    session: &'a Session,
    /// Restricting type, or `None` when querying across every registered
    /// type (the abstract root).
    type_name: Option<String>,
    /// Address of the source entity, when built from a concrete entity.
    seed_url: Option<String>,
    filter_clauses: Vec<String>,
    facet_filters: Vec<String>,
    order: Option<String>,
    start: usize,
    limit: Option<usize>,
    facet: bool,
    facet_fields: Vec<String>,
    more_like_this: bool,
    transaction_url: Option<String>,
    results: Option<ResultSet>,
}

impl<'a> Relation<'a> {
    pub(crate) fn for_type(session: &'a Session, type_name: &str) -> Self {
        Self::build(session, Some(type_name.to_string()), None)
    }

    pub(crate) fn across_types(session: &'a Session) -> Self {
        Self::build(session, None, None)
    }

    /// Relation seeded by a concrete entity; the only form on which
    /// `more_like_this` is permitted.
    pub(crate) fn for_entity(session: &'a Session, entity: &Entity) -> Result<Self> {
        let url = entity.url().ok_or_else(|| {
            Error::Invariant("cannot build a query from an unsaved entity".to_string())
        })?;
        Ok(Self::build(
            session,
            Some(entity.type_name().to_string()),
            Some(url.to_string()),
        ))
    }

    fn build(session: &'a Session, type_name: Option<String>, seed_url: Option<String>) -> Self {
        Self {
            session,
            type_name,
            seed_url,
            filter_clauses: Vec::new(),
            facet_filters: Vec::new(),
            order: None,
            start: 0,
            limit: None,
            facet: false,
            facet_fields: Vec::new(),
            more_like_this: false,
            transaction_url: None,
            results: None,
        }
    }

    /// Add a free-text clause searched against the default field. Blank
    /// input is dropped silently.
    pub fn filter(&mut self, clause: &str) -> &mut Self {
        if !clause.trim().is_empty() {
            self.filter_clauses.push(clause.trim().to_string());
            self.invalidate();
        }
        self
    }

    /// Add one field:value clause; entries are combined with logical AND.
    /// Blank keys or values are dropped silently.
    pub fn filter_field(&mut self, field: &str, value: &str) -> &mut Self {
        if !field.trim().is_empty() && !value.trim().is_empty() {
            self.filter_clauses.push(format!("{}:\"{}\"", field.trim(), value.trim()));
            self.invalidate();
        }
        self
    }

    /// Add several field:value clauses at once.
    pub fn filter_fields(&mut self, pairs: &[(&str, &str)]) -> &mut Self {
        for (field, value) in pairs {
            self.filter_field(field, value);
        }
        self
    }

    /// Sort order, e.g. `"pages_i desc"`. A bare field name sorts
    /// ascending.
    pub fn order(&mut self, order: &str) -> &mut Self {
        let order = order.trim();
        if !order.is_empty() {
            let order = if order.ends_with(" asc") || order.ends_with(" desc") {
                order.to_string()
            } else {
                format!("{} asc", order)
            };
            self.order = Some(order);
            self.invalidate();
        }
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self.invalidate();
        self
    }

    pub fn start(&mut self, start: usize) -> &mut Self {
        self.start = start;
        self.invalidate();
        self
    }

    /// Enable or disable facet computation.
    pub fn facet(&mut self, enabled: bool) -> &mut Self {
        self.facet = enabled;
        self.invalidate();
        self
    }

    /// Narrow faceting to the given fields (and enable it). An empty list
    /// falls back to the configured facet fields.
    pub fn facet_fields(&mut self, fields: &[&str]) -> &mut Self {
        self.facet = true;
        self.facet_fields = fields.iter().map(|f| f.to_string()).collect();
        self.invalidate();
        self
    }

    /// Add a post-filter (facet) query. Blank input is dropped silently.
    pub fn facet_filter(&mut self, fq: &str) -> &mut Self {
        if !fq.trim().is_empty() {
            self.facet_filters.push(fq.trim().to_string());
            self.invalidate();
        }
        self
    }

    /// Switch to similarity mode, seeded by the source entity. Requires the
    /// relation to have been built from a concrete entity; faceting is
    /// mutually exclusive with similarity queries and is disabled.
    pub fn more_like_this(&mut self) -> Result<&mut Self> {
        if self.seed_url.is_none() {
            return Err(Error::Invariant(
                "more_like_this requires a query built from a concrete entity".to_string(),
            ));
        }
        self.more_like_this = true;
        self.facet = false;
        self.invalidate();
        Ok(self)
    }

    /// Resolve repository fetches through the given transaction namespace.
    pub fn use_transaction(&mut self, tx_url: &str) -> &mut Self {
        self.transaction_url = Some(tx_url.trim_end_matches('/').to_string());
        self.invalidate();
        self
    }

    /// Execute (if needed) and return the memoized result set.
    pub fn results(&mut self) -> Result<&ResultSet> {
        if self.results.is_none() {
            let page_size = self.limit.unwrap_or(self.session.config().default_rows);
            let results = self.execute(page_size)?;
            self.results = Some(results);
        }
        match &self.results {
            Some(results) => Ok(results),
            None => Err(Error::Invariant("query memo vanished".to_string())),
        }
    }

    /// Execute and clone out the hydrated page.
    pub fn to_vec(&mut self) -> Result<Vec<Entity>> {
        Ok(self.results()?.entities().to_vec())
    }

    /// First matching entity, forcing the page down to one document.
    pub fn first(&mut self) -> Result<Option<Entity>> {
        self.limit(1);
        Ok(self.results()?.first().cloned())
    }

    /// Unpaginated match count, read from the index's total rather than the
    /// hydrated page length. Runs a minimal-page query when no result set
    /// is memoized; the memo is left untouched.
    pub fn count(&mut self) -> Result<usize> {
        if let Some(results) = &self.results {
            return Ok(results.total_count());
        }
        Ok(self.execute(1)?.total_count())
    }

    /// Facets for the current query (empty unless faceting was enabled).
    pub fn facets(&mut self) -> Result<Vec<Facet>> {
        Ok(self.results()?.facets().to_vec())
    }

    fn invalidate(&mut self) {
        self.results = None;
    }

    fn execute(&self, page_size: usize) -> Result<ResultSet> {
        let config = self.session.config();
        let mut clauses = self.filter_clauses.clone();

        // restrict to the relation's type unless querying the abstract root
        if let Some(type_name) = &self.type_name {
            let schema = self.session.registry().get(type_name).ok_or_else(|| {
                Error::Schema(format!("unregistered entity type {:?}", type_name))
            })?;
            clauses.push(format!("{}:\"{}\"", config.class_field, schema.class_uri));
        }

        let query = IndexQuery {
            clauses,
            filters: self.facet_filters.clone(),
            default_field: config.default_search_field.clone(),
            sort: self.order.clone(),
            start: self.start,
            rows: page_size,
            facet: self.facet,
            facet_fields: if self.facet_fields.is_empty() {
                config.facet_fields.clone()
            } else {
                self.facet_fields.clone()
            },
        };

        let response = if self.more_like_this {
            match self.seed_url.as_deref() {
                Some(seed) => self.session.index().more_like_this(seed, &query),
                None => Err(Error::Invariant(
                    "similarity query without a seed entity".to_string(),
                )),
            }
        } else {
            self.session.index().select(&query)
        }?;

        self.hydrate(response)
    }

    /// Hydrate each index document from the repository. A document whose
    /// resource is gone (index staleness after deletion) or whose type
    /// cannot be resolved is dropped and the reported total adjusted.
    fn hydrate(&self, response: IndexResponse) -> Result<ResultSet> {
        let config = self.session.config();
        let mut total = response.total;
        let mut entities = Vec::new();

        for doc in &response.documents {
            let Some(id) = doc.get(&config.id_field).and_then(|v| v.as_str()) else {
                error!("index document carries no {} field", config.id_field);
                total = total.saturating_sub(1);
                continue;
            };

            let schema = match &self.type_name {
                Some(type_name) => self.session.registry().get(type_name),
                None => doc
                    .get(&config.class_field)
                    .and_then(|v| v.as_str())
                    .and_then(|class_uri| self.session.registry().schema_for_class(class_uri)),
            };
            let Some(schema) = schema else {
                error!(id, "unable to resolve an entity type for index document");
                total = total.saturating_sub(1);
                continue;
            };

            let mut entity = Entity::new(schema.clone(), &config.class_predicate);
            entity.set_url(id.to_string());
            entity.set_transaction_url(self.transaction_url.clone())?;

            let fetch_url = self.session.transactional(&entity, id);
            match self.session.repository().fetch_graph(&fetch_url)? {
                Some(graph) => {
                    schema.run_hooks(HookPoint::BeforeLoad, self.session, &mut entity)?;
                    EntityMapper::hydrate(&mut entity, graph);
                    schema.run_hooks(HookPoint::AfterLoad, self.session, &mut entity)?;
                    entity.score = doc.get("score").and_then(|v| v.as_f64());
                    entities.push(entity);
                }
                None => {
                    // expected after deletions that have not propagated yet
                    warn!(id, "document present in index is missing from repository");
                    total = total.saturating_sub(1);
                }
            }
        }

        let facets = if self.facet {
            facets_from_response(&response.facet_fields)
        } else {
            Vec::new()
        };

        Ok(ResultSet {
            entities,
            total_count: total,
            facets,
        })
    }
}
