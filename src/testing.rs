//! In-memory service fakes and fixture schemas for tests.
//!
//! `MemoryRepository` models the repository's containment, transaction
//! staging, and binary sidecar behavior well enough to exercise the whole
//! lifecycle without a network. `MemoryIndex` evaluates the small clause
//! language the relation layer emits. Both are deliberately strict about
//! shapes the real services would reject.

use crate::config::Config;
use crate::index::{IndexQuery, IndexResponse, SearchClient};
use crate::indexing;
use crate::repository::{BinaryContent, RepositoryClient};
use crate::schema::{EntityKind, SchemaBuilder, SchemaRegistry, ValueType};
use crate::session::Session;
use crate::statement::{Statement, StatementGraph};
use crate::vocab;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const REPO_URL: &str = "http://repo.example.org/rest";
pub const INDEX_URL: &str = "http://index.example.org";

pub const COLLECTION_CLASS: &str = "http://example.org/Collection";
pub const ITEM_CLASS: &str = "http://example.org/Item";
pub const BYTESTREAM_CLASS: &str = "http://example.org/Bytestream";

/// Fixture registry: a collection/item/bytestream hierarchy with index
/// maintenance wired in.
pub fn registry() -> Arc<SchemaRegistry> {
    let collection = indexing::register(
        SchemaBuilder::new("collection", COLLECTION_CLASS)
            .property("title", "http://example.org/title", ValueType::String, "title_s")
            .has_many("items", "item", "collection_uri_s"),
    )
    .build()
    .unwrap();

    let item = indexing::register(
        SchemaBuilder::new("item", ITEM_CLASS)
            .property("title", "http://example.org/title", ValueType::String, "title_s")
            .property("pages", "http://example.org/pageCount", ValueType::Integer, "pages_i")
            .property("published", "http://example.org/published", ValueType::Boolean, "published_b")
            .belongs_to("collection", "collection", "http://example.org/isMemberOf", "collection_uri_s")
            .has_many("bytestreams", "bytestream", "item_uri_s"),
    )
    .build()
    .unwrap();

    let bytestream = indexing::register(
        SchemaBuilder::new("bytestream", BYTESTREAM_CLASS)
            .kind(EntityKind::Binary)
            .property("media_type", "http://example.org/mediaType", ValueType::String, "media_type_s")
            .belongs_to("item", "item", "http://example.org/isOwnedBy", "item_uri_s"),
    )
    .build()
    .unwrap();

    Arc::new(SchemaRegistry::build(vec![collection, item, bytestream]).unwrap())
}

/// Memory-backed session over the fixture registry.
pub fn session() -> Session {
    harness().0
}

pub fn session_with(registry: Arc<SchemaRegistry>) -> Session {
    harness_with(registry).0
}

/// Session plus direct handles on its fakes, for tests that need to inspect
/// or perturb backing state.
pub fn harness() -> (Session, Arc<MemoryRepository>, Arc<MemoryIndex>) {
    harness_with(registry())
}

pub fn harness_with(
    registry: Arc<SchemaRegistry>,
) -> (Session, Arc<MemoryRepository>, Arc<MemoryIndex>) {
    // honor RUST_LOG when a test run wants the warn/debug trail
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let repository = Arc::new(MemoryRepository::new(REPO_URL));
    let index = Arc::new(MemoryIndex::default());
    let mut config = Config::for_services(REPO_URL, INDEX_URL, "core1");
    config.facet_fields = vec!["collection_uri_s".to_string(), "class_s".to_string()];
    let session = Session::new(config, registry, repository.clone(), index.clone());
    (session, repository, index)
}

#[derive(Default)]
struct RepoState {
    /// Canonical address to stored graph.
    resources: HashMap<String, StatementGraph>,
    /// Per-transaction overlay: canonical address to pending graph, or
    /// `None` for a pending delete.
    staged: HashMap<String, HashMap<String, Option<StatementGraph>>>,
    resource_counter: usize,
    tx_counter: usize,
}

/// In-memory `RepositoryClient` with transaction staging.
pub struct MemoryRepository {
    base: String,
    state: Mutex<RepoState>,
}

impl MemoryRepository {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            state: Mutex::new(RepoState::default()),
        }
    }

    /// Number of canonically visible resources.
    pub fn resource_count(&self) -> usize {
        self.state.lock().unwrap().resources.len()
    }

    /// Split an address into its transaction overlay (if any) and the
    /// canonical address, with any binary metadata suffix stripped.
    fn split(&self, url: &str) -> (Option<String>, String) {
        let tx_prefix = format!("{}/tx:", self.base);
        let (tx, canonical) = match url.strip_prefix(&tx_prefix) {
            Some(rest) => match rest.find('/') {
                Some(i) => (
                    Some(format!("{}{}", tx_prefix, &rest[..i])),
                    format!("{}{}", self.base, &rest[i..]),
                ),
                None => (Some(url.to_string()), self.base.clone()),
            },
            None => (None, url.to_string()),
        };
        let canonical = canonical
            .strip_suffix("/metadata")
            .unwrap_or(&canonical)
            .to_string();
        (tx, canonical)
    }

    fn read(&self, state: &RepoState, tx: &Option<String>, canonical: &str) -> Option<StatementGraph> {
        if let Some(tx) = tx {
            if let Some(overlay) = state.staged.get(tx) {
                if let Some(entry) = overlay.get(canonical) {
                    return entry.clone();
                }
            }
        }
        state.resources.get(canonical).cloned()
    }

    fn write(state: &mut RepoState, tx: &Option<String>, canonical: String, graph: StatementGraph) {
        match tx {
            Some(tx) => {
                state
                    .staged
                    .entry(tx.clone())
                    .or_default()
                    .insert(canonical, Some(graph));
            }
            None => {
                state.resources.insert(canonical, graph);
            }
        }
    }

    fn assign_url(&self, state: &mut RepoState, parent: &str, slug: Option<&str>) -> String {
        state.resource_counter += 1;
        let segment = match slug {
            Some(slug) => slug.to_string(),
            None => format!("res{}", state.resource_counter),
        };
        format!("{}/{}", parent.trim_end_matches('/'), segment)
    }

    /// Repository-managed statements asserted on every new resource.
    fn managed_statements(state: &RepoState, parent: &str) -> Vec<Statement> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        vec![
            Statement::reference(vocab::HAS_PARENT, parent),
            Statement::literal(vocab::IDENTIFIER, format!("id{}", state.resource_counter)),
            Statement::literal(vocab::CREATED, now.clone()),
            Statement::literal(vocab::LAST_MODIFIED, now),
        ]
    }

    fn add_containment(&self, state: &mut RepoState, tx: &Option<String>, parent: &str, child: &str) {
        let mut parent_graph = self.read(state, tx, parent).unwrap_or_default();
        parent_graph.add(Statement::reference(vocab::CONTAINS, child));
        Self::write(state, tx, parent.to_string(), parent_graph);
    }
}

impl RepositoryClient for MemoryRepository {
    fn fetch_graph(&self, url: &str) -> Result<Option<StatementGraph>> {
        let (tx, canonical) = self.split(url);
        let state = self.state.lock().unwrap();
        if canonical.ends_with("/fixity") {
            let target = canonical.trim_end_matches("/fixity").to_string();
            if self.read(&state, &tx, &target).is_none() {
                return Ok(None);
            }
            let mut graph = StatementGraph::new();
            graph.add(Statement::reference(vocab::HAS_FIXITY, format!("{}/fixity/results/1", target)));
            graph.add(Statement::reference(vocab::CONTENT_LOCATION, format!("info:store{}", target)));
            return Ok(Some(graph));
        }
        Ok(self.read(&state, &tx, &canonical))
    }

    fn create_resource(
        &self,
        parent_url: &str,
        graph: &StatementGraph,
        slug: Option<&str>,
    ) -> Result<String> {
        let (tx, parent) = self.split(parent_url);
        let mut state = self.state.lock().unwrap();
        let url = self.assign_url(&mut state, &parent, slug);

        let mut stored = graph.clone();
        for st in Self::managed_statements(&state, &parent) {
            stored.add(st);
        }
        Self::write(&mut state, &tx, url.clone(), stored);
        self.add_containment(&mut state, &tx, &parent, &url);

        // the repository answers with an address in the caller's namespace
        Ok(match &tx {
            Some(tx) => format!("{}{}", tx, url.strip_prefix(&self.base).unwrap_or("")),
            None => url,
        })
    }

    fn create_binary(
        &self,
        parent_url: &str,
        content: &BinaryContent,
        slug: Option<&str>,
    ) -> Result<String> {
        let (tx, parent) = self.split(parent_url);
        let mut state = self.state.lock().unwrap();
        let url = self.assign_url(&mut state, &parent, slug);

        let mut stored = StatementGraph::new();
        for st in Self::managed_statements(&state, &parent) {
            stored.add(st);
        }
        let size = match content {
            BinaryContent::Bytes { data, .. } => data.len(),
            BinaryContent::External { .. } => 0,
        };
        stored.add(Statement::literal(vocab::HAS_SIZE, size.to_string()));
        Self::write(&mut state, &tx, url.clone(), stored);
        self.add_containment(&mut state, &tx, &parent, &url);

        Ok(match &tx {
            Some(tx) => format!("{}{}", tx, url.strip_prefix(&self.base).unwrap_or("")),
            None => url,
        })
    }

    fn replace_graph(&self, url: &str, graph: &StatementGraph) -> Result<()> {
        let (tx, canonical) = self.split(url);
        let mut state = self.state.lock().unwrap();
        if self.read(&state, &tx, &canonical).is_none() {
            return Err(Error::Repository {
                status: 404,
                status_text: "Not Found".to_string(),
                body: canonical,
            });
        }
        let mut stored = graph.clone();
        stored.remove(None, Some(vocab::LAST_MODIFIED), None);
        stored.add(Statement::literal(
            vocab::LAST_MODIFIED,
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ));
        Self::write(&mut state, &tx, canonical, stored);
        Ok(())
    }

    fn patch(&self, url: &str, change_set_body: &str) -> Result<()> {
        let (tx, canonical) = self.split(url);
        let mut state = self.state.lock().unwrap();
        let mut graph = self.read(&state, &tx, &canonical).ok_or(Error::Repository {
            status: 404,
            status_text: "Not Found".to_string(),
            body: canonical.clone(),
        })?;

        // the change-set wire form: DELETE WHERE lines, then one INSERT block
        let mut inserting = false;
        for line in change_set_body.lines() {
            let line = line.trim().trim_end_matches(';');
            if let Some(rest) = line.strip_prefix("DELETE WHERE {") {
                let triple = rest.trim_end_matches('}').trim();
                if let Some(predicate) = triple
                    .split_whitespace()
                    .nth(1)
                    .map(|p| p.trim_matches(|c| c == '<' || c == '>'))
                {
                    graph.remove(None, Some(predicate), None);
                }
            } else if line.starts_with("INSERT {") {
                inserting = true;
            } else if inserting && line.starts_with('}') {
                inserting = false;
            } else if inserting && !line.is_empty() {
                graph.merge_from(&StatementGraph::decode(line)?);
            }
        }
        Self::write(&mut state, &tx, canonical, graph);
        Ok(())
    }

    fn delete(&self, url: &str) -> Result<()> {
        let (tx, canonical) = self.split(url);
        let canonical = canonical.trim_end_matches("/tombstone").to_string();
        let mut state = self.state.lock().unwrap();
        match tx {
            Some(tx) => {
                state.staged.entry(tx).or_default().insert(canonical, None);
            }
            None => {
                state.resources.remove(&canonical);
            }
        }
        Ok(())
    }

    fn post(&self, url: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        if url == format!("{}/tx/begin", self.base) {
            state.tx_counter += 1;
            let tx_url = format!("{}/tx:{}", self.base, state.tx_counter);
            state.staged.insert(tx_url.clone(), HashMap::new());
            return Ok(Some(tx_url));
        }
        if let Some(tx_url) = url.strip_suffix("/commit") {
            let overlay = state.staged.remove(tx_url).ok_or(Error::Repository {
                status: 410,
                status_text: "Gone".to_string(),
                body: tx_url.to_string(),
            })?;
            for (canonical, entry) in overlay {
                match entry {
                    Some(graph) => {
                        state.resources.insert(canonical, graph);
                    }
                    None => {
                        state.resources.remove(&canonical);
                    }
                }
            }
            return Ok(None);
        }
        if let Some(tx_url) = url.strip_suffix("/rollback") {
            state.staged.remove(tx_url);
            return Ok(None);
        }
        Err(Error::Repository {
            status: 404,
            status_text: "Not Found".to_string(),
            body: url.to_string(),
        })
    }
}

/// In-memory `SearchClient` evaluating the relation layer's clause grammar.
#[derive(Default)]
pub struct MemoryIndex {
    docs: Mutex<HashMap<String, Value>>,
}

impl MemoryIndex {
    pub fn document_count(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    /// Remove a document directly, simulating index state drifting ahead of
    /// (or behind) the repository.
    pub fn evict(&self, id: &str) {
        self.docs.lock().unwrap().remove(id);
    }

    fn matches(doc: &Value, clause: &str, default_field: &str) -> bool {
        if let Some((field, value)) = parse_field_clause(clause) {
            return doc
                .get(field)
                .map(|v| match v {
                    Value::String(s) => s == value,
                    other => other.to_string() == value,
                })
                .unwrap_or(false);
        }
        doc.get(default_field)
            .and_then(|v| v.as_str())
            .map(|text| text.to_lowercase().contains(&clause.to_lowercase()))
            .unwrap_or(false)
    }

    fn run(&self, query: &IndexQuery, exclude_id: Option<&str>) -> IndexResponse {
        let docs = self.docs.lock().unwrap();
        let mut matched: Vec<&Value> = docs
            .values()
            .filter(|doc| {
                if let Some(id) = exclude_id {
                    if doc.get("id").and_then(|v| v.as_str()) == Some(id) {
                        return false;
                    }
                }
                query
                    .clauses
                    .iter()
                    .chain(query.filters.iter())
                    .all(|clause| Self::matches(doc, clause, &query.default_field))
            })
            .collect();

        match &query.sort {
            Some(sort) => {
                let (field, descending) = match sort.rsplit_once(' ') {
                    Some((f, "desc")) => (f, true),
                    Some((f, _)) => (f, false),
                    None => (sort.as_str(), false),
                };
                matched.sort_by(|a, b| {
                    let av = a.get(field);
                    let bv = b.get(field);
                    match (av.and_then(Value::as_f64), bv.and_then(Value::as_f64)) {
                        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                        _ => {
                            let ax = av.and_then(Value::as_str).unwrap_or("");
                            let bx = bv.and_then(Value::as_str).unwrap_or("");
                            ax.cmp(bx)
                        }
                    }
                });
                if descending {
                    matched.reverse();
                }
            }
            None => {
                matched.sort_by_key(|doc| doc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string());
            }
        }

        let mut facet_fields = HashMap::new();
        if query.facet {
            for field in &query.facet_fields {
                let mut counts: HashMap<String, u64> = HashMap::new();
                for doc in &matched {
                    if let Some(value) = doc.get(field).and_then(|v| v.as_str()) {
                        *counts.entry(value.to_string()).or_default() += 1;
                    }
                }
                let mut pairs: Vec<(String, u64)> = counts.into_iter().collect();
                pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                let interleaved = pairs
                    .into_iter()
                    .flat_map(|(term, count)| [Value::String(term), Value::from(count)])
                    .collect();
                facet_fields.insert(field.clone(), interleaved);
            }
        }

        let total = matched.len();
        let documents = matched
            .into_iter()
            .skip(query.start)
            .take(query.rows)
            .map(|doc| {
                let mut doc = doc.clone();
                if let Value::Object(map) = &mut doc {
                    map.insert("score".to_string(), Value::from(1.0));
                }
                doc
            })
            .collect();

        IndexResponse {
            total,
            documents,
            facet_fields,
        }
    }
}

impl SearchClient for MemoryIndex {
    fn select(&self, query: &IndexQuery) -> Result<IndexResponse> {
        Ok(self.run(query, None))
    }

    fn more_like_this(&self, seed_id: &str, query: &IndexQuery) -> Result<IndexResponse> {
        let seed_exists = self.docs.lock().unwrap().contains_key(seed_id);
        if !seed_exists {
            return Ok(IndexResponse::default());
        }
        Ok(self.run(query, Some(seed_id)))
    }

    fn add_document(&self, document: &Value) -> Result<()> {
        let id = document
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Invariant("index document without an id".to_string()))?;
        self.docs.lock().unwrap().insert(id.to_string(), document.clone());
        Ok(())
    }

    fn delete_document(&self, id: &str) -> Result<()> {
        self.docs.lock().unwrap().remove(id);
        Ok(())
    }
}

fn parse_field_clause(clause: &str) -> Option<(&str, &str)> {
    let (field, rest) = clause.split_once(":\"")?;
    let value = rest.strip_suffix('"')?;
    Some((field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_transaction_staging() {
        let repo = MemoryRepository::new(REPO_URL);
        let tx_url = repo.post(&format!("{}/tx/begin", REPO_URL)).unwrap().unwrap();

        let mut graph = StatementGraph::new();
        graph.add(Statement::literal("http://example.org/title", "Staged"));
        let location = repo.create_resource(&tx_url, &graph, Some("a")).unwrap();
        assert!(location.starts_with(&tx_url));

        // visible inside the transaction, invisible canonically
        assert!(repo.fetch_graph(&location).unwrap().is_some());
        assert!(repo.fetch_graph(&format!("{}/a", REPO_URL)).unwrap().is_none());

        repo.post(&format!("{}/commit", tx_url)).unwrap();
        assert!(repo.fetch_graph(&format!("{}/a", REPO_URL)).unwrap().is_some());
    }

    #[test]
    fn test_repository_rollback_discards() {
        let repo = MemoryRepository::new(REPO_URL);
        let tx_url = repo.post(&format!("{}/tx/begin", REPO_URL)).unwrap().unwrap();
        repo.create_resource(&tx_url, &StatementGraph::new(), Some("a")).unwrap();
        repo.post(&format!("{}/rollback", tx_url)).unwrap();
        assert!(repo.fetch_graph(&format!("{}/a", REPO_URL)).unwrap().is_none());
        assert_eq!(repo.resource_count(), 0);
    }

    #[test]
    fn test_repository_metadata_alias() {
        let repo = MemoryRepository::new(REPO_URL);
        let url = repo
            .create_binary(
                REPO_URL,
                &BinaryContent::Bytes {
                    data: b"12345".to_vec(),
                    filename: "a.bin".to_string(),
                    media_type: None,
                },
                Some("bin1"),
            )
            .unwrap();
        let direct = repo.fetch_graph(&url).unwrap().unwrap();
        let sidecar = repo.fetch_graph(&format!("{}/metadata", url)).unwrap().unwrap();
        assert_eq!(direct, sidecar);
        assert_eq!(direct.value_of(vocab::HAS_SIZE).unwrap().as_str(), "5");
    }

    #[test]
    fn test_index_clause_matching() {
        let index = MemoryIndex::default();
        index
            .add_document(&serde_json::json!({
                "id": "http://repo.example.org/rest/i1",
                "title_s": "Alpha",
                "searchall_txt": "Alpha maps",
            }))
            .unwrap();
        index
            .add_document(&serde_json::json!({
                "id": "http://repo.example.org/rest/i2",
                "title_s": "Beta",
                "searchall_txt": "Beta charts",
            }))
            .unwrap();

        let query = IndexQuery {
            clauses: vec!["title_s:\"Alpha\"".to_string()],
            default_field: "searchall_txt".to_string(),
            rows: 10,
            ..Default::default()
        };
        assert_eq!(index.select(&query).unwrap().total, 1);

        let query = IndexQuery {
            clauses: vec!["charts".to_string()],
            default_field: "searchall_txt".to_string(),
            rows: 10,
            ..Default::default()
        };
        let response = index.select(&query).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.documents[0]["id"], "http://repo.example.org/rest/i2");
    }
}
