//! Search index collaborator interface
//!
//! The index holds a flattened projection of each entity and is only
//! eventually consistent with the repository. This module defines the query
//! shapes, the client seam, and the HTTP implementation speaking a
//! Solr-style JSON surface.

use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// One index query: accumulated clauses plus paging and facet switches.
/// Built by `Relation`, executed by a `SearchClient`.
#[derive(Debug, Clone, Default)]
pub struct IndexQuery {
    /// Clauses combined with logical AND. Empty means match-all.
    pub clauses: Vec<String>,
    /// Post-filter (facet) queries.
    pub filters: Vec<String>,
    /// Field searched by free-text clauses.
    pub default_field: String,
    pub sort: Option<String>,
    pub start: usize,
    pub rows: usize,
    pub facet: bool,
    pub facet_fields: Vec<String>,
}

impl IndexQuery {
    /// The AND-joined query string, or match-all when no clause was given.
    pub fn query_string(&self) -> String {
        if self.clauses.is_empty() {
            "*:*".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

/// Raw index response: matching documents plus the unpaginated match count
/// and, when requested, facet counts in the index's interleaved
/// term/count shape.
#[derive(Debug, Clone, Default)]
pub struct IndexResponse {
    pub total: usize,
    pub documents: Vec<Value>,
    /// Field name to `[term, count, term, count, ...]`.
    pub facet_fields: HashMap<String, Vec<Value>>,
}

/// Client seam for the search index.
pub trait SearchClient: Send + Sync {
    /// Execute a query against the select endpoint.
    fn select(&self, query: &IndexQuery) -> Result<IndexResponse>;

    /// Execute a similarity query seeded by the document with the given id.
    fn more_like_this(&self, seed_id: &str, query: &IndexQuery) -> Result<IndexResponse>;

    /// Add or replace one document. Issued by the indexing integration, not
    /// by query execution.
    fn add_document(&self, document: &Value) -> Result<()>;

    /// Delete the document with the given id.
    fn delete_document(&self, id: &str) -> Result<()>;
}

/// HTTP-backed search client.
pub struct HttpSearchIndex {
    client: reqwest::blocking::Client,
    core_url: String,
    more_like_this_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SelectBody {
    response: ResponseBody,
    #[serde(default)]
    facet_counts: Option<FacetCounts>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "numFound")]
    num_found: usize,
    docs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FacetCounts {
    #[serde(default)]
    facet_fields: HashMap<String, Vec<Value>>,
}

impl HttpSearchIndex {
    pub fn new(index_url: &str, core: &str, more_like_this_endpoint: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            core_url: format!("{}/{}", index_url.trim_end_matches('/'), core),
            more_like_this_endpoint: more_like_this_endpoint.trim_matches('/').to_string(),
        }
    }

    fn run(&self, endpoint: &str, params: Vec<(String, String)>) -> Result<IndexResponse> {
        let url = format!("{}/{}", self.core_url, endpoint);
        debug!(url, "index query");
        let response = self.client.get(&url).query(&params).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Repository {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: response.text().unwrap_or_default(),
            });
        }
        let body: SelectBody = response.json()?;
        Ok(IndexResponse {
            total: body.response.num_found,
            documents: body.response.docs,
            facet_fields: body.facet_counts.map(|f| f.facet_fields).unwrap_or_default(),
        })
    }

    /// Shared parameters, without the main query (`q`) itself.
    fn base_params(query: &IndexQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("df".to_string(), query.default_field.clone()),
            ("fl".to_string(), "*,score".to_string()),
            ("wt".to_string(), "json".to_string()),
            ("start".to_string(), query.start.to_string()),
            ("rows".to_string(), query.rows.to_string()),
        ];
        if let Some(sort) = &query.sort {
            params.push(("sort".to_string(), sort.clone()));
        }
        params
    }
}

impl SearchClient for HttpSearchIndex {
    fn select(&self, query: &IndexQuery) -> Result<IndexResponse> {
        let mut params = vec![("q".to_string(), query.query_string())];
        params.extend(Self::base_params(query));
        for fq in &query.filters {
            params.push(("fq".to_string(), fq.clone()));
        }
        if query.facet {
            params.push(("facet".to_string(), "true".to_string()));
            params.push(("facet.mincount".to_string(), "1".to_string()));
            for field in &query.facet_fields {
                params.push(("facet.field".to_string(), field.clone()));
            }
        }
        self.run("select", params)
    }

    fn more_like_this(&self, seed_id: &str, query: &IndexQuery) -> Result<IndexResponse> {
        let mut params = vec![("q".to_string(), format!("id:\"{}\"", seed_id))];
        params.extend(Self::base_params(query));
        params.push(("mlt.fl".to_string(), query.default_field.clone()));
        // accumulated clauses ride as post-filters so the type restriction
        // still applies to the similar set
        for clause in query.clauses.iter().chain(query.filters.iter()) {
            params.push(("fq".to_string(), clause.clone()));
        }
        let endpoint = self.more_like_this_endpoint.clone();
        self.run(&endpoint, params)
    }

    fn add_document(&self, document: &Value) -> Result<()> {
        let url = format!("{}/update/json/docs", self.core_url);
        debug!(url, "index add");
        let response = self.client.post(&url).json(document).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Repository {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn delete_document(&self, id: &str) -> Result<()> {
        let url = format!("{}/update", self.core_url);
        debug!(url, id, "index delete");
        let body = serde_json::json!({ "delete": { "id": id } });
        let response = self.client.post(&url).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Repository {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Derive an index-safe text field name from a predicate URI: every run of
/// non-alphanumerics becomes a single underscore.
pub fn field_name_for_predicate(predicate: &str) -> String {
    let re = regex::Regex::new(r"[^0-9A-Za-z]+").expect("static pattern");
    format!("uri_{}_txt", re.replace_all(predicate, "_").trim_matches('_'))
}
