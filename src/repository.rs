//! Repository collaborator interface
//!
//! The graph repository stores each entity as a resource addressable by URL.
//! This module defines the client seam the rest of the crate talks through
//! plus the HTTP-backed implementation. Every call is a blocking
//! request-response exchange; retry policy belongs to the caller.

use crate::statement::StatementGraph;
use crate::{Error, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use tracing::debug;

/// Media type of the statement wire format.
pub const GRAPH_MEDIA_TYPE: &str = "application/n-triples";

/// Media type of a delete/insert change-set body.
pub const CHANGE_SET_MEDIA_TYPE: &str = "application/sparql-update";

/// Content for a new binary resource.
#[derive(Debug, Clone)]
pub enum BinaryContent {
    /// Upload the given bytes as the resource content.
    Bytes {
        data: Vec<u8>,
        filename: String,
        media_type: Option<String>,
    },
    /// Register content living at an external URL instead of uploading.
    External { url: String },
}

/// Client seam for the graph repository.
///
/// Absent resources surface as `Ok(None)` from `fetch_graph`; only the
/// get-or-fail entry points in the session layer turn that into an error.
pub trait RepositoryClient: Send + Sync {
    /// Fetch the statement graph at `url`, or `None` if the resource is
    /// missing.
    fn fetch_graph(&self, url: &str) -> Result<Option<StatementGraph>>;

    /// Create a new resource under `parent_url` holding `graph`. `slug`
    /// requests a specific last path segment. Returns the assigned address.
    fn create_resource(
        &self,
        parent_url: &str,
        graph: &StatementGraph,
        slug: Option<&str>,
    ) -> Result<String>;

    /// Create a new binary resource under `parent_url`. Returns the assigned
    /// address.
    fn create_binary(
        &self,
        parent_url: &str,
        content: &BinaryContent,
        slug: Option<&str>,
    ) -> Result<String>;

    /// Replace the whole graph at `url`.
    fn replace_graph(&self, url: &str, graph: &StatementGraph) -> Result<()>;

    /// Apply a serialized delete/insert change-set at `url`.
    fn patch(&self, url: &str, change_set_body: &str) -> Result<()>;

    /// Delete the resource at `url`.
    fn delete(&self, url: &str) -> Result<()>;

    /// Bare POST against `url` (transaction lifecycle endpoints). Returns the
    /// Location response field when the repository assigns one.
    fn post(&self, url: &str) -> Result<Option<String>>;
}

/// HTTP-backed repository client.
pub struct HttpRepository {
    client: Client,
}

impl HttpRepository {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let body = response.text().unwrap_or_default();
        Err(Error::Repository {
            status: status.as_u16(),
            status_text,
            body,
        })
    }

    fn location(response: &reqwest::blocking::Response) -> Option<String> {
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

impl Default for HttpRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryClient for HttpRepository {
    fn fetch_graph(&self, url: &str) -> Result<Option<StatementGraph>> {
        debug!(url, "repository GET");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, GRAPH_MEDIA_TYPE)
            .send()?;
        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::GONE {
            return Ok(None);
        }
        let body = Self::check(response)?.text()?;
        Ok(Some(StatementGraph::decode(&body)?))
    }

    fn create_resource(
        &self,
        parent_url: &str,
        graph: &StatementGraph,
        slug: Option<&str>,
    ) -> Result<String> {
        debug!(parent_url, slug, "repository POST");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRAPH_MEDIA_TYPE));
        if let Some(slug) = slug {
            headers.insert(
                "Slug",
                HeaderValue::from_str(slug)
                    .map_err(|_| Error::Invariant(format!("slug {:?} is not a valid header value", slug)))?,
            );
        }
        let response = self
            .client
            .post(parent_url)
            .headers(headers)
            .body(graph.encode())
            .send()?;
        let response = Self::check(response)?;
        Self::location(&response).ok_or_else(|| Error::Repository {
            status: response.status().as_u16(),
            status_text: "missing Location in create response".to_string(),
            body: String::new(),
        })
    }

    fn create_binary(
        &self,
        parent_url: &str,
        content: &BinaryContent,
        slug: Option<&str>,
    ) -> Result<String> {
        debug!(parent_url, slug, "repository POST (binary)");
        let mut headers = HeaderMap::new();
        if let Some(slug) = slug {
            headers.insert(
                "Slug",
                HeaderValue::from_str(slug)
                    .map_err(|_| Error::Invariant(format!("slug {:?} is not a valid header value", slug)))?,
            );
        }
        let request = match content {
            BinaryContent::Bytes {
                data,
                filename,
                media_type,
            } => {
                headers.insert(
                    "Content-Disposition",
                    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
                        .map_err(|_| {
                            Error::Invariant(format!("filename {:?} is not a valid header value", filename))
                        })?,
                );
                if let Some(mt) = media_type {
                    headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_str(mt).map_err(|_| {
                            Error::Invariant(format!("media type {:?} is not a valid header value", mt))
                        })?,
                    );
                }
                self.client.post(parent_url).headers(headers).body(data.clone())
            }
            BinaryContent::External { url } => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_str(&format!(
                        "message/external-body; access-type=URL; URL=\"{}\"",
                        url
                    ))
                    .map_err(|_| Error::Invariant(format!("external URL {:?} is not a valid header value", url)))?,
                );
                self.client.post(parent_url).headers(headers)
            }
        };
        let response = Self::check(request.send()?)?;
        Self::location(&response).ok_or_else(|| Error::Repository {
            status: response.status().as_u16(),
            status_text: "missing Location in create response".to_string(),
            body: String::new(),
        })
    }

    fn replace_graph(&self, url: &str, graph: &StatementGraph) -> Result<()> {
        debug!(url, "repository PUT");
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, GRAPH_MEDIA_TYPE)
            .body(graph.encode())
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn patch(&self, url: &str, change_set_body: &str) -> Result<()> {
        debug!(url, "repository PATCH");
        let response = self
            .client
            .patch(url)
            .header(CONTENT_TYPE, CHANGE_SET_MEDIA_TYPE)
            .body(change_set_body.to_string())
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn delete(&self, url: &str) -> Result<()> {
        debug!(url, "repository DELETE");
        let response = self.client.delete(url).send()?;
        Self::check(response)?;
        Ok(())
    }

    fn post(&self, url: &str) -> Result<Option<String>> {
        debug!(url, "repository POST (bare)");
        let response = Self::check(self.client.post(url).send()?)?;
        Ok(Self::location(&response))
    }
}
