use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Process-wide configuration: service endpoints and index field mappings.
/// Supplied once at startup and treated as immutable for the process
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the graph repository, without a trailing slash.
    pub repository_url: String,
    /// Base URL of the search index service.
    pub index_url: String,
    /// Index core/collection name appended to `index_url`.
    pub index_core: String,
    /// Predicate asserting an entity's class URI.
    #[serde(default = "default_class_predicate")]
    pub class_predicate: String,
    /// Index field holding the resource address (the document id).
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Index field holding the entity's class URI.
    #[serde(default = "default_class_field")]
    pub class_field: String,
    /// Index field holding the parent container address.
    #[serde(default = "default_parent_field")]
    pub parent_field: String,
    /// Index field holding the repository-assigned identifier.
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,
    /// Field searched by free-text clauses.
    #[serde(default = "default_search_field")]
    pub default_search_field: String,
    /// Fields faceted when faceting is enabled without narrowing.
    #[serde(default)]
    pub facet_fields: Vec<String>,
    /// Page size applied when a query sets no explicit limit.
    #[serde(default = "default_rows")]
    pub default_rows: usize,
    /// Path of the similarity-query endpoint, relative to the core.
    #[serde(default = "default_mlt_endpoint")]
    pub more_like_this_endpoint: String,
}

fn default_class_predicate() -> String {
    "http://example.org/ns#class".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_class_field() -> String {
    "class_s".to_string()
}

fn default_parent_field() -> String {
    "parent_uri_s".to_string()
}

fn default_identifier_field() -> String {
    "identifier_s".to_string()
}

fn default_search_field() -> String {
    "searchall_txt".to_string()
}

fn default_rows() -> usize {
    20
}

fn default_mlt_endpoint() -> String {
    "mlt".to_string()
}

impl Config {
    /// Configuration with default field mappings for the given services.
    pub fn for_services(
        repository_url: impl Into<String>,
        index_url: impl Into<String>,
        index_core: impl Into<String>,
    ) -> Self {
        Self {
            repository_url: trim_slash(repository_url.into()),
            index_url: trim_slash(index_url.into()),
            index_core: index_core.into(),
            class_predicate: default_class_predicate(),
            id_field: default_id_field(),
            class_field: default_class_field(),
            parent_field: default_parent_field(),
            identifier_field: default_identifier_field(),
            default_search_field: default_search_field(),
            facet_fields: Vec::new(),
            default_rows: default_rows(),
            more_like_this_endpoint: default_mlt_endpoint(),
        }
    }
}

fn trim_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("triplemap.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<Config>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let mut config: Config = toml::from_str(&contents)?;
    config.repository_url = trim_slash(config.repository_url);
    config.index_url = trim_slash(config.index_url);
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &Config, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
