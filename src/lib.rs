//! # Triplemap - Graph-Repository Object Mapping
//!
//! Keeps in-memory entities consistent with two backing services: a graph
//! repository holding each entity's statement graph (with transactions), and
//! an eventually-consistent search index holding a flattened projection for
//! querying.
//!
//! Triplemap provides:
//! - Statement graphs with a line-oriented wire codec
//! - Declarative entity schemas: typed properties, associations, hooks
//! - A session layer driving the create/read/update/delete lifecycle
//! - Repository transactions with transparent address rewriting
//! - A lazy, memoized query builder over the search index

pub mod statement;
pub mod vocab;
pub mod schema;
pub mod config;
pub mod repository;
pub mod transaction;
pub mod index;
pub mod mapper;
pub mod entity;
pub mod relation;
pub mod facet;
pub mod association;
pub mod session;
pub mod indexing;
pub mod fixity;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::Config;
pub use entity::{Entity, PropertyValue};
pub use facet::{Facet, FacetTerm};
pub use fixity::Fixity;
pub use index::{IndexQuery, IndexResponse, SearchClient};
pub use mapper::{ChangeSet, EntityMapper};
pub use relation::{Relation, ResultSet};
pub use repository::{BinaryContent, RepositoryClient};
pub use schema::{
    AssociationKind, AssociationSpec, EntityKind, EntitySchema, HookPoint, PropertySpec,
    SchemaBuilder, SchemaRegistry, ValueType,
};
pub use session::Session;
pub use statement::{Object, Statement, StatementGraph, Subject};
pub use transaction::{Transaction, TransactionManager, TxState};

/// Result type alias for triplemap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for triplemap operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Repository answered {status} {status_text}: {body}")]
    Repository {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Wire format error: {0}")]
    WireFormat(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}
