//! Well-known repository vocabulary
//!
//! Predicates the repository asserts on every resource it manages, plus the
//! prefix list used to tell repository-managed statements apart from entity
//! data.

/// Parent container of a resource.
pub const HAS_PARENT: &str = "http://graphrepo.org/ns/repository#hasParent";

/// Containment statement asserted on a container for each child.
pub const CONTAINS: &str = "http://graphrepo.org/ns/repository#contains";

/// Repository-assigned opaque identifier.
pub const IDENTIFIER: &str = "http://graphrepo.org/ns/repository#identifier";

/// Creation timestamp assigned by the repository.
pub const CREATED: &str = "http://graphrepo.org/ns/repository#created";

/// Last-modification timestamp assigned by the repository.
pub const LAST_MODIFIED: &str = "http://graphrepo.org/ns/repository#lastModified";

/// Byte size of a binary resource's content.
pub const HAS_SIZE: &str = "http://graphrepo.org/ns/premis#hasSize";

/// Fixity-check result resource.
pub const HAS_FIXITY: &str = "http://graphrepo.org/ns/premis#hasFixity";

/// Location of the checked content within the repository.
pub const CONTENT_LOCATION: &str = "http://graphrepo.org/ns/premis#hasContentLocationValue";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Predicate URI prefixes assumed to be repository-managed. Statements under
/// these prefixes round-trip through the entity's graph but are never mapped
/// to declared properties or re-asserted by outgoing writes.
pub const MANAGED_PREFIXES: &[&str] = &[
    "http://graphrepo.org/ns/",
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#",
    "http://www.w3.org/2000/01/rdf-schema#",
];

/// Facet terms that duplicate repository bookkeeping values. These are hidden
/// from extracted facets.
pub const FACET_EXCLUDED_TERMS: &[&str] = &["http://graphrepo.org/ns/repository#export/xml"];

/// True if the predicate lives under a repository-managed namespace.
pub fn is_managed(predicate: &str) -> bool {
    MANAGED_PREFIXES.iter().any(|p| predicate.starts_with(p))
}
