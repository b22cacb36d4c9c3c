//! Fixity checking
//!
//! The repository can run an integrity check over a binary resource's
//! content and answer with a small graph describing the check: the address
//! of the fixity resource and the store-internal location of the checked
//! content.

use crate::entity::Entity;
use crate::session::Session;
use crate::statement::StatementGraph;
use crate::vocab;
use crate::{Error, Result};

/// Result of one repository fixity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixity {
    /// Address of the fixity resource the repository minted for this check.
    pub repository_url: String,
    /// Store-internal location of the checked content.
    pub content_location: String,
}

impl Fixity {
    /// Decode a fixity-check graph.
    pub fn from_graph(graph: &StatementGraph) -> Result<Self> {
        let repository_url = graph
            .value_of(vocab::HAS_FIXITY)
            .map(|o| o.as_str().to_string())
            .ok_or_else(|| {
                Error::WireFormat("fixity response asserts no fixity resource".to_string())
            })?;
        let content_location = graph
            .value_of(vocab::CONTENT_LOCATION)
            .map(|o| o.as_str().to_string())
            .ok_or_else(|| {
                Error::WireFormat("fixity response asserts no content location".to_string())
            })?;
        Ok(Self {
            repository_url,
            content_location,
        })
    }
}

impl Session {
    /// Run a fixity check over a persisted binary entity's content.
    pub fn fixity_of(&self, entity: &Entity) -> Result<Fixity> {
        let url = entity.url().ok_or_else(|| {
            Error::Invariant(format!(
                "cannot check fixity of an unsaved {} entity",
                entity.type_name()
            ))
        })?;
        let fixity_url = format!("{}/fixity", url.trim_end_matches('/'));
        let graph = self
            .repository()
            .fetch_graph(&fixity_url)?
            .ok_or_else(|| Error::NotFound(fixity_url))?;
        Fixity::from_graph(&graph)
    }
}
