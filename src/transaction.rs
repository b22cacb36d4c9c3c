//! Repository transactions
//!
//! A transaction is a repository-side context identified by its own address
//! namespace: `<repository>/tx:<id>`. Resources written through the
//! transactional address become visible at their canonical address only on
//! commit. Address rewriting between the two forms is a pure string
//! operation; no I/O happens outside open/commit/rollback.
//!
//! A transaction is scoped to the call stack of its enclosing block. Sharing
//! one transaction across concurrent operations is caller error and is not
//! guarded against here.

use crate::repository::RepositoryClient;
use crate::{Error, Result};

/// Marker that distinguishes a transactional address from a canonical one.
const TX_SEGMENT: &str = "/tx:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// An open repository transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    repository_url: String,
    tx_url: String,
    state: TxState,
}

impl Transaction {
    /// Rewriting-only view over an externally tracked transaction address.
    pub(crate) fn for_urls(repository_url: &str, tx_url: &str) -> Self {
        Self {
            repository_url: repository_url.trim_end_matches('/').to_string(),
            tx_url: tx_url.trim_end_matches('/').to_string(),
            state: TxState::Open,
        }
    }

    /// The transaction's base address.
    pub fn url(&self) -> &str {
        &self.tx_url
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Rewrite a canonical address to live under this transaction's
    /// namespace. Idempotent: an already-transactional address is returned
    /// unchanged, as is any address outside the repository.
    pub fn transactional_url(&self, url: &str) -> String {
        if url.starts_with(&format!("{}{}", self.repository_url, TX_SEGMENT)) {
            return url.to_string();
        }
        if let Some(rest) = url.strip_prefix(self.repository_url.as_str()) {
            return format!("{}{}", self.tx_url, rest);
        }
        url.to_string()
    }

    /// Inverse of `transactional_url`.
    pub fn canonical_url(&self, url: &str) -> String {
        if let Some(rest) = url.strip_prefix(self.tx_url.as_str()) {
            return format!("{}{}", self.repository_url, rest);
        }
        url.to_string()
    }
}

/// Opens, commits, and rolls back repository transactions.
pub struct TransactionManager<'a> {
    repository: &'a dyn RepositoryClient,
    repository_url: &'a str,
}

impl<'a> TransactionManager<'a> {
    pub fn new(repository: &'a dyn RepositoryClient, repository_url: &'a str) -> Self {
        Self {
            repository,
            repository_url,
        }
    }

    /// Open a transaction: `POST <repository>/tx/begin`. The repository
    /// answers with the transaction's address.
    pub fn open(&self) -> Result<Transaction> {
        let begin_url = format!("{}/tx/begin", self.repository_url);
        let location = self.repository.post(&begin_url)?.ok_or(Error::Repository {
            status: 0,
            status_text: "transaction begin returned no address".to_string(),
            body: String::new(),
        })?;
        Ok(Transaction {
            repository_url: self.repository_url.to_string(),
            tx_url: trim_slash(location),
            state: TxState::Open,
        })
    }

    /// Commit: `POST <tx>/commit`. Terminal; retrying a committed
    /// transaction is a no-op.
    pub fn commit(&self, tx: &mut Transaction) -> Result<()> {
        match tx.state {
            TxState::Committed => Ok(()),
            TxState::RolledBack => Err(Error::Invariant(
                "cannot commit a rolled-back transaction".to_string(),
            )),
            TxState::Open => {
                self.repository.post(&format!("{}/commit", tx.tx_url))?;
                tx.state = TxState::Committed;
                Ok(())
            }
        }
    }

    /// Roll back: `POST <tx>/rollback`. Terminal; retrying a rolled-back
    /// transaction is a no-op.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        match tx.state {
            TxState::RolledBack => Ok(()),
            TxState::Committed => Err(Error::Invariant(
                "cannot roll back a committed transaction".to_string(),
            )),
            TxState::Open => {
                self.repository.post(&format!("{}/rollback", tx.tx_url))?;
                tx.state = TxState::RolledBack;
                Ok(())
            }
        }
    }

    /// Execute a unit of work inside a transaction. Any error (including
    /// validation failures bubbling up from entity saves) rolls the
    /// transaction back before propagating; normal completion commits.
    pub fn in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut tx = self.open()?;
        match work(&tx) {
            Ok(value) => {
                self.commit(&mut tx)?;
                Ok(value)
            }
            Err(e) => {
                // the original error wins even if rollback itself fails
                let _ = self.rollback(&mut tx);
                Err(e)
            }
        }
    }
}

fn trim_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}
