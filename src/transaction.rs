//! Transaction scope.
//!
//! A [`TransactionScope`] is owned by the caller and passed by reference to
//! whatever needs to run inside a transaction. The first `begin` issues
//! `BEGIN` and records its identifier as the owner; later begins join the
//! running transaction. Only the owner's `commit`/`rollback` reach the
//! database.
//!
//! ```
//! use tether::mock::MockExecutor;
//! use tether::transaction::{TransactionScope, DEFAULT_TRANSACTION};
//!
//! let executor = MockExecutor::new();
//! let mut scope = TransactionScope::new();
//! assert!(scope.begin(&executor, "flush").unwrap());
//! assert!(!scope.begin(&executor, DEFAULT_TRANSACTION).unwrap());
//! assert!(!scope.commit(&executor, DEFAULT_TRANSACTION).unwrap());
//! assert!(scope.commit(&executor, "flush").unwrap());
//! assert_eq!(executor.executed(), vec!["BEGIN".to_string(), "COMMIT".to_string()]);
//! ```

use crate::error::{Error, Result};
use crate::executor::QueryExecutor;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Identifier used when the caller does not name its transaction
pub const DEFAULT_TRANSACTION: &str = "default";

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted (PostgreSQL treats it as ReadCommitted)
    ReadUncommitted,
    /// Read committed (default)
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Default)]
pub struct TransactionScope {
    owner: Option<String>,
    /// Begins by the owner's identifier after the first one
    reentered: usize,
    rollback_only: bool,
}

impl TransactionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transaction, or join the active one
    ///
    /// Returns `true` when this call issued `BEGIN`.
    pub fn begin(&mut self, executor: &dyn QueryExecutor, identifier: &str) -> Result<bool> {
        self.begin_with_isolation(executor, identifier, IsolationLevel::ReadCommitted)
    }

    pub fn begin_with_isolation(
        &mut self,
        executor: &dyn QueryExecutor,
        identifier: &str,
        isolation_level: IsolationLevel,
    ) -> Result<bool> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span(identifier).entered();

        if let Some(owner) = &self.owner {
            if owner == identifier {
                self.reentered += 1;
            }
            log::debug!("{identifier} joins transaction {owner}");
            return Ok(false);
        }

        executor.execute("BEGIN", &[])?;
        if isolation_level != IsolationLevel::ReadCommitted {
            let isolation_sql = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation_level.to_sql());
            executor.execute(&isolation_sql, &[])?;
        }
        log::debug!("transaction {identifier} started");
        self.owner = Some(identifier.to_string());
        self.rollback_only = false;
        Ok(true)
    }

    /// Commit if `identifier` owns the transaction
    ///
    /// # Errors
    ///
    /// If a participant rolled back, the owner's commit issues `ROLLBACK`
    /// instead and returns `Error::Transaction`.
    pub fn commit(&mut self, executor: &dyn QueryExecutor, identifier: &str) -> Result<bool> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span(identifier).entered();

        if !self.leave(identifier) {
            return Ok(false);
        }
        if self.rollback_only {
            self.rollback_only = false;
            executor.execute("ROLLBACK", &[])?;
            log::debug!("transaction {identifier} rolled back on commit");
            return Err(Error::Transaction(format!(
                "transaction {identifier} was marked rollback-only by a participant"
            )));
        }
        executor.execute("COMMIT", &[])?;
        log::debug!("transaction {identifier} committed");
        Ok(true)
    }

    /// Roll back if `identifier` owns the transaction
    ///
    /// A participant's rollback marks the transaction rollback-only.
    pub fn rollback(&mut self, executor: &dyn QueryExecutor, identifier: &str) -> Result<bool> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span(identifier).entered();

        if self.owner.is_none() {
            return Ok(false);
        }
        if !self.leave(identifier) {
            self.rollback_only = true;
            log::debug!("{identifier} marked the transaction rollback-only");
            return Ok(false);
        }
        self.rollback_only = false;
        executor.execute("ROLLBACK", &[])?;
        log::debug!("transaction {identifier} rolled back");
        Ok(true)
    }

    /// Run `f` inside the scope, committing on `Ok` and rolling back on `Err`
    pub fn run<T, F>(&mut self, executor: &dyn QueryExecutor, identifier: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionScope) -> Result<T>,
    {
        self.begin(executor, identifier)?;
        match f(self) {
            Ok(value) => {
                self.commit(executor, identifier)?;
                Ok(value)
            }
            Err(err) => {
                self.rollback(executor, identifier)?;
                Err(err)
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// True when `identifier` closes the outermost begin
    fn leave(&mut self, identifier: &str) -> bool {
        if self.owner.as_deref() != Some(identifier) {
            return false;
        }
        if self.reentered > 0 {
            self.reentered -= 1;
            return false;
        }
        self.owner = None;
        true
    }
}
