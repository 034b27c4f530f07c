//! SELECT assembly and the extension pipeline.
//!
//! A [`QueryBuilder`] turns a join graph and a [`Where`] into a
//! [`QueryContext`]: the SQL template carries two markers, one where the
//! extension condition goes (`AND TRUE` by default) and a trailing needle
//! extensions insert their clauses in front of. [`apply_extensions`] runs the
//! registered extensions and either hands results back from the one that
//! takes over, or executes the statement through a [`QueryRunner`].
//!
//! Conditions use `$*` placeholders; they are numbered `$1..$n` when the
//! context is finalized, user parameters first.

mod context;
mod extension;
mod pager;
mod where_clause;

pub use context::{QueryContext, CONDITION_NEEDLE, NEEDLE};
pub use extension::{
    apply_extensions, ExtensionStage, GroupBy, OrderBy, QueryExtension, QueryOutput, QueryRunner,
};
pub use pager::{CursorPage, CursorPager, OffsetPager, Page};
pub use where_clause::{number_placeholders, Where, PLACEHOLDER};

use crate::error::Result;
use crate::join::JoinGraphBuilder;
use crate::registry::Registry;

/// Builds query contexts over registered classes
pub struct QueryBuilder<'r> {
    registry: &'r Registry,
}

impl<'r> QueryBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// `SELECT <properties> FROM <class> ... WHERE <condition>`
    pub fn select<S: AsRef<str>>(
        &self,
        class: &str,
        properties: &[S],
        condition: Where,
        collection: bool,
    ) -> Result<QueryContext> {
        let graph = JoinGraphBuilder::new(self.registry).build(class, properties)?;
        Ok(QueryContext::new(&graph, condition, collection))
    }
}
