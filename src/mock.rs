//! Recording executor for tests.
//!
//! [`MockExecutor`] records every statement it receives and replays queued
//! row sets in FIFO order; once the queue is exhausted queries return no
//! rows. Share it with a session through an `Rc` to inspect it afterwards.
//!
//! ```
//! use std::rc::Rc;
//! use tether::executor::{Projection, QueryExecutor, Row};
//! use tether::mock::{MockExecutor, QueryKind};
//!
//! let executor = Rc::new(MockExecutor::new());
//! executor.push_rows(vec![Row::new().scalar("name", "rex")]);
//!
//! let rows: Vec<Row> = executor.query("SELECT 1", &[], &Projection::default()).unwrap().collect();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(executor.last_query().unwrap().kind, QueryKind::Query);
//! ```

use crate::error::Result;
use crate::executor::{Projection, QueryExecutor, Row, Rows};
use sea_query::Value;
use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Query,
    Execute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: QueryKind,
}

#[derive(Debug, Default)]
pub struct MockExecutor {
    rows: RefCell<VecDeque<Vec<Row>>>,
    affected: RefCell<VecDeque<u64>>,
    queries: RefCell<Vec<RecordedQuery>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `query`
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.rows.borrow_mut().push_back(rows);
    }

    /// Queue the affected-row count of the next `execute`
    pub fn push_affected(&self, count: u64) {
        self.affected.borrow_mut().push_back(count);
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.borrow().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.borrow().len()
    }

    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.queries.borrow().last().cloned()
    }

    /// Statements passed to `execute`, e.g. transaction control
    pub fn executed(&self) -> Vec<String> {
        self.queries
            .borrow()
            .iter()
            .filter(|q| q.kind == QueryKind::Execute)
            .map(|q| q.sql.clone())
            .collect()
    }

    /// Forget recorded statements and queued results
    pub fn reset(&self) {
        self.rows.borrow_mut().clear();
        self.affected.borrow_mut().clear();
        self.queries.borrow_mut().clear();
    }

    fn record(&self, sql: &str, params: &[Value], kind: QueryKind) {
        self.queries.borrow_mut().push(RecordedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
            kind,
        });
    }
}

impl QueryExecutor for MockExecutor {
    fn query(&self, sql: &str, params: &[Value], _projection: &Projection) -> Result<Rows> {
        self.record(sql, params, QueryKind::Query);
        let rows = self.rows.borrow_mut().pop_front().unwrap_or_default();
        Ok(Rows::new(rows))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params, QueryKind::Execute);
        Ok(self.affected.borrow_mut().pop_front().unwrap_or(0))
    }
}
