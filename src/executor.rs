//! Query execution collaborator.
//!
//! The engine never talks to a database directly. It hands a
//! [`QueryExecutor`] SQL text with positional placeholders, the ordered
//! parameter values, and a [`Projection`] describing what each result column
//! holds; the executor returns rows already converted to [`RowValue`]s.

use crate::error::Result;
use sea_query::Value;
use std::rc::Rc;

/// Column shape of a projected field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub class: String,
    /// (field name, declared SQL type), in structure order
    pub fields: Vec<(String, String)>,
}

/// Declared semantic type of a projected result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Plain column of the named SQL type
    Sql(String),
    /// Whole row of a joined relation
    Entity(RecordType),
    /// Aggregated rows of a joined relation
    EntityArray(RecordType),
}

impl FieldType {
    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::EntityArray(_))
    }

    pub fn record_type(&self) -> Option<&RecordType> {
        match self {
            FieldType::Entity(r) | FieldType::EntityArray(r) => Some(r),
            FieldType::Sql(_) => None,
        }
    }
}

/// name -> SQL expression -> declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedField {
    pub name: String,
    pub expression: String,
    pub field_type: FieldType,
}

impl ProjectedField {
    pub fn new(name: impl Into<String>, expression: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            field_type,
        }
    }

    /// `<expression> as "<name>"`
    pub fn render(&self) -> String {
        format!("{} as {}", self.expression, crate::join::quote_ident(&self.name))
    }
}

/// Ordered result-column descriptor handed to the executor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<ProjectedField>,
}

impl Projection {
    pub fn new(fields: Vec<ProjectedField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[ProjectedField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&ProjectedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn push(&mut self, field: ProjectedField) {
        self.fields.push(field);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One converted result value
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Scalar(Value),
    Record(Row),
    Records(Vec<Row>),
}

impl From<Value> for RowValue {
    fn from(value: Value) -> Self {
        RowValue::Scalar(value)
    }
}

impl From<Row> for RowValue {
    fn from(row: Row) -> Self {
        RowValue::Record(row)
    }
}

impl From<Vec<Row>> for RowValue {
    fn from(rows: Vec<Row>) -> Self {
        RowValue::Records(rows)
    }
}

/// A result row: named values in projection order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, RowValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<RowValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Shorthand for a scalar column
    pub fn scalar(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(name, RowValue::Scalar(value.into()))
    }

    pub fn null(self, name: impl Into<String>) -> Self {
        self.with(name, RowValue::Null)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RowValue>) {
        let name = name.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RowValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Finite, forward-only row iterator; re-run the query to restart
#[derive(Debug)]
pub struct Rows {
    inner: std::vec::IntoIter<Row>,
}

impl Rows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            inner: rows.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl From<Vec<Row>> for Rows {
    fn from(rows: Vec<Row>) -> Self {
        Rows::new(rows)
    }
}

/// Trait for executing statements on behalf of the engine
///
/// # Examples
///
/// ```
/// use tether::executor::{Projection, QueryExecutor, Row, Rows};
/// use tether::Result;
/// use sea_query::Value;
///
/// struct Fixed;
///
/// impl QueryExecutor for Fixed {
///     fn query(&self, _sql: &str, _params: &[Value], _projection: &Projection) -> Result<Rows> {
///         Ok(Rows::new(vec![Row::new().scalar("name", "someone")]))
///     }
///
///     fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
///         Ok(0)
///     }
/// }
///
/// let rows: Vec<Row> = Fixed.query("SELECT 1", &[], &Projection::default()).unwrap().collect();
/// assert_eq!(rows.len(), 1);
/// ```
pub trait QueryExecutor {
    /// Run a statement returning rows
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` (or the adapter's own error) if the
    /// statement fails or a value cannot be converted.
    fn query(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Rows>;

    /// Run a statement and return the number of rows affected
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for Rc<T> {
    fn query(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Rows> {
        (**self).query(sql, params, projection)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for Box<T> {
    fn query(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Rows> {
        (**self).query(sql, params, projection)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }
}
