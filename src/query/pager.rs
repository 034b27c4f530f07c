//! Offset and keyset pagination extensions.

use super::context::QueryContext;
use super::extension::{ExtensionStage, OrderBy, QueryExtension, QueryOutput, QueryRunner};
use super::where_clause::{Where, PLACEHOLDER};
use crate::entity::EntityRef;
use crate::error::{Error, Result};
use crate::executor::RowValue;
use sea_query::Value;

/// One page of an offset-paginated collection
#[derive(Debug)]
pub struct Page {
    pub items: Vec<EntityRef>,
    /// 1-based
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

impl Page {
    pub fn last_page(&self) -> u64 {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.per_page)
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.last_page()
    }
}

/// One slice of a keyset-paginated collection
#[derive(Debug)]
pub struct CursorPage {
    pub items: Vec<EntityRef>,
    pub limit: u64,
    /// Primary key of the last item when more rows follow
    pub next_cursor: Option<Vec<Value>>,
}

/// `LIMIT`/`OFFSET` pagination with a total count
#[derive(Debug, Clone)]
pub struct OffsetPager {
    page: u64,
    per_page: u64,
    max_per_page: u64,
}

impl OffsetPager {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page,
            per_page,
            max_per_page: u64::MAX,
        }
    }

    /// Upper bound applied to the requested page size
    pub fn max_per_page(mut self, max: u64) -> Self {
        self.max_per_page = max.max(1);
        self
    }

    fn page(&self) -> u64 {
        self.page.max(1)
    }

    fn per_page(&self) -> u64 {
        self.per_page.clamp(1, self.max_per_page)
    }
}

impl QueryExtension for OffsetPager {
    fn name(&self) -> &str {
        "offset_pager"
    }

    fn stage(&self) -> ExtensionStage {
        ExtensionStage::Pagination
    }

    fn supports(&self, context: &QueryContext) -> bool {
        context.is_collection()
    }

    fn apply(&self, context: &mut QueryContext) -> Result<()> {
        let per_page = self.per_page();
        let offset = (self.page() - 1).saturating_mul(per_page);
        context.insert_clause(&format!("LIMIT {per_page} OFFSET {offset}"));
        Ok(())
    }

    fn supports_result(&self, context: &QueryContext) -> bool {
        context.is_collection()
    }

    fn result(&self, context: &QueryContext, runner: &dyn QueryRunner) -> Result<QueryOutput> {
        let (sql, params, projection) = context.count_query();
        let rows = runner.fetch_rows(&sql, &params, &projection)?;
        let total = match rows.first().and_then(|row| row.get("count")) {
            Some(RowValue::Scalar(value)) => count_value(value)?,
            _ => 0,
        };
        let items = runner.fetch_entities(context)?;
        Ok(QueryOutput::Page(Page {
            items,
            page: self.page(),
            per_page: self.per_page(),
            total,
        }))
    }
}

fn count_value(value: &Value) -> Result<u64> {
    let count = match value {
        Value::BigInt(Some(i)) => *i,
        Value::Int(Some(i)) => i64::from(*i),
        Value::SmallInt(Some(i)) => i64::from(*i),
        Value::BigUnsigned(Some(u)) => return Ok(*u),
        Value::Unsigned(Some(u)) => i64::from(*u),
        other => return Err(Error::Conversion(format!("count is not an integer: {other:?}"))),
    };
    u64::try_from(count).map_err(|_| Error::Conversion(format!("negative count {count}")))
}

/// Keyset pagination on the root primary key
///
/// Fetches `limit + 1` rows past the cursor to learn whether another slice
/// follows. Requires primary key ordering.
#[derive(Debug, Clone)]
pub struct CursorPager {
    after: Option<Vec<Value>>,
    limit: u64,
}

impl CursorPager {
    pub fn new(after: Option<Vec<Value>>, limit: u64) -> Self {
        Self {
            after,
            limit: limit.max(1),
        }
    }
}

impl QueryExtension for CursorPager {
    fn name(&self) -> &str {
        "cursor_pager"
    }

    fn stage(&self) -> ExtensionStage {
        ExtensionStage::Pagination
    }

    fn supports(&self, context: &QueryContext) -> bool {
        context.is_collection()
    }

    fn apply(&self, context: &mut QueryContext) -> Result<()> {
        if OrderBy::is_custom(context) {
            return Err(Error::configuration(
                context.class(),
                "<cursor>",
                "cursor pagination requires primary key ordering",
            ));
        }

        if let Some(after) = &self.after {
            let key = context.primary_key();
            if after.len() != key.len() {
                return Err(Error::Conversion(format!(
                    "cursor has {} component(s), {} primary key has {}",
                    after.len(),
                    context.class(),
                    key.len()
                )));
            }
            let placeholders = vec![PLACEHOLDER; key.len()].join(", ");
            let condition = Where::new(format!("({}) > ({placeholders})", key.join(", ")), after.clone());
            context.add_condition(condition);
        }

        if context.param("ordered").is_none() {
            let terms: Vec<String> = context.primary_key().iter().map(|c| format!("{c} ASC")).collect();
            context.insert_clause(&format!("ORDER BY {}", terms.join(", ")));
        }
        context.insert_clause(&format!("LIMIT {}", self.limit.saturating_add(1)));
        Ok(())
    }

    fn supports_result(&self, context: &QueryContext) -> bool {
        context.is_collection()
    }

    fn result(&self, context: &QueryContext, runner: &dyn QueryRunner) -> Result<QueryOutput> {
        let mut items = runner.fetch_entities(context)?;
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            match items.last() {
                Some(last) => Some(cursor_of(last)?),
                None => None,
            }
        } else {
            None
        };
        Ok(QueryOutput::CursorPage(CursorPage {
            items,
            limit: self.limit,
            next_cursor,
        }))
    }
}

fn cursor_of(entity: &EntityRef) -> Result<Vec<Value>> {
    let entity = entity.borrow();
    entity
        .metadata()
        .structure()
        .primary_key_fields()
        .iter()
        .map(|column| {
            entity.scalar(column).cloned().ok_or_else(|| Error::MissingPrimaryKey {
                class: entity.class().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Projection, Row};
    use crate::join::JoinGraphBuilder;
    use crate::tests_cfg::registry;
    use sea_query::Order;
    use std::cell::RefCell;

    struct CountingRunner {
        count: i64,
        statements: RefCell<Vec<String>>,
    }

    impl QueryRunner for CountingRunner {
        fn fetch_entities(&self, context: &QueryContext) -> Result<Vec<EntityRef>> {
            self.statements.borrow_mut().push(context.build().0);
            Ok(Vec::new())
        }

        fn fetch_rows(&self, sql: &str, _params: &[Value], _projection: &Projection) -> Result<Vec<Row>> {
            self.statements.borrow_mut().push(sql.to_string());
            Ok(vec![Row::new().scalar("count", self.count)])
        }
    }

    fn context() -> QueryContext {
        let registry = registry();
        let graph = JoinGraphBuilder::new(&registry).build("DummyPerson", &["name"]).unwrap();
        QueryContext::new(&graph, Where::default(), true)
    }

    #[test]
    fn test_offset_pager_clamps_and_counts() {
        let pager = OffsetPager::new(3, 500).max_per_page(100);
        let mut ctx = context();
        pager.apply(&mut ctx).unwrap();
        assert!(ctx.build().0.ends_with("LIMIT 100 OFFSET 200"));

        let runner = CountingRunner { count: 250, statements: RefCell::new(Vec::new()) };
        let QueryOutput::Page(page) = pager.result(&ctx, &runner).unwrap() else {
            panic!("expected a page");
        };
        assert_eq!(page.total, 250);
        assert_eq!(page.last_page(), 3);
        assert!(!page.has_next());
        let statements = runner.statements.borrow();
        assert!(statements[0].starts_with("SELECT count(DISTINCT (t0.\"name\"))"));
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_page_zero_reads_as_first() {
        let mut ctx = context();
        OffsetPager::new(0, 10).apply(&mut ctx).unwrap();
        assert!(ctx.build().0.ends_with("LIMIT 10 OFFSET 0"));
    }

    #[test]
    fn test_cursor_pager_adds_keyset_condition() {
        let mut ctx = context();
        CursorPager::new(Some(vec![Value::from("m")]), 20).apply(&mut ctx).unwrap();
        let (sql, params) = ctx.build();
        assert!(sql.contains("WHERE TRUE AND (t0.\"name\") > ($1)"));
        assert!(sql.ends_with("ORDER BY t0.\"name\" ASC LIMIT 21"));
        assert_eq!(params, vec![Value::from("m")]);
    }

    #[test]
    fn test_cursor_pager_rejects_custom_order() {
        let mut ctx = context();
        OrderBy::push(&mut ctx, "t0.\"bio\"", &Order::Asc).unwrap();
        let err = CursorPager::new(None, 5).apply(&mut ctx).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_cursor_arity_must_match() {
        let mut ctx = context();
        let err = CursorPager::new(Some(vec![Value::from("a"), Value::from(1)]), 5)
            .apply(&mut ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }
}
