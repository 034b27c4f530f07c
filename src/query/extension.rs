//! Query extension pipeline.
//!
//! Extensions run in [`ExtensionStage`] order, stable on registration order
//! within a stage. Each one that supports the query may rewrite the context;
//! the first that also supports producing results takes over and returns
//! them, otherwise the runner executes the statement.

use super::context::QueryContext;
use super::pager::{CursorPage, Page};
use crate::entity::EntityRef;
use crate::error::{Error, Result};
use crate::executor::{Projection, Row};
use sea_query::{Order, Value};
use serde_json::Value as JsonValue;
use std::rc::Rc;

/// Ordering contract between SQL-mutating extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionStage {
    /// Adds predicates to the extension condition
    Condition,
    /// `GROUP BY`
    Grouping,
    /// `ORDER BY`
    Ordering,
    /// `LIMIT`/`OFFSET` and result takeover
    Pagination,
}

/// Executes statements on behalf of result-producing extensions
pub trait QueryRunner {
    /// Run the finalized context and hydrate its root entities
    fn fetch_entities(&self, context: &QueryContext) -> Result<Vec<EntityRef>>;

    /// Run an arbitrary statement and collect its rows
    fn fetch_rows(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Vec<Row>>;
}

/// Result of running a query through the pipeline
#[derive(Debug)]
pub enum QueryOutput {
    One(Option<EntityRef>),
    All(Vec<EntityRef>),
    Page(Page),
    CursorPage(CursorPage),
    /// Results were not requested; the finalized statement
    Sql { sql: String, params: Vec<Value> },
}

impl QueryOutput {
    /// Entities of whatever shape was produced
    pub fn into_entities(self) -> Vec<EntityRef> {
        match self {
            QueryOutput::One(entity) => entity.into_iter().collect(),
            QueryOutput::All(items) => items,
            QueryOutput::Page(page) => page.items,
            QueryOutput::CursorPage(page) => page.items,
            QueryOutput::Sql { .. } => Vec::new(),
        }
    }

    pub fn into_one(self) -> Option<EntityRef> {
        self.into_entities().into_iter().next()
    }
}

/// A pluggable rewrite of, or takeover of, a SELECT
pub trait QueryExtension {
    fn name(&self) -> &str;

    fn stage(&self) -> ExtensionStage;

    fn supports(&self, context: &QueryContext) -> bool;

    fn apply(&self, context: &mut QueryContext) -> Result<()>;

    fn supports_result(&self, _context: &QueryContext) -> bool {
        false
    }

    fn result(&self, _context: &QueryContext, _runner: &dyn QueryRunner) -> Result<QueryOutput> {
        Err(Error::Execution(format!("extension {} does not produce results", self.name())))
    }
}

/// Run `extensions` over `context`, then produce results
///
/// With `get_results == false` the finalized statement is returned instead
/// of being executed.
pub fn apply_extensions(
    extensions: &[Rc<dyn QueryExtension>],
    is_collection: bool,
    get_results: bool,
    context: &mut QueryContext,
    runner: &dyn QueryRunner,
) -> Result<QueryOutput> {
    context.set_collection(is_collection);

    let mut ordered: Vec<&Rc<dyn QueryExtension>> = extensions.iter().collect();
    ordered.sort_by_key(|e| e.stage());

    for extension in ordered {
        if !extension.supports(context) {
            continue;
        }
        log::trace!("applying query extension {}", extension.name());
        extension.apply(context)?;
        if get_results && extension.supports_result(context) {
            return extension.result(context, runner);
        }
    }

    if !get_results {
        let (sql, params) = context.build();
        return Ok(QueryOutput::Sql { sql, params });
    }

    let items = runner.fetch_entities(context)?;
    if is_collection {
        Ok(QueryOutput::All(items))
    } else {
        Ok(QueryOutput::One(items.into_iter().next()))
    }
}

/// Emits `GROUP BY` for the expressions the join graph put in the bag
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupBy;

impl QueryExtension for GroupBy {
    fn name(&self) -> &str {
        "group_by"
    }

    fn stage(&self) -> ExtensionStage {
        ExtensionStage::Grouping
    }

    fn supports(&self, context: &QueryContext) -> bool {
        string_list(context.param("group_by")).is_some_and(|list| !list.is_empty())
    }

    fn apply(&self, context: &mut QueryContext) -> Result<()> {
        if let Some(list) = string_list(context.param("group_by")) {
            context.insert_clause(&format!("GROUP BY {}", list.join(", ")));
        }
        Ok(())
    }
}

/// Emits `ORDER BY`, defaulting to the root primary key ascending
#[derive(Debug, Clone, Copy)]
pub struct OrderBy {
    by_primary_key: bool,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self { by_primary_key: true }
    }
}

impl OrderBy {
    pub fn new(by_primary_key: bool) -> Self {
        Self { by_primary_key }
    }

    /// Queue an explicit ordering term in the context bag
    pub fn push(context: &mut QueryContext, expression: &str, order: &Order) -> Result<()> {
        let keyword = order_keyword(order)?;
        let mut terms = match context.remove_param("order_by") {
            Some(JsonValue::Array(terms)) => terms,
            _ => Vec::new(),
        };
        terms.push(JsonValue::String(format!("{expression} {keyword}")));
        context.set_param("order_by", JsonValue::Array(terms));
        Ok(())
    }

    /// The context carries explicit ordering terms
    pub fn is_custom(context: &QueryContext) -> bool {
        string_list(context.param("order_by")).is_some_and(|list| !list.is_empty())
    }
}

impl QueryExtension for OrderBy {
    fn name(&self) -> &str {
        "order_by"
    }

    fn stage(&self) -> ExtensionStage {
        ExtensionStage::Ordering
    }

    fn supports(&self, context: &QueryContext) -> bool {
        OrderBy::is_custom(context) || (self.by_primary_key && !context.primary_key().is_empty())
    }

    fn apply(&self, context: &mut QueryContext) -> Result<()> {
        let terms = match string_list(context.param("order_by")) {
            Some(list) if !list.is_empty() => list,
            _ => context
                .primary_key()
                .iter()
                .map(|column| format!("{column} ASC"))
                .collect(),
        };
        context.insert_clause(&format!("ORDER BY {}", terms.join(", ")));
        context.set_param("ordered", JsonValue::Bool(true));
        Ok(())
    }
}

pub(crate) fn order_keyword(order: &Order) -> Result<&'static str> {
    match order {
        Order::Asc => Ok("ASC"),
        Order::Desc => Ok("DESC"),
        _ => Err(Error::Conversion("only ASC and DESC orderings are supported".to_string())),
    }
}

fn string_list(value: Option<&JsonValue>) -> Option<Vec<String>> {
    match value {
        Some(JsonValue::Array(items)) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::JoinGraphBuilder;
    use crate::query::Where;
    use crate::tests_cfg::registry;
    use std::cell::Cell;

    struct NoRunner;

    impl QueryRunner for NoRunner {
        fn fetch_entities(&self, _context: &QueryContext) -> Result<Vec<EntityRef>> {
            Ok(Vec::new())
        }

        fn fetch_rows(&self, _sql: &str, _params: &[Value], _projection: &Projection) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
    }

    struct Marker {
        stage: ExtensionStage,
        clause: &'static str,
        takes_over: bool,
        applied: Rc<Cell<usize>>,
    }

    impl QueryExtension for Marker {
        fn name(&self) -> &str {
            self.clause
        }

        fn stage(&self) -> ExtensionStage {
            self.stage
        }

        fn supports(&self, _context: &QueryContext) -> bool {
            true
        }

        fn apply(&self, context: &mut QueryContext) -> Result<()> {
            self.applied.set(self.applied.get() + 1);
            context.insert_clause(self.clause);
            Ok(())
        }

        fn supports_result(&self, _context: &QueryContext) -> bool {
            self.takes_over
        }

        fn result(&self, _context: &QueryContext, _runner: &dyn QueryRunner) -> Result<QueryOutput> {
            Ok(QueryOutput::All(Vec::new()))
        }
    }

    fn context(properties: &[&str]) -> QueryContext {
        let registry = registry();
        let graph = JoinGraphBuilder::new(&registry).build("DummyPerson", properties).unwrap();
        QueryContext::new(&graph, Where::default(), true)
    }

    #[test]
    fn test_stage_order_wins_over_registration_order() {
        let counter = Rc::new(Cell::new(0));
        let extensions: Vec<Rc<dyn QueryExtension>> = vec![
            Rc::new(Marker { stage: ExtensionStage::Pagination, clause: "LIMIT 1", takes_over: false, applied: counter.clone() }),
            Rc::new(OrderBy::default()),
            Rc::new(GroupBy),
        ];
        let mut ctx = context(&["name", "dogs"]);
        let output = apply_extensions(&extensions, true, false, &mut ctx, &NoRunner).unwrap();
        let QueryOutput::Sql { sql, .. } = output else {
            panic!("expected SQL output");
        };
        assert!(sql.ends_with("AND TRUE GROUP BY t0.\"name\" ORDER BY t0.\"name\" ASC LIMIT 1"));
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_first_result_extension_short_circuits() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let extensions: Vec<Rc<dyn QueryExtension>> = vec![
            Rc::new(Marker { stage: ExtensionStage::Pagination, clause: "A", takes_over: true, applied: first.clone() }),
            Rc::new(Marker { stage: ExtensionStage::Pagination, clause: "B", takes_over: true, applied: second.clone() }),
        ];
        let mut ctx = context(&["name"]);
        apply_extensions(&extensions, true, true, &mut ctx, &NoRunner).unwrap();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
    }

    #[test]
    fn test_group_by_skipped_without_aggregation() {
        let mut ctx = context(&["name"]);
        assert!(!GroupBy.supports(&ctx));
        OrderBy::default().apply(&mut ctx).unwrap();
        assert!(ctx.build().0.ends_with("AND TRUE ORDER BY t0.\"name\" ASC"));
    }

    #[test]
    fn test_custom_order_replaces_primary_key_order() {
        let mut ctx = context(&["name", "bio"]);
        OrderBy::push(&mut ctx, "t0.\"bio\"", &Order::Desc).unwrap();
        OrderBy::push(&mut ctx, "t0.\"name\"", &Order::Asc).unwrap();
        OrderBy::default().apply(&mut ctx).unwrap();
        assert!(ctx.build().0.ends_with("ORDER BY t0.\"bio\" DESC, t0.\"name\" ASC"));
    }

    #[test]
    fn test_fallback_single_item() {
        let mut ctx = context(&["name"]);
        let output = apply_extensions(&[], false, true, &mut ctx, &NoRunner).unwrap();
        assert!(matches!(output, QueryOutput::One(None)));
    }
}
