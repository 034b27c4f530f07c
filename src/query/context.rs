//! Accumulated state of one SELECT while extensions rewrite it.

use super::where_clause::{number_placeholders, Where};
use crate::executor::{FieldType, ProjectedField, Projection};
use crate::join::JoinGraph;
use sea_query::Value;
use serde_json::{Map, Value as JsonValue};

/// Marker extensions insert their clauses in front of
pub const NEEDLE: &str = "{:tether_extensions:}";

/// Marker replaced by the extension condition (or `TRUE`)
pub const CONDITION_NEEDLE: &str = "{:tether_condition:}";

/// SQL template, bound values, projection and extension parameter bag
#[derive(Debug, Clone)]
pub struct QueryContext {
    class: String,
    sql: String,
    params: Vec<Value>,
    projection: Projection,
    bag: Map<String, JsonValue>,
    collection: bool,
    root_alias: String,
    primary_key: Vec<String>,
    from_clause: String,
    condition: Where,
    extra_condition: Where,
}

impl QueryContext {
    pub fn new(graph: &JoinGraph, condition: Where, collection: bool) -> Self {
        let from_clause = graph.from_clause();
        let sql = format!(
            "SELECT {} FROM {from_clause} WHERE {condition} AND {CONDITION_NEEDLE} {NEEDLE}",
            graph.select_list()
        );

        let mut bag = Map::new();
        let group_by = graph.group_by();
        if !group_by.is_empty() {
            bag.insert(
                "group_by".to_string(),
                JsonValue::Array(group_by.into_iter().map(JsonValue::String).collect()),
            );
        }

        Self {
            class: graph.class().to_string(),
            params: condition.values(),
            sql,
            projection: graph.projection(),
            bag,
            collection,
            root_alias: graph.alias().to_string(),
            primary_key: graph.primary_key().to_vec(),
            from_clause,
            condition,
            extra_condition: Where::default(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Template including the extension markers
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    pub(crate) fn set_collection(&mut self, collection: bool) {
        self.collection = collection;
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    /// Qualified root primary key columns
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn from_clause(&self) -> &str {
        &self.from_clause
    }

    pub fn condition(&self) -> &Where {
        &self.condition
    }

    pub fn extra_condition(&self) -> &Where {
        &self.extra_condition
    }

    pub fn param(&self, name: &str) -> Option<&JsonValue> {
        self.bag.get(name)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: JsonValue) {
        self.bag.insert(name.into(), value);
    }

    pub fn remove_param(&mut self, name: &str) -> Option<JsonValue> {
        self.bag.remove(name)
    }

    /// Insert `clause` right before the needle, keeping the needle in place
    pub fn insert_clause(&mut self, clause: &str) {
        self.sql = self.sql.replacen(NEEDLE, &format!("{clause} {NEEDLE}"), 1);
    }

    /// AND a predicate into the extension condition
    pub fn add_condition(&mut self, condition: Where) {
        let current = std::mem::take(&mut self.extra_condition);
        self.extra_condition = current.and_where(condition);
    }

    /// Final SQL with numbered placeholders, and its parameters
    pub fn build(&self) -> (String, Vec<Value>) {
        let sql = self
            .sql
            .replacen(CONDITION_NEEDLE, &self.extra_condition.to_string(), 1)
            .replacen(&format!(" {NEEDLE}"), "", 1);
        let mut params = self.params.clone();
        params.extend(self.extra_condition.values());
        (number_placeholders(&sql), params)
    }

    /// `count(DISTINCT pk)` over the same joins and conditions
    pub fn count_query(&self) -> (String, Vec<Value>, Projection) {
        let sql = format!(
            "SELECT count(DISTINCT ({})) as \"count\" FROM {} WHERE {} AND {}",
            self.primary_key.join(", "),
            self.from_clause,
            self.condition,
            self.extra_condition
        );
        let mut params = self.params.clone();
        params.extend(self.extra_condition.values());
        let projection = Projection::new(vec![ProjectedField::new(
            "count",
            "count(*)",
            FieldType::Sql("int8".to_string()),
        )]);
        (number_placeholders(&sql), params, projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::JoinGraphBuilder;
    use crate::tests_cfg::registry;

    fn context(properties: &[&str], condition: Where) -> QueryContext {
        let registry = registry();
        let graph = JoinGraphBuilder::new(&registry).build("DummyPerson", properties).unwrap();
        QueryContext::new(&graph, condition, true)
    }

    #[test]
    fn test_build_without_extensions() {
        let ctx = context(&["name"], Where::new("t0.\"name\" = $*", vec![Value::from("someone")]));
        let (sql, params) = ctx.build();
        assert_eq!(
            sql,
            "SELECT t0.\"name\" as \"name\" FROM dummy_person t0 WHERE t0.\"name\" = $1 AND TRUE"
        );
        assert_eq!(params, vec![Value::from("someone")]);
    }

    #[test]
    fn test_clauses_keep_insertion_order() {
        let mut ctx = context(&["name"], Where::default());
        ctx.insert_clause("GROUP BY a");
        ctx.insert_clause("ORDER BY b");
        assert!(ctx.sql().ends_with(&format!("GROUP BY a ORDER BY b {NEEDLE}")));
        let (sql, _) = ctx.build();
        assert!(sql.ends_with("WHERE TRUE AND TRUE GROUP BY a ORDER BY b"));
    }

    #[test]
    fn test_extra_condition_params_follow_user_params() {
        let mut ctx = context(&["name"], Where::new("t0.\"name\" != $*", vec![Value::from("a")]));
        ctx.add_condition(Where::new("(t0.\"name\") > ($*)", vec![Value::from("b")]));
        let (sql, params) = ctx.build();
        assert!(sql.contains("WHERE t0.\"name\" != $1 AND (t0.\"name\") > ($2)"));
        assert_eq!(params, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_group_by_bag_only_when_aggregated() {
        assert!(context(&["name"], Where::default()).param("group_by").is_none());
        let ctx = context(&["name", "dogs"], Where::default());
        assert_eq!(ctx.param("group_by"), Some(&serde_json::json!(["t0.\"name\""])));
    }

    #[test]
    fn test_count_query_uses_distinct_primary_key() {
        let ctx = context(&["name", "dogs"], Where::new("t0.\"name\" != $*", vec![Value::from("x")]));
        let (sql, params, projection) = ctx.count_query();
        assert!(sql.starts_with("SELECT count(DISTINCT (t0.\"name\")) as \"count\" FROM dummy_person t0 LEFT OUTER JOIN"));
        assert!(sql.ends_with("WHERE t0.\"name\" != $1 AND TRUE"));
        assert_eq!(params.len(), 1);
        assert!(projection.get("count").is_some());
    }
}
