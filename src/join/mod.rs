//! Join graph primitives.
//!
//! A [`JoinNode`] is one `JOIN` clause plus the result columns it
//! contributes. Nodes are created by the [`JoinGraphBuilder`] (or by a fetch
//! callback through a [`JoinContext`]) and rendered once into SQL.

mod builder;

pub use builder::{JoinGraph, JoinGraphBuilder};

use crate::error::Result;
use crate::executor::{FieldType, ProjectedField, RecordType};
use crate::registry::Registry;
use crate::relation::ColumnPair;
use crate::structure::{is_text_type, Structure};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Alias of the root relation in every generated statement
pub const ROOT_ALIAS: &str = "t0";

/// SQL join flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Left,
    Inner,
    Right,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Left => "LEFT OUTER JOIN",
            JoinType::Inner => "INNER JOIN",
            JoinType::Right => "RIGHT OUTER JOIN",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `alias."column"`
pub fn qualify(alias: &str, column: &str) -> String {
    format!("{alias}.{}", quote_ident(column))
}

/// Monotonic `t0`, `t1`, ... alias source, one per graph build
#[derive(Debug, Default)]
pub struct AliasGenerator {
    next: usize,
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.next);
        self.next += 1;
        alias
    }

    /// Number of aliases handed out so far
    pub fn issued(&self) -> usize {
        self.next
    }
}

/// One join clause and the fields it projects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinNode {
    pub join_type: JoinType,
    /// Alias of the relation this node joins from
    pub source_alias: String,
    /// Class behind the joined relation
    pub class: String,
    /// Joined table name
    pub relation: String,
    pub alias: String,
    /// `source_alias.source = alias.target`, all pairs ANDed
    pub condition: Vec<ColumnPair>,
    pub fields: Vec<ProjectedField>,
    /// Joins hanging off this node (mid -> related)
    pub children: Vec<JoinNode>,
}

impl JoinNode {
    pub fn render_condition(&self) -> String {
        self.condition
            .iter()
            .map(|pair| {
                format!(
                    "{} = {}",
                    qualify(&self.source_alias, &pair.source),
                    qualify(&self.alias, &pair.target)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Append this join and then its children, depth first
    pub fn render_into(&self, out: &mut String) {
        out.push(' ');
        out.push_str(self.join_type.as_sql());
        out.push(' ');
        out.push_str(&self.relation);
        out.push_str(" AS ");
        out.push_str(&self.alias);
        out.push_str(" ON ");
        out.push_str(&self.render_condition());
        for child in &self.children {
            child.render_into(out);
        }
    }

    /// Projected fields of this subtree in pre-order
    pub fn collect_fields<'a>(&'a self, out: &mut Vec<&'a ProjectedField>) {
        out.extend(self.fields.iter());
        for child in &self.children {
            child.collect_fields(out);
        }
    }
}

/// State handed to join builders and fetch callbacks
pub struct JoinContext<'a> {
    registry: &'a Registry,
    aliases: &'a mut AliasGenerator,
    source_class: &'a str,
    source_alias: &'a str,
    property: &'a str,
}

impl<'a> JoinContext<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        aliases: &'a mut AliasGenerator,
        source_class: &'a str,
        source_alias: &'a str,
        property: &'a str,
    ) -> Self {
        Self {
            registry,
            aliases,
            source_class,
            source_alias,
            property,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn source_class(&self) -> &str {
        self.source_class
    }

    pub fn source_alias(&self) -> &str {
        self.source_alias
    }

    /// Property being fetched
    pub fn property(&self) -> &str {
        self.property
    }

    pub fn next_alias(&mut self) -> String {
        self.aliases.next_alias()
    }

    pub fn structure(&self, class: &str) -> Result<Arc<Structure>> {
        self.registry.structure(class)
    }

    /// A join onto `class` from `source_alias` with a fresh alias and no fields
    pub fn join(&mut self, class: &str, source_alias: &str, condition: &[ColumnPair]) -> Result<JoinNode> {
        let structure = self.structure(class)?;
        Ok(JoinNode {
            join_type: self.registry.default_join_type(),
            source_alias: source_alias.to_string(),
            class: class.to_string(),
            relation: structure.relation().to_string(),
            alias: self.next_alias(),
            condition: condition.to_vec(),
            fields: Vec::new(),
            children: Vec::new(),
        })
    }

    /// `alias as "name"` carrying the whole related row
    pub fn entity_field(&self, alias: &str, class: &str, name: &str) -> Result<ProjectedField> {
        let structure = self.structure(class)?;
        Ok(entity_field(alias, class, &structure, name))
    }

    /// `array_agg(alias) FILTER (...) as "name"` aggregating related rows
    pub fn array_field(&self, alias: &str, class: &str, name: &str) -> Result<ProjectedField> {
        let structure = self.structure(class)?;
        Ok(array_field(alias, class, &structure, name))
    }
}

pub(crate) fn record_type(class: &str, structure: &Structure) -> RecordType {
    RecordType {
        class: class.to_string(),
        fields: structure
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.sql_type.clone()))
            .collect(),
    }
}

pub(crate) fn entity_field(alias: &str, class: &str, structure: &Structure, name: &str) -> ProjectedField {
    ProjectedField::new(name, alias, FieldType::Entity(record_type(class, structure)))
}

pub(crate) fn array_field(alias: &str, class: &str, structure: &Structure, name: &str) -> ProjectedField {
    let expression = format!("array_agg({alias}) FILTER (WHERE {})", unmatched_guard(alias, structure));
    ProjectedField::new(name, expression, FieldType::EntityArray(record_type(class, structure)))
}

/// Excludes the all-NULL row a LEFT join yields when nothing matched
fn unmatched_guard(alias: &str, structure: &Structure) -> String {
    let Some(column) = structure.primary_key_fields().first() else {
        return format!("{alias} IS NOT NULL");
    };
    let qualified = qualify(alias, column);
    match structure.field_type(column) {
        Some(sql_type) if is_text_type(sql_type) => format!("{qualified} != ''::text"),
        _ => format!("{qualified} IS NOT NULL"),
    }
}
