//! Fetch strategies.
//!
//! Every relation property, and any structure field that should not be part
//! of the initial SELECT, has a [`FetchDescriptor`] deciding when its value is
//! loaded:
//! - `Join`: in the same statement as the owner
//! - `Proxy`: reference-only instance built from the owner's key columns
//! - `Lazy`: on first access, one statement for the whole lazy group
//! - `ExtraLazy`: on first access, one statement per property

pub(crate) mod resolver;

use crate::error::Result;
use crate::join::{JoinContext, JoinNode, JoinType};
use crate::relation::ColumnPair;
use sea_query::Value;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Custom join escape hatch; the returned node is wired into the graph as is
pub type JoinCallback = Arc<dyn Fn(&mut JoinContext<'_>) -> Result<JoinNode> + Send + Sync>;

/// Loading strategy of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Join,
    Proxy,
    Lazy,
    ExtraLazy,
}

impl FetchMode {
    /// Resolved in a later statement, not in the owner's SELECT
    pub fn is_deferred(&self) -> bool {
        matches!(self, FetchMode::Lazy | FetchMode::ExtraLazy)
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchMode::Join => "JOIN",
            FetchMode::Proxy => "PROXY",
            FetchMode::Lazy => "LAZY",
            FetchMode::ExtraLazy => "EXTRA_LAZY",
        };
        f.write_str(name)
    }
}

/// Declarative fetch record for one property
#[derive(Clone)]
pub struct FetchConfig {
    pub property: String,
    pub mode: FetchMode,
    /// Target class when the property has no relation declaration
    pub target_class: Option<String>,
    /// owner column -> target column
    pub columns: Vec<ColumnPair>,
    /// Target is a collection (only meaningful without a relation)
    pub collection: bool,
    pub callback: Option<JoinCallback>,
    /// Literal values given to a freshly built proxy
    pub defaults: Vec<(String, Value)>,
}

impl FetchConfig {
    pub fn new(property: impl Into<String>, mode: FetchMode) -> Self {
        Self {
            property: property.into(),
            mode,
            target_class: None,
            columns: Vec::new(),
            collection: false,
            callback: None,
            defaults: Vec::new(),
        }
    }

    pub fn join(property: impl Into<String>) -> Self {
        Self::new(property, FetchMode::Join)
    }

    pub fn proxy(property: impl Into<String>) -> Self {
        Self::new(property, FetchMode::Proxy)
    }

    pub fn lazy(property: impl Into<String>) -> Self {
        Self::new(property, FetchMode::Lazy)
    }

    pub fn extra_lazy(property: impl Into<String>) -> Self {
        Self::new(property, FetchMode::ExtraLazy)
    }

    pub fn target(mut self, class: impl Into<String>) -> Self {
        self.target_class = Some(class.into());
        self
    }

    pub fn columns<I, A, B>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        self.columns = crate::relation::def::pairs_from(columns);
        self
    }

    pub fn collection(mut self, collection: bool) -> Self {
        self.collection = collection;
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut JoinContext<'_>) -> Result<JoinNode> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn default_value(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((property.into(), value.into()));
        self
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("property", &self.property)
            .field("mode", &self.mode)
            .field("target_class", &self.target_class)
            .field("columns", &self.columns)
            .field("collection", &self.collection)
            .field("callback", &self.callback.is_some())
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// What a fetch descriptor loads
#[derive(Clone)]
pub enum FetchTarget {
    /// A structure column of the owner itself
    Field,
    /// A direct join to another class
    Related {
        class: String,
        columns: Vec<ColumnPair>,
        collection: bool,
    },
    /// owner -> mid -> related
    Through {
        mid_class: String,
        owner_columns: Vec<ColumnPair>,
        related_class: String,
        related_columns: Vec<ColumnPair>,
    },
    /// Opaque join built by a user callback
    Callback(JoinCallback),
}

impl FetchTarget {
    pub fn is_field(&self) -> bool {
        matches!(self, FetchTarget::Field)
    }

    pub fn is_collection(&self) -> bool {
        match self {
            FetchTarget::Related { collection, .. } => *collection,
            FetchTarget::Through { .. } => true,
            _ => false,
        }
    }

    pub fn target_class(&self) -> Option<&str> {
        match self {
            FetchTarget::Related { class, .. } => Some(class),
            FetchTarget::Through { related_class, .. } => Some(related_class),
            _ => None,
        }
    }
}

impl fmt::Debug for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Field => f.write_str("Field"),
            FetchTarget::Related {
                class,
                columns,
                collection,
            } => f
                .debug_struct("Related")
                .field("class", class)
                .field("columns", columns)
                .field("collection", collection)
                .finish(),
            FetchTarget::Through {
                mid_class,
                owner_columns,
                related_class,
                related_columns,
            } => f
                .debug_struct("Through")
                .field("mid_class", mid_class)
                .field("owner_columns", owner_columns)
                .field("related_class", related_class)
                .field("related_columns", related_columns)
                .finish(),
            FetchTarget::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Normalized fetch metadata for one property
#[derive(Clone, Debug)]
pub struct FetchDescriptor {
    pub property: String,
    pub mode: FetchMode,
    pub source_class: String,
    pub target: FetchTarget,
    pub join_type: JoinType,
    pub defaults: Vec<(String, Value)>,
}

impl FetchDescriptor {
    /// Loaded by joining another relation
    pub fn is_relational(&self) -> bool {
        !self.target.is_field()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_modes() {
        assert!(FetchMode::Lazy.is_deferred());
        assert!(FetchMode::ExtraLazy.is_deferred());
        assert!(!FetchMode::Join.is_deferred());
        assert!(!FetchMode::Proxy.is_deferred());
    }

    #[test]
    fn test_fetch_mode_deserializes_snake_case() {
        let mode: FetchMode = serde_json::from_str("\"extra_lazy\"").unwrap();
        assert_eq!(mode, FetchMode::ExtraLazy);
    }

    #[test]
    fn test_fetch_config_builder() {
        let config = FetchConfig::proxy("mother")
            .target("DummyPerson")
            .columns([("dummy_person_mother_name", "name")])
            .default_value("bio", "unknown");
        assert_eq!(config.mode, FetchMode::Proxy);
        assert_eq!(config.columns.len(), 1);
        assert_eq!(config.defaults[0].0, "bio");
    }

    #[test]
    fn test_target_collection_flags() {
        let through = FetchTarget::Through {
            mid_class: "DummyPersonDog".to_string(),
            owner_columns: vec![],
            related_class: "DummyDog".to_string(),
            related_columns: vec![],
        };
        assert!(through.is_collection());
        assert_eq!(through.target_class(), Some("DummyDog"));
        assert!(!FetchTarget::Field.is_collection());
    }
}
