//! Relation declarations and their resolved descriptors.
//!
//! A [`RelationConfig`] is the declarative record attached to one property of
//! an entity class. The registry validates it and normalizes it into a
//! [`RelationDescriptor`], filling in join columns inferred from the inverse
//! side or from the mid class.

use crate::entity::Entity;
use crate::error::Result;
use crate::join::JoinType;
use crate::registry::ClassMetadata;
use crate::value::FieldValue;
use std::fmt;
use std::sync::Arc;

/// Custom setter invoked after the in-memory relation update
pub type Setter = Arc<dyn Fn(&mut Entity, &FieldValue) -> Result<()> + Send + Sync>;

/// Custom getter applied to a resolved property value before it is returned
pub type Getter = Arc<dyn Fn(&Entity, FieldValue) -> Result<FieldValue> + Send + Sync>;

/// Builds a fresh mid entity for a many-to-many link
pub type MidFactory = Arc<dyn Fn(Arc<ClassMetadata>) -> Result<Entity> + Send + Sync>;

/// Cardinality of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// `set`/`unset` are legal
    pub fn is_to_one(&self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::ManyToOne)
    }

    /// `add`/`remove`/`has` are legal
    pub fn is_to_many(&self) -> bool {
        !self.is_to_one()
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cardinality::OneToOne => "oneToOne",
            Cardinality::OneToMany => "oneToMany",
            Cardinality::ManyToOne => "manyToOne",
            Cardinality::ManyToMany => "manyToMany",
        };
        f.write_str(name)
    }
}

/// Column equality used in a join: `source.column = target.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnPair {
    pub source: String,
    pub target: String,
}

impl ColumnPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Swap source and target
    pub fn rev(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}

pub(crate) fn pairs_from<I, A, B>(columns: I) -> Vec<ColumnPair>
where
    I: IntoIterator<Item = (A, B)>,
    A: Into<String>,
    B: Into<String>,
{
    columns
        .into_iter()
        .map(|(a, b)| ColumnPair::new(a, b))
        .collect()
}

/// Join-table declaration of a many-to-many relation
#[derive(Clone)]
pub struct MidConfig {
    /// Mid entity class
    pub class: String,
    /// Mid property (manyToOne) pointing back at the owner
    pub local_property: String,
    /// Mid property (manyToOne) pointing at the related entity
    pub related_property: String,
    pub factory: Option<MidFactory>,
}

impl MidConfig {
    pub fn new(
        class: impl Into<String>,
        local_property: impl Into<String>,
        related_property: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            local_property: local_property.into(),
            related_property: related_property.into(),
            factory: None,
        }
    }

    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(Arc<ClassMetadata>) -> Result<Entity> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }
}

impl fmt::Debug for MidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidConfig")
            .field("class", &self.class)
            .field("local_property", &self.local_property)
            .field("related_property", &self.related_property)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// Declarative relation record for one property
///
/// Columns are always written owner-side first: for a `manyToOne` that is
/// `(foreign key on owner, key on related)`, for a `oneToMany`
/// `(key on owner, foreign key on related)`.
#[derive(Clone)]
pub struct RelationConfig {
    pub property: String,
    pub cardinality: Cardinality,
    pub related_class: Option<String>,
    pub mapped_by: Option<String>,
    pub columns: Vec<ColumnPair>,
    pub mid: Option<MidConfig>,
    pub join_type: Option<JoinType>,
    pub setter: Option<Setter>,
    pub getter: Option<Getter>,
}

impl RelationConfig {
    pub fn new(property: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            property: property.into(),
            cardinality,
            related_class: None,
            mapped_by: None,
            columns: Vec::new(),
            mid: None,
            join_type: None,
            setter: None,
            getter: None,
        }
    }

    pub fn one_to_one(property: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(property, Cardinality::OneToOne).related(related)
    }

    pub fn many_to_one(property: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(property, Cardinality::ManyToOne).related(related)
    }

    pub fn one_to_many(property: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(property, Cardinality::OneToMany).related(related)
    }

    pub fn many_to_many(property: impl Into<String>, related: impl Into<String>, mid: MidConfig) -> Self {
        let mut config = Self::new(property, Cardinality::ManyToMany).related(related);
        config.mid = Some(mid);
        config
    }

    pub fn related(mut self, class: impl Into<String>) -> Self {
        self.related_class = Some(class.into());
        self
    }

    /// Name of the inverse property on the related class
    pub fn mapped_by(mut self, property: impl Into<String>) -> Self {
        self.mapped_by = Some(property.into());
        self
    }

    pub fn columns<I, A, B>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        self.columns = pairs_from(columns);
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut Entity, &FieldValue) -> Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Entity, FieldValue) -> Result<FieldValue> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }
}

impl fmt::Debug for RelationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationConfig")
            .field("property", &self.property)
            .field("cardinality", &self.cardinality)
            .field("related_class", &self.related_class)
            .field("mapped_by", &self.mapped_by)
            .field("columns", &self.columns)
            .field("mid", &self.mid)
            .field("join_type", &self.join_type)
            .finish_non_exhaustive()
    }
}

/// Resolved join path through the mid entity of a many-to-many relation
#[derive(Clone)]
pub struct MidDescriptor {
    pub class: String,
    pub local_property: String,
    pub related_property: String,
    /// owner column -> mid column
    pub owner_columns: Vec<ColumnPair>,
    /// mid column -> related column
    pub related_columns: Vec<ColumnPair>,
    pub factory: Option<MidFactory>,
}

impl fmt::Debug for MidDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidDescriptor")
            .field("class", &self.class)
            .field("local_property", &self.local_property)
            .field("related_property", &self.related_property)
            .field("owner_columns", &self.owner_columns)
            .field("related_columns", &self.related_columns)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// Normalized relation metadata, immutable once resolved
#[derive(Clone)]
pub struct RelationDescriptor {
    pub property: String,
    pub cardinality: Cardinality,
    pub related_class: String,
    pub mapped_by: Option<String>,
    /// owner column -> related column; empty for many-to-many
    pub columns: Vec<ColumnPair>,
    /// The owner row holds the foreign key
    pub owning: bool,
    pub mid: Option<MidDescriptor>,
    pub cascade_delete: bool,
    pub join_type: JoinType,
    pub setter: Option<Setter>,
    pub getter: Option<Getter>,
}

impl fmt::Debug for RelationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("property", &self.property)
            .field("cardinality", &self.cardinality)
            .field("related_class", &self.related_class)
            .field("mapped_by", &self.mapped_by)
            .field("columns", &self.columns)
            .field("owning", &self.owning)
            .field("mid", &self.mid)
            .field("cascade_delete", &self.cascade_delete)
            .field("join_type", &self.join_type)
            .field("setter", &self.setter.is_some())
            .field("getter", &self.getter.is_some())
            .finish()
    }
}

/// Owner scalar mirroring a property of its to-one related entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapValue {
    pub property: String,
    pub relation: String,
    pub related_property: String,
}

impl MapValue {
    pub fn new(
        property: impl Into<String>,
        relation: impl Into<String>,
        related_property: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            relation: relation.into(),
            related_property: related_property.into(),
        }
    }
}
