//! Relation declarations.
//!
//! Declaration types ([`RelationConfig`], [`MidConfig`], [`MapValue`]) are
//! what entity definitions are written with; the descriptor types are what
//! the registry hands back once a class resolved.

pub mod def;

#[doc(inline)]
pub use def::{
    Cardinality, ColumnPair, Getter, MapValue, MidConfig, MidDescriptor, MidFactory, RelationConfig,
    RelationDescriptor, Setter,
};
