//! # Tether
//!
//! Relation, fetch-strategy and identity-map engine for PostgreSQL entity
//! models.
//!
//! Classes are declared once in a [`Registry`]. A [`Session`] loads entities
//! through per-class [`session::Repository`] clients, hands out one instance
//! per primary key, and resolves relations according to their fetch mode:
//! joined into the initial statement, proxied from foreign keys, or loaded on
//! first access. Relation mutators keep both sides consistent in memory.
//!
//! ```
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use tether::fetch::FetchConfig;
//! use tether::mock::MockExecutor;
//! use tether::registry::EntityDefinition;
//! use tether::relation::RelationConfig;
//! use tether::{Registry, Session, Structure};
//!
//! let registry = Registry::builder()
//!     .register(
//!         EntityDefinition::new(
//!             "Person",
//!             Structure::new("person").field("name", "text").primary_key(["name"]),
//!         )
//!         .relation(RelationConfig::one_to_many("dogs", "Dog").mapped_by("owner"))
//!         .fetch(FetchConfig::join("dogs")),
//!     )
//!     .register(
//!         EntityDefinition::new(
//!             "Dog",
//!             Structure::new("dog")
//!                 .field("name", "text")
//!                 .field("owner_name", "text")
//!                 .primary_key(["name"]),
//!         )
//!         .relation(RelationConfig::many_to_one("owner", "Person").columns([("owner_name", "name")])),
//!     )
//!     .build();
//!
//! let executor = Rc::new(MockExecutor::new());
//! let session = Session::new(Arc::new(registry), executor.clone());
//! let people = session.repository("Person").unwrap();
//! let (sql, _) = people.select().to_sql(true).unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT t0.\"name\" as \"name\", array_agg(t1) FILTER (WHERE t1.\"name\" != ''::text) as \"dogs\" \
//!      FROM person t0 LEFT OUTER JOIN dog AS t1 ON t0.\"name\" = t1.\"owner_name\" \
//!      WHERE TRUE AND TRUE GROUP BY t0.\"name\" ORDER BY t0.\"name\" ASC"
//! );
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod identity;
pub mod join;
pub mod metrics;
pub mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod registry;
pub mod relation;
mod runtime;
pub mod session;
pub mod structure;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod tests_cfg;

pub use config::{DatabaseConfig, FetchSettings, TetherConfig};
pub use entity::{Entity, EntityRef, EntityStatus};
pub use error::{Error, Result};
pub use identity::IdentityMap;
pub use registry::{ClassMetadata, EntityDefinition, Registry};
pub use session::{ChangeSet, Repository, Session};
pub use structure::Structure;
pub use transaction::TransactionScope;
pub use value::{FieldValue, KeyPart, PrimaryKey};

#[cfg(feature = "postgres")]
pub use postgres::MayPostgresExecutor;
