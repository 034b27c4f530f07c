//! Per-session identity map.
//!
//! Keys are `(class, PrimaryKey)`. Because [`PrimaryKey`] parts are exact
//! typed, `1` and `'1'` never collide.

use crate::entity::{Entity, EntityRef};
use crate::registry::ClassMetadata;
use crate::value::PrimaryKey;
use std::collections::HashMap;
use std::sync::Arc;

/// At most one live instance per `(class, primary key)`
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<(String, PrimaryKey), EntityRef>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical instance for the key, allocating an empty shell if absent
    ///
    /// The flag is `true` when the shell was just created and still needs
    /// hydrating.
    pub fn fetch(&mut self, metadata: &Arc<ClassMetadata>, primary_key: PrimaryKey) -> (EntityRef, bool) {
        let key = (metadata.name().to_string(), primary_key);
        if let Some(existing) = self.entries.get(&key) {
            log::trace!("identity map hit {}{}", key.0, key.1);
            return (existing.clone(), false);
        }
        log::trace!("identity map miss {}{}", key.0, key.1);
        let entity = EntityRef::new(Entity::new(Arc::clone(metadata)));
        self.entries.insert(key, entity.clone());
        (entity, true)
    }

    /// Pure lookup
    pub fn get(&self, class: &str, primary_key: &PrimaryKey) -> Option<EntityRef> {
        self.entries
            .get(&(class.to_string(), primary_key.clone()))
            .cloned()
    }

    /// Register an entity whose key became known after creation
    ///
    /// Returns the entity already mapped under that key, if any, without
    /// replacing it.
    pub fn register(&mut self, class: &str, primary_key: PrimaryKey, entity: &EntityRef) -> Option<EntityRef> {
        let key = (class.to_string(), primary_key);
        match self.entries.get(&key) {
            Some(existing) if !existing.ptr_eq(entity) => Some(existing.clone()),
            Some(_) => None,
            None => {
                self.entries.insert(key, entity.clone());
                None
            }
        }
    }

    pub fn remove(&mut self, class: &str, primary_key: &PrimaryKey) -> Option<EntityRef> {
        self.entries.remove(&(class.to_string(), primary_key.clone()))
    }

    pub fn contains(&self, class: &str, primary_key: &PrimaryKey) -> bool {
        self.get(class, primary_key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
