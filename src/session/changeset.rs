use crate::entity::{EntityRef, EntityStatus};
use crate::error::Result;
use crate::value::FieldValue;
use std::collections::HashSet;

/// Reachable entities partitioned by the statement a flush would issue
///
/// An entity marked `TO_DELETE` before it ever existed is left out entirely.
///
/// Inserts and updates are ordered so every owning to-one target comes
/// before the entity referencing it; deletes run in the reverse order.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub inserts: Vec<EntityRef>,
    pub updates: Vec<EntityRef>,
    pub deletes: Vec<EntityRef>,
}

impl ChangeSet {
    /// Walk the graph held in memory from `root`; nothing is loaded
    pub fn collect(root: &EntityRef) -> Result<Self> {
        let mut changeset = ChangeSet::default();
        let mut visited = HashSet::new();
        changeset.visit(root, &mut visited);
        changeset.deletes.reverse();
        Ok(changeset)
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    fn visit(&mut self, entity: &EntityRef, visited: &mut HashSet<usize>) {
        if !visited.insert(entity.addr()) {
            return;
        }

        let (dependencies, dependents) = neighbours(entity);
        for dependency in &dependencies {
            self.visit(dependency, visited);
        }

        let status = entity.status();
        if status.contains(EntityStatus::TO_DELETE) {
            // Skipped when it was never persisted
            if status.contains(EntityStatus::EXIST) {
                self.deletes.push(entity.clone());
            }
        } else if !status.contains(EntityStatus::EXIST) && !status.contains(EntityStatus::PROXY) {
            self.inserts.push(entity.clone());
        } else if status.contains(EntityStatus::EXIST | EntityStatus::MODIFIED) {
            self.updates.push(entity.clone());
        }

        for dependent in &dependents {
            self.visit(dependent, visited);
        }
    }
}

/// (owning to-one targets, everything else reachable)
fn neighbours(entity: &EntityRef) -> (Vec<EntityRef>, Vec<EntityRef>) {
    let owner = entity.borrow();
    let metadata = owner.metadata();
    let mut dependencies = Vec::new();
    let mut dependents = Vec::new();

    let mut properties: Vec<&str> = owner.values().map(|(name, _)| name).collect();
    properties.sort_unstable();
    for property in properties {
        let owning = metadata
            .relation(property)
            .is_some_and(|r| r.owning && r.cardinality.is_to_one());
        match owner.raw(property) {
            Some(FieldValue::Entity(related)) if owning => dependencies.push(related.clone()),
            Some(FieldValue::Entity(related)) => dependents.push(related.clone()),
            Some(FieldValue::Collection(members)) => dependents.extend(members.iter().cloned()),
            _ => {}
        }
    }

    let mut mids: Vec<_> = owner.mids.iter().collect();
    mids.sort_unstable_by(|a, b| a.0.cmp(b.0));
    for (_, set) in mids {
        dependents.extend(set.entries.iter().cloned());
        dependents.extend(set.removed.iter().cloned());
    }
    (dependencies, dependents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::tests_cfg::registry;

    #[test]
    fn test_owning_target_is_inserted_first() {
        let registry = registry();
        let person = EntityRef::new(Entity::new(registry.metadata("DummyPerson").unwrap()));
        person.borrow_mut().set_field("name", "someone").unwrap();
        let dog = EntityRef::new(Entity::new(registry.metadata("DummyDog").unwrap()));
        dog.borrow_mut().set_field("name", "rex").unwrap();
        dog.borrow_mut().put("owner", FieldValue::Entity(person.clone()));

        let changeset = ChangeSet::collect(&dog).unwrap();
        assert_eq!(changeset.inserts.len(), 2);
        assert!(changeset.inserts[0].ptr_eq(&person));
        assert!(changeset.inserts[1].ptr_eq(&dog));
    }

    #[test]
    fn test_statuses_are_partitioned() {
        let registry = registry();
        let metadata = registry.metadata("DummyDog").unwrap();
        let root = EntityRef::new(Entity::new(registry.metadata("DummyPerson").unwrap()));
        root.borrow_mut().add_status(EntityStatus::EXIST);

        let modified = EntityRef::new(Entity::new(metadata.clone()));
        modified.borrow_mut().add_status(EntityStatus::EXIST | EntityStatus::MODIFIED);
        let doomed = EntityRef::new(Entity::new(metadata.clone()));
        doomed.borrow_mut().add_status(EntityStatus::EXIST | EntityStatus::TO_DELETE);
        let proxy = EntityRef::new(Entity::new(metadata));
        proxy.borrow_mut().add_status(EntityStatus::EXIST | EntityStatus::PROXY);

        root.borrow_mut().put(
            "owned_dogs",
            FieldValue::Collection(vec![modified.clone(), doomed.clone(), proxy]),
        );

        let changeset = ChangeSet::collect(&root).unwrap();
        assert!(changeset.inserts.is_empty());
        assert_eq!(changeset.updates.len(), 1);
        assert!(changeset.updates[0].ptr_eq(&modified));
        assert_eq!(changeset.deletes.len(), 1);
        assert!(changeset.deletes[0].ptr_eq(&doomed));
    }

    #[test]
    fn test_deleted_before_insert_is_skipped() {
        let registry = registry();
        let person = EntityRef::new(Entity::new(registry.metadata("DummyPerson").unwrap()));
        person.borrow_mut().set_field("name", "someone").unwrap();
        person.borrow_mut().add_status(EntityStatus::TO_DELETE);

        let changeset = ChangeSet::collect(&person).unwrap();
        assert!(changeset.is_empty());
    }

    #[test]
    fn test_cycles_terminate() {
        let registry = registry();
        let person = EntityRef::new(Entity::new(registry.metadata("DummyPerson").unwrap()));
        person.borrow_mut().put("mother", FieldValue::Entity(person.clone()));
        let changeset = ChangeSet::collect(&person).unwrap();
        assert_eq!(changeset.inserts.len(), 1);
    }
}
