//! Relation synchronization.
//!
//! Mutators keep both sides of a relation consistent in memory: foreign key
//! columns, the inverse property when it is loaded, mapped scalar values
//! and, for many-to-many relations, the mid entities. Nothing here writes;
//! persistence goes through the change set.
//!
//! Membership is decided against the full collection. When a persisted
//! entity's to-many property is not loaded yet (LAZY or EXTRA_LAZY), the
//! mutator reads it through the fetch resolver first, which issues that
//! property's one load query; the same holds for persisted mid entities.
//! Every later mutation on the property is in memory only.

use crate::entity::{null_for, Entity, EntityRef, EntityStatus};
use crate::error::{Error, Result};
use crate::fetch::resolver;
use crate::relation::{Cardinality, RelationDescriptor};
use crate::value::{value_is_null, FieldValue};
use std::collections::HashSet;
use std::sync::Arc;

fn relation_of(entity: &EntityRef, property: &str) -> Result<RelationDescriptor> {
    entity
        .metadata()
        .relation(property)
        .cloned()
        .ok_or_else(|| Error::unknown_property(entity.class(), property))
}

fn cardinality_error(entity: &EntityRef, relation: &RelationDescriptor, expected: &'static str) -> Error {
    Error::Cardinality {
        class: entity.class(),
        property: relation.property.clone(),
        expected,
        actual: relation.cardinality,
    }
}

fn check_class(entity: &EntityRef, relation: &RelationDescriptor, related: &EntityRef) -> Result<()> {
    let actual = related.class();
    if actual != relation.related_class {
        return Err(Error::RelatedClassMismatch {
            class: entity.class(),
            property: relation.property.clone(),
            expected: relation.related_class.clone(),
            actual,
        });
    }
    Ok(())
}

fn null_column(entity: &EntityRef, column: &str) -> FieldValue {
    FieldValue::Scalar(null_for(entity.metadata().structure().field_type(column)))
}

fn column_value(entity: &EntityRef, column: &str) -> FieldValue {
    match entity.borrow().scalar(column) {
        Some(value) => FieldValue::Scalar(value.clone()),
        None => null_column(entity, column),
    }
}

/// Set a scalar field or a to-one relation
pub(crate) fn set(entity: &EntityRef, property: &str, value: FieldValue) -> Result<()> {
    let metadata = entity.metadata();
    if let Some(relation) = metadata.relation(property) {
        if !relation.cardinality.is_to_one() {
            return Err(cardinality_error(entity, relation, "to-one"));
        }
        let related = match value {
            FieldValue::Entity(related) => Some(related),
            value if value.is_null() => None,
            _ => {
                return Err(Error::Conversion(format!(
                    "{}::{property} holds an entity of class {}",
                    metadata.name(),
                    relation.related_class
                )))
            }
        };
        return set_to_one(entity, relation, related);
    }
    if metadata.structure().has_field(property) {
        return entity.borrow_mut().set_field(property, value);
    }
    if metadata.fetch(property).is_some() {
        // Fetch-only properties have no columns to synchronize.
        entity.borrow_mut().put(property, value);
        return Ok(());
    }
    Err(Error::unknown_property(metadata.name(), property))
}

pub(crate) fn unset(entity: &EntityRef, property: &str) -> Result<()> {
    set(entity, property, FieldValue::Null)
}

fn set_to_one(entity: &EntityRef, relation: &RelationDescriptor, related: Option<EntityRef>) -> Result<()> {
    if let Some(related) = &related {
        check_class(entity, relation, related)?;
    }
    let previous = entity
        .borrow()
        .raw(&relation.property)
        .and_then(FieldValue::as_entity)
        .cloned();
    let unchanged = match (&previous, &related) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    };

    if relation.owning {
        let mut values = Vec::with_capacity(relation.columns.len());
        for pair in &relation.columns {
            let value = match &related {
                Some(related) => column_value(related, &pair.target),
                None => null_column(entity, &pair.source),
            };
            values.push((pair.source.clone(), value));
        }
        {
            let mut owner = entity.borrow_mut();
            for (column, value) in values {
                owner.assign_column(&column, value)?;
            }
        }
        if !unchanged {
            if let Some(previous) = &previous {
                detach_inverse(entity, relation, previous)?;
            }
            if let Some(related) = &related {
                attach_inverse(entity, relation, related)?;
            }
        }
    } else if !unchanged {
        if let Some(previous) = &previous {
            for pair in &relation.columns {
                let null = null_column(previous, &pair.target);
                previous.borrow_mut().assign_column(&pair.target, null)?;
            }
            if let Some(inverse) = &relation.mapped_by {
                previous.borrow_mut().put(inverse.clone(), FieldValue::Null);
            }
        }
        if let Some(related) = &related {
            for pair in &relation.columns {
                let value = column_value(entity, &pair.source);
                related.borrow_mut().assign_column(&pair.target, value)?;
            }
            if let Some(inverse) = &relation.mapped_by {
                related.borrow_mut().put(inverse.clone(), FieldValue::Entity(entity.clone()));
            }
        }
    }

    let value = related.clone().map_or(FieldValue::Null, FieldValue::Entity);
    let metadata = entity.metadata();
    let mut mapped = Vec::new();
    for map_value in metadata.map_values().iter().filter(|m| m.relation == relation.property) {
        let value = match &related {
            Some(related) => column_value(related, &map_value.related_property),
            None => null_column(entity, &map_value.property),
        };
        mapped.push((map_value.property.clone(), value));
    }

    let mut owner = entity.borrow_mut();
    owner.put(relation.property.clone(), value.clone());
    for (column, value) in mapped {
        owner.assign_column(&column, value)?;
    }
    if let Some(setter) = &relation.setter {
        setter(&mut owner, &value)?;
    }
    owner.add_status(EntityStatus::MODIFIED);
    Ok(())
}

/// The related class's relation declared `mapped_by` this one
fn inverse_of(entity: &EntityRef, relation: &RelationDescriptor, related: &EntityRef) -> Option<RelationDescriptor> {
    let owner_class = entity.class();
    related
        .metadata()
        .relations()
        .iter()
        .find(|r| r.mapped_by.as_deref() == Some(relation.property.as_str()) && r.related_class == owner_class)
        .cloned()
}

/// Add `entity` to a loaded inverse property of `related`
fn attach_inverse(entity: &EntityRef, relation: &RelationDescriptor, related: &EntityRef) -> Result<()> {
    let Some(inverse) = inverse_of(entity, relation, related) else {
        return Ok(());
    };
    let mut target = related.borrow_mut();
    let current = target.raw(&inverse.property).cloned();
    match current {
        Some(FieldValue::Collection(mut members)) => {
            if !members.iter().any(|m| m.ptr_eq(entity)) {
                members.push(entity.clone());
            }
            target.put(inverse.property, FieldValue::Collection(members));
        }
        _ if inverse.cardinality.is_to_one() => target.put(inverse.property, FieldValue::Entity(entity.clone())),
        _ => {}
    }
    Ok(())
}

/// Drop `entity` from a loaded inverse property of `previous`
fn detach_inverse(entity: &EntityRef, relation: &RelationDescriptor, previous: &EntityRef) -> Result<()> {
    let Some(inverse) = inverse_of(entity, relation, previous) else {
        return Ok(());
    };
    let mut target = previous.borrow_mut();
    let current = target.raw(&inverse.property).cloned();
    match current {
        Some(FieldValue::Collection(mut members)) => {
            members.retain(|m| !m.ptr_eq(entity));
            target.put(inverse.property, FieldValue::Collection(members));
        }
        Some(FieldValue::Entity(current)) if current.ptr_eq(entity) => {
            target.put(inverse.property, FieldValue::Null);
        }
        _ => {}
    }
    Ok(())
}

fn to_many(entity: &EntityRef, property: &str, related: &EntityRef) -> Result<RelationDescriptor> {
    let relation = relation_of(entity, property)?;
    if !relation.cardinality.is_to_many() {
        return Err(cardinality_error(entity, &relation, "to-many"));
    }
    check_class(entity, &relation, related)?;
    Ok(relation)
}

/// Add `related` to a to-many relation
///
/// Loads the collection first if it is deferred and not loaded yet.
///
/// For a many-to-many relation, exactly one mid entity is created (or a
/// pending removal of the same link is undone).
pub(crate) fn add_to(entity: &EntityRef, property: &str, related: &EntityRef) -> Result<()> {
    let relation = to_many(entity, property, related)?;
    let mut members = resolver::get(entity, property)?.into_collection();
    if members.iter().any(|m| m.ptr_eq(related)) {
        return Ok(());
    }

    match relation.cardinality {
        Cardinality::ManyToMany => link_mid(entity, &relation, related)?,
        _ => {
            for pair in &relation.columns {
                let value = column_value(entity, &pair.source);
                related.borrow_mut().assign_column(&pair.target, value)?;
            }
            if let Some(inverse) = &relation.mapped_by {
                let previous = related.borrow().raw(inverse).and_then(FieldValue::as_entity).cloned();
                if let Some(previous) = previous.filter(|p| !p.ptr_eq(entity)) {
                    let mut old = previous.borrow_mut();
                    let held = old.raw(property).cloned();
                    if let Some(FieldValue::Collection(items)) = held {
                        let items: Vec<EntityRef> = items.into_iter().filter(|m| !m.ptr_eq(related)).collect();
                        old.put(property, FieldValue::Collection(items));
                    }
                }
                related.borrow_mut().put(inverse.clone(), FieldValue::Entity(entity.clone()));
            }
        }
    }

    members.push(related.clone());
    entity.borrow_mut().put(property, FieldValue::Collection(members));
    Ok(())
}

fn link_mid(entity: &EntityRef, relation: &RelationDescriptor, related: &EntityRef) -> Result<()> {
    let mid = relation
        .mid
        .as_ref()
        .ok_or_else(|| Error::configuration(entity.class(), &relation.property, "relation has no mid class"))?;

    let restored = {
        let mut owner = entity.borrow_mut();
        let set = owner.mids.entry(relation.property.clone()).or_default();
        let position = set.removed.iter().position(|m| {
            m.borrow()
                .raw(&mid.related_property)
                .and_then(FieldValue::as_entity)
                .is_some_and(|r| r.ptr_eq(related))
        });
        position.map(|i| {
            let link = set.removed.remove(i);
            set.entries.push(link.clone());
            link
        })
    };
    if let Some(link) = restored {
        link.borrow_mut().remove_status(EntityStatus::TO_DELETE);
        return Ok(());
    }

    let session = entity.session().ok_or_else(|| Error::NoSession {
        class: entity.class(),
        property: relation.property.clone(),
    })?;
    let metadata = session.registry().metadata(&mid.class)?;
    let mut link: Entity = match &mid.factory {
        Some(factory) => factory(Arc::clone(&metadata))?,
        None => Entity::new(metadata),
    };
    link.attach(session.downgrade());
    let link = EntityRef::new(link);
    set(&link, &mid.local_property, FieldValue::Entity(entity.clone()))?;
    set(&link, &mid.related_property, FieldValue::Entity(related.clone()))?;
    log::trace!("created mid {} for {}::{}", mid.class, entity.class(), relation.property);

    entity
        .borrow_mut()
        .mids
        .entry(relation.property.clone())
        .or_default()
        .entries
        .push(link);
    Ok(())
}

/// Remove `related` from a to-many relation; `false` if it was not a member
///
/// Loads the collection first if it is deferred and not loaded yet.
pub(crate) fn remove_from(entity: &EntityRef, property: &str, related: &EntityRef) -> Result<bool> {
    let relation = to_many(entity, property, related)?;
    let mut members = resolver::get(entity, property)?.into_collection();
    let Some(position) = members.iter().position(|m| m.ptr_eq(related)) else {
        return Ok(false);
    };
    members.remove(position);

    match relation.cardinality {
        Cardinality::ManyToMany => {
            if let Some(link) = mid_relation_with(entity, property, related)? {
                let persisted = link.has_status(EntityStatus::EXIST);
                if persisted {
                    link.borrow_mut().add_status(EntityStatus::TO_DELETE);
                }
                let mut owner = entity.borrow_mut();
                let set = owner.mids.entry(property.to_string()).or_default();
                set.entries.retain(|m| !m.ptr_eq(&link));
                if persisted {
                    set.removed.push(link);
                }
            }
        }
        _ if relation.cascade_delete => mark_for_delete(related)?,
        _ => {
            for pair in &relation.columns {
                let null = null_column(related, &pair.target);
                related.borrow_mut().assign_column(&pair.target, null)?;
            }
            if let Some(inverse) = &relation.mapped_by {
                let points_back = related
                    .borrow()
                    .raw(inverse)
                    .and_then(FieldValue::as_entity)
                    .is_some_and(|e| e.ptr_eq(entity));
                if points_back {
                    related.borrow_mut().put(inverse.clone(), FieldValue::Null);
                }
            }
        }
    }

    entity.borrow_mut().put(property, FieldValue::Collection(members));
    Ok(true)
}

/// Membership test over the full collection, loading it if needed
pub(crate) fn has(entity: &EntityRef, property: &str, related: &EntityRef) -> Result<bool> {
    let relation = relation_of(entity, property)?;
    if !relation.cardinality.is_to_many() {
        return Err(cardinality_error(entity, &relation, "to-many"));
    }
    Ok(resolver::get(entity, property)?
        .into_collection()
        .iter()
        .any(|m| m.ptr_eq(related)))
}

fn many_to_many(entity: &EntityRef, property: &str) -> Result<RelationDescriptor> {
    let relation = relation_of(entity, property)?;
    if relation.cardinality != Cardinality::ManyToMany {
        return Err(cardinality_error(entity, &relation, "manyToMany"));
    }
    Ok(relation)
}

/// Persisted links merged with pending ones, minus pending removals
pub(crate) fn mid_relations_from(entity: &EntityRef, property: &str) -> Result<Vec<EntityRef>> {
    let relation = many_to_many(entity, property)?;
    let needs_load = {
        let owner = entity.borrow();
        owner.has_status(EntityStatus::EXIST) && !owner.mids.get(property).is_some_and(|m| m.loaded)
    };

    if needs_load {
        let session = entity.session().ok_or_else(|| Error::NoSession {
            class: entity.class(),
            property: property.to_string(),
        })?;
        let persisted = session.load_mids(entity, &relation)?;
        let mut owner = entity.borrow_mut();
        let set = owner.mids.entry(property.to_string()).or_default();
        let pending = std::mem::take(&mut set.entries);
        let mut entries: Vec<EntityRef> = persisted
            .into_iter()
            .filter(|m| !set.removed.iter().any(|r| r.ptr_eq(m)))
            .collect();
        for link in pending {
            if !entries.iter().any(|m| m.ptr_eq(&link)) {
                entries.push(link);
            }
        }
        set.entries = entries;
        set.loaded = true;
    }

    Ok(entity
        .borrow()
        .mids
        .get(property)
        .map(|m| m.entries.clone())
        .unwrap_or_default())
}

/// The mid entity linking `entity` to `related`, if any
pub(crate) fn mid_relation_with(entity: &EntityRef, property: &str, related: &EntityRef) -> Result<Option<EntityRef>> {
    let relation = many_to_many(entity, property)?;
    let Some(mid) = &relation.mid else {
        return Ok(None);
    };
    for link in mid_relations_from(entity, property)? {
        let link_ref = link.borrow();
        let linked = link_ref
            .raw(&mid.related_property)
            .and_then(FieldValue::as_entity)
            .is_some_and(|r| r.ptr_eq(related));
        let keyed = !mid.related_columns.is_empty()
            && mid.related_columns.iter().all(|pair| {
                let target = related.borrow();
                match (link_ref.scalar(&pair.source), target.scalar(&pair.target)) {
                    (Some(a), Some(b)) => !value_is_null(a) && a == b,
                    _ => false,
                }
            });
        drop(link_ref);
        if linked || keyed {
            return Ok(Some(link));
        }
    }
    Ok(None)
}

/// Flag `TO_DELETE`, cascading through cascade-delete relations
///
/// A persisted entity attached to a session has its unloaded cascade-delete
/// relations loaded first, so the cascade reaches rows not yet in memory.
/// Detached entities cascade only through what they hold.
pub(crate) fn mark_for_delete(entity: &EntityRef) -> Result<()> {
    let mut visited = HashSet::new();
    mark(entity, &mut visited)
}

fn mark(entity: &EntityRef, visited: &mut HashSet<usize>) -> Result<()> {
    if !visited.insert(entity.addr()) {
        return Ok(());
    }
    entity.borrow_mut().add_status(EntityStatus::TO_DELETE);

    let metadata = entity.metadata();
    let loadable = entity.has_status(EntityStatus::EXIST) && entity.session().is_some();
    let mut cascaded = Vec::new();
    for relation in metadata.relations().iter().filter(|r| r.cascade_delete) {
        if relation.cardinality == Cardinality::ManyToMany {
            if loadable {
                cascaded.extend(mid_relations_from(entity, &relation.property)?);
            } else if let Some(set) = entity.borrow().mids.get(&relation.property) {
                cascaded.extend(set.entries.iter().cloned());
            }
            continue;
        }
        let held = entity.borrow().raw(&relation.property).cloned();
        let value = match held {
            Some(value) => value,
            None if loadable => {
                log::debug!("loading {}::{} to cascade delete", entity.class(), relation.property);
                resolver::get(entity, &relation.property)?
            }
            None => continue,
        };
        match value {
            FieldValue::Entity(related) => cascaded.push(related),
            FieldValue::Collection(members) => cascaded.extend(members),
            _ => {}
        }
    }
    for related in &cascaded {
        mark(related, visited)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Row;
    use crate::mock::MockExecutor;
    use crate::session::Session;
    use crate::tests_cfg::registry;
    use sea_query::Value;
    use std::rc::Rc;

    fn session() -> (Session, Rc<MockExecutor>) {
        let executor = Rc::new(MockExecutor::new());
        (Session::new(Arc::new(registry()), executor.clone()), executor)
    }

    #[test]
    fn test_set_to_one_writes_foreign_key() {
        let (session, _) = session();
        let people = session.repository("DummyPerson").unwrap();
        let child = people.create([("name", "kid")]).unwrap();
        let mother = people.create([("name", "mum")]).unwrap();
        child.set("mother", mother.clone()).unwrap();
        assert_eq!(child.borrow().scalar("dummy_person_mother_name"), Some(&Value::from("mum")));
        assert!(child.get("mother").unwrap().as_entity().unwrap().ptr_eq(&mother));

        child.unset("mother").unwrap();
        assert!(child.borrow().raw("dummy_person_mother_name").unwrap().is_null());
        assert!(child.get("mother").unwrap().is_null());
    }

    #[test]
    fn test_set_rejects_to_many() {
        let (session, _) = session();
        let people = session.repository("DummyPerson").unwrap();
        let person = people.create([("name", "someone")]).unwrap();
        let err = person.set("dogs", FieldValue::Collection(vec![])).unwrap_err();
        assert!(matches!(err, Error::Cardinality { expected: "to-one", .. }));
    }

    #[test]
    fn test_add_rejects_to_one() {
        let (session, _) = session();
        let person = session.repository("DummyPerson").unwrap().create([("name", "a")]).unwrap();
        let other = session.repository("DummyPerson").unwrap().create([("name", "b")]).unwrap();
        let err = person.add_to("mother", &other).unwrap_err();
        assert!(matches!(err, Error::Cardinality { expected: "to-many", .. }));
        assert!(matches!(person.remove_from("mother", &other), Err(Error::Cardinality { .. })));
    }

    #[test]
    fn test_related_class_is_checked() {
        let (session, _) = session();
        let person = session.repository("DummyPerson").unwrap().create([("name", "a")]).unwrap();
        let other = session.repository("DummyPerson").unwrap().create([("name", "b")]).unwrap();
        let err = person.add_to("dogs", &other).unwrap_err();
        assert!(matches!(err, Error::RelatedClassMismatch { .. }));
    }

    #[test]
    fn test_one_to_many_add_and_remove_sync_inverse() {
        let (session, _) = session();
        let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
        let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();

        person.add_to("owned_dogs", &dog).unwrap();
        assert!(person.has("owned_dogs", &dog).unwrap());
        assert_eq!(dog.borrow().scalar("dummy_person_name"), Some(&Value::from("someone")));
        assert!(dog.get("owner").unwrap().as_entity().unwrap().ptr_eq(&person));

        assert!(person.remove_from("owned_dogs", &dog).unwrap());
        assert!(!person.remove_from("owned_dogs", &dog).unwrap());
        assert!(dog.borrow().raw("dummy_person_name").unwrap().is_null());
        assert!(dog.get("owner").unwrap().is_null());
    }

    #[test]
    fn test_owning_set_updates_loaded_inverse_collection() {
        let (session, _) = session();
        let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
        person.borrow_mut().put("owned_dogs", FieldValue::Collection(vec![]));
        let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();
        dog.set("owner", person.clone()).unwrap();
        assert!(person.has("owned_dogs", &dog).unwrap());
    }

    #[test]
    fn test_many_to_many_mid_lifecycle() {
        let (session, executor) = session();
        let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
        let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();

        person.add_to("dogs", &dog).unwrap();
        person.add_to("dogs", &dog).unwrap();
        let mids = person.mid_relations_from("dogs").unwrap();
        assert_eq!(mids.len(), 1);
        let link = mids[0].borrow();
        assert_eq!(link.scalar("dummy_person_name"), Some(&Value::from("someone")));
        assert_eq!(link.scalar("dummy_dog_name"), Some(&Value::from("rex")));
        drop(link);

        let found = person.mid_relation_with("dogs", &dog).unwrap().unwrap();
        assert!(found.ptr_eq(&mids[0]));

        assert!(person.remove_from("dogs", &dog).unwrap());
        assert!(person.mid_relations_from("dogs").unwrap().is_empty());
        assert_eq!(executor.query_count(), 0);
    }

    #[test]
    fn test_removing_persisted_mid_marks_it() {
        let (session, executor) = session();
        executor.push_rows(vec![Row::new()
            .scalar("name", "someone")
            .null("dummy_person_mother_name")
            .null("favorite_dog_name")
            .with("dogs", vec![Row::new().scalar("name", "rex").scalar("dummy_person_name", "someone").scalar("age", 3i32)])
            .with("dogs_from_callback", crate::executor::RowValue::Null)]);
        executor.push_rows(vec![Row::new()
            .scalar("dummy_person_name", "someone")
            .scalar("dummy_dog_name", "rex")]);

        let person = session
            .repository("DummyPerson")
            .unwrap()
            .find_by_pk(&[("name", Value::from("someone"))])
            .unwrap()
            .unwrap();
        let dog = person.get("dogs").unwrap().into_collection().remove(0);

        assert!(person.remove_from("dogs", &dog).unwrap());
        assert_eq!(executor.query_count(), 2);
        let changeset = session.changeset(&person).unwrap();
        assert_eq!(changeset.deletes.len(), 1);
        assert_eq!(changeset.deletes[0].class(), "DummyPersonDog");
    }

    #[test]
    fn test_map_value_follows_relation() {
        let (session, _) = session();
        let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();
        let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
        person.set("favorite_dog", dog.clone()).unwrap();
        assert_eq!(person.borrow().scalar("favorite_dog_name"), Some(&Value::from("rex")));
    }

    #[test]
    fn test_cascade_delete_on_remove() {
        let (session, _) = session();
        let person = session.repository("DummyPerson").unwrap().create([("name", "mum")]).unwrap();
        let child = session.repository("DummyPerson").unwrap().create([("name", "kid")]).unwrap();
        person.add_to("children", &child).unwrap();
        assert!(person.remove_from("children", &child).unwrap());
        assert!(child.has_status(EntityStatus::TO_DELETE));
    }

    #[test]
    fn test_mark_for_delete_cascades() {
        let (session, _) = session();
        let person = session.repository("DummyPerson").unwrap().create([("name", "mum")]).unwrap();
        let child = session.repository("DummyPerson").unwrap().create([("name", "kid")]).unwrap();
        person.add_to("children", &child).unwrap();
        person.mark_for_delete().unwrap();
        assert!(person.has_status(EntityStatus::TO_DELETE));
        assert!(child.has_status(EntityStatus::TO_DELETE));
    }
}
