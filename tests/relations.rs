//! Relation mutators and the change set they leave behind.

mod common;

use common::{dog_record, person_record, person_row, session};
use sea_query::Value;
use tether::executor::Row;
use tether::{EntityStatus, Error, FieldValue};

// ============================================================================
// Many-to-many
// ============================================================================

#[test]
fn test_many_to_many_add_creates_one_link() {
    let (session, executor) = session();
    let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
    let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();

    person.add_to("dogs", &dog).unwrap();
    person.add_to("dogs", &dog).unwrap();

    assert!(person.has("dogs", &dog).unwrap());
    let links = person.mid_relations_from("dogs").unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].class(), "DummyPersonDog");
    assert_eq!(links[0].get_scalar("dummy_person_name").unwrap(), Some(Value::from("someone")));
    assert_eq!(links[0].get_scalar("dummy_dog_name").unwrap(), Some(Value::from("rex")));
    assert_eq!(executor.query_count(), 0);
}

#[test]
fn test_changeset_inserts_targets_before_link() {
    let (session, _) = session();
    let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
    let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();
    person.add_to("dogs", &dog).unwrap();

    let changeset = session.changeset(&person).unwrap();
    let classes: Vec<String> = changeset.inserts.iter().map(|e| e.class()).collect();
    assert_eq!(classes, vec!["DummyPerson", "DummyDog", "DummyPersonDog"]);
    assert!(changeset.updates.is_empty());
    assert!(changeset.deletes.is_empty());
}

#[test]
fn test_remove_then_add_reuses_pending_link() {
    let (session, _) = session();
    let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
    let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();

    person.add_to("dogs", &dog).unwrap();
    let first = person.mid_relation_with("dogs", &dog).unwrap().unwrap();
    assert!(person.remove_from("dogs", &dog).unwrap());
    assert!(person.mid_relation_with("dogs", &dog).unwrap().is_none());
    assert!(!person.has("dogs", &dog).unwrap());

    person.add_to("dogs", &dog).unwrap();
    let links = person.mid_relations_from("dogs").unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].get_scalar("dummy_dog_name").unwrap(), first.get_scalar("dummy_dog_name").unwrap());
}

#[test]
fn test_removing_loaded_link_deletes_it() {
    let (session, executor) = session();
    executor.push_rows(vec![person_row("someone", None, vec![dog_record("rex", None, 3)])]);
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
    assert!(executor.last_query().unwrap().sql.starts_with("SELECT"));
    assert!(executor.last_query().unwrap().sql.contains("FROM dummy_person_dog t0"));

    let changeset = session.changeset(&person).unwrap();
    assert!(changeset.inserts.is_empty());
    assert_eq!(changeset.deletes.len(), 1);
    assert!(changeset.deletes[0].has_status(EntityStatus::TO_DELETE));
    assert_eq!(changeset.deletes[0].class(), "DummyPersonDog");
}

// ============================================================================
// To-one
// ============================================================================

#[test]
fn test_setting_owner_moves_dog_between_collections() {
    let (session, _) = session();
    let people = session.repository("DummyPerson").unwrap();
    let first = people.create([("name", "first")]).unwrap();
    let second = people.create([("name", "second")]).unwrap();
    let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();

    first.add_to("owned_dogs", &dog).unwrap();
    second.add_to("owned_dogs", &dog).unwrap();

    assert!(!first.has("owned_dogs", &dog).unwrap());
    assert!(second.has("owned_dogs", &dog).unwrap());
    assert_eq!(dog.get_scalar("dummy_person_name").unwrap(), Some(Value::from("second")));
    assert!(dog.get("owner").unwrap().as_entity().unwrap().ptr_eq(&second));

    dog.unset("owner").unwrap();
    assert_eq!(dog.get_scalar("dummy_person_name").unwrap(), Some(Value::String(None)));
}

#[test]
fn test_setting_loaded_entity_marks_it_modified() {
    let (session, executor) = session();
    executor.push_rows(vec![person_row("someone", None, vec![])]);
    let person = session
        .repository("DummyPerson")
        .unwrap()
        .find_by_pk(&[("name", Value::from("someone"))])
        .unwrap()
        .unwrap();
    assert!(!person.has_status(EntityStatus::MODIFIED));

    let mother = session.repository("DummyPerson").unwrap().create([("name", "mum")]).unwrap();
    person.set("mother", mother.clone()).unwrap();
    assert!(person.has_status(EntityStatus::MODIFIED));

    let changeset = session.changeset(&person).unwrap();
    assert_eq!(changeset.inserts.len(), 1);
    assert!(changeset.inserts[0].ptr_eq(&mother));
    assert_eq!(changeset.updates.len(), 1);
    assert!(changeset.updates[0].ptr_eq(&person));
}

#[test]
fn test_cardinality_is_enforced() {
    let (session, _) = session();
    let person = session.repository("DummyPerson").unwrap().create([("name", "someone")]).unwrap();
    let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();

    assert!(matches!(
        person.set("owned_dogs", FieldValue::Collection(vec![dog.clone()])),
        Err(Error::Cardinality { .. })
    ));
    assert!(matches!(dog.add_to("owner", &person), Err(Error::Cardinality { .. })));
    assert!(matches!(person.add_to("nonsense", &dog), Err(Error::UnknownProperty { .. })));
}

// ============================================================================
// Cascade delete
// ============================================================================

#[test]
fn test_cascade_delete_orders_dependents_first() {
    let (session, executor) = session();
    executor.push_rows(vec![person_row("mum", None, vec![])]);
    executor.push_rows(vec![Row::new()
        .scalar("name", "mum")
        .with("children", vec![person_record("kid", Some("mum"))])]);

    let mother = session
        .repository("DummyPerson")
        .unwrap()
        .find_by_pk(&[("name", Value::from("mum"))])
        .unwrap()
        .unwrap();
    assert!(mother.borrow().raw("children").is_none());

    mother.mark_for_delete().unwrap();
    // The unloaded children are read, then the child's own children
    assert_eq!(executor.query_count(), 3);
    let child = session
        .repository("DummyPerson")
        .unwrap()
        .get_cached(&[("name", Value::from("kid"))])
        .unwrap()
        .unwrap();
    assert!(child.has_status(EntityStatus::EXIST | EntityStatus::TO_DELETE));

    let changeset = session.changeset(&mother).unwrap();
    assert!(changeset.inserts.is_empty());
    assert!(changeset.updates.is_empty());
    assert_eq!(changeset.deletes.len(), 2);
    assert!(changeset.deletes[0].ptr_eq(&child));
    assert!(changeset.deletes[1].ptr_eq(&mother));
}

#[test]
fn test_deleting_unsaved_entities_leaves_nothing_to_do() {
    let (session, executor) = session();
    let people = session.repository("DummyPerson").unwrap();
    let mother = people.create([("name", "mum")]).unwrap();
    let child = people.create([("name", "kid")]).unwrap();
    mother.add_to("children", &child).unwrap();
    assert_eq!(child.get_scalar("dummy_person_mother_name").unwrap(), Some(Value::from("mum")));

    mother.mark_for_delete().unwrap();
    assert!(child.has_status(EntityStatus::TO_DELETE));

    let changeset = session.changeset(&mother).unwrap();
    assert!(changeset.is_empty());
    assert_eq!(executor.query_count(), 0);
}

#[test]
fn test_detached_cascade_only_follows_held_relations() {
    let (session, executor) = session();
    executor.push_rows(vec![person_row("mum", None, vec![])]);
    let mother = session
        .repository("DummyPerson")
        .unwrap()
        .find_by_pk(&[("name", Value::from("mum"))])
        .unwrap()
        .unwrap();
    drop(session);

    mother.mark_for_delete().unwrap();
    assert_eq!(executor.query_count(), 1);
    assert!(mother.has_status(EntityStatus::TO_DELETE));
}

// ============================================================================
// Deferred collections
// ============================================================================

#[test]
fn test_membership_loads_deferred_collection_once() {
    let (session, executor) = session();
    executor.push_rows(vec![person_row("someone", None, vec![])]);
    executor.push_rows(vec![Row::new()
        .scalar("name", "someone")
        .with("owned_dogs", vec![dog_record("old", Some("someone"), 5)])]);

    let person = session
        .repository("DummyPerson")
        .unwrap()
        .find_by_pk(&[("name", Value::from("someone"))])
        .unwrap()
        .unwrap();
    let dog = session.repository("DummyDog").unwrap().create([("name", "rex")]).unwrap();

    person.add_to("owned_dogs", &dog).unwrap();
    assert_eq!(executor.query_count(), 2);
    assert!(executor.last_query().unwrap().sql.contains("as \"owned_dogs\""));

    // Persisted members survive the addition
    let old = session
        .repository("DummyDog")
        .unwrap()
        .get_cached(&[("name", Value::from("old"))])
        .unwrap()
        .unwrap();
    assert!(person.has("owned_dogs", &old).unwrap());
    assert!(person.has("owned_dogs", &dog).unwrap());
    assert!(person.remove_from("owned_dogs", &dog).unwrap());
    assert_eq!(person.get("owned_dogs").unwrap().into_collection().len(), 1);
    assert_eq!(executor.query_count(), 2);
}
