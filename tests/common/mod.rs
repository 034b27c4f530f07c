//! Fixture classes and row builders shared by the integration tests.
#![allow(dead_code)]

use sea_query::Value;
use std::rc::Rc;
use std::sync::Arc;
use tether::executor::{Row, RowValue};
use tether::fetch::FetchConfig;
use tether::mock::MockExecutor;
use tether::relation::{ColumnPair, MapValue, MidConfig, RelationConfig};
use tether::{EntityDefinition, Registry, Session, Structure};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn registry() -> Registry {
    Registry::builder()
        .register(
            EntityDefinition::new(
                "DummyPerson",
                Structure::new("dummy_person")
                    .field("name", "text")
                    .field("dummy_person_mother_name", "text")
                    .field("bio", "text")
                    .field("favorite_dog_name", "text")
                    .primary_key(["name"]),
            )
            .fetch(FetchConfig::lazy("bio"))
            .relation(
                RelationConfig::many_to_one("mother", "DummyPerson").columns([("dummy_person_mother_name", "name")]),
            )
            .fetch(FetchConfig::proxy("mother"))
            .relation(RelationConfig::one_to_many("children", "DummyPerson").mapped_by("mother"))
            .cascade_delete("children")
            .relation(RelationConfig::one_to_many("owned_dogs", "DummyDog").mapped_by("owner"))
            .relation(RelationConfig::many_to_many(
                "dogs",
                "DummyDog",
                MidConfig::new("DummyPersonDog", "person", "dog"),
            ))
            .fetch(FetchConfig::join("dogs"))
            .fetch(FetchConfig::join("dogs_from_callback").callback(|ctx| {
                let source = ctx.source_alias().to_string();
                let mut mid = ctx.join("DummyPersonDog", &source, &[ColumnPair::new("name", "dummy_person_name")])?;
                let mut dog = ctx.join("DummyDog", &mid.alias, &[ColumnPair::new("dummy_dog_name", "name")])?;
                dog.fields.push(ctx.array_field(&dog.alias, "DummyDog", ctx.property())?);
                mid.children.push(dog);
                Ok(mid)
            }))
            .relation(RelationConfig::many_to_one("favorite_dog", "DummyDog").columns([("favorite_dog_name", "name")]))
            .fetch(FetchConfig::lazy("favorite_dog"))
            .map_value(MapValue::new("favorite_dog_name", "favorite_dog", "name")),
        )
        .register(
            EntityDefinition::new(
                "DummyDog",
                Structure::new("dummy_dog")
                    .field("name", "text")
                    .field("dummy_person_name", "text")
                    .field("age", "int4")
                    .primary_key(["name"]),
            )
            .relation(RelationConfig::many_to_one("owner", "DummyPerson").columns([("dummy_person_name", "name")])),
        )
        .register(
            EntityDefinition::new(
                "DummyPersonDog",
                Structure::new("dummy_person_dog")
                    .field("dummy_person_name", "text")
                    .field("dummy_dog_name", "text")
                    .primary_key(["dummy_person_name", "dummy_dog_name"]),
            )
            .relation(RelationConfig::many_to_one("person", "DummyPerson").columns([("dummy_person_name", "name")]))
            .relation(RelationConfig::many_to_one("dog", "DummyDog").columns([("dummy_dog_name", "name")])),
        )
        .build()
}

pub fn session() -> (Session, Rc<MockExecutor>) {
    init_logging();
    let executor = Rc::new(MockExecutor::new());
    (Session::new(Arc::new(registry()), executor.clone()), executor)
}

pub fn text(value: Option<&str>) -> Value {
    Value::String(value.map(|v| v.into()))
}

/// Every structure field of a person, as a joined record carries them
pub fn person_record(name: &str, mother: Option<&str>) -> Row {
    Row::new()
        .scalar("name", name)
        .with("dummy_person_mother_name", text(mother))
        .null("bio")
        .null("favorite_dog_name")
}

pub fn dog_record(name: &str, owner: Option<&str>, age: i32) -> Row {
    Row::new()
        .scalar("name", name)
        .with("dummy_person_name", text(owner))
        .scalar("age", age)
}

/// A person row as selected by the default fetch plan
pub fn person_row(name: &str, mother: Option<&str>, dogs: Vec<Row>) -> Row {
    Row::new()
        .scalar("name", name)
        .with("dummy_person_mother_name", text(mother))
        .null("favorite_dog_name")
        .with("dogs", RowValue::Records(dogs.clone()))
        .with("dogs_from_callback", RowValue::Records(dogs))
}
