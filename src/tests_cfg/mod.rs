//! Fixture classes shared by unit tests.
//!
//! `DummyPerson` exercises every relation kind against `DummyDog`, with
//! `DummyPersonDog` as the many-to-many mid class.

use crate::fetch::FetchConfig;
use crate::registry::{EntityDefinition, Registry};
use crate::relation::{ColumnPair, MapValue, MidConfig, RelationConfig};
use crate::structure::Structure;

pub(crate) fn person_definition() -> EntityDefinition {
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
    .relation(RelationConfig::many_to_one("mother", "DummyPerson").columns([("dummy_person_mother_name", "name")]))
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
        let mut mid = ctx.join(
            "DummyPersonDog",
            &source,
            &[ColumnPair::new("name", "dummy_person_name")],
        )?;
        let mut dog = ctx.join("DummyDog", &mid.alias, &[ColumnPair::new("dummy_dog_name", "name")])?;
        dog.fields.push(ctx.array_field(&dog.alias, "DummyDog", ctx.property())?);
        mid.children.push(dog);
        Ok(mid)
    }))
    .relation(RelationConfig::many_to_one("favorite_dog", "DummyDog").columns([("favorite_dog_name", "name")]))
    .fetch(FetchConfig::lazy("favorite_dog"))
    .map_value(MapValue::new("favorite_dog_name", "favorite_dog", "name"))
}

pub(crate) fn dog_definition() -> EntityDefinition {
    EntityDefinition::new(
        "DummyDog",
        Structure::new("dummy_dog")
            .field("name", "text")
            .field("dummy_person_name", "text")
            .field("age", "int4")
            .primary_key(["name"]),
    )
    .relation(RelationConfig::many_to_one("owner", "DummyPerson").columns([("dummy_person_name", "name")]))
}

pub(crate) fn person_dog_definition() -> EntityDefinition {
    EntityDefinition::new(
        "DummyPersonDog",
        Structure::new("dummy_person_dog")
            .field("dummy_person_name", "text")
            .field("dummy_dog_name", "text")
            .primary_key(["dummy_person_name", "dummy_dog_name"]),
    )
    .relation(RelationConfig::many_to_one("person", "DummyPerson").columns([("dummy_person_name", "name")]))
    .relation(RelationConfig::many_to_one("dog", "DummyDog").columns([("dummy_dog_name", "name")]))
}

pub(crate) fn definitions() -> Vec<EntityDefinition> {
    vec![person_definition(), dog_definition(), person_dog_definition()]
}

pub(crate) fn registry() -> Registry {
    definitions()
        .into_iter()
        .fold(Registry::builder(), |builder, definition| builder.register(definition))
        .build()
}
