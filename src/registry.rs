//! Relation metadata registry.
//!
//! Entity classes are registered as [`EntityDefinition`]s: a [`Structure`]
//! plus the property-level declarations (relation, fetch, map-value,
//! cascade-delete) that an annotation parser would produce. The first lookup
//! of a class validates its declarations against the related classes and
//! freezes the normalized result as an `Arc<ClassMetadata>`; every later
//! lookup returns the same metadata.
//!
//! A registry is immutable apart from that cache and can be shared read-only
//! between sessions.

use crate::error::{Error, Result};
use crate::fetch::{FetchConfig, FetchDescriptor, FetchMode, FetchTarget};
use crate::join::JoinType;
use crate::relation::{
    Cardinality, ColumnPair, MapValue, MidDescriptor, RelationConfig, RelationDescriptor,
};
use crate::structure::Structure;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// One property-level declaration
#[derive(Debug, Clone)]
pub enum PropertyConfig {
    Relation(RelationConfig),
    Fetch(FetchConfig),
    MapValue(MapValue),
    /// Name of a relation whose targets are deleted along with the owner
    CascadeDelete(String),
}

/// Declarative description of one entity class
///
/// # Example
///
/// ```
/// use tether::registry::EntityDefinition;
/// use tether::relation::RelationConfig;
/// use tether::fetch::FetchConfig;
/// use tether::Structure;
///
/// let definition = EntityDefinition::new(
///     "DummyDog",
///     Structure::new("dummy_dog")
///         .field("name", "text")
///         .field("dummy_person_name", "text")
///         .primary_key(["name"]),
/// )
/// .relation(RelationConfig::many_to_one("owner", "DummyPerson").columns([("dummy_person_name", "name")]))
/// .fetch(FetchConfig::proxy("owner"));
///
/// assert_eq!(definition.class(), "DummyDog");
/// ```
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    class: String,
    structure: Structure,
    properties: Vec<PropertyConfig>,
}

impl EntityDefinition {
    pub fn new(class: impl Into<String>, structure: Structure) -> Self {
        Self {
            class: class.into(),
            structure,
            properties: Vec::new(),
        }
    }

    pub fn relation(mut self, relation: RelationConfig) -> Self {
        self.properties.push(PropertyConfig::Relation(relation));
        self
    }

    pub fn fetch(mut self, fetch: FetchConfig) -> Self {
        self.properties.push(PropertyConfig::Fetch(fetch));
        self
    }

    pub fn map_value(mut self, map_value: MapValue) -> Self {
        self.properties.push(PropertyConfig::MapValue(map_value));
        self
    }

    pub fn cascade_delete(mut self, relation: impl Into<String>) -> Self {
        self.properties.push(PropertyConfig::CascadeDelete(relation.into()));
        self
    }

    pub fn property(mut self, config: PropertyConfig) -> Self {
        self.properties.push(config);
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn properties(&self) -> &[PropertyConfig] {
        &self.properties
    }

    fn relation_config(&self, property: &str) -> Option<&RelationConfig> {
        self.properties.iter().find_map(|p| match p {
            PropertyConfig::Relation(r) if r.property == property => Some(r),
            _ => None,
        })
    }
}

/// Frozen, validated metadata of one entity class
#[derive(Debug)]
pub struct ClassMetadata {
    name: String,
    structure: Arc<Structure>,
    relations: Vec<RelationDescriptor>,
    fetches: Vec<FetchDescriptor>,
    map_values: Vec<MapValue>,
}

impl ClassMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structure(&self) -> &Arc<Structure> {
        &self.structure
    }

    /// Relations in declaration order
    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    pub fn relation(&self, property: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.property == property)
    }

    /// Fetch descriptors in declaration order
    pub fn fetches(&self) -> &[FetchDescriptor] {
        &self.fetches
    }

    pub fn fetch(&self, property: &str) -> Option<&FetchDescriptor> {
        self.fetches.iter().find(|f| f.property == property)
    }

    pub fn fetches_with_mode(&self, mode: FetchMode) -> impl Iterator<Item = &FetchDescriptor> {
        self.fetches.iter().filter(move |f| f.mode == mode)
    }

    pub fn map_values(&self) -> &[MapValue] {
        &self.map_values
    }

    /// Structure field, relation or fetch-only property
    pub fn has_property(&self, property: &str) -> bool {
        self.structure.has_field(property)
            || self.relation(property).is_some()
            || self.fetch(property).is_some()
    }

    /// The property holds entities rather than scalars
    pub fn is_relational(&self, property: &str) -> bool {
        self.relation(property).is_some() || self.fetch(property).is_some_and(|f| f.is_relational())
    }

    /// The property holds a collection of entities
    pub fn is_collection(&self, property: &str) -> bool {
        match self.relation(property) {
            Some(relation) => relation.cardinality.is_to_many(),
            None => self.fetch(property).is_some_and(|f| f.target.is_collection()),
        }
    }
}

/// Collects definitions for a [`Registry`]
///
/// `build()` only indexes them; each class is validated on its first
/// metadata lookup and frozen from then on.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<EntityDefinition>,
    default_join_type: JoinType,
}

impl RegistryBuilder {
    pub fn register(mut self, definition: EntityDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Join type of relations that do not declare one
    pub fn default_join_type(mut self, join_type: JoinType) -> Self {
        self.default_join_type = join_type;
        self
    }

    pub fn build(self) -> Registry {
        let definitions = self
            .definitions
            .into_iter()
            .map(|d| (d.class.clone(), d))
            .collect();
        Registry {
            definitions,
            default_join_type: self.default_join_type,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

/// Resolve-then-freeze metadata cache keyed by class name
#[derive(Debug)]
pub struct Registry {
    definitions: HashMap<String, EntityDefinition>,
    default_join_type: JoinType,
    cache: RwLock<HashMap<String, Arc<ClassMetadata>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.definitions.contains_key(class)
    }

    pub fn default_join_type(&self) -> JoinType {
        self.default_join_type
    }

    /// Resolved metadata of `class`, validated on first use
    ///
    /// # Errors
    ///
    /// `UnknownClass` if the class was never registered, `Configuration` if
    /// any of its declarations is invalid.
    pub fn metadata(&self, class: &str) -> Result<Arc<ClassMetadata>> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(metadata) = cache.get(class) {
                return Ok(Arc::clone(metadata));
            }
        }

        let resolved = Arc::new(self.resolve(class)?);
        log::trace!("resolved metadata for {class}: {} relation(s)", resolved.relations.len());

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent resolution may have won; keep the first frozen copy.
        let metadata = cache.entry(class.to_string()).or_insert(resolved);
        Ok(Arc::clone(metadata))
    }

    pub fn structure(&self, class: &str) -> Result<Arc<Structure>> {
        Ok(Arc::clone(self.metadata(class)?.structure()))
    }

    pub fn get_relation(&self, class: &str, property: &str) -> Result<RelationDescriptor> {
        self.metadata(class)?
            .relation(property)
            .cloned()
            .ok_or_else(|| Error::unknown_property(class, property))
    }

    /// Fetch descriptors of `class`, in declaration order
    pub fn get_fetch_config(&self, class: &str) -> Result<Vec<FetchDescriptor>> {
        Ok(self.metadata(class)?.fetches().to_vec())
    }

    fn definition(&self, class: &str) -> Result<&EntityDefinition> {
        self.definitions
            .get(class)
            .ok_or_else(|| Error::UnknownClass(class.to_string()))
    }

    fn resolve(&self, class: &str) -> Result<ClassMetadata> {
        let definition = self.definition(class)?;
        let structure = &definition.structure;

        if structure.primary_key_fields().is_empty() {
            return Err(Error::configuration(class, "<primary key>", "structure declares no primary key"));
        }
        for column in structure.primary_key_fields() {
            if !structure.has_field(column) {
                return Err(Error::configuration(
                    class,
                    column,
                    "primary key column is not a structure field",
                ));
            }
        }

        let mut order: Vec<&str> = Vec::new();
        let mut relation_configs: Vec<&RelationConfig> = Vec::new();
        let mut fetch_configs: HashMap<&str, &FetchConfig> = HashMap::new();
        let mut map_values = Vec::new();
        let mut cascades: HashSet<&str> = HashSet::new();

        for property in &definition.properties {
            match property {
                PropertyConfig::Relation(relation) => {
                    if relation_configs.iter().any(|r| r.property == relation.property) {
                        return Err(Error::configuration(class, &relation.property, "relation declared twice"));
                    }
                    if structure.has_field(&relation.property) {
                        return Err(Error::configuration(
                            class,
                            &relation.property,
                            "relation property shadows a structure field",
                        ));
                    }
                    relation_configs.push(relation);
                    if !order.contains(&relation.property.as_str()) {
                        order.push(&relation.property);
                    }
                }
                PropertyConfig::Fetch(fetch) => {
                    if fetch_configs.insert(&fetch.property, fetch).is_some() {
                        return Err(Error::configuration(class, &fetch.property, "fetch declared twice"));
                    }
                    if !order.contains(&fetch.property.as_str()) {
                        order.push(&fetch.property);
                    }
                }
                PropertyConfig::MapValue(map_value) => map_values.push(map_value.clone()),
                PropertyConfig::CascadeDelete(relation) => {
                    cascades.insert(relation);
                }
            }
        }

        let relations = relation_configs
            .iter()
            .map(|config| self.resolve_relation(definition, config, cascades.contains(config.property.as_str())))
            .collect::<Result<Vec<_>>>()?;

        for cascade in &cascades {
            if !relations.iter().any(|r| r.property == *cascade) {
                return Err(Error::configuration(class, *cascade, "cascade delete on an undeclared relation"));
            }
        }

        for map_value in &map_values {
            self.validate_map_value(definition, &relations, map_value)?;
        }

        let mut fetches = Vec::new();
        for property in order {
            let fetch = fetch_configs.get(property).copied();
            let descriptor = match relations.iter().find(|r| r.property == property) {
                Some(relation) => self.relation_fetch(class, relation, fetch)?,
                None => match fetch {
                    Some(fetch) => self.standalone_fetch(definition, fetch)?,
                    None => continue,
                },
            };
            fetches.push(descriptor);
        }

        Ok(ClassMetadata {
            name: class.to_string(),
            structure: Arc::new(structure.clone()),
            relations,
            fetches,
            map_values,
        })
    }

    fn related_definition(&self, class: &str, property: &str, related: Option<&String>) -> Result<&EntityDefinition> {
        let related = related.ok_or_else(|| Error::configuration(class, property, "related class is required"))?;
        self.definitions.get(related).ok_or_else(|| {
            Error::configuration(class, property, format!("related class {related} is not registered"))
        })
    }

    fn resolve_relation(
        &self,
        owner: &EntityDefinition,
        config: &RelationConfig,
        cascade_delete: bool,
    ) -> Result<RelationDescriptor> {
        let class = owner.class.as_str();
        let property = config.property.as_str();
        let related = self.related_definition(class, property, config.related_class.as_ref())?;

        if let Some(mapped_by) = &config.mapped_by {
            let inverse = related.relation_config(mapped_by).ok_or_else(|| {
                Error::configuration(
                    class,
                    property,
                    format!("mapped_by {mapped_by} is not a relation of {}", related.class),
                )
            })?;
            if inverse.related_class.as_deref() != Some(class) {
                return Err(Error::configuration(
                    class,
                    property,
                    format!("{}::{mapped_by} does not point back at {class}", related.class),
                ));
            }
        }

        let (columns, mid, owning) = match config.cardinality {
            Cardinality::ManyToMany => {
                let mid = config
                    .mid
                    .as_ref()
                    .ok_or_else(|| Error::configuration(class, property, "manyToMany requires a mid class"))?;
                let mid_definition = self.definitions.get(&mid.class).ok_or_else(|| {
                    Error::configuration(class, property, format!("mid class {} is not registered", mid.class))
                })?;
                let local = mid_link(class, property, mid_definition, &mid.local_property, class)?;
                let remote = mid_link(class, property, mid_definition, &mid.related_property, &related.class)?;
                let owner_columns: Vec<ColumnPair> = local.iter().map(ColumnPair::rev).collect();
                check_columns(class, property, &owner.structure, &mid_definition.structure, &owner_columns)?;
                check_columns(class, property, &mid_definition.structure, &related.structure, &remote)?;
                let descriptor = MidDescriptor {
                    class: mid.class.clone(),
                    local_property: mid.local_property.clone(),
                    related_property: mid.related_property.clone(),
                    owner_columns,
                    related_columns: remote,
                    factory: mid.factory.clone(),
                };
                (Vec::new(), Some(descriptor), false)
            }
            cardinality => {
                if config.mid.is_some() {
                    return Err(Error::configuration(
                        class,
                        property,
                        format!("a mid class is only valid on manyToMany, not {cardinality}"),
                    ));
                }
                let columns = if !config.columns.is_empty() {
                    config.columns.clone()
                } else if let Some(mapped_by) = &config.mapped_by {
                    // The inverse side owns the columns; read them reversed.
                    let inverse = related.relation_config(mapped_by).map(|r| &r.columns);
                    match inverse {
                        Some(columns) if !columns.is_empty() => columns.iter().map(ColumnPair::rev).collect(),
                        _ => {
                            return Err(Error::configuration(
                                class,
                                property,
                                format!("inverse relation {}::{mapped_by} declares no columns", related.class),
                            ))
                        }
                    }
                } else {
                    return Err(Error::configuration(class, property, "columns or mapped_by is required"));
                };
                check_columns(class, property, &owner.structure, &related.structure, &columns)?;
                let owning = match cardinality {
                    Cardinality::ManyToOne => true,
                    Cardinality::OneToOne => config.mapped_by.is_none(),
                    _ => false,
                };
                (columns, None, owning)
            }
        };

        Ok(RelationDescriptor {
            property: config.property.clone(),
            cardinality: config.cardinality,
            related_class: related.class.clone(),
            mapped_by: config.mapped_by.clone(),
            columns,
            owning,
            mid,
            cascade_delete,
            join_type: config.join_type.unwrap_or(self.default_join_type),
            setter: config.setter.clone(),
            getter: config.getter.clone(),
        })
    }

    fn relation_fetch(
        &self,
        class: &str,
        relation: &RelationDescriptor,
        fetch: Option<&FetchConfig>,
    ) -> Result<FetchDescriptor> {
        let to_many = relation.cardinality.is_to_many();
        let mode = match fetch {
            Some(fetch) => fetch.mode,
            None if to_many => FetchMode::ExtraLazy,
            None => FetchMode::Proxy,
        };

        if mode == FetchMode::Proxy {
            if to_many {
                return Err(Error::configuration(
                    class,
                    &relation.property,
                    format!("PROXY requires a to-one relation, {} is {}", relation.property, relation.cardinality),
                ));
            }
            if !relation.owning {
                return Err(Error::configuration(
                    class,
                    &relation.property,
                    "PROXY requires the owner to hold the foreign key",
                ));
            }
            let related = self.definition(&relation.related_class)?;
            let mut targets: Vec<&str> = relation.columns.iter().map(|c| c.target.as_str()).collect();
            let mut key: Vec<&str> = related.structure.primary_key_fields().iter().map(String::as_str).collect();
            targets.sort_unstable();
            key.sort_unstable();
            if targets != key {
                return Err(Error::configuration(
                    class,
                    &relation.property,
                    format!("PROXY columns must map onto the primary key of {}", relation.related_class),
                ));
            }
        }

        let target = match (fetch.and_then(|f| f.callback.clone()), &relation.mid) {
            (Some(callback), _) => FetchTarget::Callback(callback),
            (None, Some(mid)) => FetchTarget::Through {
                mid_class: mid.class.clone(),
                owner_columns: mid.owner_columns.clone(),
                related_class: relation.related_class.clone(),
                related_columns: mid.related_columns.clone(),
            },
            (None, None) => FetchTarget::Related {
                class: relation.related_class.clone(),
                columns: relation.columns.clone(),
                collection: to_many,
            },
        };

        Ok(FetchDescriptor {
            property: relation.property.clone(),
            mode,
            source_class: class.to_string(),
            target,
            join_type: relation.join_type,
            defaults: fetch.map(|f| f.defaults.clone()).unwrap_or_default(),
        })
    }

    fn standalone_fetch(&self, owner: &EntityDefinition, fetch: &FetchConfig) -> Result<FetchDescriptor> {
        let class = owner.class.as_str();
        let property = fetch.property.as_str();

        let target = if let Some(callback) = &fetch.callback {
            FetchTarget::Callback(callback.clone())
        } else if owner.structure.has_field(property) {
            if fetch.mode == FetchMode::Proxy {
                return Err(Error::configuration(class, property, "PROXY cannot apply to a structure field"));
            }
            if owner.structure.is_primary_key(property) && fetch.mode.is_deferred() {
                return Err(Error::configuration(class, property, "primary key fields cannot be deferred"));
            }
            FetchTarget::Field
        } else if let Some(target_class) = &fetch.target_class {
            let related = self.related_definition(class, property, Some(target_class))?;
            if fetch.columns.is_empty() {
                return Err(Error::configuration(class, property, "columns are required for a fetch target"));
            }
            check_columns(class, property, &owner.structure, &related.structure, &fetch.columns)?;
            if fetch.mode == FetchMode::Proxy && fetch.collection {
                return Err(Error::configuration(class, property, "PROXY requires a single target"));
            }
            FetchTarget::Related {
                class: target_class.clone(),
                columns: fetch.columns.clone(),
                collection: fetch.collection,
            }
        } else {
            return Err(Error::configuration(
                class,
                property,
                "fetch declared on neither a field, a relation nor a target class",
            ));
        };

        Ok(FetchDescriptor {
            property: fetch.property.clone(),
            mode: fetch.mode,
            source_class: class.to_string(),
            target,
            join_type: self.default_join_type,
            defaults: fetch.defaults.clone(),
        })
    }

    fn validate_map_value(
        &self,
        owner: &EntityDefinition,
        relations: &[RelationDescriptor],
        map_value: &MapValue,
    ) -> Result<()> {
        let class = owner.class.as_str();
        if !owner.structure.has_field(&map_value.property) {
            return Err(Error::configuration(class, &map_value.property, "map value target is not a structure field"));
        }
        let relation = relations
            .iter()
            .find(|r| r.property == map_value.relation)
            .ok_or_else(|| {
                Error::configuration(
                    class,
                    &map_value.property,
                    format!("map value relation {} is not declared", map_value.relation),
                )
            })?;
        if !relation.cardinality.is_to_one() {
            return Err(Error::configuration(
                class,
                &map_value.property,
                format!("map value relation {} must be to-one", map_value.relation),
            ));
        }
        let related = self.definition(&relation.related_class)?;
        if !related.structure.has_field(&map_value.related_property) {
            return Err(Error::configuration(
                class,
                &map_value.property,
                format!("{} has no field {}", relation.related_class, map_value.related_property),
            ));
        }
        Ok(())
    }
}

/// Columns (mid fk -> linked key) of the mid relation named `property`
fn mid_link(
    class: &str,
    owner_property: &str,
    mid: &EntityDefinition,
    property: &str,
    expected: &str,
) -> Result<Vec<ColumnPair>> {
    let link = mid.relation_config(property).ok_or_else(|| {
        Error::configuration(
            class,
            owner_property,
            format!("mid property {}::{property} is not a relation", mid.class),
        )
    })?;
    if link.cardinality != Cardinality::ManyToOne || link.related_class.as_deref() != Some(expected) {
        return Err(Error::configuration(
            class,
            owner_property,
            format!("mid property {}::{property} must be a manyToOne to {expected}", mid.class),
        ));
    }
    if link.columns.is_empty() {
        return Err(Error::configuration(
            class,
            owner_property,
            format!("mid property {}::{property} declares no columns", mid.class),
        ));
    }
    Ok(link.columns.clone())
}

fn check_columns(
    class: &str,
    property: &str,
    source: &Structure,
    target: &Structure,
    columns: &[ColumnPair],
) -> Result<()> {
    for pair in columns {
        if !source.has_field(&pair.source) {
            return Err(Error::configuration(
                class,
                property,
                format!("unknown column {}.{}", source.relation(), pair.source),
            ));
        }
        if !target.has_field(&pair.target) {
            return Err(Error::configuration(
                class,
                property,
                format!("unknown column {}.{}", target.relation(), pair.target),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::MidConfig;
    use crate::tests_cfg::{definitions, registry};

    fn registry_with(extra: EntityDefinition) -> Registry {
        definitions()
            .into_iter()
            .filter(|d| d.class() != extra.class())
            .fold(Registry::builder(), |b, d| b.register(d))
            .register(extra)
            .build()
    }

    #[test]
    fn test_metadata_is_frozen() {
        let registry = registry();
        let a = registry.metadata("DummyPerson").unwrap();
        let b = registry.metadata("DummyPerson").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_invalid_class_fails_on_lookup_not_build() {
        let registry = registry_with(EntityDefinition::new(
            "Kennel",
            Structure::new("kennel").field("id", "int4"),
        ));
        assert!(registry.metadata("DummyPerson").is_ok());
        assert!(registry.metadata("Kennel").unwrap_err().is_configuration());
        // Failures are not cached
        assert!(registry.metadata("Kennel").unwrap_err().is_configuration());
    }

    #[test]
    fn test_one_to_many_columns_are_inferred_from_inverse() {
        let registry = registry();
        let relation = registry.get_relation("DummyPerson", "owned_dogs").unwrap();
        assert_eq!(relation.columns, vec![ColumnPair::new("name", "dummy_person_name")]);
        assert!(!relation.owning);
    }

    #[test]
    fn test_many_to_many_columns_come_from_mid() {
        let registry = registry();
        let relation = registry.get_relation("DummyPerson", "dogs").unwrap();
        let mid = relation.mid.unwrap();
        assert_eq!(mid.owner_columns, vec![ColumnPair::new("name", "dummy_person_name")]);
        assert_eq!(mid.related_columns, vec![ColumnPair::new("dummy_dog_name", "name")]);
    }

    #[test]
    fn test_default_fetch_modes() {
        let registry = registry();
        let fetches = registry.get_fetch_config("DummyDog").unwrap();
        let owner = fetches.iter().find(|f| f.property == "owner").unwrap();
        assert_eq!(owner.mode, FetchMode::Proxy);

        let metadata = registry.metadata("DummyPerson").unwrap();
        assert_eq!(metadata.fetch("children").unwrap().mode, FetchMode::ExtraLazy);
        assert_eq!(metadata.fetch("bio").unwrap().mode, FetchMode::Lazy);
    }

    #[test]
    fn test_fetch_order_follows_declarations() {
        let registry = registry();
        let metadata = registry.metadata("DummyPerson").unwrap();
        let names: Vec<&str> = metadata.fetches().iter().map(|f| f.property.as_str()).collect();
        assert_eq!(
            names,
            vec!["bio", "mother", "children", "owned_dogs", "dogs", "dogs_from_callback", "favorite_dog"]
        );
    }

    #[test]
    fn test_missing_related_class_fails_fast() {
        let registry = registry_with(
            EntityDefinition::new("Orphan", Structure::new("orphan").field("id", "int4").primary_key(["id"]))
                .relation(RelationConfig::new("parent", Cardinality::ManyToOne).columns([("id", "name")])),
        );
        let err = registry.metadata("Orphan").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Orphan::parent"));
    }

    #[test]
    fn test_many_to_many_without_mid_fails() {
        let registry = registry_with(
            EntityDefinition::new("Kennel", Structure::new("kennel").field("id", "int4").primary_key(["id"]))
                .relation(RelationConfig::new("dogs", Cardinality::ManyToMany).related("DummyDog")),
        );
        let err = registry.metadata("Kennel").unwrap_err();
        assert!(err.to_string().contains("mid class"));
    }

    #[test]
    fn test_proxy_on_to_many_fails() {
        let registry = registry_with(
            EntityDefinition::new(
                "Kennel",
                Structure::new("kennel")
                    .field("id", "int4")
                    .field("parent_id", "int4")
                    .primary_key(["id"]),
            )
            .relation(RelationConfig::many_to_one("parent", "Kennel").columns([("parent_id", "id")]))
            .relation(RelationConfig::one_to_many("branches", "Kennel").mapped_by("parent"))
            .fetch(FetchConfig::proxy("branches")),
        );
        let err = registry.metadata("Kennel").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("PROXY requires a to-one relation, branches is"));
    }

    #[test]
    fn test_unknown_column_fails() {
        let registry = registry_with(
            EntityDefinition::new("Kennel", Structure::new("kennel").field("id", "int4").primary_key(["id"]))
                .relation(RelationConfig::many_to_one("keeper", "DummyPerson").columns([("keeper_name", "name")])),
        );
        let err = registry.metadata("Kennel").unwrap_err();
        assert!(err.to_string().contains("kennel.keeper_name"));
    }

    #[test]
    fn test_unregistered_class() {
        let registry = registry();
        assert!(matches!(registry.metadata("Nope"), Err(Error::UnknownClass(_))));
    }
}
