//! Request-scoped session: identity map, executor and per-class clients.
//!
//! A [`Session`] is a cheap handle (`Rc`) over the state one unit of work
//! shares. Entities hydrated through it keep a weak back-reference so
//! deferred properties can be loaded later; once every handle is dropped,
//! those loads fail with `NoSession`.

mod changeset;
mod repository;

pub use changeset::ChangeSet;
pub use repository::{Repository, Select};

use crate::config::FetchSettings;
use crate::entity::EntityRef;
use crate::error::{Error, Result};
use crate::executor::{Projection, QueryExecutor, Row, Rows};
use crate::fetch::resolver::{self, FetchPlan};
use crate::identity::IdentityMap;
use crate::join::{qualify, ROOT_ALIAS};
use crate::query::{GroupBy, OrderBy, QueryContext, QueryExtension, QueryRunner, Where, PLACEHOLDER};
use crate::registry::{ClassMetadata, Registry};
use crate::relation::RelationDescriptor;
use crate::value::{interpolate, PrimaryKey};
use sea_query::Value;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use std::time::Instant;

/// Per-class singleton state shared by every repository of one class
pub(crate) struct ClassClient {
    pub(crate) metadata: Arc<ClassMetadata>,
    pub(crate) default_plan: FetchPlan,
}

pub(crate) struct SessionCore {
    registry: Arc<Registry>,
    executor: Box<dyn QueryExecutor>,
    identity_map: RefCell<IdentityMap>,
    settings: FetchSettings,
    extensions: RefCell<Vec<Rc<dyn QueryExtension>>>,
    clients: RefCell<HashMap<String, Rc<ClassClient>>>,
}

/// Configures a [`Session`] before it is opened
pub struct SessionBuilder {
    registry: Arc<Registry>,
    executor: Box<dyn QueryExecutor>,
    settings: FetchSettings,
    extensions: Vec<Rc<dyn QueryExtension>>,
}

impl SessionBuilder {
    pub fn settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register an extension after the default `GroupBy` and `OrderBy`
    pub fn extension(mut self, extension: Rc<dyn QueryExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn build(self) -> Session {
        let mut extensions: Vec<Rc<dyn QueryExtension>> = vec![
            Rc::new(GroupBy),
            Rc::new(OrderBy::new(self.settings.order_by_primary_key)),
        ];
        extensions.extend(self.extensions);
        Session(Rc::new(SessionCore {
            registry: self.registry,
            executor: self.executor,
            identity_map: RefCell::new(IdentityMap::new()),
            settings: self.settings,
            extensions: RefCell::new(extensions),
            clients: RefCell::new(HashMap::new()),
        }))
    }
}

/// Handle to one unit of work
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use std::sync::Arc;
/// use tether::mock::MockExecutor;
/// use tether::registry::EntityDefinition;
/// use tether::{Registry, Session, Structure};
///
/// let registry = Registry::builder()
///     .register(EntityDefinition::new(
///         "DummyDog",
///         Structure::new("dummy_dog").field("name", "text").primary_key(["name"]),
///     ))
///     .build();
/// let executor = Rc::new(MockExecutor::new());
/// let session = Session::new(Arc::new(registry), executor.clone());
///
/// let dogs = session.repository("DummyDog").unwrap().find_all().unwrap();
/// assert!(dogs.is_empty());
/// assert_eq!(
///     executor.last_query().unwrap().sql,
///     "SELECT t0.\"name\" as \"name\" FROM dummy_dog t0 WHERE TRUE AND TRUE ORDER BY t0.\"name\" ASC"
/// );
/// ```
#[derive(Clone)]
pub struct Session(Rc<SessionCore>);

impl Session {
    pub fn new(registry: Arc<Registry>, executor: impl QueryExecutor + 'static) -> Self {
        Self::builder(registry, executor).build()
    }

    pub fn builder(registry: Arc<Registry>, executor: impl QueryExecutor + 'static) -> SessionBuilder {
        SessionBuilder {
            registry,
            executor: Box::new(executor),
            settings: FetchSettings::default(),
            extensions: Vec::new(),
        }
    }

    pub(crate) fn from_core(core: Rc<SessionCore>) -> Self {
        Self(core)
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionCore> {
        Rc::downgrade(&self.0)
    }

    /// Both handles point at the same session
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity_fetch(&self, metadata: &Arc<ClassMetadata>, primary_key: PrimaryKey) -> (EntityRef, bool) {
        self.0.identity_map.borrow_mut().fetch(metadata, primary_key)
    }

    pub fn registry(&self) -> &Registry {
        &self.0.registry
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.0.settings
    }

    pub fn identity_map(&self) -> Ref<'_, IdentityMap> {
        self.0.identity_map.borrow()
    }

    /// Canonical instance for a key, without querying
    pub fn get_entity(&self, class: &str, primary_key: &PrimaryKey) -> Option<EntityRef> {
        self.0.identity_map.borrow().get(class, primary_key)
    }

    /// Make `entity` the canonical instance for its current primary key
    ///
    /// Returns the instance already mapped under that key instead, if any.
    pub fn attach(&self, entity: &EntityRef) -> Result<EntityRef> {
        entity.borrow_mut().attach(self.downgrade());
        let class = entity.class();
        let primary_key = entity
            .primary_key()?
            .ok_or_else(|| Error::MissingPrimaryKey { class: class.clone() })?;
        let existing = self.0.identity_map.borrow_mut().register(&class, primary_key, entity);
        Ok(existing.unwrap_or_else(|| entity.clone()))
    }

    /// Forget every mapped entity
    pub fn clear(&self) {
        self.0.identity_map.borrow_mut().clear();
    }

    /// Append an extension to the session pipeline
    pub fn register_extension(&self, extension: Rc<dyn QueryExtension>) {
        self.0.extensions.borrow_mut().push(extension);
    }

    pub fn extensions(&self) -> Vec<Rc<dyn QueryExtension>> {
        self.0.extensions.borrow().clone()
    }

    /// Repository over the session's singleton client for `class`
    ///
    /// # Errors
    ///
    /// `UnknownClass` or `Configuration` if the class does not resolve.
    pub fn repository(&self, class: &str) -> Result<Repository<'_>> {
        if let Some(client) = self.0.clients.borrow().get(class) {
            return Ok(Repository::new(self, Rc::clone(client)));
        }
        let metadata = self.0.registry.metadata(class)?;
        let client = Rc::new(ClassClient {
            default_plan: FetchPlan::default_for(&metadata),
            metadata,
        });
        log::trace!("registered client for {class}");
        self.0
            .clients
            .borrow_mut()
            .insert(class.to_string(), Rc::clone(&client));
        Ok(Repository::new(self, client))
    }

    fn run_query(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Rows> {
        log::debug!("{}", interpolate(sql, params));
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::query_span(sql, params.len()).entered();
        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = self.0.executor.query(sql, params, projection);

        #[cfg(feature = "metrics")]
        METRICS.record_query(start.elapsed());
        result
    }

    /// Run a statement that returns no rows
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        log::debug!("{}", interpolate(sql, params));
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::query_span(sql, params.len()).entered();
        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = self.0.executor.execute(sql, params);

        #[cfg(feature = "metrics")]
        METRICS.record_query(start.elapsed());
        result
    }

    pub fn fetch_rows(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Vec<Row>> {
        Ok(self.run_query(sql, params, projection)?.collect())
    }

    /// Load every default field of a proxy in one SELECT by primary key
    ///
    /// # Errors
    ///
    /// `NotFound` if no row matches the key.
    pub fn load_proxy(&self, entity: &EntityRef) -> Result<()> {
        let metadata = entity.metadata();
        let condition = key_condition(entity, metadata.structure().primary_key_fields())?;
        let plan = FetchPlan::default_for(&metadata);
        let found = self
            .repository(metadata.name())?
            .select()
            .properties(plan.properties())
            .filter(condition)
            .one()?;
        match found {
            Some(_) => Ok(()),
            None => Err(Error::NotFound {
                class: metadata.name().to_string(),
            }),
        }
    }

    /// Entities reachable from `root`, partitioned for a flush
    pub fn changeset(&self, root: &EntityRef) -> Result<ChangeSet> {
        ChangeSet::collect(root)
    }

    /// Persisted mid entities of a many-to-many relation of `owner`
    pub(crate) fn load_mids(&self, owner: &EntityRef, relation: &RelationDescriptor) -> Result<Vec<EntityRef>> {
        let mid = relation.mid.as_ref().ok_or_else(|| {
            Error::configuration(owner.class(), &relation.property, "relation has no mid class")
        })?;
        let mut condition = Where::default();
        {
            let entity = owner.borrow();
            for pair in &mid.owner_columns {
                let value = entity.scalar(&pair.source).ok_or_else(|| Error::MissingPrimaryKey {
                    class: entity.class().to_string(),
                })?;
                condition = condition.and_where(Where::new(
                    format!("{} = {PLACEHOLDER}", qualify(ROOT_ALIAS, &pair.target)),
                    vec![value.clone()],
                ));
            }
        }
        log::debug!("loading mid entities {} of {}::{}", mid.class, owner.class(), relation.property);
        self.repository(&mid.class)?.select().filter(condition).all()
    }
}

/// `t0."pk" = $*` for each key column of `entity`
pub(crate) fn key_condition(entity: &EntityRef, columns: &[String]) -> Result<Where> {
    let entity = entity.borrow();
    let mut condition = Where::default();
    for column in columns {
        let value = entity.scalar(column).ok_or_else(|| Error::MissingPrimaryKey {
            class: entity.class().to_string(),
        })?;
        condition = condition.and_where(Where::new(
            format!("{} = {PLACEHOLDER}", qualify(ROOT_ALIAS, column)),
            vec![value.clone()],
        ));
    }
    Ok(condition)
}

impl QueryRunner for Session {
    fn fetch_entities(&self, context: &QueryContext) -> Result<Vec<EntityRef>> {
        let (sql, params) = context.build();
        let rows = self.fetch_rows(&sql, &params, context.projection())?;
        let metadata = self.0.registry.metadata(context.class())?;
        let mut entities: Vec<EntityRef> = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = resolver::hydrate(self, &metadata, row, Some(context.projection()))?;
            if !entities.iter().any(|e| e.ptr_eq(&entity)) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    fn fetch_rows(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Vec<Row>> {
        Session::fetch_rows(self, sql, params, projection)
    }
}

impl QueryExecutor for Session {
    fn query(&self, sql: &str, params: &[Value], projection: &Projection) -> Result<Rows> {
        self.run_query(sql, params, projection)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        Session::execute(self, sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityStatus;
    use crate::mock::MockExecutor;
    use crate::tests_cfg::registry;

    fn session() -> (Session, Rc<MockExecutor>) {
        let executor = Rc::new(MockExecutor::new());
        (Session::new(Arc::new(registry()), executor.clone()), executor)
    }

    #[test]
    fn test_repository_clients_are_singletons() {
        let (session, _) = session();
        let a = session.repository("DummyDog").unwrap();
        let b = session.repository("DummyDog").unwrap();
        assert!(a.shares_client(&b));
    }

    #[test]
    fn test_load_proxy_clears_flag() {
        let (session, executor) = session();
        executor.push_rows(vec![Row::new()
            .scalar("name", "rex")
            .scalar("dummy_person_name", "someone")
            .scalar("age", 3i32)]);
        let dog = session.repository("DummyDog").unwrap().find_all().unwrap().remove(0);
        let owner = dog.get("owner").unwrap().as_entity().cloned().unwrap();
        assert!(owner.has_status(EntityStatus::PROXY));
        assert_eq!(executor.query_count(), 1);

        executor.push_rows(vec![Row::new()
            .scalar("name", "someone")
            .null("dummy_person_mother_name")
            .null("favorite_dog_name")]);
        session.load_proxy(&owner).unwrap();
        assert_eq!(executor.query_count(), 2);
        assert!(!owner.has_status(EntityStatus::PROXY));
        assert!(owner.has_status(EntityStatus::EXIST));
    }

    #[test]
    fn test_load_proxy_not_found() {
        let (session, _) = session();
        let registry = session.registry();
        let metadata = registry.metadata("DummyDog").unwrap();
        let (ghost, _) = session.identity_fetch(
            &metadata,
            PrimaryKey::from_values([&Value::from("ghost")]).unwrap().unwrap(),
        );
        ghost.borrow_mut().put("name", Value::from("ghost").into());
        assert!(matches!(session.load_proxy(&ghost), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_attach_returns_canonical_instance() {
        let (session, _) = session();
        let repository = session.repository("DummyDog").unwrap();
        let first = repository.create([("name", "rex")]).unwrap();
        let second = repository.create([("name", "rex")]).unwrap();
        let canonical = session.attach(&second).unwrap();
        assert!(canonical.ptr_eq(&first));
    }
}
