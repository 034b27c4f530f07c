use super::{ClassClient, Session};
use crate::entity::{Entity, EntityRef, EntityStatus};
use crate::error::{Error, Result};
use crate::fetch::resolver::FetchPlan;
use crate::join::{qualify, ROOT_ALIAS};
use crate::query::{
    apply_extensions, CursorPage, CursorPager, OffsetPager, OrderBy, Page, QueryBuilder, QueryExtension,
    QueryOutput, Where, PLACEHOLDER,
};
use crate::registry::ClassMetadata;
use crate::value::{FieldValue, PrimaryKey};
use sea_query::{Order, Value};
use std::rc::Rc;
use std::sync::Arc;

/// Entry point for loading and creating entities of one class
pub struct Repository<'s> {
    session: &'s Session,
    client: Rc<ClassClient>,
}

impl<'s> Repository<'s> {
    pub(crate) fn new(session: &'s Session, client: Rc<ClassClient>) -> Self {
        Self { session, client }
    }

    pub fn class(&self) -> &str {
        self.client.metadata.name()
    }

    pub fn metadata(&self) -> &Arc<ClassMetadata> {
        &self.client.metadata
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Both repositories use the same per-class client
    pub fn shares_client(&self, other: &Repository<'_>) -> bool {
        Rc::ptr_eq(&self.client, &other.client)
    }

    /// Root-qualified column reference for hand-written conditions
    pub fn field(&self, column: &str) -> String {
        qualify(ROOT_ALIAS, column)
    }

    /// A new `NONE` entity attached to the session
    ///
    /// Relations in `values` go through the relation runtime, so foreign
    /// keys are synchronized. An entity whose primary key is complete is
    /// registered in the identity map unless that key is already taken.
    pub fn create<I, K, V>(&self, values: I) -> Result<EntityRef>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let mut entity = Entity::new(Arc::clone(&self.client.metadata));
        entity.attach(self.session.downgrade());
        let entity = EntityRef::new(entity);
        for (property, value) in values {
            entity.set(property.as_ref(), value)?;
        }
        entity.borrow_mut().remove_status(EntityStatus::MODIFIED);

        if let Some(primary_key) = entity.primary_key()? {
            let existing = self
                .session
                .0
                .identity_map
                .borrow_mut()
                .register(self.class(), primary_key, &entity);
            if existing.is_some() {
                log::debug!("created {} shares a key with a mapped instance; not registered", self.class());
            }
        }
        Ok(entity)
    }

    /// One entity by primary key, default properties
    ///
    /// `key` holds one `(column, value)` per primary key column, in any order.
    pub fn find_by_pk(&self, key: &[(&str, Value)]) -> Result<Option<EntityRef>> {
        self.select().filter(self.key_condition(key)?).one()
    }

    /// One entity by primary key with exactly the requested properties
    pub fn find_by_pk_with<S: AsRef<str>>(&self, key: &[(&str, Value)], properties: &[S]) -> Result<Option<EntityRef>> {
        self.select().properties(properties).filter(self.key_condition(key)?).one()
    }

    /// Canonical instance for a key if the session already holds it
    pub fn get_cached(&self, key: &[(&str, Value)]) -> Result<Option<EntityRef>> {
        let ordered = self.ordered_key(key)?;
        match PrimaryKey::from_values(ordered.iter())? {
            Some(primary_key) => Ok(self.session.get_entity(self.class(), &primary_key)),
            None => Ok(None),
        }
    }

    pub fn find_where(&self, condition: Where) -> Result<Vec<EntityRef>> {
        self.select().filter(condition).all()
    }

    pub fn find_one_where(&self, condition: Where) -> Result<Option<EntityRef>> {
        self.select().filter(condition).one()
    }

    pub fn find_all(&self) -> Result<Vec<EntityRef>> {
        self.select().all()
    }

    /// Offset pagination; `per_page` defaults to the session settings
    pub fn paginate(&self, condition: Where, page: u64, per_page: Option<u64>) -> Result<Page> {
        let settings = self.session.settings();
        let pager = OffsetPager::new(page, per_page.unwrap_or(settings.default_items_per_page))
            .max_per_page(settings.max_items_per_page);
        match self.select().filter(condition).with_extension(Rc::new(pager)).output(true)? {
            QueryOutput::Page(page) => Ok(page),
            other => Err(Error::Execution(format!("offset pager produced {}", output_kind(&other)))),
        }
    }

    /// Keyset pagination on the primary key, starting after `after`
    pub fn paginate_after(&self, condition: Where, after: Option<Vec<Value>>, limit: u64) -> Result<CursorPage> {
        let pager = CursorPager::new(after, limit);
        match self.select().filter(condition).with_extension(Rc::new(pager)).output(true)? {
            QueryOutput::CursorPage(page) => Ok(page),
            other => Err(Error::Execution(format!("cursor pager produced {}", output_kind(&other)))),
        }
    }

    pub fn select(&self) -> Select<'_> {
        Select {
            repository: self,
            properties: None,
            condition: Where::default(),
            orders: Vec::new(),
            extensions: Vec::new(),
        }
    }

    fn ordered_key(&self, key: &[(&str, Value)]) -> Result<Vec<Value>> {
        let columns = self.client.metadata.structure().primary_key_fields();
        if key.len() != columns.len() {
            return Err(Error::MissingPrimaryKey {
                class: self.class().to_string(),
            });
        }
        columns
            .iter()
            .map(|column| {
                key.iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| Error::MissingPrimaryKey {
                        class: self.class().to_string(),
                    })
            })
            .collect()
    }

    fn key_condition(&self, key: &[(&str, Value)]) -> Result<Where> {
        let columns = self.client.metadata.structure().primary_key_fields();
        let values = self.ordered_key(key)?;
        Ok(columns.iter().zip(values).fold(Where::default(), |condition, (column, value)| {
            condition.and_where(Where::new(
                format!("{} = {PLACEHOLDER}", qualify(ROOT_ALIAS, column)),
                vec![value],
            ))
        }))
    }
}

fn output_kind(output: &QueryOutput) -> &'static str {
    match output {
        QueryOutput::One(_) => "a single item",
        QueryOutput::All(_) => "a collection",
        QueryOutput::Page(_) => "a page",
        QueryOutput::CursorPage(_) => "a cursor page",
        QueryOutput::Sql { .. } => "SQL only",
    }
}

/// One SELECT being assembled over a repository's class
pub struct Select<'r> {
    repository: &'r Repository<'r>,
    properties: Option<Vec<String>>,
    condition: Where,
    orders: Vec<(String, Order)>,
    extensions: Vec<Rc<dyn QueryExtension>>,
}

impl<'r> Select<'r> {
    /// Request exactly these properties instead of the class defaults
    pub fn properties<S: AsRef<str>>(mut self, properties: &[S]) -> Self {
        self.properties = Some(properties.iter().map(|p| p.as_ref().to_string()).collect());
        self
    }

    /// AND a predicate into the WHERE clause
    pub fn filter(mut self, condition: impl Into<Where>) -> Self {
        self.condition = self.condition.and_where(condition);
        self
    }

    /// Order by a structure field of the root, or by a raw SQL expression
    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        let expression = if self.repository.client.metadata.structure().has_field(field) {
            qualify(ROOT_ALIAS, field)
        } else {
            field.to_string()
        };
        self.orders.push((expression, order));
        self
    }

    /// Run an extra extension after the session's own
    pub fn with_extension(mut self, extension: Rc<dyn QueryExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn one(self) -> Result<Option<EntityRef>> {
        Ok(self.output(false)?.into_one())
    }

    pub fn all(self) -> Result<Vec<EntityRef>> {
        Ok(self.output(true)?.into_entities())
    }

    /// Finalized statement without executing it
    pub fn to_sql(self, collection: bool) -> Result<(String, Vec<Value>)> {
        match self.run(collection, false)? {
            QueryOutput::Sql { sql, params } => Ok((sql, params)),
            other => Err(Error::Execution(format!("expected SQL, got {}", output_kind(&other)))),
        }
    }

    pub fn output(self, collection: bool) -> Result<QueryOutput> {
        self.run(collection, true)
    }

    fn run(self, collection: bool, get_results: bool) -> Result<QueryOutput> {
        let repository = self.repository;
        let session = repository.session;
        let metadata = &repository.client.metadata;
        let plan = match &self.properties {
            Some(requested) => FetchPlan::for_properties(metadata, requested)?,
            None => repository.client.default_plan.clone(),
        };

        let mut context = QueryBuilder::new(session.registry()).select(
            metadata.name(),
            plan.properties(),
            self.condition,
            collection,
        )?;
        for (expression, order) in &self.orders {
            OrderBy::push(&mut context, expression, order)?;
        }

        let mut extensions = session.extensions();
        extensions.extend(self.extensions);
        apply_extensions(&extensions, collection, get_results, &mut context, session)
    }
}
