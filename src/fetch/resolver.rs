//! Fetch-mode execution: hydration of result rows, proxy construction and
//! deferred (lazy, extra-lazy) loads on first access.

use super::{FetchDescriptor, FetchMode, FetchTarget};
use crate::entity::{null_for, EntityRef, EntityStatus};
use crate::error::{Error, Result};
use crate::executor::{Projection, Row, RowValue};
use crate::join::{qualify, ROOT_ALIAS};
use crate::query::{GroupBy, QueryBuilder, QueryExtension, Where, PLACEHOLDER};
use crate::registry::ClassMetadata;
use crate::relation::ColumnPair;
use crate::session::Session;
use crate::value::{value_is_null, FieldValue, PrimaryKey};
use sea_query::Value;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Ordered property list of one root SELECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchPlan {
    select: Vec<String>,
}

impl FetchPlan {
    /// Structure fields that are not deferred, then every JOIN relation
    pub(crate) fn default_for(metadata: &ClassMetadata) -> Self {
        let mut select: Vec<String> = metadata
            .structure()
            .field_names()
            .filter(|field| !metadata.fetch(field).is_some_and(|f| f.mode.is_deferred()))
            .map(str::to_string)
            .collect();
        for descriptor in metadata.fetches() {
            if descriptor.mode == FetchMode::Join && descriptor.is_relational() {
                select.push(descriptor.property.clone());
            }
        }
        let mut plan = Self { select };
        plan.ensure_keys(metadata);
        plan
    }

    /// Exactly `requested`, plus what identity and proxies need
    ///
    /// PROXY properties are never joined; their source columns are selected
    /// instead so the proxy can be built from the row.
    pub(crate) fn for_properties<S: AsRef<str>>(metadata: &ClassMetadata, requested: &[S]) -> Result<Self> {
        let mut plan = Self { select: Vec::new() };
        for property in requested {
            let property = property.as_ref();
            if !metadata.has_property(property) {
                return Err(Error::unknown_property(metadata.name(), property));
            }
            match metadata.fetch(property) {
                Some(descriptor) if descriptor.mode == FetchMode::Proxy => {
                    for column in proxy_columns(descriptor) {
                        plan.push(column);
                    }
                }
                _ => plan.push(property),
            }
        }
        plan.ensure_keys(metadata);
        Ok(plan)
    }

    pub(crate) fn properties(&self) -> &[String] {
        &self.select
    }

    fn push(&mut self, property: &str) {
        if !self.select.iter().any(|p| p == property) {
            self.select.push(property.to_string());
        }
    }

    /// Primary key first, then the proxy source columns
    fn ensure_keys(&mut self, metadata: &ClassMetadata) {
        let key = metadata.structure().primary_key_fields();
        let missing: Vec<String> = key.iter().filter(|c| !self.select.contains(*c)).cloned().collect();
        self.select.splice(0..0, missing);
        for descriptor in metadata.fetches_with_mode(FetchMode::Proxy) {
            for column in proxy_columns(descriptor) {
                self.push(column);
            }
        }
    }
}

fn proxy_columns(descriptor: &FetchDescriptor) -> impl Iterator<Item = &str> {
    let columns: &[ColumnPair] = match &descriptor.target {
        FetchTarget::Related { columns, .. } => columns,
        _ => &[],
    };
    columns.iter().map(|pair| pair.source.as_str())
}

/// Map one root row onto its canonical entity
///
/// Values already held by a `MODIFIED` entity are left alone; everything
/// else is overwritten from the row.
pub(crate) fn hydrate(
    session: &Session,
    metadata: &Arc<ClassMetadata>,
    row: &Row,
    projection: Option<&Projection>,
) -> Result<EntityRef> {
    let primary_key = row_primary_key(metadata, row)?.ok_or_else(|| Error::MissingPrimaryKey {
        class: metadata.name().to_string(),
    })?;
    let (entity, _) = session.identity_fetch(metadata, primary_key);

    let mut values = Vec::with_capacity(row.len());
    for (name, value) in row.iter() {
        if let Some(value) = field_from_row(session, metadata, name, value, projection)? {
            values.push((name.to_string(), value));
        }
    }

    {
        let mut target = entity.borrow_mut();
        target.attach(session.downgrade());
        let keep_held = target.has_status(EntityStatus::MODIFIED);
        if !keep_held {
            for descriptor in metadata.fetches_with_mode(FetchMode::Proxy) {
                if proxy_columns(descriptor).any(|column| row.contains(column)) {
                    target.take(&descriptor.property);
                }
            }
        }
        for (name, value) in values {
            if keep_held && target.has(&name) {
                continue;
            }
            target.put(name, value);
        }
        target.add_status(EntityStatus::EXIST);
        if !keep_held {
            target.remove_status(EntityStatus::MODIFIED);
        }
        if covers_structure(metadata, row) {
            target.remove_status(EntityStatus::PROXY);
        }
    }

    resolve_proxies(session, &entity)?;
    Ok(entity)
}

/// `None` when a primary key column is absent or NULL
fn row_primary_key(metadata: &ClassMetadata, row: &Row) -> Result<Option<PrimaryKey>> {
    let mut values = Vec::new();
    for column in metadata.structure().primary_key_fields() {
        match row.get(column) {
            Some(RowValue::Scalar(value)) => values.push(value),
            _ => return Ok(None),
        }
    }
    PrimaryKey::from_values(values)
}

/// The row held every structure field a default SELECT would load
fn covers_structure(metadata: &ClassMetadata, row: &Row) -> bool {
    metadata
        .structure()
        .field_names()
        .filter(|field| !metadata.fetch(field).is_some_and(|f| f.mode.is_deferred()))
        .all(|field| row.contains(field))
}

fn field_from_row(
    session: &Session,
    metadata: &ClassMetadata,
    name: &str,
    value: &RowValue,
    projection: Option<&Projection>,
) -> Result<Option<FieldValue>> {
    let structure = metadata.structure();
    if structure.has_field(name) {
        let value = match value {
            RowValue::Scalar(v) => FieldValue::Scalar(v.clone()),
            RowValue::Null => FieldValue::Scalar(null_for(structure.field_type(name))),
            _ => {
                return Err(Error::Conversion(format!(
                    "{}::{name} is a scalar field, the row holds a record",
                    metadata.name()
                )))
            }
        };
        return Ok(Some(value));
    }
    if !metadata.is_relational(name) {
        log::trace!("ignoring result column {name} not mapped on {}", metadata.name());
        return Ok(None);
    }

    let projected = projection.and_then(|p| p.get(name)).map(|f| &f.field_type);
    let class = projected
        .and_then(|t| t.record_type())
        .map(|r| r.class.clone())
        .or_else(|| metadata.fetch(name).and_then(|f| f.target.target_class()).map(str::to_string))
        .or_else(|| metadata.relation(name).map(|r| r.related_class.clone()))
        .ok_or_else(|| Error::configuration(metadata.name(), name, "class of the joined rows is unknown"))?;
    let related = session.registry().metadata(&class)?;
    let collection = metadata.is_collection(name) || projected.is_some_and(|t| t.is_array());

    let members = match value {
        RowValue::Null => Vec::new(),
        RowValue::Record(record) => hydrate_related(session, &related, record)?.into_iter().collect(),
        RowValue::Records(records) => {
            let mut members: Vec<EntityRef> = Vec::with_capacity(records.len());
            for record in records {
                if let Some(member) = hydrate_related(session, &related, record)? {
                    if !members.iter().any(|m| m.ptr_eq(&member)) {
                        members.push(member);
                    }
                }
            }
            members
        }
        RowValue::Scalar(_) => {
            return Err(Error::Conversion(format!(
                "{}::{name} is a relation, the row holds a scalar",
                metadata.name()
            )))
        }
    };

    Ok(Some(if collection {
        FieldValue::Collection(members)
    } else {
        members.into_iter().next().map_or(FieldValue::Null, FieldValue::Entity)
    }))
}

/// Unmatched LEFT join rows carry a NULL key and map to nothing
fn hydrate_related(session: &Session, metadata: &Arc<ClassMetadata>, row: &Row) -> Result<Option<EntityRef>> {
    if row_primary_key(metadata, row)?.is_none() {
        return Ok(None);
    }
    hydrate(session, metadata, row, None).map(Some)
}

/// Build every PROXY property the entity does not hold yet
pub(crate) fn resolve_proxies(session: &Session, entity: &EntityRef) -> Result<()> {
    let metadata = entity.metadata();
    for descriptor in metadata.fetches_with_mode(FetchMode::Proxy) {
        if !entity.borrow().has(&descriptor.property) {
            resolve_proxy(Some(session), entity, descriptor)?;
        }
    }
    Ok(())
}

/// Reference-only instance keyed by the owner's source columns
///
/// Returns `Null` and stores nothing when a source column is unset.
fn resolve_proxy(session: Option<&Session>, entity: &EntityRef, descriptor: &FetchDescriptor) -> Result<FieldValue> {
    let FetchTarget::Related { class, columns, .. } = &descriptor.target else {
        return Err(Error::configuration(
            &descriptor.source_class,
            &descriptor.property,
            "PROXY requires a direct relation",
        ));
    };

    let mut keys: Vec<(String, Value)> = Vec::with_capacity(columns.len());
    {
        let owner = entity.borrow();
        for pair in columns {
            match owner.scalar(&pair.source) {
                Some(value) if !value_is_null(value) => keys.push((pair.target.clone(), value.clone())),
                _ => {
                    log::debug!(
                        "Proxy not created, primary key missing: {}::{}",
                        descriptor.source_class,
                        descriptor.property
                    );
                    return Ok(FieldValue::Null);
                }
            }
        }
    }

    let session = session.ok_or_else(|| Error::NoSession {
        class: descriptor.source_class.clone(),
        property: descriptor.property.clone(),
    })?;
    let related = session.registry().metadata(class)?;

    let mut ordered = Vec::with_capacity(keys.len());
    for column in related.structure().primary_key_fields() {
        let value = keys.iter().find(|(target, _)| target == column).map(|(_, v)| v).ok_or_else(|| {
            Error::configuration(
                &descriptor.source_class,
                &descriptor.property,
                format!("PROXY columns do not cover {class}.{column}"),
            )
        })?;
        ordered.push(value);
    }
    let primary_key = PrimaryKey::from_values(ordered)?.ok_or_else(|| Error::MissingPrimaryKey {
        class: class.clone(),
    })?;

    let (proxy, created) = session.identity_fetch(&related, primary_key);
    if created {
        let mut shell = proxy.borrow_mut();
        for (column, value) in keys {
            shell.put(column, FieldValue::Scalar(value));
        }
        for (property, value) in &descriptor.defaults {
            shell.put(property.clone(), FieldValue::Scalar(value.clone()));
        }
        shell.attach(session.downgrade());
        shell.add_status(EntityStatus::EXIST | EntityStatus::PROXY);
        log::trace!("built proxy {class} for {}::{}", descriptor.source_class, descriptor.property);
    }

    let value = FieldValue::Entity(proxy);
    entity.borrow_mut().put(descriptor.property.clone(), value.clone());
    Ok(value)
}

/// Property read with fetch resolution, then the relation's custom getter
pub(crate) fn get(entity: &EntityRef, property: &str) -> Result<FieldValue> {
    let metadata = entity.metadata();
    let value = resolve(entity, &metadata, property)?;
    match metadata.relation(property).and_then(|r| r.getter.clone()) {
        Some(getter) => {
            let owner = entity.borrow();
            getter(&owner, value)
        }
        None => Ok(value),
    }
}

fn resolve(entity: &EntityRef, metadata: &Arc<ClassMetadata>, property: &str) -> Result<FieldValue> {
    if let Some(value) = entity.borrow().raw(property) {
        return Ok(value.clone());
    }
    if !metadata.has_property(property) {
        return Err(Error::unknown_property(metadata.name(), property));
    }
    let Some(descriptor) = metadata.fetch(property) else {
        return Ok(empty_value(metadata, property));
    };

    match descriptor.mode {
        FetchMode::Join => Ok(empty_value(metadata, property)),
        FetchMode::Proxy => resolve_proxy(entity.session().as_ref(), entity, descriptor),
        FetchMode::Lazy | FetchMode::ExtraLazy => {
            if !entity.has_status(EntityStatus::EXIST) {
                return Ok(empty_value(metadata, property));
            }
            let session = entity.session().ok_or_else(|| Error::NoSession {
                class: metadata.name().to_string(),
                property: property.to_string(),
            })?;
            let loaded = {
                let e = entity.borrow();
                match descriptor.mode {
                    FetchMode::Lazy => e.lazy_loaded,
                    _ => e.extra_lazy_loaded.contains(property),
                }
            };
            if !loaded {
                if descriptor.mode == FetchMode::Lazy {
                    load_lazy_group(&session, entity, metadata)?;
                } else {
                    load_extra_lazy(&session, entity, metadata, property)?;
                }
            }
            let held = entity.borrow().raw(property).cloned();
            Ok(held.unwrap_or_else(|| empty_value(metadata, property)))
        }
    }
}

fn empty_value(metadata: &ClassMetadata, property: &str) -> FieldValue {
    if metadata.is_collection(property) {
        FieldValue::Collection(Vec::new())
    } else {
        FieldValue::Null
    }
}

/// One statement for every LAZY property of the entity
fn load_lazy_group(session: &Session, entity: &EntityRef, metadata: &Arc<ClassMetadata>) -> Result<()> {
    let lazy: Vec<String> = metadata
        .fetches_with_mode(FetchMode::Lazy)
        .map(|f| f.property.clone())
        .collect();
    log::debug!("loading lazy group {lazy:?} of {}", metadata.name());
    load_deferred(session, entity, metadata, &lazy)?;
    entity.borrow_mut().lazy_loaded = true;
    #[cfg(feature = "metrics")]
    METRICS.record_lazy_load(metadata.name(), FetchMode::Lazy);
    Ok(())
}

/// One statement for a single EXTRA_LAZY property
fn load_extra_lazy(
    session: &Session,
    entity: &EntityRef,
    metadata: &Arc<ClassMetadata>,
    property: &str,
) -> Result<()> {
    log::debug!("loading extra-lazy {}::{property}", metadata.name());
    load_deferred(session, entity, metadata, &[property.to_string()])?;
    entity.borrow_mut().extra_lazy_loaded.insert(property.to_string());
    #[cfg(feature = "metrics")]
    METRICS.record_lazy_load(metadata.name(), FetchMode::ExtraLazy);
    Ok(())
}

/// Select `properties` of this entity by primary key and fill the ones it
/// does not hold yet; a missing row loads empty values
fn load_deferred(
    session: &Session,
    entity: &EntityRef,
    metadata: &Arc<ClassMetadata>,
    properties: &[String],
) -> Result<()> {
    let key_columns = metadata.structure().primary_key_fields();
    let mut condition = Where::default();
    {
        let owner = entity.borrow();
        for column in key_columns {
            let value = owner.scalar(column).ok_or_else(|| Error::MissingPrimaryKey {
                class: metadata.name().to_string(),
            })?;
            condition = condition.and_where(Where::new(
                format!("{} = {PLACEHOLDER}", qualify(ROOT_ALIAS, column)),
                vec![value.clone()],
            ));
        }
    }

    let mut select: Vec<String> = key_columns.to_vec();
    select.extend(properties.iter().filter(|p| !key_columns.contains(*p)).cloned());

    let mut context = QueryBuilder::new(session.registry()).select(metadata.name(), &select, condition, false)?;
    if GroupBy.supports(&context) {
        GroupBy.apply(&mut context)?;
    }
    let (sql, params) = context.build();
    let rows = session.fetch_rows(&sql, &params, context.projection())?;
    let row = rows.into_iter().next();

    let mut values = Vec::with_capacity(properties.len());
    for property in properties {
        let value = match row.as_ref().and_then(|r| r.get(property)) {
            Some(value) => field_from_row(session, metadata, property, value, Some(context.projection()))?,
            None => Some(empty_value(metadata, property)),
        };
        if let Some(value) = value {
            values.push((property.clone(), value));
        }
    }

    let mut owner = entity.borrow_mut();
    for (property, value) in values {
        if !owner.has(&property) {
            owner.put(property, value);
        }
    }
    Ok(())
}
