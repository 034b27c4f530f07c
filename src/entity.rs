//! Session-managed entity instances.
//!
//! An [`Entity`] is a property bag over its class metadata plus a lifecycle
//! [`EntityStatus`]. Callers share entities through [`EntityRef`]; the
//! session's identity map holds the canonical reference for every primary
//! key it has seen.

use crate::error::{Error, Result};
use crate::fetch::resolver;
use crate::registry::ClassMetadata;
use crate::runtime;
use crate::session::{Session, SessionCore};
use crate::value::{FieldValue, PrimaryKey};
use sea_query::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Combinable lifecycle flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityStatus(u8);

impl EntityStatus {
    pub const NONE: EntityStatus = EntityStatus(0);
    pub const EXIST: EntityStatus = EntityStatus(1);
    pub const MODIFIED: EntityStatus = EntityStatus(1 << 1);
    pub const TO_DELETE: EntityStatus = EntityStatus(1 << 2);
    pub const PROXY: EntityStatus = EntityStatus(1 << 3);

    pub fn contains(&self, other: EntityStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: EntityStatus) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EntityStatus) {
        self.0 &= !other.0;
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for EntityStatus {
    type Output = EntityStatus;

    fn bitor(self, rhs: EntityStatus) -> EntityStatus {
        EntityStatus(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntityStatus {
    fn bitor_assign(&mut self, rhs: EntityStatus) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("NONE");
        }
        let names = [
            (EntityStatus::EXIST, "EXIST"),
            (EntityStatus::MODIFIED, "MODIFIED"),
            (EntityStatus::TO_DELETE, "TO_DELETE"),
            (EntityStatus::PROXY, "PROXY"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&set.join("|"))
    }
}

/// Mid entities of one many-to-many property
#[derive(Debug, Default, Clone)]
pub(crate) struct MidSet {
    /// Persisted links were read from the mid table
    pub loaded: bool,
    pub entries: Vec<EntityRef>,
    /// Persisted links removed in memory, pending deletion
    pub removed: Vec<EntityRef>,
}

/// Property bag of one entity class row
pub struct Entity {
    metadata: Arc<ClassMetadata>,
    values: HashMap<String, FieldValue>,
    status: EntityStatus,
    pub(crate) lazy_loaded: bool,
    pub(crate) extra_lazy_loaded: HashSet<String>,
    pub(crate) mids: HashMap<String, MidSet>,
    pub(crate) session: Option<Weak<SessionCore>>,
}

impl Entity {
    /// A detached `NONE` entity
    pub fn new(metadata: Arc<ClassMetadata>) -> Self {
        Self {
            metadata,
            values: HashMap::new(),
            status: EntityStatus::NONE,
            lazy_loaded: false,
            extra_lazy_loaded: HashSet::new(),
            mids: HashMap::new(),
            session: None,
        }
    }

    pub fn class(&self) -> &str {
        self.metadata.name()
    }

    pub fn metadata(&self) -> &Arc<ClassMetadata> {
        &self.metadata
    }

    pub fn status(&self) -> EntityStatus {
        self.status
    }

    pub fn has_status(&self, status: EntityStatus) -> bool {
        self.status.contains(status)
    }

    pub(crate) fn add_status(&mut self, status: EntityStatus) {
        self.status.insert(status);
    }

    pub(crate) fn remove_status(&mut self, status: EntityStatus) {
        self.status.remove(status);
    }

    /// Stored value without any fetch resolution
    pub fn raw(&self, property: &str) -> Option<&FieldValue> {
        self.values.get(property)
    }

    /// The property holds a value (possibly `Null`)
    pub fn has(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    /// Stored scalar of a structure field
    pub fn scalar(&self, property: &str) -> Option<&Value> {
        self.values.get(property).and_then(FieldValue::as_scalar)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Structure fields currently held, in structure order
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.metadata
            .structure()
            .fields()
            .iter()
            .filter_map(|f| self.scalar(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect()
    }

    /// Every structure field is present
    pub fn is_complete(&self) -> bool {
        self.metadata.structure().field_names().all(|f| self.values.contains_key(f))
    }

    /// Primary key from the stored scalars; `None` while any part is unset
    pub fn primary_key(&self) -> Result<Option<PrimaryKey>> {
        let mut values = Vec::new();
        for column in self.metadata.structure().primary_key_fields() {
            match self.scalar(column) {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        PrimaryKey::from_values(values)
    }

    pub fn session(&self) -> Option<Session> {
        self.session.as_ref().and_then(Weak::upgrade).map(Session::from_core)
    }

    pub fn has_session(&self) -> bool {
        self.session().is_some()
    }

    pub(crate) fn attach(&mut self, session: Weak<SessionCore>) {
        self.session = Some(session);
    }

    /// Store without checks or side effects
    pub(crate) fn put(&mut self, property: impl Into<String>, value: FieldValue) {
        self.values.insert(property.into(), value);
    }

    pub(crate) fn take(&mut self, property: &str) -> Option<FieldValue> {
        self.values.remove(property)
    }

    /// Write a structure column, enforcing primary key immutability
    pub(crate) fn assign_column(&mut self, column: &str, value: FieldValue) -> Result<()> {
        if self.status.contains(EntityStatus::EXIST) && self.metadata.structure().is_primary_key(column) {
            let unchanged = self.values.get(column).is_some_and(|current| *current == value);
            if !unchanged {
                return Err(Error::ImmutablePrimaryKey {
                    class: self.class().to_string(),
                    property: column.to_string(),
                });
            }
            return Ok(());
        }
        self.values.insert(column.to_string(), value);
        self.status.insert(EntityStatus::MODIFIED);
        Ok(())
    }

    /// Set a scalar field
    ///
    /// Proxies built from this column are dropped so they are rebuilt from
    /// the new value on next access.
    pub fn set_field(&mut self, column: &str, value: impl Into<FieldValue>) -> Result<()> {
        if !self.metadata.structure().has_field(column) {
            return Err(Error::unknown_property(self.class(), column));
        }
        let value = value.into();
        if !matches!(value, FieldValue::Null | FieldValue::Scalar(_)) {
            return Err(Error::Conversion(format!(
                "{}::{column} is a scalar field and cannot hold an entity",
                self.class()
            )));
        }
        self.assign_column(column, value)?;

        let metadata = Arc::clone(&self.metadata);
        for relation in metadata.relations() {
            let proxied = metadata
                .fetch(&relation.property)
                .is_some_and(|f| f.mode == crate::fetch::FetchMode::Proxy);
            if proxied && relation.owning && relation.columns.iter().any(|c| c.source == column) {
                self.values.remove(&relation.property);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Related entities print by class only; graphs are cyclic.
        let mut map = f.debug_map();
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        for key in keys {
            match &self.values[key] {
                FieldValue::Scalar(v) => map.entry(key, v),
                FieldValue::Null => map.entry(key, &"NULL"),
                FieldValue::Entity(e) => map.entry(key, &format_args!("<{}>", e.class())),
                FieldValue::Collection(items) => map.entry(key, &format_args!("[{} item(s)]", items.len())),
            };
        }
        map.finish()?;
        write!(f, " {}({})", self.class(), self.status)
    }
}

pub(crate) fn null_for(sql_type: Option<&str>) -> Value {
    match sql_type.map(str::to_ascii_lowercase).as_deref() {
        Some("int2" | "smallint") => Value::SmallInt(None),
        Some("int4" | "integer" | "int") => Value::Int(None),
        Some("int8" | "bigint") => Value::BigInt(None),
        Some("bool" | "boolean") => Value::Bool(None),
        Some("float4" | "real") => Value::Float(None),
        Some("float8" | "double precision") => Value::Double(None),
        Some("uuid") => Value::Uuid(None),
        Some("json" | "jsonb") => Value::Json(None),
        Some("bytea") => Value::Bytes(None),
        _ => Value::String(None),
    }
}

/// Shared handle to a live entity
///
/// Clones point at the same instance; [`EntityRef::ptr_eq`] is the identity
/// test the identity map guarantees.
#[derive(Clone)]
pub struct EntityRef(Rc<RefCell<Entity>>);

impl EntityRef {
    pub fn new(entity: Entity) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    pub fn borrow(&self) -> Ref<'_, Entity> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Entity> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn class(&self) -> String {
        self.borrow().class().to_string()
    }

    pub fn metadata(&self) -> Arc<ClassMetadata> {
        Arc::clone(self.borrow().metadata())
    }

    pub fn status(&self) -> EntityStatus {
        self.borrow().status()
    }

    pub fn has_status(&self, status: EntityStatus) -> bool {
        self.borrow().has_status(status)
    }

    pub fn primary_key(&self) -> Result<Option<PrimaryKey>> {
        self.borrow().primary_key()
    }

    pub fn session(&self) -> Option<Session> {
        self.borrow().session()
    }

    /// Read a property, resolving its fetch strategy on first access
    ///
    /// # Errors
    ///
    /// `NoSession` if a deferred property must be loaded and the session
    /// is gone; any error of the load query or of a custom getter.
    pub fn get(&self, property: &str) -> Result<FieldValue> {
        resolver::get(self, property)
    }

    /// Scalar shorthand for [`EntityRef::get`]
    pub fn get_scalar(&self, property: &str) -> Result<Option<Value>> {
        Ok(match self.get(property)? {
            FieldValue::Scalar(v) => Some(v),
            _ => None,
        })
    }

    /// Set a scalar field or a to-one relation
    pub fn set(&self, property: &str, value: impl Into<FieldValue>) -> Result<()> {
        runtime::set(self, property, value.into())
    }

    /// Clear a to-one relation
    pub fn unset(&self, property: &str) -> Result<()> {
        runtime::unset(self, property)
    }

    /// Add `related` to a to-many relation
    ///
    /// An unloaded deferred collection of a persisted entity is loaded
    /// first; the mutation itself stays in memory.
    pub fn add_to(&self, property: &str, related: &EntityRef) -> Result<()> {
        runtime::add_to(self, property, related)
    }

    /// `true` if `related` was a member
    pub fn remove_from(&self, property: &str, related: &EntityRef) -> Result<bool> {
        runtime::remove_from(self, property, related)
    }

    pub fn has(&self, property: &str, related: &EntityRef) -> Result<bool> {
        runtime::has(self, property, related)
    }

    /// Mid entities of a many-to-many property
    pub fn mid_relations_from(&self, property: &str) -> Result<Vec<EntityRef>> {
        runtime::mid_relations_from(self, property)
    }

    /// The mid entity linking this entity to `related`
    pub fn mid_relation_with(&self, property: &str, related: &EntityRef) -> Result<Option<EntityRef>> {
        runtime::mid_relation_with(self, property, related)
    }

    /// Flag `TO_DELETE`, cascading through cascade-delete relations
    ///
    /// Unloaded cascade-delete relations of a persisted entity are loaded so
    /// the cascade reaches them.
    pub fn mark_for_delete(&self) -> Result<()> {
        runtime::mark_for_delete(self)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(entity) => fmt::Debug::fmt(&*entity, f),
            Err(_) => f.write_str("<borrowed entity>"),
        }
    }
}
