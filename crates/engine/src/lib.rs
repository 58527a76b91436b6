pub mod error;
pub mod export;
pub mod ip;
pub mod naming;
pub mod pool;
pub mod registry;
pub mod resource;
pub mod vm;

pub use error::{EngineError, PoolError, ResourceError};
pub use registry::{Basic, Driver, DriverRegistry, DriverSpec, Meta, TypedDriver};

use rackline_core::{AttrFilter, AttrValue, Attribute, EntityId, SubkeyFilter, Version};
use rackline_storage::{ClaimKind, EntityRecord, SqliteStore, StoreError, Txn, View};

/// Name of the singleton meta entity created on open.
pub const META_NAME: &str = "rackline-meta";
const META_SCHEMA_KEY: &str = "schema-version";

/// Outcome of `set_attr`: a write that would not change anything is
/// detected up front and mints no version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetAttrOutcome {
    Unchanged(Attribute),
    Set(Attribute),
}

impl SetAttrOutcome {
    pub fn attribute(&self) -> &Attribute {
        match self {
            SetAttrOutcome::Unchanged(a) | SetAttrOutcome::Set(a) => a,
        }
    }
}

/// The inventory facade: owns the store and the driver registry, and wraps
/// every logical mutation in exactly one storage transaction.
pub struct Inventory {
    store: SqliteStore,
    registry: DriverRegistry,
}

impl Inventory {
    pub fn open(path: &str) -> Result<Self, EngineError> {
        Self::with_store(SqliteStore::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::with_store(SqliteStore::open_in_memory()?)
    }

    fn with_store(store: SqliteStore) -> Result<Self, EngineError> {
        let mut inventory = Self {
            store,
            registry: DriverRegistry::builtin(),
        };
        inventory.ensure_meta()?;
        Ok(inventory)
    }

    /// Lookup-or-create the meta singleton. Open is the only writer of this
    /// entity, so at most one ever exists.
    fn ensure_meta(&mut self) -> Result<(), EngineError> {
        if self.store.get_entity_by_name(META_NAME, View::Latest)?.is_some() {
            return Ok(());
        }
        let mut txn = self.store.begin()?;
        let id = txn.create_entity(META_NAME, Meta::KIND, Meta::DRIVER_NAME)?;
        txn.add_attr(
            id,
            META_SCHEMA_KEY,
            None,
            None,
            &AttrValue::Int(rackline_storage::schema::SCHEMA_VERSION as i64),
            ClaimKind::None,
        )?;
        txn.commit()?;
        tracing::debug!(name = META_NAME, "created meta singleton");
        Ok(())
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn latest_version(&self) -> Result<Version, EngineError> {
        Ok(self.store.latest_version()?)
    }

    /// Run several write steps as one transaction. An error from the
    /// closure rolls everything back; a closure that ends up writing
    /// nothing commits nothing (the minted version is discarded).
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Txn<'_>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut txn = self.store.begin()?;
        let out = f(&mut txn)?;
        match txn.commit() {
            Ok(_) | Err(StoreError::EmptyCommit) => Ok(out),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Create an entity under the given registered driver and return the
    /// generic handle.
    pub fn create(&mut self, name: &str, driver_name: &str) -> Result<Box<dyn Driver>, EngineError> {
        let spec = self
            .registry
            .spec(driver_name)
            .ok_or_else(|| EngineError::DriverNotRegistered(driver_name.to_string()))?
            .clone();
        let mut txn = self.store.begin()?;
        let entity_id = match txn.create_entity(name, spec.kind, spec.driver_name) {
            Err(StoreError::NameInUse(n)) => return Err(EngineError::NameInUse(n)),
            other => other?,
        };
        let version = txn.commit()?;
        tracing::debug!(name, driver = spec.driver_name, %version, "created entity");
        Ok((spec.construct)(&EntityRecord {
            entity_id,
            name: name.to_string(),
            kind: spec.kind.to_string(),
            driver: spec.driver_name.to_string(),
            version,
            deleted_at_version: None,
        }))
    }

    /// Create an entity with a statically known driver type.
    pub fn create_as<T: TypedDriver>(&mut self, name: &str) -> Result<T, EngineError> {
        let mut txn = self.store.begin()?;
        let entity_id = match txn.create_entity(name, T::KIND, T::DRIVER_NAME) {
            Err(StoreError::NameInUse(n)) => return Err(EngineError::NameInUse(n)),
            other => other?,
        };
        let version = txn.commit()?;
        tracing::debug!(name, driver = T::DRIVER_NAME, %version, "created entity");
        Ok(T::from_parts(entity_id, name))
    }

    /// Load an entity and dispatch it through the registry on its stored
    /// driver tag.
    pub fn get_by_name(&self, name: &str) -> Result<Box<dyn Driver>, EngineError> {
        let record = self
            .store
            .get_entity_by_name(name, View::Latest)?
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        self.registry.construct(&record)
    }

    /// Load an entity as a specific driver type, failing if the stored tag
    /// disagrees.
    pub fn get_as<T: TypedDriver>(&self, name: &str) -> Result<T, EngineError> {
        let record = self
            .store
            .get_entity_by_name(name, View::Latest)?
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        if record.driver != T::DRIVER_NAME {
            return Err(EngineError::DriverMismatch {
                name: record.name,
                actual: record.driver,
                expected: T::DRIVER_NAME,
            });
        }
        Ok(T::from_parts(record.entity_id, &record.name))
    }

    pub fn get_record(&self, name: &str, view: View) -> Result<Option<EntityRecord>, EngineError> {
        Ok(self.store.get_entity_by_name(name, view)?)
    }

    pub fn entity(&self, id: EntityId, view: View) -> Result<Option<EntityRecord>, EngineError> {
        Ok(self.store.get_entity(id, view)?)
    }

    pub fn list_by_kind(&self, kind: &str, view: View) -> Result<Vec<EntityRecord>, EngineError> {
        Ok(self.store.list_entities(Some(kind), None, view)?)
    }

    pub fn list_by_driver(
        &self,
        driver: &str,
        view: View,
    ) -> Result<Vec<EntityRecord>, EngineError> {
        Ok(self.store.list_entities(None, Some(driver), view)?)
    }

    /// Soft-delete an entity. Past views keep seeing it; the latest view
    /// does not, and its name becomes reusable.
    pub fn delete(&mut self, id: EntityId) -> Result<(), EngineError> {
        let mut txn = self.store.begin()?;
        if !txn.delete_entity(id)? {
            txn.rollback()?;
            return Err(EngineError::NotFound(id.to_string()));
        }
        let version = txn.commit()?;
        tracing::debug!(entity = %id, %version, "deleted entity");
        Ok(())
    }

    pub(crate) fn require_live(&self, id: EntityId) -> Result<EntityRecord, EngineError> {
        self.store
            .get_entity(id, View::Latest)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// Entity name for error messages; falls back to the raw id when the
    /// entity is gone.
    pub(crate) fn display_name(&self, id: EntityId) -> String {
        match self.store.get_entity(id, View::Latest) {
            Ok(Some(record)) => record.name,
            _ => id.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn add_attr(
        &mut self,
        entity: EntityId,
        key: &str,
        subkey: Option<&str>,
        value: impl Into<AttrValue>,
    ) -> Result<Attribute, EngineError> {
        self.require_live(entity)?;
        let value = value.into();
        let mut txn = self.store.begin()?;
        let attr = txn.add_attr(entity, key, subkey, None, &value, ClaimKind::None)?;
        txn.commit()?;
        Ok(attr)
    }

    /// Add a multi-valued attribute, minting the next ordinal slot for the
    /// key from the entity's counter.
    pub fn add_attr_numbered(
        &mut self,
        entity: EntityId,
        key: &str,
        subkey: Option<&str>,
        value: impl Into<AttrValue>,
    ) -> Result<Attribute, EngineError> {
        self.require_live(entity)?;
        let value = value.into();
        let mut txn = self.store.begin()?;
        let number = txn.next_counter(entity, &format!("attrnum:{key}"))?;
        let attr = txn.add_attr(entity, key, subkey, Some(number), &value, ClaimKind::None)?;
        txn.commit()?;
        Ok(attr)
    }

    /// Soft-delete matching attributes; matching nothing is a no-op, not an
    /// error.
    pub fn del_attrs(&mut self, entity: EntityId, filter: &AttrFilter) -> Result<usize, EngineError> {
        let mut txn = self.store.begin()?;
        let n = txn.del_attrs(entity, filter)?;
        match txn.commit() {
            Ok(_) => Ok(n),
            Err(StoreError::EmptyCommit) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the single attribute matching (key, subkey). Fails when
    /// more than one row matches; writing the current value again is
    /// detected before any transaction and mints no version.
    pub fn set_attr(
        &mut self,
        entity: EntityId,
        key: &str,
        subkey: Option<&str>,
        value: impl Into<AttrValue>,
    ) -> Result<SetAttrOutcome, EngineError> {
        self.require_live(entity)?;
        let value = value.into();
        let filter = match subkey {
            Some(s) => AttrFilter::key(key).subkey(s),
            None => AttrFilter::key(key).no_subkey(),
        }
        .no_number();
        let existing = self.store.attrs(entity, &filter, View::Latest)?;
        if existing.len() > 1 {
            return Err(EngineError::AmbiguousAttr {
                entity: self.display_name(entity),
                key: key.to_string(),
            });
        }
        if let Some(current) = existing.first()
            && current.value == value
        {
            return Ok(SetAttrOutcome::Unchanged(current.clone()));
        }
        let mut txn = self.store.begin()?;
        txn.del_attrs(entity, &filter)?;
        let attr = txn.add_attr(entity, key, subkey, None, &value, ClaimKind::None)?;
        txn.commit()?;
        Ok(SetAttrOutcome::Set(attr))
    }

    pub fn attrs(
        &self,
        entity: EntityId,
        filter: &AttrFilter,
        view: View,
    ) -> Result<Vec<Attribute>, EngineError> {
        Ok(self.store.attrs(entity, filter, view)?)
    }

    pub fn attr_values(
        &self,
        entity: EntityId,
        filter: &AttrFilter,
        view: View,
    ) -> Result<Vec<AttrValue>, EngineError> {
        Ok(self
            .store
            .attrs(entity, filter, view)?
            .into_iter()
            .map(|a| a.value)
            .collect())
    }

    pub fn has_attr(&self, entity: EntityId, filter: &AttrFilter) -> Result<bool, EngineError> {
        Ok(!self.store.attrs(entity, filter, View::Latest)?.is_empty())
    }

    /// Single expected value for (key, subkey); `None` when absent,
    /// ambiguous when several rows match.
    pub fn attr_value(
        &self,
        entity: EntityId,
        key: &str,
        subkey: Option<&str>,
        view: View,
    ) -> Result<Option<AttrValue>, EngineError> {
        let filter = AttrFilter {
            key: Some(key.to_string()),
            subkey: match subkey {
                Some(s) => SubkeyFilter::Is(s.to_string()),
                None => SubkeyFilter::None,
            },
            ..AttrFilter::default()
        };
        let mut found = self.store.attrs(entity, &filter, view)?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found.remove(0).value)),
            _ => Err(EngineError::AmbiguousAttr {
                entity: self.display_name(entity),
                key: key.to_string(),
            }),
        }
    }

    /// Live relation attributes pointing at `target`.
    pub fn referencers(
        &self,
        target: EntityId,
        filter: &AttrFilter,
        view: View,
    ) -> Result<Vec<Attribute>, EngineError> {
        Ok(self.store.referencers(target, filter, view)?)
    }
}
