use rackline_core::{AttrValue, EntityId};
use rackline_storage::{ClaimKind, View};

use crate::error::{EngineError, ResourceError};
use crate::registry::driver_handle;
use crate::resource::ResourceManager;
use crate::{Driver, Inventory};

driver_handle!(NameManager, "name-manager", "resourcemanager");
driver_handle!(NumManager, "num-manager", "resourcemanager");

const PROP_KEY: &str = "property";
const PROP_BASENAME: &str = "basename";
const PROP_MAX: &str = "max-num";
const NEXT_COUNTER: &str = "next";

impl NameManager {
    /// Create a manager minting sequential names: `basename1`, `basename2`, ...
    pub fn create(inv: &mut Inventory, name: &str, basename: &str) -> Result<Self, EngineError> {
        let manager: Self = inv.create_as(name)?;
        let id = manager.entity_id();
        inv.transaction(|txn| {
            txn.add_attr(
                id,
                PROP_KEY,
                Some(PROP_BASENAME),
                None,
                &AttrValue::Text(basename.to_string()),
                ClaimKind::None,
            )?;
            Ok(())
        })?;
        Ok(manager)
    }

    fn basename(&self, inv: &Inventory) -> Result<String, EngineError> {
        let value = inv
            .attr_value(self.entity_id(), PROP_KEY, Some(PROP_BASENAME), View::Latest)?
            .ok_or_else(|| {
                EngineError::NotFound(format!("{}: missing basename property", self.name()))
            })?;
        Ok(value.expect_text().map_err(EngineError::Core)?.to_string())
    }
}

impl ResourceManager for NameManager {
    fn ensure_type(&self, _inv: &Inventory, value: &AttrValue) -> Result<(), EngineError> {
        match value {
            AttrValue::Text(_) => Ok(()),
            other => Err(ResourceError::WrongType(format!(
                "{}: names are text, got {:?}",
                self.name(),
                other
            ))
            .into()),
        }
    }

    fn allocator(&self, inv: &mut Inventory, _thing: EntityId) -> Result<AttrValue, EngineError> {
        let basename = self.basename(inv)?;
        let id = self.entity_id();
        let n = inv.transaction(|txn| Ok(txn.next_counter(id, NEXT_COUNTER)?))?;
        Ok(AttrValue::Text(format!("{basename}{n}")))
    }
}

impl NumManager {
    /// Create a manager minting sequential integers, optionally capped.
    pub fn create(
        inv: &mut Inventory,
        name: &str,
        max_num: Option<i64>,
    ) -> Result<Self, EngineError> {
        let manager: Self = inv.create_as(name)?;
        if let Some(max) = max_num {
            let id = manager.entity_id();
            inv.transaction(|txn| {
                txn.add_attr(
                    id,
                    PROP_KEY,
                    Some(PROP_MAX),
                    None,
                    &AttrValue::Int(max),
                    ClaimKind::None,
                )?;
                Ok(())
            })?;
        }
        Ok(manager)
    }

    fn max_num(&self, inv: &Inventory) -> Result<Option<i64>, EngineError> {
        match inv.attr_value(self.entity_id(), PROP_KEY, Some(PROP_MAX), View::Latest)? {
            Some(value) => Ok(Some(value.expect_int().map_err(EngineError::Core)?)),
            None => Ok(None),
        }
    }
}

impl ResourceManager for NumManager {
    fn ensure_type(&self, inv: &Inventory, value: &AttrValue) -> Result<(), EngineError> {
        let n = value.expect_int().map_err(|_| {
            EngineError::Resource(ResourceError::WrongType(format!(
                "{}: resources are ints, got {:?}",
                self.name(),
                value
            )))
        })?;
        if let Some(max) = self.max_num(inv)?
            && n > max
        {
            return Err(ResourceError::NotAvailable(format!("{n} exceeds max {max}")).into());
        }
        Ok(())
    }

    fn allocator(&self, inv: &mut Inventory, _thing: EntityId) -> Result<AttrValue, EngineError> {
        let id = self.entity_id();
        let n = inv.transaction(|txn| Ok(txn.next_counter(id, NEXT_COUNTER)?))?;
        if let Some(max) = self.max_num(inv)?
            && n > max
        {
            return Err(ResourceError::NotAvailable(format!(
                "{}: sequence exhausted at {max}",
                self.name()
            ))
            .into());
        }
        Ok(AttrValue::Int(n))
    }
}
