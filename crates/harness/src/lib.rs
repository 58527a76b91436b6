//! Shared fixtures for the integration tests: an in-memory inventory with
//! shorthand for the setup every test repeats.

use rackline_core::{AttrValue, EntityId, Version};
use rackline_engine::{Basic, Driver, EngineError, Inventory};
use rackline_storage::View;

pub struct TestSite {
    pub inv: Inventory,
}

impl TestSite {
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            inv: Inventory::open_in_memory()?,
        })
    }

    /// Create a plain device entity and return its id.
    pub fn device(&mut self, name: &str) -> Result<EntityId, EngineError> {
        let device: Basic = self.inv.create_as(name)?;
        Ok(device.entity_id())
    }

    /// Create a device and seed it with single-valued attributes.
    pub fn device_with_attrs(
        &mut self,
        name: &str,
        attrs: Vec<(&str, AttrValue)>,
    ) -> Result<EntityId, EngineError> {
        let id = self.device(name)?;
        for (key, value) in attrs {
            self.inv.add_attr(id, key, None, value)?;
        }
        Ok(id)
    }

    /// Current global version as a plain number.
    pub fn version(&self) -> Result<u64, EngineError> {
        Ok(self.inv.latest_version()?.as_u64())
    }

    /// A read view pinned at version `v`.
    pub fn at(v: u64) -> View {
        View::At(Version::from_raw(v))
    }
}
