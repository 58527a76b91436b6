use rackline_core::{AttrFilter, AttrValue, EntityId};
use rackline_storage::View;

use crate::error::{EngineError, ResourceError};
use crate::registry::driver_handle;
use crate::resource::ResourceManager;
use crate::{Driver, Inventory};

driver_handle!(VmManager, "vm-manager", "resourcemanager");

const HOSTS_KEY: &str = "hosts";
const SYSTEM_KEY: &str = "system";
const SYS_DISK: &str = "disk";
const SYS_CPU: &str = "cpu";
const SYS_MEMORY: &str = "memory";

/// Disk/cpu/memory triple read from an entity's `system` attributes.
/// Missing attributes read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SystemCapacity {
    pub disk: i64,
    pub cpu: i64,
    pub memory: i64,
}

impl SystemCapacity {
    fn fits(&self, request: &SystemCapacity) -> bool {
        request.disk <= self.disk && request.cpu <= self.cpu && request.memory <= self.memory
    }

    fn minus(&self, other: &SystemCapacity) -> SystemCapacity {
        SystemCapacity {
            disk: self.disk - other.disk,
            cpu: self.cpu - other.cpu,
            memory: self.memory - other.memory,
        }
    }
}

/// Read an entity's system capacity (for hosts) or request (for VMs).
pub fn system_capacity(inv: &Inventory, entity: EntityId) -> Result<SystemCapacity, EngineError> {
    let read = |subkey: &str| -> Result<i64, EngineError> {
        match inv.attr_value(entity, SYSTEM_KEY, Some(subkey), View::Latest)? {
            Some(value) => Ok(value.expect_int().map_err(EngineError::Core)?),
            None => Ok(0),
        }
    };
    Ok(SystemCapacity {
        disk: read(SYS_DISK)?,
        cpu: read(SYS_CPU)?,
        memory: read(SYS_MEMORY)?,
    })
}

/// Write an entity's system capacity attributes.
pub fn set_system_capacity(
    inv: &mut Inventory,
    entity: EntityId,
    capacity: SystemCapacity,
) -> Result<(), EngineError> {
    inv.set_attr(entity, SYSTEM_KEY, Some(SYS_DISK), capacity.disk)?;
    inv.set_attr(entity, SYSTEM_KEY, Some(SYS_CPU), capacity.cpu)?;
    inv.set_attr(entity, SYSTEM_KEY, Some(SYS_MEMORY), capacity.memory)?;
    Ok(())
}

impl VmManager {
    pub fn create(inv: &mut Inventory, name: &str) -> Result<Self, EngineError> {
        inv.create_as(name)
    }

    /// Register a candidate host for placement.
    pub fn add_host(&self, inv: &mut Inventory, host: EntityId) -> Result<(), EngineError> {
        inv.require_live(host)?;
        if inv.has_attr(
            self.entity_id(),
            &AttrFilter::key(HOSTS_KEY).value(AttrValue::Relation(host)),
        )? {
            return Err(ResourceError::NotAvailable(format!(
                "{} is already a host of {}",
                inv.display_name(host),
                self.name()
            ))
            .into());
        }
        inv.add_attr_numbered(self.entity_id(), HOSTS_KEY, None, AttrValue::Relation(host))?;
        Ok(())
    }

    pub fn hosts(&self, inv: &Inventory) -> Result<Vec<EntityId>, EngineError> {
        Ok(inv
            .attrs(self.entity_id(), &AttrFilter::key(HOSTS_KEY), View::Latest)?
            .into_iter()
            .filter_map(|a| a.value.as_relation())
            .collect())
    }

    /// Capacity left on a host after subtracting the requests of every VM
    /// currently placed there by this manager.
    fn remaining(&self, inv: &Inventory, host: EntityId) -> Result<SystemCapacity, EngineError> {
        let mut remaining = system_capacity(inv, host)?;
        let placed = inv
            .store()
            .claims(&self.resource_key(), &AttrValue::Relation(host), View::Latest)?;
        for claim in placed {
            let request = system_capacity(inv, claim.entity_id)?;
            remaining = remaining.minus(&request);
        }
        Ok(remaining)
    }
}

impl ResourceManager for VmManager {
    // Several VMs may share one host; capacity is the only limit.
    fn exclusive(&self) -> bool {
        false
    }

    fn ensure_type(&self, inv: &Inventory, value: &AttrValue) -> Result<(), EngineError> {
        let host = value.as_relation().ok_or_else(|| {
            EngineError::Resource(ResourceError::WrongType(format!(
                "{}: resources are host relations, got {:?}",
                self.name(),
                value
            )))
        })?;
        if !self.hosts(inv)?.contains(&host) {
            return Err(ResourceError::WrongType(format!(
                "{} is not a host of {}",
                inv.display_name(host),
                self.name()
            ))
            .into());
        }
        Ok(())
    }

    /// Greedy bin-packing: hosts sorted ascending by (disk, cpu, memory)
    /// capacity, first host whose remaining capacity covers the VM's
    /// request in every dimension wins.
    fn allocator(&self, inv: &mut Inventory, thing: EntityId) -> Result<AttrValue, EngineError> {
        let request = system_capacity(inv, thing)?;
        let mut candidates = Vec::new();
        for host in self.hosts(inv)? {
            candidates.push((system_capacity(inv, host)?, host));
        }
        candidates.sort();
        for (_capacity, host) in candidates {
            if self.remaining(inv, host)?.fits(&request) {
                return Ok(AttrValue::Relation(host));
            }
        }
        Err(ResourceError::NotAvailable(format!(
            "{}: no host with capacity for {:?}",
            self.name(),
            request
        ))
        .into())
    }
}
