use std::collections::HashSet;
use std::net::Ipv4Addr;

use rackline_core::{AttrValue, EntityId};
use rackline_storage::{ClaimKind, View};

use crate::error::{EngineError, ResourceError};
use crate::registry::driver_handle;
use crate::resource::ResourceManager;
use crate::{Driver, Inventory};

driver_handle!(IpManager, "ip-manager", "resourcemanager");

const PROP_KEY: &str = "property";
const PROP_BASEIP: &str = "baseip";
const PROP_NETMASK: &str = "netmask";
const PROP_GATEWAY: &str = "gateway";

/// The managed block, decoded from the manager entity's property
/// attributes. Offsets are relative to the network address: 0 is the
/// network itself, `span + 1` the broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IpBlock {
    base: u32,
    mask: u32,
    gateway: u32,
}

impl IpBlock {
    /// Number of usable host offsets (excluding network and broadcast).
    fn span(&self) -> u32 {
        (!self.mask).saturating_sub(1)
    }

    fn contains(&self, addr: u32) -> bool {
        addr & self.mask == self.base & self.mask
    }

    fn is_reserved(&self, addr: u32) -> bool {
        let network = self.base & self.mask;
        addr == network || addr == network | !self.mask || addr == self.gateway
    }
}

impl IpManager {
    /// Create a manager for one IPv4 block. `gateway` defaults to the
    /// first host address of the block.
    pub fn create(
        inv: &mut Inventory,
        name: &str,
        base: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Option<Ipv4Addr>,
    ) -> Result<Self, EngineError> {
        let mask = u32::from(netmask);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(ResourceError::WrongType(format!("non-contiguous netmask {netmask}")).into());
        }
        let network = u32::from(base) & mask;
        let gateway = gateway.map(u32::from).unwrap_or(network + 1);
        if gateway & mask != network {
            return Err(
                ResourceError::WrongType(format!("gateway outside block {base}/{netmask}")).into(),
            );
        }
        let manager: Self = inv.create_as(name)?;
        let id = manager.entity_id();
        inv.transaction(|txn| {
            txn.add_attr(
                id,
                PROP_KEY,
                Some(PROP_BASEIP),
                None,
                &AttrValue::Int(network as i64),
                ClaimKind::None,
            )?;
            txn.add_attr(
                id,
                PROP_KEY,
                Some(PROP_NETMASK),
                None,
                &AttrValue::Int(mask as i64),
                ClaimKind::None,
            )?;
            txn.add_attr(
                id,
                PROP_KEY,
                Some(PROP_GATEWAY),
                None,
                &AttrValue::Int(gateway as i64),
                ClaimKind::None,
            )?;
            Ok(())
        })?;
        Ok(manager)
    }

    fn block(&self, inv: &Inventory) -> Result<IpBlock, EngineError> {
        let read = |subkey: &str| -> Result<u32, EngineError> {
            let value = inv
                .attr_value(self.entity_id(), PROP_KEY, Some(subkey), View::Latest)?
                .ok_or_else(|| {
                    EngineError::NotFound(format!("{}: missing {subkey} property", self.name()))
                })?;
            Ok(value.expect_int().map_err(EngineError::Core)? as u32)
        };
        Ok(IpBlock {
            base: read(PROP_BASEIP)?,
            mask: read(PROP_NETMASK)?,
            gateway: read(PROP_GATEWAY)?,
        })
    }

    /// Addresses currently allocated to `thing` by this manager.
    pub fn get_ip(&self, inv: &Inventory, thing: EntityId) -> Result<Vec<Ipv4Addr>, EngineError> {
        Ok(self
            .allocations(inv, thing)?
            .into_iter()
            .filter_map(|a| a.value.as_int())
            .map(|n| Ipv4Addr::from(n as u32))
            .collect())
    }

    pub fn allocate_ip(
        &self,
        inv: &mut Inventory,
        thing: EntityId,
        addr: Option<Ipv4Addr>,
    ) -> Result<Ipv4Addr, EngineError> {
        let attr = self.allocate(
            inv,
            thing,
            addr.map(|a| AttrValue::Int(u32::from(a) as i64)),
            false,
        )?;
        // Claim values are minted by ensure_type/allocator, always ints.
        Ok(Ipv4Addr::from(attr.value.as_int().unwrap_or(0) as u32))
    }
}

impl ResourceManager for IpManager {
    fn ensure_type(&self, inv: &Inventory, value: &AttrValue) -> Result<(), EngineError> {
        let block = self.block(inv)?;
        let addr = value.expect_int().map_err(|_| {
            EngineError::Resource(ResourceError::WrongType(format!(
                "{}: ip resources are int-encoded addresses, got {:?}",
                self.name(),
                value
            )))
        })? as u32;
        if !block.contains(addr) {
            return Err(ResourceError::WrongType(format!(
                "{} is outside the managed block",
                Ipv4Addr::from(addr)
            ))
            .into());
        }
        if block.is_reserved(addr) {
            return Err(ResourceError::NotAvailable(format!(
                "{} is reserved",
                Ipv4Addr::from(addr)
            ))
            .into());
        }
        Ok(())
    }

    /// Scan the block for the lowest free host address, skipping the
    /// network, broadcast, and gateway addresses. One full pass; a full
    /// block is `NotAvailable`.
    fn allocator(&self, inv: &mut Inventory, _thing: EntityId) -> Result<AttrValue, EngineError> {
        let block = self.block(inv)?;
        let taken: HashSet<i64> = inv
            .store()
            .claims_for_key(&self.resource_key(), View::Latest)?
            .into_iter()
            .filter_map(|a| a.value.as_int())
            .collect();
        let network = block.base & block.mask;
        for offset in 1..=block.span() {
            let addr = network + offset;
            if block.is_reserved(addr) {
                continue;
            }
            if !taken.contains(&(addr as i64)) {
                return Ok(AttrValue::Int(addr as i64));
            }
        }
        Err(ResourceError::NotAvailable(format!(
            "block {}/{} exhausted",
            Ipv4Addr::from(network),
            Ipv4Addr::from(block.mask)
        ))
        .into())
    }
}
