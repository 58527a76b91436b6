use std::collections::HashSet;

use rackline_core::{AttrFilter, AttrValue, EntityId};
use rackline_storage::{EntityRecord, View};

use crate::error::{EngineError, PoolError};
use crate::registry::{TypedDriver, driver_handle};
use crate::{Driver, Inventory};

/// Relation key recording pool membership: one live `_contains` attribute
/// on the pool entity per member.
pub const CONTAINS_KEY: &str = "_contains";

driver_handle!(Pool, "pool", "pool");
driver_handle!(ExclusivePool, "exclusive-pool", "pool");
driver_handle!(UniquePool, "unique-pool", "pool");

/// Pools a thing is directly contained in (any pool-kind entity holding a
/// live `_contains` relation to it).
pub fn pools_of(
    inv: &Inventory,
    thing: EntityId,
    view: View,
) -> Result<Vec<EntityRecord>, EngineError> {
    let refs = inv.referencers(thing, &AttrFilter::key(CONTAINS_KEY), view)?;
    let mut result = Vec::new();
    for attr in refs {
        if let Some(record) = inv.entity(attr.entity_id, view)? {
            result.push(record);
        }
    }
    Ok(result)
}

/// Transitive closure of `pools_of`: the pools of a thing plus the pools
/// those pools are in, and so on. The walk carries a visited set, so a
/// cyclic containment graph terminates instead of recursing forever.
pub fn parent_pools(
    inv: &Inventory,
    thing: EntityId,
    view: View,
) -> Result<Vec<EntityRecord>, EngineError> {
    let mut seen: HashSet<EntityId> = HashSet::new();
    let mut queue: Vec<EntityId> = vec![thing];
    let mut result = Vec::new();
    while let Some(next) = queue.pop() {
        for record in pools_of(inv, next, view)? {
            if seen.insert(record.entity_id) {
                queue.push(record.entity_id);
                result.push(record);
            }
        }
    }
    Ok(result)
}

fn is_member(inv: &Inventory, pool: EntityId, thing: EntityId) -> Result<bool, EngineError> {
    inv.has_attr(
        pool,
        &AttrFilter::key(CONTAINS_KEY).value(AttrValue::Relation(thing)),
    )
}

fn insert_member(inv: &mut Inventory, pool: &dyn Driver, thing: EntityId) -> Result<(), EngineError> {
    inv.require_live(thing)?;
    if is_member(inv, pool.entity_id(), thing)? {
        return Err(PoolError::AlreadyMember {
            pool: pool.name().to_string(),
            member: inv.display_name(thing),
        }
        .into());
    }
    inv.add_attr_numbered(pool.entity_id(), CONTAINS_KEY, None, AttrValue::Relation(thing))?;
    tracing::debug!(pool = pool.name(), member = %thing, "inserted into pool");
    Ok(())
}

fn remove_member(inv: &mut Inventory, pool: &dyn Driver, thing: EntityId) -> Result<(), EngineError> {
    let removed = inv.del_attrs(
        pool.entity_id(),
        &AttrFilter::key(CONTAINS_KEY).value(AttrValue::Relation(thing)),
    )?;
    if removed == 0 {
        return Err(PoolError::NotAMember {
            pool: pool.name().to_string(),
            member: inv.display_name(thing),
        }
        .into());
    }
    Ok(())
}

fn member_records(
    inv: &Inventory,
    pool: EntityId,
    view: View,
) -> Result<Vec<EntityRecord>, EngineError> {
    let attrs = inv.attrs(pool, &AttrFilter::key(CONTAINS_KEY), view)?;
    let mut result = Vec::new();
    for attr in attrs {
        if let AttrValue::Relation(member) = attr.value
            && let Some(record) = inv.entity(member, view)?
        {
            result.push(record);
        }
    }
    Ok(result)
}

impl Pool {
    pub fn create(inv: &mut Inventory, name: &str) -> Result<Self, EngineError> {
        inv.create_as(name)
    }

    /// Add a member. Duplicate membership in the same pool is rejected.
    pub fn insert(&self, inv: &mut Inventory, thing: EntityId) -> Result<(), EngineError> {
        insert_member(inv, self, thing)
    }

    pub fn remove(&self, inv: &mut Inventory, thing: EntityId) -> Result<(), EngineError> {
        remove_member(inv, self, thing)
    }

    pub fn members(&self, inv: &Inventory, view: View) -> Result<Vec<EntityRecord>, EngineError> {
        member_records(inv, self.entity_id(), view)
    }
}

impl ExclusivePool {
    pub fn create(inv: &mut Inventory, name: &str) -> Result<Self, EngineError> {
        inv.create_as(name)
    }

    /// Add a member, rejecting anything that is already in any pool.
    pub fn insert(&self, inv: &mut Inventory, thing: EntityId) -> Result<(), EngineError> {
        inv.require_live(thing)?;
        if !pools_of(inv, thing, View::Latest)?.is_empty() {
            return Err(PoolError::ExclusiveConflict {
                pool: self.name().to_string(),
                member: inv.display_name(thing),
            }
            .into());
        }
        insert_member(inv, self, thing)
    }

    pub fn remove(&self, inv: &mut Inventory, thing: EntityId) -> Result<(), EngineError> {
        remove_member(inv, self, thing)
    }

    pub fn members(&self, inv: &Inventory, view: View) -> Result<Vec<EntityRecord>, EngineError> {
        member_records(inv, self.entity_id(), view)
    }
}

impl UniquePool {
    pub fn create(inv: &mut Inventory, name: &str) -> Result<Self, EngineError> {
        inv.create_as(name)
    }

    /// Add a member, rejecting anything already held by another UniquePool.
    pub fn insert(&self, inv: &mut Inventory, thing: EntityId) -> Result<(), EngineError> {
        inv.require_live(thing)?;
        for record in pools_of(inv, thing, View::Latest)? {
            if record.driver == Self::DRIVER_NAME && record.entity_id != self.entity_id() {
                return Err(PoolError::UniqueConflict {
                    member: inv.display_name(thing),
                    other: record.name,
                }
                .into());
            }
        }
        insert_member(inv, self, thing)
    }

    pub fn remove(&self, inv: &mut Inventory, thing: EntityId) -> Result<(), EngineError> {
        remove_member(inv, self, thing)
    }

    pub fn members(&self, inv: &Inventory, view: View) -> Result<Vec<EntityRecord>, EngineError> {
        member_records(inv, self.entity_id(), view)
    }
}
