use rackline_core::{AttrFilter, AttrValue, Attribute, EntityId};
use rackline_storage::{ClaimKind, EntityRecord, StoreError, View};

use crate::error::{EngineError, ResourceError};
use crate::registry::Driver;
use crate::Inventory;

/// Subkey of the back-pointer attribute written next to every claim.
pub const MANAGER_SUBKEY: &str = "manager";

/// Allocation over a scarce resource. A claim is recorded as two attributes
/// on the owning thing, sharing one ordinal slot: the resource value itself
/// and a relation back to the manager under the `manager` subkey.
///
/// Exclusivity is not a check-then-write: the claim row lands in a partial
/// unique index, so a concurrent second owner fails the insert itself and
/// surfaces as `ResourceError::NotAvailable`.
pub trait ResourceManager: Driver {
    /// Attribute key claims for this manager are recorded under. Defaults
    /// to the manager's entity name, which is unique among live entities.
    fn resource_key(&self) -> String {
        self.name().to_string()
    }

    /// Whether one resource value may be held by at most one owner. Shared
    /// managers (VM placement) keep their claims outside the uniqueness
    /// index.
    fn exclusive(&self) -> bool {
        true
    }

    /// Validate a caller-supplied resource value.
    fn ensure_type(&self, inv: &Inventory, value: &AttrValue) -> Result<(), EngineError>;

    /// Mint the next free resource for `thing`.
    fn allocator(&self, inv: &mut Inventory, thing: EntityId) -> Result<AttrValue, EngineError>;

    fn allocate(
        &self,
        inv: &mut Inventory,
        thing: EntityId,
        resource: Option<AttrValue>,
        force: bool,
    ) -> Result<Attribute, EngineError> {
        inv.require_live(thing)?;
        let resource = match resource {
            Some(value) => {
                self.ensure_type(inv, &value)?;
                value
            }
            None => self.allocator(inv, thing)?,
        };
        let key = self.resource_key();
        let manager_id = self.entity_id();
        let claim = if force || !self.exclusive() {
            ClaimKind::Forced
        } else {
            ClaimKind::Exclusive
        };
        let result = inv.transaction(|txn| {
            let slot = txn.next_counter(thing, &format!("claim:{key}"))?;
            let attr = txn.add_attr(thing, &key, None, Some(slot), &resource, claim)?;
            txn.add_attr(
                thing,
                &key,
                Some(MANAGER_SUBKEY),
                Some(slot),
                &AttrValue::Relation(manager_id),
                ClaimKind::None,
            )?;
            Ok(attr)
        });
        match result {
            Ok(attr) => {
                tracing::debug!(
                    manager = self.name(),
                    owner = %thing,
                    resource = ?resource,
                    force,
                    "allocated resource"
                );
                Ok(attr)
            }
            Err(EngineError::Store(StoreError::ResourceTaken(what))) => {
                Err(ResourceError::NotAvailable(what).into())
            }
            Err(e) => Err(e),
        }
    }

    /// Release one claim (`resource` given) or every claim this manager
    /// holds on `thing`.
    fn deallocate(
        &self,
        inv: &mut Inventory,
        thing: EntityId,
        resource: Option<AttrValue>,
    ) -> Result<usize, EngineError> {
        let key = self.resource_key();
        let held = inv.attrs(thing, &AttrFilter::key(key.clone()).no_subkey(), View::Latest)?;
        let slots: Vec<i64> = held
            .iter()
            .filter(|a| resource.as_ref().is_none_or(|r| &a.value == r))
            .filter_map(|a| a.number)
            .collect();
        if slots.is_empty() {
            return Err(ResourceError::NotAllocated(format!(
                "{} holds nothing matching under {key}",
                inv.display_name(thing)
            ))
            .into());
        }
        let released = slots.len();
        inv.transaction(|txn| {
            for slot in &slots {
                txn.del_attrs(thing, &AttrFilter::key(key.clone()).number(*slot))?;
            }
            Ok(())
        })?;
        Ok(released)
    }

    /// Things currently holding the given resource from this manager.
    fn owners(&self, inv: &Inventory, resource: &AttrValue) -> Result<Vec<EntityRecord>, EngineError> {
        let claims = inv
            .store()
            .claims(&self.resource_key(), resource, View::Latest)?;
        let mut result = Vec::new();
        for claim in claims {
            if let Some(record) = inv.entity(claim.entity_id, View::Latest)? {
                result.push(record);
            }
        }
        Ok(result)
    }

    fn available(&self, inv: &Inventory, resource: &AttrValue) -> Result<bool, EngineError> {
        Ok(self.owners(inv, resource)?.is_empty())
    }

    /// Claims currently held by `thing` from this manager.
    fn allocations(&self, inv: &Inventory, thing: EntityId) -> Result<Vec<Attribute>, EngineError> {
        Ok(inv
            .attrs(thing, &AttrFilter::key(self.resource_key()).no_subkey(), View::Latest)?
            .into_iter()
            .filter(|a| a.deleted_at_version.is_none())
            .collect())
    }
}
