use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use rackline_core::EntityId;
use rackline_storage::EntityRecord;

use crate::error::EngineError;

/// Behavior tag for a loaded entity. The stored `driver` string picks the
/// concrete type at load time; dispatch constructs a fresh typed handle
/// rather than mutating anything at runtime.
pub trait Driver: fmt::Debug {
    fn entity_id(&self) -> EntityId;
    fn name(&self) -> &str;
    fn driver_name(&self) -> &'static str;
    fn kind(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// Statically known driver identity, used for typed construction and for
/// registration into the registry.
pub trait TypedDriver: Driver + Sized + 'static {
    const DRIVER_NAME: &'static str;
    const KIND: &'static str;

    fn from_parts(entity_id: EntityId, name: &str) -> Self;
}

macro_rules! driver_handle {
    ($ty:ident, $driver_name:literal, $kind:literal) => {
        #[derive(Debug, Clone)]
        pub struct $ty {
            entity_id: rackline_core::EntityId,
            name: String,
        }

        impl $crate::registry::TypedDriver for $ty {
            const DRIVER_NAME: &'static str = $driver_name;
            const KIND: &'static str = $kind;

            fn from_parts(entity_id: rackline_core::EntityId, name: &str) -> Self {
                Self {
                    entity_id,
                    name: name.to_string(),
                }
            }
        }

        impl $crate::registry::Driver for $ty {
            fn entity_id(&self) -> rackline_core::EntityId {
                self.entity_id
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn driver_name(&self) -> &'static str {
                <$ty as $crate::registry::TypedDriver>::DRIVER_NAME
            }

            fn kind(&self) -> &'static str {
                <$ty as $crate::registry::TypedDriver>::KIND
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}
pub(crate) use driver_handle;

driver_handle!(Basic, "basic", "device");
driver_handle!(Meta, "meta", "meta");

type ConstructFn = fn(&EntityRecord) -> Box<dyn Driver>;

#[derive(Clone)]
pub struct DriverSpec {
    pub driver_name: &'static str,
    pub kind: &'static str,
    pub construct: ConstructFn,
}

pub fn spec_of<T: TypedDriver>() -> DriverSpec {
    DriverSpec {
        driver_name: T::DRIVER_NAME,
        kind: T::KIND,
        construct: |rec| Box::new(T::from_parts(rec.entity_id, &rec.name)),
    }
}

/// Maps stored driver-name strings to constructors. Populated explicitly at
/// startup; duplicate names are rejected instead of silently replaced.
pub struct DriverRegistry {
    map: HashMap<&'static str, DriverSpec>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Registry with every builtin driver registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for spec in [
            spec_of::<Basic>(),
            spec_of::<Meta>(),
            spec_of::<crate::pool::Pool>(),
            spec_of::<crate::pool::ExclusivePool>(),
            spec_of::<crate::pool::UniquePool>(),
            spec_of::<crate::ip::IpManager>(),
            spec_of::<crate::naming::NameManager>(),
            spec_of::<crate::naming::NumManager>(),
            spec_of::<crate::vm::VmManager>(),
        ] {
            // Builtin names are distinct by construction.
            let _ = registry.register(spec);
        }
        registry
    }

    pub fn register(&mut self, spec: DriverSpec) -> Result<(), EngineError> {
        if self.map.contains_key(spec.driver_name) {
            return Err(EngineError::DuplicateDriver(spec.driver_name.to_string()));
        }
        self.map.insert(spec.driver_name, spec);
        Ok(())
    }

    pub fn spec(&self, driver_name: &str) -> Option<&DriverSpec> {
        self.map.get(driver_name)
    }

    /// Re-hydrate a generic entity record into its typed driver handle.
    pub fn construct(&self, record: &EntityRecord) -> Result<Box<dyn Driver>, EngineError> {
        let spec = self
            .map
            .get(record.driver.as_str())
            .ok_or_else(|| EngineError::DriverNotRegistered(record.driver.clone()))?;
        Ok((spec.construct)(record))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
