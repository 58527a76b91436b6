use rackline_engine::pool::Pool;
use rackline_engine::{Basic, Driver, EngineError, Meta, TypedDriver, META_NAME};
use rackline_harness::TestSite;
use rackline_storage::View;

#[test]
fn stored_driver_tag_picks_the_type() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    Pool::create(&mut site.inv, "webservers")?;
    site.device("web1")?;

    let loaded = site.inv.get_by_name("webservers")?;
    assert_eq!(loaded.driver_name(), "pool");
    assert_eq!(loaded.kind(), "pool");
    assert!(loaded.as_any().downcast_ref::<Pool>().is_some());

    let loaded = site.inv.get_by_name("web1")?;
    assert!(loaded.as_any().downcast_ref::<Basic>().is_some());

    Ok(())
}

#[test]
fn typed_lookup_checks_the_tag() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    site.device("web1")?;

    let err = site.inv.get_as::<Pool>("web1").unwrap_err();
    assert!(matches!(
        err,
        EngineError::DriverMismatch { actual, expected, .. }
            if actual == "basic" && expected == "pool"
    ));

    let dev: Basic = site.inv.get_as("web1")?;
    assert_eq!(dev.name(), "web1");

    let err = site.inv.get_as::<Basic>("no-such").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    Ok(())
}

#[test]
fn unregistered_driver_names_are_rejected() {
    let mut site = TestSite::new().unwrap();
    let err = site.inv.create("thing", "flying-toaster").unwrap_err();
    assert!(matches!(err, EngineError::DriverNotRegistered(name) if name == "flying-toaster"));
}

#[test]
fn listing_by_kind_and_driver() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    Pool::create(&mut site.inv, "p1")?;
    Pool::create(&mut site.inv, "p2")?;
    site.device("web1")?;

    let pools = site.inv.list_by_kind("pool", View::Latest)?;
    assert_eq!(pools.len(), 2);

    let devices = site.inv.list_by_driver(Basic::DRIVER_NAME, View::Latest)?;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "web1");

    Ok(())
}

#[test]
fn meta_singleton_exists_once() -> Result<(), Box<dyn std::error::Error>> {
    let site = TestSite::new()?;
    let meta = site.inv.get_as::<Meta>(META_NAME)?;
    assert_eq!(meta.name(), META_NAME);

    let metas = site.inv.list_by_driver(Meta::DRIVER_NAME, View::Latest)?;
    assert_eq!(metas.len(), 1);

    Ok(())
}

#[test]
fn generic_create_dispatches_like_typed_create() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let handle = site.inv.create("spares", "pool")?;
    assert!(handle.as_any().downcast_ref::<Pool>().is_some());

    let again = site.inv.get_as::<Pool>("spares")?;
    assert_eq!(again.entity_id(), handle.entity_id());

    Ok(())
}
