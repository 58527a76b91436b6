use rackline_core::AttrValue;
use rackline_engine::naming::{NameManager, NumManager};
use rackline_engine::resource::ResourceManager;
use rackline_engine::{Driver, EngineError, ResourceError};
use rackline_harness::TestSite;

// ============================================================================
// Allocation exclusivity
// ============================================================================

#[test]
fn second_owner_is_refused_without_force() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = NumManager::create(&mut site.inv, "asn", None)?;
    let a = site.device("router1")?;
    let b = site.device("router2")?;

    let claimed = mgr.allocate(&mut site.inv, a, Some(AttrValue::Int(64512)), false)?;
    assert_eq!(claimed.value, AttrValue::Int(64512));
    assert!(!mgr.available(&site.inv, &AttrValue::Int(64512))?);

    let err = mgr
        .allocate(&mut site.inv, b, Some(AttrValue::Int(64512)), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    // The refused attempt leaves no partial claim behind.
    assert!(mgr.allocations(&site.inv, b)?.is_empty());

    Ok(())
}

#[test]
fn force_permits_shared_ownership() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = NumManager::create(&mut site.inv, "vlan", None)?;
    let a = site.device("sw1")?;
    let b = site.device("sw2")?;

    mgr.allocate(&mut site.inv, a, Some(AttrValue::Int(100)), false)?;
    mgr.allocate(&mut site.inv, b, Some(AttrValue::Int(100)), true)?;

    let mut owners: Vec<String> = mgr
        .owners(&site.inv, &AttrValue::Int(100))?
        .into_iter()
        .map(|r| r.name)
        .collect();
    owners.sort();
    assert_eq!(owners, vec!["sw1", "sw2"]);

    Ok(())
}

#[test]
fn deallocate_frees_the_resource() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = NumManager::create(&mut site.inv, "oob-port", None)?;
    let a = site.device("host1")?;
    let b = site.device("host2")?;

    mgr.allocate(&mut site.inv, a, Some(AttrValue::Int(7)), false)?;
    assert_eq!(mgr.deallocate(&mut site.inv, a, Some(AttrValue::Int(7)))?, 1);
    assert!(mgr.available(&site.inv, &AttrValue::Int(7))?);

    // Freed resources are claimable again.
    mgr.allocate(&mut site.inv, b, Some(AttrValue::Int(7)), false)?;

    let err = mgr
        .deallocate(&mut site.inv, a, Some(AttrValue::Int(7)))
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAllocated(_))));

    Ok(())
}

#[test]
fn deallocate_without_resource_releases_everything() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = NumManager::create(&mut site.inv, "vip-slot", None)?;
    let a = site.device("lb1")?;

    mgr.allocate(&mut site.inv, a, None, false)?;
    mgr.allocate(&mut site.inv, a, None, false)?;
    assert_eq!(mgr.allocations(&site.inv, a)?.len(), 2);

    assert_eq!(mgr.deallocate(&mut site.inv, a, None)?, 2);
    assert!(mgr.allocations(&site.inv, a)?.is_empty());

    Ok(())
}

#[test]
fn claims_record_their_manager() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = NumManager::create(&mut site.inv, "serial-seq", None)?;
    let a = site.device("host1")?;

    let claim = mgr.allocate(&mut site.inv, a, None, false)?;
    let slot = claim.number.unwrap();
    let back = site
        .inv
        .attr_value(
            a,
            "serial-seq",
            Some(rackline_engine::resource::MANAGER_SUBKEY),
            rackline_storage::View::Latest,
        );
    // attr_value matches (key, subkey) without the slot; with one claim the
    // back-pointer is unique.
    assert_eq!(back?, Some(AttrValue::Relation(mgr.entity_id())));
    assert_eq!(slot, 1);

    Ok(())
}

// ============================================================================
// Name and number minting
// ============================================================================

#[test]
fn name_manager_mints_sequential_names() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = NameManager::create(&mut site.inv, "webnames", "web")?;
    let a = site.device("unnamed-1")?;
    let b = site.device("unnamed-2")?;

    let first = mgr.allocate(&mut site.inv, a, None, false)?;
    let second = mgr.allocate(&mut site.inv, b, None, false)?;
    assert_eq!(first.value, AttrValue::Text("web1".into()));
    assert_eq!(second.value, AttrValue::Text("web2".into()));

    // A specific name can be claimed too, and is then exclusive.
    let c = site.device("unnamed-3")?;
    mgr.allocate(&mut site.inv, c, Some(AttrValue::Text("web9".into())), false)?;
    let d = site.device("unnamed-4")?;
    let err = mgr
        .allocate(&mut site.inv, d, Some(AttrValue::Text("web9".into())), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    // Values of the wrong shape are rejected up front.
    let err = mgr
        .allocate(&mut site.inv, d, Some(AttrValue::Int(5)), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::WrongType(_))));

    Ok(())
}

#[test]
fn num_manager_respects_its_cap() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = NumManager::create(&mut site.inv, "small-seq", Some(2))?;
    let a = site.device("host1")?;

    assert_eq!(
        mgr.allocate(&mut site.inv, a, None, false)?.value,
        AttrValue::Int(1)
    );
    assert_eq!(
        mgr.allocate(&mut site.inv, a, None, false)?.value,
        AttrValue::Int(2)
    );
    let err = mgr.allocate(&mut site.inv, a, None, false).unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    // Explicit requests beyond the cap fail the same way.
    let err = mgr
        .allocate(&mut site.inv, a, Some(AttrValue::Int(3)), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    Ok(())
}

#[test]
fn managers_with_distinct_names_do_not_collide() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let left = NumManager::create(&mut site.inv, "left", None)?;
    let right = NumManager::create(&mut site.inv, "right", None)?;
    let a = site.device("host1")?;

    left.allocate(&mut site.inv, a, Some(AttrValue::Int(1)), false)?;
    // Same value under a different manager is a different resource.
    right.allocate(&mut site.inv, a, Some(AttrValue::Int(1)), false)?;

    assert_eq!(left.allocations(&site.inv, a)?.len(), 1);
    assert_eq!(right.allocations(&site.inv, a)?.len(), 1);

    Ok(())
}
