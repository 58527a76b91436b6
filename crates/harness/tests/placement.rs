use std::net::Ipv4Addr;

use rackline_core::AttrValue;
use rackline_engine::ip::IpManager;
use rackline_engine::resource::ResourceManager;
use rackline_engine::vm::{set_system_capacity, SystemCapacity, VmManager};
use rackline_engine::{EngineError, ResourceError};
use rackline_harness::TestSite;

// ============================================================================
// IP allocation
// ============================================================================

#[test]
fn ip_allocation_starts_past_the_gateway() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = IpManager::create(
        &mut site.inv,
        "net-10-0-0",
        Ipv4Addr::new(10, 0, 0, 0),
        Ipv4Addr::new(255, 255, 255, 0),
        None,
    )?;
    let a = site.device("host1")?;
    let b = site.device("host2")?;

    // .0 is the network, .1 the default gateway.
    assert_eq!(mgr.allocate_ip(&mut site.inv, a, None)?, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(mgr.allocate_ip(&mut site.inv, b, None)?, Ipv4Addr::new(10, 0, 0, 3));
    assert_eq!(mgr.get_ip(&site.inv, a)?, vec![Ipv4Addr::new(10, 0, 0, 2)]);

    Ok(())
}

#[test]
fn ip_block_exhaustion_and_reuse() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = IpManager::create(
        &mut site.inv,
        "tiny-net",
        Ipv4Addr::new(192, 168, 7, 0),
        Ipv4Addr::new(255, 255, 255, 248),
        None,
    )?;
    let host = site.device("host1")?;

    // A /29 leaves .2 through .6 after network, broadcast, and gateway.
    let mut got = Vec::new();
    for _ in 0..5 {
        got.push(mgr.allocate_ip(&mut site.inv, host, None)?);
    }
    assert_eq!(
        got,
        (2..=6)
            .map(|n| Ipv4Addr::new(192, 168, 7, n))
            .collect::<Vec<_>>()
    );

    let err = mgr.allocate_ip(&mut site.inv, host, None).unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    // Releasing one address makes the scan find it again.
    mgr.deallocate(
        &mut site.inv,
        host,
        Some(AttrValue::Int(u32::from(Ipv4Addr::new(192, 168, 7, 4)) as i64)),
    )?;
    assert_eq!(
        mgr.allocate_ip(&mut site.inv, host, None)?,
        Ipv4Addr::new(192, 168, 7, 4)
    );

    Ok(())
}

#[test]
fn requested_ips_are_validated_against_the_block() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = IpManager::create(
        &mut site.inv,
        "net-a",
        Ipv4Addr::new(10, 1, 0, 0),
        Ipv4Addr::new(255, 255, 255, 0),
        Some(Ipv4Addr::new(10, 1, 0, 254)),
    )?;
    let host = site.device("host1")?;

    // Outside the block.
    let err = mgr
        .allocate_ip(&mut site.inv, host, Some(Ipv4Addr::new(10, 2, 0, 5)))
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::WrongType(_))));

    // The configured gateway is reserved.
    let err = mgr
        .allocate_ip(&mut site.inv, host, Some(Ipv4Addr::new(10, 1, 0, 254)))
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    // With a non-default gateway, .1 is an ordinary host address.
    assert_eq!(
        mgr.allocate_ip(&mut site.inv, host, Some(Ipv4Addr::new(10, 1, 0, 1)))?,
        Ipv4Addr::new(10, 1, 0, 1)
    );

    Ok(())
}

#[test]
fn malformed_blocks_are_rejected() {
    let mut site = TestSite::new().unwrap();
    // Non-contiguous netmask.
    assert!(IpManager::create(
        &mut site.inv,
        "bad-mask",
        Ipv4Addr::new(10, 0, 0, 0),
        Ipv4Addr::new(255, 0, 255, 0),
        None,
    )
    .is_err());
    // Gateway outside the block.
    assert!(IpManager::create(
        &mut site.inv,
        "bad-gw",
        Ipv4Addr::new(10, 0, 0, 0),
        Ipv4Addr::new(255, 255, 255, 0),
        Some(Ipv4Addr::new(10, 0, 1, 1)),
    )
    .is_err());
}

// ============================================================================
// VM placement
// ============================================================================

fn host_with_capacity(
    site: &mut TestSite,
    name: &str,
    disk: i64,
    cpu: i64,
    memory: i64,
) -> Result<rackline_core::EntityId, EngineError> {
    let id = site.device(name)?;
    set_system_capacity(&mut site.inv, id, SystemCapacity { disk, cpu, memory })?;
    Ok(id)
}

#[test]
fn vm_lands_on_the_smallest_sufficient_host() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = VmManager::create(&mut site.inv, "vm-pool")?;
    let big = host_with_capacity(&mut site, "big", 2000, 32, 262144)?;
    let small = host_with_capacity(&mut site, "small", 500, 8, 32768)?;
    mgr.add_host(&mut site.inv, big)?;
    mgr.add_host(&mut site.inv, small)?;

    let vm = host_with_capacity(&mut site, "vm1", 100, 4, 8192)?;
    let claim = mgr.allocate(&mut site.inv, vm, None, false)?;
    assert_eq!(claim.value, AttrValue::Relation(small));

    // A request too large for the small host spills to the big one.
    let vm2 = host_with_capacity(&mut site, "vm2", 800, 4, 8192)?;
    let claim = mgr.allocate(&mut site.inv, vm2, None, false)?;
    assert_eq!(claim.value, AttrValue::Relation(big));

    Ok(())
}

#[test]
fn placement_subtracts_earlier_placements() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = VmManager::create(&mut site.inv, "vm-pool")?;
    let host = host_with_capacity(&mut site, "hv1", 100, 8, 16384)?;
    mgr.add_host(&mut site.inv, host)?;

    let vm1 = host_with_capacity(&mut site, "vm1", 60, 2, 4096)?;
    let vm2 = host_with_capacity(&mut site, "vm2", 60, 2, 4096)?;

    mgr.allocate(&mut site.inv, vm1, None, false)?;
    // 40 disk left; vm2 needs 60.
    let err = mgr.allocate(&mut site.inv, vm2, None, false).unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    // Destroying vm1 returns its share.
    mgr.deallocate(&mut site.inv, vm1, None)?;
    mgr.allocate(&mut site.inv, vm2, None, false)?;

    Ok(())
}

#[test]
fn explicit_placement_must_name_a_registered_host() -> Result<(), Box<dyn std::error::Error>> {
    let mut site = TestSite::new()?;
    let mgr = VmManager::create(&mut site.inv, "vm-pool")?;
    let host = host_with_capacity(&mut site, "hv1", 100, 8, 16384)?;
    let stranger = site.device("not-a-host")?;
    mgr.add_host(&mut site.inv, host)?;

    let vm = host_with_capacity(&mut site, "vm1", 10, 1, 1024)?;
    let err = mgr
        .allocate(&mut site.inv, vm, Some(AttrValue::Relation(stranger)), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::WrongType(_))));

    mgr.allocate(&mut site.inv, vm, Some(AttrValue::Relation(host)), false)?;

    // Registering the same host twice is refused.
    let err = mgr.add_host(&mut site.inv, host).unwrap_err();
    assert!(matches!(err, EngineError::Resource(ResourceError::NotAvailable(_))));

    Ok(())
}
