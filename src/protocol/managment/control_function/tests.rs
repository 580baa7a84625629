//! Registry tests: claim lifecycle, arbitration against remote claims, partners,
//! request handling and silence timeout.
use super::*;
use crate::protocol::managment::iso_name::NameParameter;
use crate::protocol::transport::can_id::CanId;
use alloc::vec::Vec;

const CONTENTION: Duration = Duration::from_millis(250);

fn aac_name(raw: u64) -> IsoName {
    IsoName::from_raw(raw | (1 << 63))
}

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// Step the registry every 10 ms over `[from, until)` and collect its events.
fn run(
    registry: &mut ControlFunctionRegistry,
    from: u64,
    until: u64,
    out: &mut VecDeque<CanFrame>,
) -> Vec<ControlFunctionEvent> {
    let mut events = Vec::new();
    let mut ms = from;
    while ms < until {
        registry.update(at(ms), None, out);
        events.extend(registry.take_events());
        ms += 10;
    }
    events
}

/// Register one internal control function on channel 0 and let it claim.
fn claimed_internal(
    name: IsoName,
    preferred: u8,
) -> (ControlFunctionRegistry, ControlFunctionHandle, VecDeque<CanFrame>) {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let handle = registry
        .register_internal(name, preferred, 0, at(0))
        .expect("valid registration");
    let mut out = VecDeque::new();
    let events = run(&mut registry, 0, 1000, &mut out);
    assert_eq!(
        events,
        [ControlFunctionEvent {
            handle,
            kind: ControlFunctionEventKind::Claimed { address: preferred },
        }]
    );
    out.clear();
    (registry, handle, out)
}

#[test]
fn test_registration_rejections() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    assert_eq!(
        registry.register_internal(aac_name(1), 254, 0, at(0)),
        Err(RegistrationError::InvalidPreferredAddress { address: 254 })
    );
    let name = aac_name(2);
    registry.register_internal(name, 10, 0, at(0)).unwrap();
    assert_eq!(
        registry.register_internal(name, 11, 1, at(0)),
        Err(RegistrationError::DuplicateName { name: name.raw() })
    );
}

#[test]
/// Startup emits a request from the null address, then the claim; the address is
/// usable once the contention window elapsed.
fn test_claim_lifecycle_frames() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let name = aac_name(0x55);
    let handle = registry.register_internal(name, 42, 0, at(0)).unwrap();
    assert_eq!(registry.get(handle).unwrap().state(), ControlFunctionState::Unclaimed);
    assert_eq!(registry.claimed_address(handle), None);

    let mut out = VecDeque::new();
    run(&mut registry, 0, 1000, &mut out);

    let ids: Vec<u32> = out.iter().map(|frame| frame.id.0).collect();
    assert_eq!(ids, [0x18EA_FFFE, 0x18EE_FF2A]);
    assert_eq!(out[0].payload(), &[0x00, 0xEE, 0x00]);
    assert_eq!(out[1].payload(), &name.to_le_bytes());

    let cf = registry.get(handle).unwrap();
    assert_eq!(cf.state(), ControlFunctionState::Claimed);
    assert_eq!(cf.address(), 42);
    assert_eq!(registry.lookup(0, 42), Some(handle));
    assert_eq!(registry.internal_at(0, 42), Some(handle));
    assert_eq!(registry.claimed_address(handle), Some(42));
}

#[test]
fn test_own_claim_echo_is_ignored() {
    let name = aac_name(0x55);
    let (mut registry, handle, mut out) = claimed_internal(name, 42);
    registry.observe_claim(0, name, 42, at(1000), &mut out);
    assert!(out.is_empty());
    assert_eq!(registry.lookup(0, 42), Some(handle));
}

#[test]
/// A higher NAME claiming our address gets our claim back and no table entry.
fn test_defend_against_higher_name() {
    let (mut registry, handle, mut out) = claimed_internal(aac_name(0x10), 42);
    let intruder = aac_name(0x30);
    registry.observe_claim(0, intruder, 42, at(1000), &mut out);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, CanId(0x18EE_FF2A));
    assert_eq!(out[0].payload(), &aac_name(0x10).to_le_bytes());
    assert_eq!(registry.lookup(0, 42), Some(handle));
    assert_eq!(registry.claimed_address(handle), Some(42));

    let remote = registry
        .handles()
        .find(|h| registry.get(*h).unwrap().name() == Some(intruder))
        .unwrap();
    assert_eq!(registry.get(remote).unwrap().address(), NULL_ADDRESS);
    assert_eq!(registry.get(remote).unwrap().state(), ControlFunctionState::Unclaimed);
}

#[test]
/// A lower NAME takes our address; we re-claim in the arbitrary range.
fn test_move_after_losing_to_lower_name() {
    let (mut registry, handle, mut out) = claimed_internal(aac_name(0x20), 42);
    let winner = aac_name(0x10);
    registry.observe_claim(0, winner, 42, at(1000), &mut out);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, CanId(0x18EE_FF80));
    assert_eq!(registry.get(handle).unwrap().state(), ControlFunctionState::Claiming);
    assert_eq!(registry.claimed_address(handle), None);

    let remote = registry.lookup(0, 42).unwrap();
    assert_ne!(remote, handle);
    assert_eq!(registry.get(remote).unwrap().kind(), ControlFunctionKind::External);
    assert_eq!(registry.claimed_address(remote), Some(42));

    let events = run(&mut registry, 1000, 1300, &mut out);
    assert_eq!(
        events,
        [ControlFunctionEvent {
            handle,
            kind: ControlFunctionEventKind::Claimed { address: 128 },
        }]
    );
    assert_eq!(registry.internal_at(0, 128), Some(handle));
}

#[test]
/// Without arbitrary address capability a lost address ends the claim.
fn test_cannot_claim_without_aac() {
    let ours = IsoName::from_raw(0x20);
    let (mut registry, handle, mut out) = claimed_internal(ours, 42);
    registry.observe_claim(0, IsoName::from_raw(0x10), 42, at(1000), &mut out);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, CanId(0x18EE_FFFE));
    assert_eq!(out[0].payload(), &ours.to_le_bytes());
    assert_eq!(registry.get(handle).unwrap().state(), ControlFunctionState::CannotClaim);
    assert_eq!(registry.claimed_address(handle), None);
    assert_eq!(
        registry.take_events(),
        [ControlFunctionEvent {
            handle,
            kind: ControlFunctionEventKind::CannotClaim,
        }]
    );

    // Global requests are answered from the null address.
    out.clear();
    registry.respond_to_request(0, GLOBAL_ADDRESS, at(1100), &mut out);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, CanId(0x18EE_FFFE));
}

#[test]
/// Two internal functions preferring the same address end up apart, the lower NAME
/// keeping it.
fn test_internal_functions_share_channel() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let low = registry.register_internal(aac_name(0x01), 42, 0, at(0)).unwrap();
    let high = registry.register_internal(aac_name(0x99), 42, 0, at(0)).unwrap();
    let mut out = VecDeque::new();
    run(&mut registry, 0, 2000, &mut out);

    assert_eq!(registry.claimed_address(low), Some(42));
    assert_eq!(registry.claimed_address(high), Some(128));
}

#[test]
/// Same contest between two internal functions, the higher NAME without arbitrary
/// address capability: it gives up and says so from the null address.
fn test_internal_loser_without_aac_cannot_claim() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let low_name = IsoName::from_raw(0x01);
    let high_name = IsoName::from_raw(0x99);
    let low = registry.register_internal(low_name, 42, 0, at(0)).unwrap();
    let high = registry.register_internal(high_name, 42, 0, at(0)).unwrap();
    let mut out = VecDeque::new();
    let events = run(&mut registry, 0, 2000, &mut out);

    assert_eq!(registry.claimed_address(low), Some(42));
    assert_eq!(registry.internal_at(0, 42), Some(low));
    assert_eq!(registry.get(high).unwrap().state(), ControlFunctionState::CannotClaim);
    assert_eq!(registry.get(high).unwrap().address(), NULL_ADDRESS);
    assert_eq!(registry.claimed_address(high), None);

    let gave_up: Vec<_> = out
        .iter()
        .filter(|frame| frame.id == CanId(0x18EE_FFFE))
        .collect();
    assert_eq!(gave_up.len(), 1);
    assert_eq!(gave_up[0].payload(), &high_name.to_le_bytes());

    assert!(events.contains(&ControlFunctionEvent {
        handle: high,
        kind: ControlFunctionEventKind::CannotClaim,
    }));
    assert!(events.contains(&ControlFunctionEvent {
        handle: low,
        kind: ControlFunctionEventKind::Claimed { address: 42 },
    }));
}

#[test]
fn test_remote_claims_replace_each_other() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let mut out = VecDeque::new();
    let first = aac_name(0x10);
    let second = aac_name(0x20);
    registry.observe_claim(0, first, 10, at(0), &mut out);
    let first_handle = registry.lookup(0, 10).unwrap();
    registry.observe_claim(0, second, 10, at(5), &mut out);
    let second_handle = registry.lookup(0, 10).unwrap();

    assert!(out.is_empty());
    assert_ne!(first_handle, second_handle);
    assert_eq!(registry.get(first_handle).unwrap().address(), NULL_ADDRESS);
    assert_eq!(registry.claimed_address(first_handle), None);
    assert_eq!(registry.claimed_address(second_handle), Some(10));

    // Same NAME moving keeps its record.
    registry.observe_claim(0, second, 11, at(10), &mut out);
    assert_eq!(registry.lookup(0, 11), Some(second_handle));
    assert_eq!(registry.lookup(0, 10), None);
}

#[test]
fn test_remote_cannot_claim_and_reserved_addresses() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let mut out = VecDeque::new();
    let name = aac_name(0x44);
    registry.observe_claim(0, name, 20, at(0), &mut out);
    let handle = registry.lookup(0, 20).unwrap();

    registry.observe_claim(0, name, NULL_ADDRESS, at(10), &mut out);
    assert_eq!(registry.get(handle).unwrap().state(), ControlFunctionState::CannotClaim);
    assert_eq!(registry.lookup(0, 20), None);

    registry.observe_claim(0, aac_name(0x45), GLOBAL_ADDRESS, at(20), &mut out);
    assert_eq!(registry.lookup(0, GLOBAL_ADDRESS), None);
}

#[test]
/// Address tables are kept per channel.
fn test_channels_are_independent() {
    let (mut registry, handle, mut out) = claimed_internal(aac_name(0x20), 42);
    registry.observe_claim(1, aac_name(0x10), 42, at(1000), &mut out);

    assert!(out.is_empty());
    assert_eq!(registry.internal_at(0, 42), Some(handle));
    let remote = registry.lookup(1, 42).unwrap();
    assert_eq!(registry.get(remote).unwrap().channel(), 1);
}

#[test]
fn test_partner_binds_to_matching_claim() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let filters = [NameFilter::new(NameParameter::ManufacturerCode, 77)];
    let partner = registry.register_partner(0, &filters, at(0));
    assert_eq!(registry.get(partner).unwrap().name(), None);

    let mut out = VecDeque::new();
    let other = IsoName::builder().manufacturer_code(12).build();
    registry.observe_claim(0, other, 30, at(5), &mut out);
    assert_ne!(registry.lookup(0, 30), Some(partner));

    let matching = IsoName::builder().manufacturer_code(77).identity_number(5).build();
    registry.observe_claim(0, matching, 31, at(10), &mut out);
    assert_eq!(registry.lookup(0, 31), Some(partner));
    let cf = registry.get(partner).unwrap();
    assert_eq!(cf.kind(), ControlFunctionKind::Partnered);
    assert_eq!(cf.name(), Some(matching));
    assert_eq!(registry.claimed_address(partner), Some(31));
}

#[test]
fn test_partner_adopts_known_external() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let mut out = VecDeque::new();
    let name = IsoName::builder().function_code(130).build();
    registry.observe_claim(0, name, 50, at(0), &mut out);
    let external = registry.lookup(0, 50).unwrap();

    let filters = [NameFilter::new(NameParameter::FunctionCode, 130)];
    let partner = registry.register_partner(0, &filters, at(10));

    assert_eq!(registry.lookup(0, 50), Some(partner));
    assert_eq!(registry.claimed_address(partner), Some(50));
    assert_eq!(
        registry.get(external).unwrap().state(),
        ControlFunctionState::Deactivated
    );
}

#[test]
fn test_respond_to_request() {
    let (registry, _, mut out) = claimed_internal(aac_name(0x20), 42);

    registry.respond_to_request(0, GLOBAL_ADDRESS, at(1000), &mut out);
    registry.respond_to_request(0, 42, at(1000), &mut out);
    registry.respond_to_request(0, 43, at(1000), &mut out);
    registry.respond_to_request(1, GLOBAL_ADDRESS, at(1000), &mut out);
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|frame| frame.id == CanId(0x18EE_FF2A)));

    out.clear();
    registry.request_address_claim(at(1000), &mut out);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].timestamp, at(1000));
}

#[test]
fn test_silence_timeout() {
    let mut registry = ControlFunctionRegistry::new(CONTENTION);
    let mut out = VecDeque::new();
    registry.observe_claim(0, aac_name(0x70), 60, at(0), &mut out);
    let external = registry.lookup(0, 60).unwrap();
    let partner = registry.register_partner(
        0,
        &[NameFilter::new(NameParameter::IdentityNumber, 9)],
        at(0),
    );
    let partner_name = IsoName::builder().identity_number(9).build();
    registry.observe_claim(0, partner_name, 61, at(0), &mut out);
    assert_eq!(registry.lookup(0, 61), Some(partner));

    let timeout = Some(Duration::from_secs(1));
    registry.note_activity(0, 60, at(800));
    registry.update(at(1500), timeout, &mut out);
    assert_eq!(registry.claimed_address(external), Some(60));
    assert_eq!(registry.claimed_address(partner), None);
    assert_eq!(registry.get(partner).unwrap().state(), ControlFunctionState::Unclaimed);
    assert_eq!(registry.get(partner).unwrap().name(), Some(partner_name));

    registry.update(at(1900), timeout, &mut out);
    assert_eq!(registry.get(external).unwrap().state(), ControlFunctionState::Deactivated);
    assert_eq!(registry.lookup(0, 60), None);
    assert_eq!(
        registry.take_events(),
        [ControlFunctionEvent {
            handle: external,
            kind: ControlFunctionEventKind::Deactivated,
        }]
    );
}

#[test]
fn test_deactivate_internal() {
    let (mut registry, handle, _) = claimed_internal(aac_name(0x20), 42);
    assert!(registry.deactivate(handle));
    assert!(!registry.deactivate(handle));
    assert!(!registry.deactivate(ControlFunctionHandle(99)));
    assert_eq!(registry.lookup(0, 42), None);
    assert_eq!(registry.claimed_address(handle), None);
}
