//! “First conversation” integration scenario: a tractor and an implement claim their
//! addresses, the implement broadcasts a 20-byte message through BAM and the tractor
//! answers with a 100-byte point-to-point message through connection mode.
mod helpers;

use helpers::{aac_name, SimulatedBus};
use korri_isobus::config::NetworkConfig;
use korri_isobus::error::TransferError;
use korri_isobus::protocol::managment::network_manager::NetworkManager;
use korri_isobus::protocol::messages::{Destination, Message, MessageFilter};
use std::cell::RefCell;
use std::rc::Rc;

const STATUS_PGN: u32 = 0xFEF1;
const COMMAND_PGN: u32 = 0xEF00;
const TRACTOR: usize = 0;
const IMPLEMENT: usize = 1;

#[test]
fn test_first_conversation() {
    let mut tractor = NetworkManager::new(NetworkConfig::default());
    let mut implement = NetworkManager::new(NetworkConfig::default());
    let tractor_cf = tractor
        .register_internal_control_function(aac_name(0x0100_0001), 0x80, 0)
        .expect("tractor registration");
    let implement_cf = implement
        .register_internal_control_function(aac_name(0x0200_0002), 0xAA, 0)
        .expect("implement registration");

    let status: Rc<RefCell<Vec<Message>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = status.clone();
    tractor.register_listener(
        STATUS_PGN,
        MessageFilter::Broadcast,
        Box::new(move |message: &Message| sink.borrow_mut().push(message.clone())),
    );
    let commands: Rc<RefCell<Vec<Message>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = commands.clone();
    implement.register_listener(
        COMMAND_PGN,
        MessageFilter::To(implement_cf),
        Box::new(move |message: &Message| sink.borrow_mut().push(message.clone())),
    );

    let mut bus = SimulatedBus::new(vec![tractor, implement]);

    // 1. Both nodes claim their preferred address.
    bus.run(0, 1000);
    assert_eq!(bus.nodes[TRACTOR].claimed_address(tractor_cf), Some(0x80));
    assert_eq!(bus.nodes[IMPLEMENT].claimed_address(implement_cf), Some(0xAA));

    // 2. The implement broadcasts its status.
    let report: Vec<u8> = (1..=20).collect();
    bus.log.clear();
    bus.nodes[IMPLEMENT]
        .send_message(implement_cf, None, STATUS_PGN, 6, &report)
        .expect("BAM accepted");
    bus.run(1000, 1500);

    let announces = bus.logged(0x1FFF_FFFF, 0x18EC_FFAA);
    assert_eq!(announces.len(), 1);
    assert_eq!(
        announces[0].payload(),
        &[0x20, 0x14, 0x00, 0x03, 0xFF, 0xF1, 0xFE, 0x00]
    );
    let data = bus.logged(0x1FFF_FFFF, 0x1CEB_FFAA);
    assert_eq!(data.len(), 3);
    for (index, frame) in data.iter().enumerate() {
        assert_eq!(frame.payload()[0] as usize, index + 1);
    }
    assert_eq!(data[2].payload(), &[3, 15, 16, 17, 18, 19, 20, 0xFF]);

    {
        let status = status.borrow();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].data, report);
        assert_eq!(status[0].source_address, 0xAA);
        assert_eq!(status[0].destination, Destination::Global);
    }

    // 3. The tractor answers the implement directly.
    let implement_seen_from_tractor = bus.nodes[TRACTOR]
        .control_function_at(0, 0xAA)
        .expect("implement known to the tractor");
    let outcome: Rc<RefCell<Option<Result<(), TransferError>>>> = Rc::new(RefCell::new(None));
    let sink = outcome.clone();
    let command: Vec<u8> = (0..100).map(|i| (i * 3) as u8).collect();
    bus.nodes[TRACTOR]
        .send_message_with_callback(
            tractor_cf,
            Some(implement_seen_from_tractor),
            COMMAND_PGN,
            6,
            &command,
            Box::new(move |result| *sink.borrow_mut() = Some(result)),
        )
        .expect("connection-mode send accepted");
    bus.run(1500, 3000);

    assert_eq!(*outcome.borrow(), Some(Ok(())));
    let commands = commands.borrow();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].data, command);
    assert_eq!(commands[0].source_address, 0x80);
    assert_eq!(
        commands[0].destination,
        Destination::ControlFunction {
            handle: implement_cf,
            address: 0xAA
        }
    );
}
