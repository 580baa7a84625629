/// Test doubles: an async CAN adapter pair and a synchronous shared bus for several stacks.
use embassy_time::Instant;
use korri_isobus::protocol::managment::iso_name::IsoName;
use korri_isobus::protocol::managment::network_manager::NetworkManager;
use korri_isobus::protocol::transport::{can_frame::CanFrame, traits::can_bus::CanBus};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Clone)]
#[allow(dead_code)]
/// In-memory CAN adapter implementing `CanBus`.
pub struct MockCanBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<CanFrame>>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// Construct a pair of interconnected adapters (DUT ↔ host).
    pub fn create_pair() -> (Self, Self) {
        let (dut_tx, host_rx) = mpsc::unbounded_channel();
        let (host_tx, dut_rx) = mpsc::unbounded_channel();

        let dut_bus = Self {
            tx: dut_tx,
            rx: Arc::new(Mutex::new(dut_rx)),
        };

        let host_bus = Self {
            tx: host_tx,
            rx: Arc::new(Mutex::new(host_rx)),
        };

        (dut_bus, host_bus)
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.tx.send(frame.clone()).map_err(|_| ())?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }
}

#[allow(dead_code)]
pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

#[allow(dead_code)]
/// Arbitrary-address-capable NAME with the given low bits.
pub fn aac_name(raw: u64) -> IsoName {
    IsoName::from_raw(raw | (1 << 63))
}

#[allow(dead_code)]
/// Every stack hears every frame the others transmit, in transmit order.
pub struct SimulatedBus {
    pub nodes: Vec<NetworkManager>,
    /// Every frame put on the bus.
    pub log: Vec<CanFrame>,
    /// Frames for which this returns `false` are lost.
    pub keep: Box<dyn FnMut(&CanFrame) -> bool>,
}

#[allow(dead_code)]
impl SimulatedBus {
    pub fn new(nodes: Vec<NetworkManager>) -> Self {
        Self {
            nodes,
            log: Vec::new(),
            keep: Box::new(|_| true),
        }
    }

    /// Deliver pending frames until every stack is quiet.
    pub fn flush(&mut self, now: Instant) {
        loop {
            let mut moved = false;
            for sender in 0..self.nodes.len() {
                while let Some(frame) = self.nodes[sender].pop_transmit_frame() {
                    moved = true;
                    if !(self.keep)(&frame) {
                        continue;
                    }
                    self.log.push(frame.clone());
                    for receiver in 0..self.nodes.len() {
                        if receiver != sender {
                            self.nodes[receiver].process_receive_frame(&frame, now);
                        }
                    }
                }
            }
            if !moved {
                break;
            }
        }
    }

    /// Update every stack each 10 ms over `[from, until)`.
    pub fn run(&mut self, from: u64, until: u64) {
        let mut ms = from;
        while ms < until {
            for node in self.nodes.iter_mut() {
                node.update(at(ms));
            }
            self.flush(at(ms));
            ms += 10;
        }
    }

    /// Frames of the log whose identifier matches `mask`/`value`.
    pub fn logged(&self, mask: u32, value: u32) -> Vec<&CanFrame> {
        self.log
            .iter()
            .filter(|frame| frame.id.0 & mask == value)
            .collect()
    }
}
