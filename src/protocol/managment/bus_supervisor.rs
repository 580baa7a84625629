//! Hardware boundary of the stack.
//!
//! The core is synchronous; frames reach it through a pair of bounded
//! [`embassy_sync::channel::Channel`]s per bus channel:
//!
//! * the [`BusRunner`] task pumps a [`CanBus`] adapter, pushing received frames into the
//!   receive queue and transmitting what the core left in the transmit queue;
//! * [`NetworkManager::service`](crate::protocol::managment::network_manager::NetworkManager::service)
//!   drains the receive queue, runs the state machines and refills the transmit queue.
//!
//! Firmware provides the storage (usually a `static`), so nothing is allocated here and
//! there is no dependency on a particular BSP or executor.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use futures_util::{future::select, future::Either, pin_mut};

use crate::error::BusRunnerError;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::can_bus::CanBus;

/// Receive and transmit queues of one bus channel.
pub struct BusQueues<M: RawMutex, const RX: usize, const TX: usize> {
    channel: u8,
    rx: Channel<M, CanFrame, RX>,
    tx: Channel<M, CanFrame, TX>,
}

impl<M: RawMutex, const RX: usize, const TX: usize> BusQueues<M, RX, TX> {
    pub const fn new(channel: u8) -> Self {
        Self {
            channel,
            rx: Channel::new(),
            tx: Channel::new(),
        }
    }

    /// Bus channel served by these queues.
    #[inline]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Hand a received frame to the core. Returns `false` when the queue is full and the
    /// frame was dropped.
    pub fn push_received(&self, frame: CanFrame) -> bool {
        self.rx.try_send(frame.on_channel(self.channel)).is_ok()
    }

    pub fn pop_received(&self) -> Option<CanFrame> {
        self.rx.try_receive().ok()
    }

    /// Queue a frame for transmission. The frame is given back when the queue is full.
    pub fn queue_transmit(&self, frame: CanFrame) -> Result<(), CanFrame> {
        self.tx.try_send(frame).map_err(|err| match err {
            embassy_sync::channel::TrySendError::Full(frame) => frame,
        })
    }

    pub fn pop_transmit(&self) -> Option<CanFrame> {
        self.tx.try_receive().ok()
    }

    /// Bind an adapter to these queues.
    pub fn runner<C: CanBus>(&self, bus: C) -> BusRunner<'_, C, M, RX, TX> {
        BusRunner { bus, queues: self }
    }
}

/// Async task moving frames between a [`CanBus`] adapter and its [`BusQueues`].
pub struct BusRunner<'a, C: CanBus, M: RawMutex, const RX: usize, const TX: usize> {
    bus: C,
    queues: &'a BusQueues<M, RX, TX>,
}

impl<'a, C, M, const RX: usize, const TX: usize> BusRunner<'a, C, M, RX, TX>
where
    C: CanBus,
    M: RawMutex,
{
    /// Run until the adapter fails. Received frames wait for room in the receive queue,
    /// so a slow core applies back-pressure on the adapter instead of losing frames.
    pub async fn drive(mut self) -> Result<(), BusRunnerError<C::Error>> {
        let channel = self.queues.channel;
        loop {
            let event = {
                let recv_future = self.bus.recv();
                let transmit_future = self.queues.tx.receive();
                pin_mut!(recv_future);
                pin_mut!(transmit_future);

                match select(recv_future, transmit_future).await {
                    Either::Left((received, _)) => Either::Left(received),
                    Either::Right((frame, _)) => Either::Right(frame),
                }
            };

            match event {
                Either::Left(Ok(frame)) => {
                    #[cfg(feature = "defmt")]
                    defmt::trace!("RX {:X}", frame.id.0);
                    self.queues.rx.send(frame.on_channel(channel)).await;
                }
                Either::Left(Err(err)) => return Err(BusRunnerError::Receive(err)),
                Either::Right(frame) => {
                    #[cfg(feature = "defmt")]
                    defmt::trace!("TX {:X}", frame.id.0);
                    self.bus.send(&frame).await.map_err(BusRunnerError::Send)?;
                }
            }
        }
    }
}
