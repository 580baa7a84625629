//! Hardware boundary: an asynchronous CAN adapter (embedded HAL, SocketCAN wrapper,
//! virtual bus in tests). The core never calls it directly; the
//! [`BusRunner`](crate::protocol::managment::bus_supervisor::BusRunner) pumps it.
use crate::protocol::transport::can_frame::CanFrame;
use core::future::Future;

/// Contract to send and receive extended CAN frames asynchronously.
pub trait CanBus {
    type Error: core::fmt::Debug;

    /// Emit a frame on the bus. Retries and back-off belong to the implementation.
    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;

    /// Wait for the next frame. Frames must be returned in bus order.
    fn recv<'a>(&'a mut self) -> impl Future<Output = Result<CanFrame, Self::Error>> + 'a;
}
