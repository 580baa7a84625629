//! Network management: NAME fields and filters, the address-claim state machine, the
//! control function registry, the network manager dispatching traffic, and the
//! supervisor bridging the hardware boundary.
pub mod address_claiming;
pub mod bus_supervisor;
pub mod control_function;
pub mod iso_name;
pub mod network_manager;
