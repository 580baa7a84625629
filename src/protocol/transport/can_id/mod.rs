//! Creation and extraction of the 29-bit CAN identifiers used by
//! ISO 11783 / SAE J1939.
use crate::core::GLOBAL_ADDRESS;
use crate::error::CanIdBuildError;

/// Mask of the 29 bits carried by an extended identifier.
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Encapsulates an extended CAN identifier (29 bits) and exposes accessors
/// for priority, PGN, destination, and source.
pub struct CanId(pub u32);

impl CanId {
    /// Creates a pre-configured `CanIdBuilder` for a PGN and source address.
    pub fn builder(pgn: u32, source_address: u8) -> CanIdBuilder {
        CanIdBuilder::new(pgn, source_address)
    }

    /// Encodes an identifier without validation.
    ///
    /// PDU1 PGNs get `destination` in the PS byte; PDU2 PGNs keep their own PS byte and
    /// ignore `destination`. Used for frames whose layout is fixed by the protocol
    /// (claims, transport control and data frames).
    pub const fn encode(priority: u8, pgn: u32, destination: u8, source_address: u8) -> Self {
        let pf = (pgn >> 8) & 0xFF;
        let ps = if pf < 240 {
            destination as u32
        } else {
            pgn & 0xFF
        };
        CanId(
            (((priority & 0x07) as u32) << 26)
                | (((pgn >> 16) & 0x03) << 24)
                | (pf << 16)
                | (ps << 8)
                | source_address as u32,
        )
    }

    /// `true` when no bit above the 29-bit identifier range is set.
    pub const fn is_valid(&self) -> bool {
        self.0 & !EXTENDED_ID_MASK == 0
    }

    /// Returns the priority (3 bits, value 0-7) encoded in the CAN ID.
    pub const fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// Extracts the 18-bit PGN, handling the PDU1/PDU2 distinction.
    pub const fn pgn(&self) -> u32 {
        let ps = (self.0 >> 8) & 0xFF;
        let pf = (self.0 >> 16) & 0xFF;
        let dp = (self.0 >> 24) & 0x01;
        let r = (self.0 >> 25) & 0x01;

        if pf >= 240 {
            // PDU2: implicit destination, PS becomes part of the PGN.
            (r << 17) | (dp << 16) | (pf << 8) | ps
        } else {
            // PDU1: PS stores the explicit destination.
            (r << 17) | (dp << 16) | (pf << 8)
        }
    }

    /// Returns the destination address (PDU1) when the PGN carries one.
    pub const fn destination(&self) -> Option<u8> {
        if self.is_pdu2() {
            None
        } else {
            Some(((self.0 >> 8) & 0xFF) as u8)
        }
    }

    /// Destination address with PDU2 frames reported as global (255).
    pub const fn destination_address(&self) -> u8 {
        match self.destination() {
            Some(address) => address,
            None => GLOBAL_ADDRESS,
        }
    }

    /// `true` for PDU2 (broadcast-only) identifiers.
    pub const fn is_pdu2(&self) -> bool {
        ((self.0 >> 16) & 0xFF) >= 240
    }

    /// Eight-bit source address.
    pub const fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

//==================================================================================CAN_ID_BUILDER
#[derive(Debug)]
/// Fluent builder that enforces the PDU1/PDU2 rules.
pub struct CanIdBuilder {
    pub priority: u8,
    pub pgn: u32,
    pub source_address: u8,
    pub destination: Option<u8>,
}

impl CanIdBuilder {
    /// Initializes the builder for a given PGN and source address.
    pub fn new(pgn: u32, source_address: u8) -> Self {
        Self {
            priority: 6, // Default priority
            pgn,
            source_address,
            destination: None,
        }
    }

    /// Sets the priority (3 bits) to use during construction.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Assigns a destination address (PDU1). Implies a directed message.
    pub fn to_destination(mut self, destination_address: u8) -> Self {
        self.destination = Some(destination_address);
        self
    }

    /// Builds the CAN identifier while applying J1939 rules:
    /// - PF < 240 → addressed message (PDU1): `destination` mandatory and PGN PS byte must be `0`
    /// - PF ≥ 240 → broadcast (PDU2): `destination` must not be provided
    /// - R/DP/PF/PS bits are copied from the provided PGN
    ///
    /// Returns a dedicated error when the configuration violates these rules.
    pub fn build(self) -> Result<CanId, CanIdBuildError> {
        if self.pgn > 0x3FFFF {
            return Err(CanIdBuildError::InvalidData);
        }
        let pf_from_pgn = ((self.pgn >> 8) & 0xFF) as u8;
        let ps_from_pgn = (self.pgn & 0xFF) as u8;

        match self.destination {
            None => {
                if pf_from_pgn < 240 {
                    return Err(CanIdBuildError::InvalidForBroadcast);
                }
                Ok(CanId::encode(
                    self.priority,
                    self.pgn,
                    GLOBAL_ADDRESS,
                    self.source_address,
                ))
            }
            Some(da) => {
                if pf_from_pgn >= 240 {
                    return Err(CanIdBuildError::InvalidForFocusedMessage { pgn: pf_from_pgn });
                }
                if ps_from_pgn != 0 {
                    return Err(CanIdBuildError::PsFocusMessageMustBeNull);
                }
                Ok(CanId::encode(self.priority, self.pgn, da, self.source_address))
            }
        }
    }
}
//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
