//! ISO 11783-5 address-claim algorithm for one internal control function:
//! settle, request the claims already on the bus, claim a free address, listen for
//! conflicts during the contention window, and fall back to alternative addresses when
//! needed.
//!
//! The [`AddressClaimer`] is a pure state machine: it never touches the bus and never
//! reads a clock. The registry polls it with the current time and an `occupant` view of
//! the address table, then turns the returned [`ClaimStep`] into frames.
use crate::core::{
    ADDRESS_CLAIM_PGN, ARBITRARY_ADDRESS_FIRST, ARBITRARY_ADDRESS_LAST, DEFAULT_PRIORITY,
    GLOBAL_ADDRESS, MAX_CLAIMABLE_ADDRESS, NULL_ADDRESS, REQUEST_PGN,
};
use crate::protocol::managment::iso_name::IsoName;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use embassy_time::{Duration, Instant};

/// Microseconds per step of the NAME-derived settling delay (0 to 255 steps).
const SETTLING_STEP_US: u64 = 600;

//==================================================================================CLAIMER
/// Progress of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClaimPhase {
    /// Deterministic pseudo-random delay before the first frame.
    WaitForStartup { until: Instant },
    /// Request for address claim sent; collecting the answers.
    WaitForRequestContention { until: Instant },
    /// Claim sent for `address`; a lower NAME may still take it.
    Contending { until: Instant },
    Claimed,
    CannotClaim,
}

/// Action the owner of the claimer must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClaimStep {
    None,
    /// Broadcast a request for the address-claim PGN from the null address.
    SendRequest,
    /// Broadcast a claim for the given address.
    SendClaim(u8),
    /// The contention window elapsed without a winning competitor.
    Claimed(u8),
    /// No address left: announce it from the null address and stay silent.
    CannotClaim,
}

/// Outcome of a competing claim for the address we hold or contend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClaimReaction {
    /// Same NAME, or we do not hold that address.
    Ignore,
    /// Our NAME is lower: re-send our claim.
    Defend,
    /// We lost and now contend for another address.
    Moved(u8),
    CannotClaim,
}

/// Claim state machine of one internal control function.
#[derive(Debug, Clone)]
pub struct AddressClaimer {
    name: IsoName,
    preferred: u8,
    address: u8,
    phase: ClaimPhase,
    candidates: AddressClaimIterator,
}

impl AddressClaimer {
    /// Start a claim. The first frame goes out after [`settling_delay`].
    pub fn new(name: IsoName, preferred_address: u8, now: Instant) -> Self {
        Self {
            name,
            preferred: preferred_address,
            address: NULL_ADDRESS,
            phase: ClaimPhase::WaitForStartup {
                until: now + settling_delay(name),
            },
            candidates: AddressClaimIterator::new(
                preferred_address,
                name.is_arbitrary_address_capable(),
            ),
        }
    }

    #[inline]
    pub fn name(&self) -> IsoName {
        self.name
    }

    #[inline]
    pub fn preferred_address(&self) -> u8 {
        self.preferred
    }

    /// Address claimed or contended for, `NULL_ADDRESS` when none.
    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[inline]
    pub fn phase(&self) -> ClaimPhase {
        self.phase
    }

    /// Advance timers. `occupant(address)` returns the NAME currently holding an
    /// address in the table, if any.
    pub fn update<F>(&mut self, now: Instant, contention: Duration, occupant: F) -> ClaimStep
    where
        F: Fn(u8) -> Option<IsoName>,
    {
        match self.phase {
            ClaimPhase::WaitForStartup { until } if now >= until => {
                self.phase = ClaimPhase::WaitForRequestContention {
                    until: now + contention,
                };
                ClaimStep::SendRequest
            }
            ClaimPhase::WaitForRequestContention { until } if now >= until => {
                self.claim_next(now, contention, occupant)
            }
            ClaimPhase::Contending { until } if now >= until => {
                self.phase = ClaimPhase::Claimed;
                #[cfg(feature = "defmt")]
                defmt::info!("Address {} claimed", self.address);
                ClaimStep::Claimed(self.address)
            }
            _ => ClaimStep::None,
        }
    }

    /// Arbitrate against a claim carrying `their_name` for our address.
    pub fn on_competing_claim<F>(
        &mut self,
        their_name: IsoName,
        now: Instant,
        contention: Duration,
        occupant: F,
    ) -> ClaimReaction
    where
        F: Fn(u8) -> Option<IsoName>,
    {
        let holding = matches!(
            self.phase,
            ClaimPhase::Contending { .. } | ClaimPhase::Claimed
        );
        if !holding || their_name == self.name {
            return ClaimReaction::Ignore;
        }
        if self.name < their_name {
            #[cfg(feature = "defmt")]
            defmt::info!("Defending address {}", self.address);
            return ClaimReaction::Defend;
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("Lost address {} to a lower NAME", self.address);
        match self.claim_next(now, contention, occupant) {
            ClaimStep::SendClaim(address) => ClaimReaction::Moved(address),
            _ => ClaimReaction::CannotClaim,
        }
    }

    /// Pick the next candidate not held by a lower NAME and contend for it.
    fn claim_next<F>(&mut self, now: Instant, contention: Duration, occupant: F) -> ClaimStep
    where
        F: Fn(u8) -> Option<IsoName>,
    {
        let name = self.name;
        let next = self
            .candidates
            .by_ref()
            .find(|&address| !matches!(occupant(address), Some(holder) if holder < name));

        match next {
            Some(address) => {
                #[cfg(feature = "defmt")]
                defmt::info!("Trying to claim address: {}", address);
                self.address = address;
                self.phase = ClaimPhase::Contending {
                    until: now + contention,
                };
                ClaimStep::SendClaim(address)
            }
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("No address available, cannot claim");
                self.address = NULL_ADDRESS;
                self.phase = ClaimPhase::CannotClaim;
                ClaimStep::CannotClaim
            }
        }
    }
}

/// Deterministic startup delay derived from the NAME: `0.6 ms × (0..=255)`.
pub fn settling_delay(name: IsoName) -> Duration {
    let seed = name
        .to_le_bytes()
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_mul(31).wrapping_add(*byte));
    Duration::from_micros(seed as u64 * SETTLING_STEP_US)
}

//==================================================================================ADDRESS_CLAIM_ITERATOR
/// Generates candidate addresses: the preferred one, then 128-247 for arbitrary
/// address capable NAMEs.
#[derive(Debug, Clone)]
struct AddressClaimIterator {
    preferred: u8,
    next_arbitrary: u16,
    state: AddressClaimState,
    arbitrary_capable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AddressClaimState {
    TryPreferred,
    TryArbitrary,
    Done,
}

impl AddressClaimIterator {
    fn new(preferred_address: u8, arbitrary_capable: bool) -> Self {
        Self {
            preferred: preferred_address,
            next_arbitrary: ARBITRARY_ADDRESS_FIRST as u16,
            state: AddressClaimState::TryPreferred,
            arbitrary_capable,
        }
    }
}

impl Iterator for AddressClaimIterator {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                AddressClaimState::TryPreferred => {
                    self.state = if self.arbitrary_capable {
                        AddressClaimState::TryArbitrary
                    } else {
                        // Non-AAC equipment only gets a single attempt.
                        AddressClaimState::Done
                    };
                    if self.preferred <= MAX_CLAIMABLE_ADDRESS {
                        return Some(self.preferred);
                    }
                }
                AddressClaimState::TryArbitrary => {
                    if self.next_arbitrary > ARBITRARY_ADDRESS_LAST as u16 {
                        self.state = AddressClaimState::Done;
                        continue;
                    }
                    let address = self.next_arbitrary as u8;
                    self.next_arbitrary += 1;
                    if address == self.preferred {
                        continue;
                    }
                    return Some(address);
                }
                AddressClaimState::Done => return None,
            }
        }
    }
}

//==================================================================================FRAMES
/// Claim frame (PGN 60928, global destination) carrying the NAME little-endian.
pub fn build_address_claim_frame(name: IsoName, address: u8) -> CanFrame {
    CanFrame::new(
        CanId::encode(DEFAULT_PRIORITY, ADDRESS_CLAIM_PGN, GLOBAL_ADDRESS, address),
        &name.to_le_bytes(),
    )
}

/// Claim frame sent from the null address by a node that could not claim.
pub fn build_cannot_claim_frame(name: IsoName) -> CanFrame {
    build_address_claim_frame(name, NULL_ADDRESS)
}

/// Request (PGN 59904) for the address-claim PGN.
pub fn build_request_for_address_claim(source: u8, destination: u8) -> CanFrame {
    let pgn = ADDRESS_CLAIM_PGN.to_le_bytes();
    CanFrame::new(
        CanId::encode(DEFAULT_PRIORITY, REQUEST_PGN, destination, source),
        &pgn[..3],
    )
}

/// Extracts the NAME from an address-claim frame.
pub fn extract_name_from_claim(frame: &CanFrame) -> Option<IsoName> {
    if frame.id.pgn() != ADDRESS_CLAIM_PGN || frame.len != 8 {
        return None;
    }
    Some(IsoName::from_le_bytes(frame.data))
}

/// PGN asked for by a request frame.
pub fn requested_pgn(frame: &CanFrame) -> Option<u32> {
    if frame.id.pgn() != REQUEST_PGN || frame.len < 3 {
        return None;
    }
    Some(u32::from_le_bytes([frame.data[0], frame.data[1], frame.data[2], 0]))
}
