//! Control function registry: the single owner of the NAME ↔ address table of every
//! channel.
//!
//! Records live in an arena and are referred to through [`ControlFunctionHandle`]s,
//! which stay valid (but may point at a deactivated record) for the lifetime of the
//! registry. Internal records carry an [`AddressClaimer`]; external and partnered
//! records are updated from the claims observed on the bus.
use crate::core::{GLOBAL_ADDRESS, MAX_CLAIMABLE_ADDRESS, NULL_ADDRESS};
use crate::error::RegistrationError;
use crate::protocol::managment::address_claiming::{
    build_address_claim_frame, build_cannot_claim_frame, build_request_for_address_claim,
    AddressClaimer, ClaimReaction, ClaimStep,
};
use crate::protocol::managment::iso_name::{matches_all, IsoName, NameFilter};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::transport_protocol::AddressResolver;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

//==================================================================================TYPES
/// Lookup handle of a control function record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlFunctionHandle(pub(crate) usize);

impl ControlFunctionHandle {
    /// Arena index of the record.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlFunctionKind {
    /// Owned and defended by this stack.
    Internal,
    /// Remote node bound through NAME filters.
    Partnered,
    /// Any other remote node seen on the bus.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlFunctionState {
    Unclaimed,
    Claiming,
    Claimed,
    CannotClaim,
    Deactivated,
}

/// Lifecycle notification queued by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlFunctionEventKind {
    Claimed { address: u8 },
    CannotClaim,
    Deactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlFunctionEvent {
    pub handle: ControlFunctionHandle,
    pub kind: ControlFunctionEventKind,
}

/// One node of the network.
#[derive(Debug, Clone)]
pub struct ControlFunction {
    kind: ControlFunctionKind,
    name: Option<IsoName>,
    address: u8,
    channel: u8,
    state: ControlFunctionState,
    filters: Vec<NameFilter>,
    last_seen: Instant,
    claimer: Option<AddressClaimer>,
}

impl ControlFunction {
    fn new(kind: ControlFunctionKind, name: Option<IsoName>, channel: u8, now: Instant) -> Self {
        Self {
            kind,
            name,
            address: NULL_ADDRESS,
            channel,
            state: ControlFunctionState::Unclaimed,
            filters: Vec::new(),
            last_seen: now,
            claimer: None,
        }
    }

    #[inline]
    pub fn kind(&self) -> ControlFunctionKind {
        self.kind
    }

    /// `None` for a partner that has not been matched yet.
    #[inline]
    pub fn name(&self) -> Option<IsoName> {
        self.name
    }

    /// Current address, `NULL_ADDRESS` when none.
    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    #[inline]
    pub fn state(&self) -> ControlFunctionState {
        self.state
    }

    #[inline]
    pub fn is_claimed(&self) -> bool {
        self.state == ControlFunctionState::Claimed
    }

    #[inline]
    pub fn filters(&self) -> &[NameFilter] {
        &self.filters
    }

    #[inline]
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    #[inline]
    fn is_active(&self) -> bool {
        self.state != ControlFunctionState::Deactivated
    }
}

//==================================================================================REGISTRY
/// Owner of every control function record and of the address table.
#[derive(Debug)]
pub struct ControlFunctionRegistry {
    functions: Vec<ControlFunction>,
    by_address: BTreeMap<(u8, u8), ControlFunctionHandle>,
    events: Vec<ControlFunctionEvent>,
    contention: Duration,
}

impl ControlFunctionRegistry {
    pub fn new(contention: Duration) -> Self {
        Self {
            functions: Vec::new(),
            by_address: BTreeMap::new(),
            events: Vec::new(),
            contention,
        }
    }

    pub fn get(&self, handle: ControlFunctionHandle) -> Option<&ControlFunction> {
        self.functions.get(handle.0)
    }

    /// Handle of the record holding `address` on `channel`.
    pub fn lookup(&self, channel: u8, address: u8) -> Option<ControlFunctionHandle> {
        self.by_address.get(&(channel, address)).copied()
    }

    /// Claimed internal control function at `address` on `channel`.
    pub fn internal_at(&self, channel: u8, address: u8) -> Option<ControlFunctionHandle> {
        self.lookup(channel, address).filter(|handle| {
            self.get(*handle).is_some_and(|cf| {
                cf.kind == ControlFunctionKind::Internal && cf.is_claimed()
            })
        })
    }

    /// Every handle ever issued, deactivated ones included.
    pub fn handles(&self) -> impl Iterator<Item = ControlFunctionHandle> + '_ {
        (0..self.functions.len()).map(ControlFunctionHandle)
    }

    /// Drain the queued lifecycle events.
    pub fn take_events(&mut self) -> Vec<ControlFunctionEvent> {
        core::mem::take(&mut self.events)
    }

    //==================================================================================REGISTRATION
    /// Create an internal control function and start its claim procedure.
    pub fn register_internal(
        &mut self,
        name: IsoName,
        preferred_address: u8,
        channel: u8,
        now: Instant,
    ) -> Result<ControlFunctionHandle, RegistrationError> {
        if preferred_address > MAX_CLAIMABLE_ADDRESS {
            return Err(RegistrationError::InvalidPreferredAddress {
                address: preferred_address,
            });
        }
        if self.functions.iter().any(|cf| {
            cf.kind == ControlFunctionKind::Internal && cf.is_active() && cf.name == Some(name)
        }) {
            return Err(RegistrationError::DuplicateName { name: name.raw() });
        }

        let mut record =
            ControlFunction::new(ControlFunctionKind::Internal, Some(name), channel, now);
        record.claimer = Some(AddressClaimer::new(name, preferred_address, now));
        let handle = ControlFunctionHandle(self.functions.len());
        self.functions.push(record);

        #[cfg(feature = "defmt")]
        defmt::info!("Registered internal control function {}", name);
        Ok(handle)
    }

    /// Create a partnered control function. It adopts an already known external record
    /// whose NAME satisfies every filter, otherwise it binds to the first matching claim.
    pub fn register_partner(
        &mut self,
        channel: u8,
        filters: &[NameFilter],
        now: Instant,
    ) -> ControlFunctionHandle {
        let handle = ControlFunctionHandle(self.functions.len());
        let mut record = ControlFunction::new(ControlFunctionKind::Partnered, None, channel, now);
        record.filters = filters.to_vec();

        let adopted = self.functions.iter().position(|cf| {
            cf.kind == ControlFunctionKind::External
                && cf.is_active()
                && cf.channel == channel
                && cf.name.is_some_and(|name| matches_all(filters, name))
        });
        if let Some(index) = adopted {
            let external = &mut self.functions[index];
            record.name = external.name;
            record.address = external.address;
            record.state = external.state;
            record.last_seen = external.last_seen;
            external.state = ControlFunctionState::Deactivated;
            external.address = NULL_ADDRESS;
            if record.address != NULL_ADDRESS {
                self.by_address.insert((channel, record.address), handle);
            }
        }

        self.functions.push(record);
        handle
    }

    /// Remove a control function from the table. Returns `false` for unknown or already
    /// deactivated handles.
    pub fn deactivate(&mut self, handle: ControlFunctionHandle) -> bool {
        if !self.get(handle).is_some_and(ControlFunction::is_active) {
            return false;
        }
        self.unmap(handle);
        let record = &mut self.functions[handle.0];
        record.state = ControlFunctionState::Deactivated;
        record.address = NULL_ADDRESS;
        record.claimer = None;
        self.events.push(ControlFunctionEvent {
            handle,
            kind: ControlFunctionEventKind::Deactivated,
        });
        true
    }

    //==================================================================================BUS_INPUT
    /// Apply a claim observed on `channel`: NAME `name` claims `address`.
    pub fn observe_claim(
        &mut self,
        channel: u8,
        name: IsoName,
        address: u8,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) {
        if self.functions.iter().any(|cf| {
            cf.kind == ControlFunctionKind::Internal
                && cf.is_active()
                && cf.channel == channel
                && cf.name == Some(name)
        }) {
            // Our own NAME echoed back.
            return;
        }

        if address == NULL_ADDRESS {
            let handle = self.remote_record(channel, name, now);
            self.unmap(handle);
            let record = &mut self.functions[handle.0];
            record.address = NULL_ADDRESS;
            record.state = ControlFunctionState::CannotClaim;
            record.last_seen = now;
            #[cfg(feature = "defmt")]
            defmt::debug!("Remote {} cannot claim", name);
            return;
        }
        if address > MAX_CLAIMABLE_ADDRESS {
            return;
        }
        self.apply_claim(channel, address, name, None, now, out);
    }

    /// Refresh the silence timer of whoever holds `address`.
    pub fn note_activity(&mut self, channel: u8, address: u8, now: Instant) {
        if let Some(handle) = self.lookup(channel, address) {
            self.functions[handle.0].last_seen = now;
        }
    }

    /// Answer a request for the address-claim PGN received on `channel`.
    pub fn respond_to_request(
        &self,
        channel: u8,
        destination: u8,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) {
        for cf in self.functions.iter() {
            if cf.kind != ControlFunctionKind::Internal || cf.channel != channel {
                continue;
            }
            let Some(name) = cf.name else { continue };
            match cf.state {
                ControlFunctionState::Claimed | ControlFunctionState::Claiming
                    if destination == GLOBAL_ADDRESS || destination == cf.address =>
                {
                    out.push_back(
                        build_address_claim_frame(name, cf.address)
                            .on_channel(channel)
                            .at(now),
                    );
                }
                ControlFunctionState::CannotClaim if destination == GLOBAL_ADDRESS => {
                    out.push_back(build_cannot_claim_frame(name).on_channel(channel).at(now));
                }
                _ => {}
            }
        }
    }

    /// Re-broadcast the claim of every internal control function on every channel.
    pub fn request_address_claim(&self, now: Instant, out: &mut VecDeque<CanFrame>) {
        let mut channels: Vec<u8> = self
            .functions
            .iter()
            .filter(|cf| cf.kind == ControlFunctionKind::Internal)
            .map(|cf| cf.channel)
            .collect();
        channels.sort_unstable();
        channels.dedup();
        for channel in channels {
            self.respond_to_request(channel, GLOBAL_ADDRESS, now, out);
        }
    }

    //==================================================================================UPDATE
    /// Drive claim timers and expire silent remote nodes.
    pub fn update(&mut self, now: Instant, silence: Option<Duration>, out: &mut VecDeque<CanFrame>) {
        for index in 0..self.functions.len() {
            let handle = ControlFunctionHandle(index);
            let Some(mut claimer) = self.functions[index].claimer.take() else {
                continue;
            };
            let channel = self.functions[index].channel;
            let step = claimer.update(now, self.contention, |address| {
                self.occupant(channel, address, handle)
            });
            self.functions[index].claimer = Some(claimer);
            self.apply_step(handle, step, now, out);
        }

        if let Some(timeout) = silence {
            for index in 0..self.functions.len() {
                let record = &self.functions[index];
                let silent = record.kind != ControlFunctionKind::Internal
                    && record.is_claimed()
                    && now.checked_duration_since(record.last_seen).is_some_and(|d| d > timeout);
                if !silent {
                    continue;
                }
                let handle = ControlFunctionHandle(index);
                #[cfg(feature = "defmt")]
                defmt::info!("Control function at {} went silent", record.address);
                if record.kind == ControlFunctionKind::Partnered {
                    self.unmap(handle);
                    let partner = &mut self.functions[index];
                    partner.address = NULL_ADDRESS;
                    partner.state = ControlFunctionState::Unclaimed;
                } else {
                    self.deactivate(handle);
                }
            }
        }
    }

    //==================================================================================ARBITRATION
    /// Resolve a claim for `address` by `name`. `claimant` is `Some` for internal
    /// control functions, `None` for claims received from the bus.
    fn apply_claim(
        &mut self,
        channel: u8,
        address: u8,
        name: IsoName,
        claimant: Option<ControlFunctionHandle>,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) {
        if let Some(holder) = self.lookup(channel, address) {
            let record = &self.functions[holder.0];
            let holder_name = record.name;
            let holder_internal = record.kind == ControlFunctionKind::Internal;

            if Some(holder) == claimant || holder_name == Some(name) {
                // Re-announcement of the current owner.
            } else if holder_internal {
                let Some(mut claimer) = self.functions[holder.0].claimer.take() else {
                    return;
                };
                let reaction = claimer.on_competing_claim(name, now, self.contention, |a| {
                    if a == address {
                        Some(name)
                    } else {
                        self.occupant(channel, a, holder)
                    }
                });
                self.functions[holder.0].claimer = Some(claimer);

                match reaction {
                    ClaimReaction::Ignore => {}
                    ClaimReaction::Defend => {
                        let Some(holder_name) = holder_name else { return };
                        out.push_back(
                            build_address_claim_frame(holder_name, address)
                                .on_channel(channel)
                                .at(now),
                        );
                        match claimant {
                            Some(loser) => self.internal_lost(loser, holder_name, now, out),
                            None => {
                                let remote = self.remote_record(channel, name, now);
                                self.release(remote, ControlFunctionState::Unclaimed, now);
                            }
                        }
                        return;
                    }
                    ClaimReaction::Moved(next) => {
                        self.unmap(holder);
                        self.apply_step(holder, ClaimStep::SendClaim(next), now, out);
                    }
                    ClaimReaction::CannotClaim => {
                        self.apply_step(holder, ClaimStep::CannotClaim, now, out);
                    }
                }
            } else {
                match (claimant, holder_name) {
                    (Some(internal), Some(remote_name)) if remote_name < name => {
                        self.internal_lost(internal, remote_name, now, out);
                        return;
                    }
                    _ => {
                        // Latest claim takes the address from a remote holder.
                        self.release(holder, ControlFunctionState::Unclaimed, now);
                    }
                }
            }
        }

        let handle = match claimant {
            Some(handle) => handle,
            None => self.remote_record(channel, name, now),
        };
        self.assign(handle, address, now);
    }

    /// An internal claimant lost `its` address to `winner`: move on or give up.
    fn internal_lost(
        &mut self,
        loser: ControlFunctionHandle,
        winner: IsoName,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) {
        let Some(mut claimer) = self.functions[loser.0].claimer.take() else {
            return;
        };
        let channel = self.functions[loser.0].channel;
        let lost_address = claimer.address();
        let reaction = claimer.on_competing_claim(winner, now, self.contention, |a| {
            if a == lost_address {
                Some(winner)
            } else {
                self.occupant(channel, a, loser)
            }
        });
        self.functions[loser.0].claimer = Some(claimer);
        match reaction {
            ClaimReaction::Moved(next) => {
                self.apply_step(loser, ClaimStep::SendClaim(next), now, out)
            }
            ClaimReaction::CannotClaim => self.apply_step(loser, ClaimStep::CannotClaim, now, out),
            ClaimReaction::Ignore | ClaimReaction::Defend => {}
        }
    }

    /// Perform the bus side of a claim step of internal control function `handle`.
    fn apply_step(
        &mut self,
        handle: ControlFunctionHandle,
        step: ClaimStep,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) {
        let record = &self.functions[handle.0];
        let channel = record.channel;
        let Some(name) = record.name else { return };

        match step {
            ClaimStep::None => {}
            ClaimStep::SendRequest => {
                out.push_back(
                    build_request_for_address_claim(NULL_ADDRESS, GLOBAL_ADDRESS)
                        .on_channel(channel)
                        .at(now),
                );
            }
            ClaimStep::SendClaim(address) => {
                self.functions[handle.0].state = ControlFunctionState::Claiming;
                out.push_back(
                    build_address_claim_frame(name, address)
                        .on_channel(channel)
                        .at(now),
                );
                self.apply_claim(channel, address, name, Some(handle), now, out);
            }
            ClaimStep::Claimed(address) => {
                let record = &mut self.functions[handle.0];
                record.state = ControlFunctionState::Claimed;
                record.address = address;
                self.by_address.insert((channel, address), handle);
                self.events.push(ControlFunctionEvent {
                    handle,
                    kind: ControlFunctionEventKind::Claimed { address },
                });
            }
            ClaimStep::CannotClaim => {
                self.release(handle, ControlFunctionState::CannotClaim, now);
                out.push_back(build_cannot_claim_frame(name).on_channel(channel).at(now));
                self.events.push(ControlFunctionEvent {
                    handle,
                    kind: ControlFunctionEventKind::CannotClaim,
                });
            }
        }
    }

    //==================================================================================TABLE
    /// NAME holding `address` on `channel`, ignoring `asking` itself.
    fn occupant(&self, channel: u8, address: u8, asking: ControlFunctionHandle) -> Option<IsoName> {
        self.lookup(channel, address)
            .filter(|holder| *holder != asking)
            .and_then(|holder| self.functions[holder.0].name)
    }

    /// Record of a remote NAME on `channel`: existing one, a partner whose filters
    /// match, or a new external record.
    fn remote_record(&mut self, channel: u8, name: IsoName, now: Instant) -> ControlFunctionHandle {
        let known = self.functions.iter().position(|cf| {
            cf.kind != ControlFunctionKind::Internal
                && cf.is_active()
                && cf.channel == channel
                && cf.name == Some(name)
        });
        if let Some(index) = known {
            return ControlFunctionHandle(index);
        }

        let partner = self.functions.iter().position(|cf| {
            cf.kind == ControlFunctionKind::Partnered
                && cf.is_active()
                && cf.channel == channel
                && cf.name.is_none()
                && matches_all(&cf.filters, name)
        });
        if let Some(index) = partner {
            #[cfg(feature = "defmt")]
            defmt::info!("Partner bound to {}", name);
            self.functions[index].name = Some(name);
            return ControlFunctionHandle(index);
        }

        self.functions.push(ControlFunction::new(
            ControlFunctionKind::External,
            Some(name),
            channel,
            now,
        ));
        ControlFunctionHandle(self.functions.len() - 1)
    }

    fn assign(&mut self, handle: ControlFunctionHandle, address: u8, now: Instant) {
        let record = &self.functions[handle.0];
        if record.address != address {
            self.unmap(handle);
        }
        let record = &mut self.functions[handle.0];
        record.address = address;
        record.last_seen = now;
        if record.kind != ControlFunctionKind::Internal {
            record.state = ControlFunctionState::Claimed;
        }
        self.by_address.insert((record.channel, address), handle);
    }

    /// Drop the address of `handle` and move it to `state`.
    fn release(&mut self, handle: ControlFunctionHandle, state: ControlFunctionState, now: Instant) {
        self.unmap(handle);
        let record = &mut self.functions[handle.0];
        record.address = NULL_ADDRESS;
        record.state = state;
        record.last_seen = now;
    }

    fn unmap(&mut self, handle: ControlFunctionHandle) {
        let record = &self.functions[handle.0];
        let key = (record.channel, record.address);
        if self.by_address.get(&key) == Some(&handle) {
            self.by_address.remove(&key);
        }
    }
}

impl AddressResolver for ControlFunctionRegistry {
    fn claimed_address(&self, handle: ControlFunctionHandle) -> Option<u8> {
        self.get(handle)
            .filter(|cf| cf.is_claimed() && cf.address <= MAX_CLAIMABLE_ADDRESS)
            .map(|cf| cf.address)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
