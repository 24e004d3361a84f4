// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The secondary role: polling each zone's primary for SOA changes,
//! fetching AXFRs, and serving the transferred data.
//!
//! A secondary bootstraps its zone list from the transfer keys it
//! holds: each key of the shape `<pip>.<sip>._transfer.<zone>` names a
//! zone and the primary to poll. Per zone, the state machine cycles
//! through [`TransferState::RequestedSoa`] (an SOA query is in
//! flight), [`TransferState::RequestedAxfr`] (a transfer is in
//! flight), and [`TransferState::Transferred`] (the zone is current;
//! wake up again at the SOA refresh interval). A zone whose primary
//! stays silent past the SOA expiry is dropped from the data tree
//! rather than served stale.
//!
//! Answers are only believed when they arrive from the configured
//! primary, signed by the zone's configured key, with the id of the
//! outstanding request.

use std::collections::HashMap;
use std::net::SocketAddr;

use log::warn;
use rand::Rng;

use crate::message::{find_rrset, Opcode, Packet, Payload, Qtype, Rcode, Section};
use crate::name::Name;
use crate::rr::{serial_newer, RrData, Type};
use crate::zone::ZoneTree;

use super::auth::{parse_transfer_key, KeyAction};
use super::{Authenticator, Server, Transport};

/// Seconds between retransmissions of an in-flight request when the
/// zone has no SOA yet to take intervals from.
const BOOTSTRAP_RETRY: u64 = 5;

////////////////////////////////////////////////////////////////////////
// PER-ZONE STATE                                                     //
////////////////////////////////////////////////////////////////////////

/// Where a zone stands in its transfer cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransferState {
    /// The zone is current; `ts` is when the last transfer (or SOA
    /// confirmation) completed.
    Transferred(u64),

    /// An SOA query was sent at `ts`; `retry` counts the sends.
    /// `mac` is the request's TSIG MAC, kept as signing context for
    /// verifying the response.
    RequestedSoa {
        ts: u64,
        id: u16,
        retry: u32,
        mac: Vec<u8>,
    },

    /// An AXFR request was sent at `ts`.
    RequestedAxfr { ts: u64, id: u16, mac: Vec<u8> },
}

/// A zone the secondary maintains: its transfer state, the primary to
/// poll, and the key that authenticates the traffic.
#[derive(Clone, Debug)]
struct SecondaryZone {
    state: TransferState,
    primary: SocketAddr,
    key: Name,
}

////////////////////////////////////////////////////////////////////////
// THE SECONDARY                                                      //
////////////////////////////////////////////////////////////////////////

/// A secondary authoritative server.
#[derive(Clone, Debug)]
pub struct Secondary {
    server: Server,
    zones: HashMap<Name, SecondaryZone>,
    last_now: u64,
}

impl Secondary {
    /// Creates a `Secondary` bootstrapped from the transfer keys in
    /// `auth`: every zone they name starts in an immediately-due
    /// [`TransferState::RequestedSoa`].
    pub fn new(auth: Authenticator) -> Self {
        let mut zones = HashMap::new();
        for (zone, primary, key) in auth.transfer_zones() {
            zones.insert(
                zone,
                SecondaryZone {
                    state: TransferState::RequestedSoa {
                        ts: 0,
                        id: 0,
                        retry: 0,
                        mac: Vec::new(),
                    },
                    primary,
                    key,
                },
            );
        }
        Self {
            server: Server::new(ZoneTree::new(), auth),
            zones,
            last_now: 0,
        }
    }

    /// Returns the zone data.
    pub fn data(&self) -> &ZoneTree {
        self.server.data()
    }

    /// Returns the transfer state of `zone`.
    pub fn state(&self, zone: &Name) -> Option<&TransferState> {
        self.zones.get(zone).map(|z| &z.state)
    }

    /// Records the TSIG MAC of the request currently in flight for
    /// `zone`. The external TSIG layer calls this after signing, so
    /// that the (possibly multi-message) response can be verified
    /// against the request's signing context.
    pub fn record_mac(&mut self, zone: &Name, mac: Vec<u8>) {
        if let Some(entry) = self.zones.get_mut(zone) {
            match entry.state {
                TransferState::RequestedSoa { mac: ref mut m, .. }
                | TransferState::RequestedAxfr { mac: ref mut m, .. } => *m = mac,
                TransferState::Transferred(_) => (),
            }
        }
    }

    /// Advances every zone's schedule to `now`, returning the queries
    /// to transmit.
    pub fn timer<R: Rng>(&mut self, now: u64, rng: &mut R) -> Vec<(SocketAddr, Packet)> {
        self.last_now = self.last_now.max(now);
        let now = self.last_now;

        let mut out = Vec::new();
        for (zone, entry) in self.zones.iter_mut() {
            let soa = self.server.data.soa(zone).map(|(_, soa)| soa.clone());
            match entry.state.clone() {
                TransferState::Transferred(ts) => {
                    if let Some(ref soa) = soa {
                        if now >= ts + u64::from(soa.refresh) {
                            let id = rng.gen();
                            out.push((entry.primary, Packet::soa_query(id, zone.clone())));
                            entry.state = TransferState::RequestedSoa {
                                ts: now,
                                id,
                                retry: 1,
                                mac: Vec::new(),
                            };
                        }
                    }
                }
                TransferState::RequestedSoa { ts, retry, .. } => {
                    if let Some(ref soa) = soa {
                        if now >= ts + u64::from(soa.expire) {
                            warn!("zone {zone} expired without contact from {}", entry.primary);
                            self.server.data.remove_zone(zone);
                            // Keep polling, but restart the schedule
                            // from the expiry.
                            entry.state = TransferState::RequestedSoa {
                                ts: now,
                                id: 0,
                                retry: 1,
                                mac: Vec::new(),
                            };
                            continue;
                        }
                    }
                    let due = match soa {
                        Some(ref soa) => ts + u64::from(retry) * u64::from(soa.retry),
                        None => ts + u64::from(retry) * BOOTSTRAP_RETRY,
                    };
                    if now >= due {
                        let id = rng.gen();
                        out.push((entry.primary, Packet::soa_query(id, zone.clone())));
                        entry.state = TransferState::RequestedSoa {
                            ts,
                            id,
                            retry: retry + 1,
                            mac: Vec::new(),
                        };
                    }
                }
                TransferState::RequestedAxfr { ts, .. } => {
                    if now >= ts + BOOTSTRAP_RETRY {
                        let id = rng.gen();
                        out.push((entry.primary, Packet::axfr_query(id, zone.clone())));
                        entry.state = TransferState::RequestedAxfr {
                            ts: now,
                            id,
                            mac: Vec::new(),
                        };
                    }
                }
            }
        }
        out
    }

    /// Handles one received message. Returns the response to send back
    /// to `src` (if any) along with follow-up queries to transmit.
    pub fn handle<R: Rng>(
        &mut self,
        now: u64,
        rng: &mut R,
        src: SocketAddr,
        transport: Transport,
        packet: &Packet,
    ) -> (Option<Packet>, Vec<(SocketAddr, Packet)>) {
        self.last_now = self.last_now.max(now);
        let now = self.last_now;

        if packet.header.flags.qr {
            return (None, self.handle_answer(now, rng, src, packet));
        }

        if let Err(rcode) = self.server.preflight(packet) {
            return (Some(packet.reply_error(rcode)), Vec::new());
        }

        match packet.header.opcode {
            Opcode::Notify => self.handle_notify(now, rng, src, packet),
            Opcode::Query if packet.question.qtype == Qtype::AXFR => {
                (Some(self.server.answer_axfr(transport, packet).0), Vec::new())
            }
            Opcode::Query => (Some(self.server.answer_query(packet)), Vec::new()),
            Opcode::Update => {
                let outcome = self.server.apply_update(packet);
                for action in &outcome.key_actions {
                    self.apply_key_action(now, action);
                }
                (Some(packet.reply_error(outcome.rcode)), Vec::new())
            }
            Opcode::Unimplemented(_) => {
                (Some(packet.reply_error(Rcode::NotImp)), Vec::new())
            }
        }
    }

    /// A NOTIFY from a zone's configured primary triggers an immediate
    /// SOA query; anyone else's NOTIFY is ignored.
    fn handle_notify<R: Rng>(
        &mut self,
        now: u64,
        rng: &mut R,
        src: SocketAddr,
        packet: &Packet,
    ) -> (Option<Packet>, Vec<(SocketAddr, Packet)>) {
        let zone = &packet.question.qname;
        let entry = match self.zones.get_mut(zone) {
            Some(entry) if entry.primary.ip() == src.ip() => entry,
            _ => return (None, Vec::new()),
        };

        let id = rng.gen();
        let query = Packet::soa_query(id, zone.clone());
        entry.state = TransferState::RequestedSoa {
            ts: now,
            id,
            retry: 1,
            mac: Vec::new(),
        };
        let mut ack = packet.reply();
        ack.header.flags.aa = true;
        (Some(ack), vec![(entry.primary, query)])
    }

    /// Handles a response from a primary. Nothing is believed unless
    /// it arrives from the zone's configured primary, signed with the
    /// zone's key, and echoing the outstanding request id.
    fn handle_answer<R: Rng>(
        &mut self,
        now: u64,
        rng: &mut R,
        src: SocketAddr,
        packet: &Packet,
    ) -> Vec<(SocketAddr, Packet)> {
        let zone = packet.question.qname.clone();
        let entry = match self.zones.get_mut(&zone) {
            Some(entry) => entry,
            None => return Vec::new(),
        };
        if entry.primary.ip() != src.ip() {
            warn!("ignoring answer for {zone} from {src} (expected {})", entry.primary);
            return Vec::new();
        }
        match packet.tsig {
            Some(ref tsig) if tsig.key == entry.key => (),
            _ => {
                warn!("ignoring unsigned answer for {zone} from {src}");
                return Vec::new();
            }
        }

        match entry.state.clone() {
            TransferState::RequestedSoa { id, .. } => {
                if packet.header.id != id {
                    warn!("ignoring answer for {zone} with unexpected id {}", packet.header.id);
                    return Vec::new();
                }
                let remote_serial = match Self::remote_serial_of(&zone, packet) {
                    Some(serial) => serial,
                    None => return Vec::new(),
                };
                let local_serial = self.server.data.soa(&zone).map(|(_, soa)| soa.serial);
                let stale = local_serial.map_or(true, |local| serial_newer(local, remote_serial));
                if stale {
                    let id = rng.gen();
                    entry.state = TransferState::RequestedAxfr {
                        ts: now,
                        id,
                        mac: Vec::new(),
                    };
                    vec![(entry.primary, Packet::axfr_query(id, zone))]
                } else {
                    entry.state = TransferState::Transferred(now);
                    Vec::new()
                }
            }
            TransferState::RequestedAxfr { id, .. } => {
                if packet.header.id != id {
                    warn!("ignoring transfer for {zone} with unexpected id {}", packet.header.id);
                    return Vec::new();
                }
                let section = match packet.payload {
                    Payload::Axfr(Some(ref section)) => section,
                    _ => return Vec::new(),
                };
                self.apply_axfr(now, &zone, section);
                Vec::new()
            }
            TransferState::Transferred(_) => Vec::new(),
        }
    }

    /// Replaces the zone with the contents of a transfer: the old zone
    /// is removed, the new SOA inserted, and the transferred entries
    /// (filtered to the zone) bulk-loaded. An invariant violation in
    /// the result is logged but the transfer is committed anyway; a
    /// secondary serves what its primary publishes.
    fn apply_axfr(&mut self, now: u64, zone: &Name, section: &Section) {
        let soa_rrset = match find_rrset(section, zone, Type::SOA) {
            Some(rrset) => rrset.clone(),
            None => {
                warn!("transfer of {zone} carries no SOA; ignoring it");
                return;
            }
        };
        let remote_serial = match soa_rrset.data {
            RrData::Soa(ref soa) => soa.serial,
            _ => return,
        };
        let entry = match self.zones.get_mut(zone) {
            Some(entry) => entry,
            None => return,
        };

        let local_serial = self.server.data.soa(zone).map(|(_, soa)| soa.serial);
        if let Some(local) = local_serial {
            if !serial_newer(local, remote_serial) {
                warn!(
                    "transfer of {zone} is not newer (serial {remote_serial} vs {local}); keeping our data"
                );
                entry.state = TransferState::Transferred(now);
                return;
            }
        }

        let mut next = self.server.data.clone();
        next.remove_zone(zone);
        next.insert(zone, soa_rrset);
        for section_entry in section {
            if section_entry.rrset.rtype() == Type::SOA && section_entry.owner == *zone {
                continue;
            }
            if !section_entry.owner.eq_or_subdomain_of(zone) {
                continue;
            }
            next.merge(&section_entry.owner, section_entry.rrset.clone());
        }
        if let Err(issue) = next.check() {
            warn!("transferred zone {zone} fails validation: {issue}");
        }
        self.server.data = next;
        entry.state = TransferState::Transferred(now);
    }

    /// Reads the zone's SOA serial out of an SOA query response.
    fn remote_serial_of(zone: &Name, packet: &Packet) -> Option<u32> {
        match packet.payload {
            Payload::Query { ref answer, .. } => {
                match find_rrset(answer, zone, Type::SOA)?.data {
                    RrData::Soa(ref soa) => Some(soa.serial),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Reacts to key store changes: a new transfer key bootstraps its
    /// zone, a withdrawn one drops the zone and its data.
    fn apply_key_action(&mut self, now: u64, action: &KeyAction) {
        match action {
            KeyAction::Added(key_name) => {
                if let Some((zone, primary, _)) = parse_transfer_key(key_name) {
                    self.zones.insert(
                        zone,
                        SecondaryZone {
                            state: TransferState::RequestedSoa {
                                ts: now,
                                id: 0,
                                retry: 0,
                                mac: Vec::new(),
                            },
                            primary,
                            key: key_name.clone(),
                        },
                    );
                }
            }
            KeyAction::Removed(key_name) => {
                let dropped: Vec<Name> = self
                    .zones
                    .iter()
                    .filter(|(_, entry)| entry.key == *key_name)
                    .map(|(zone, _)| zone.clone())
                    .collect();
                for zone in dropped {
                    self.zones.remove(&zone);
                    self.server.data.remove_zone(&zone);
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::message::{Question, SectionEntry, TsigInfo};
    use crate::rr::{Dnskey, Rrset, Soa, Ttl};

    const KEY_NAME: &str = "192\\.0\\.2\\.1.203\\.0\\.113\\.9._transfer.example.";

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn rng() -> StepRng {
        StepRng::new(40, 1)
    }

    fn soa(serial: u32) -> Soa {
        Soa {
            mname: name("ns1.example."),
            rname: name("hostmaster.example."),
            serial,
            refresh: 100,
            retry: 20,
            expire: 1000,
            minimum: 300,
        }
    }

    fn secondary() -> Secondary {
        let auth = Authenticator::new([(
            name(KEY_NAME),
            Dnskey {
                flags: 0,
                algorithm: 163,
                key: b"not a real secret".to_vec(),
            },
        )]);
        Secondary::new(auth)
    }

    fn primary_addr() -> SocketAddr {
        "192.0.2.1:53".parse().unwrap()
    }

    fn signed(mut packet: Packet) -> Packet {
        packet.tsig = Some(TsigInfo {
            key: name(KEY_NAME),
            mac: Vec::new(),
            original_id: packet.header.id,
        });
        packet
    }

    /// Builds the primary's response to an SOA query.
    fn soa_answer(request: &Packet, serial: u32) -> Packet {
        let mut response = request.reply();
        response.header.flags.aa = true;
        response.payload = Payload::Query {
            answer: vec![SectionEntry::new(
                name("example."),
                Rrset::new(Ttl::from(3600), RrData::Soa(soa(serial))),
            )],
            authority: Section::new(),
        };
        signed(response)
    }

    /// Builds the primary's AXFR response.
    fn axfr_answer(request: &Packet, serial: u32) -> Packet {
        let mut response = request.reply();
        response.header.flags.aa = true;
        response.payload = Payload::Axfr(Some(vec![
            SectionEntry::new(
                name("example."),
                Rrset::new(Ttl::from(3600), RrData::Soa(soa(serial))),
            ),
            SectionEntry::new(
                name("example."),
                Rrset::new(Ttl::from(3600), RrData::ns(name("ns1.example."))),
            ),
            SectionEntry::new(
                name("ns1.example."),
                Rrset::new(Ttl::from(3600), RrData::a("192.0.2.1".parse().unwrap())),
            ),
            // Out-of-zone data must be filtered out on application.
            SectionEntry::new(
                name("www.elsewhere."),
                Rrset::new(Ttl::from(3600), RrData::a("203.0.113.99".parse().unwrap())),
            ),
        ]));
        signed(response)
    }

    /// Walks a fresh secondary through its first transfer and returns
    /// it together with the time of completion.
    fn transferred_secondary() -> (Secondary, u64) {
        let mut secondary = secondary();
        let queries = secondary.timer(0, &mut rng());
        let soa_query = &queries[0].1;
        let follow_ups =
            secondary.handle(1, &mut rng(), primary_addr(), Transport::Udp, &soa_answer(soa_query, 10));
        let axfr_query = &follow_ups.1[0].1;
        secondary.handle(
            2,
            &mut rng(),
            primary_addr(),
            Transport::Tcp,
            &axfr_answer(axfr_query, 10),
        );
        (secondary, 2)
    }

    #[test]
    fn bootstrap_sends_an_immediate_soa_query() {
        let mut secondary = secondary();
        let queries = secondary.timer(0, &mut rng());
        assert_eq!(queries.len(), 1);
        let (peer, packet) = &queries[0];
        assert_eq!(*peer, primary_addr());
        assert_eq!(packet.question.qname, name("example."));
        assert_eq!(packet.question.qtype, Qtype::from(Type::SOA));
        assert!(matches!(
            secondary.state(&name("example.")),
            Some(TransferState::RequestedSoa { retry: 1, .. })
        ));
    }

    #[test]
    fn unanswered_soa_queries_are_retried_after_five_seconds() {
        let mut secondary = secondary();
        assert_eq!(secondary.timer(0, &mut rng()).len(), 1);
        assert!(secondary.timer(4, &mut rng()).is_empty());
        assert_eq!(secondary.timer(5, &mut rng()).len(), 1);
        assert!(matches!(
            secondary.state(&name("example.")),
            Some(TransferState::RequestedSoa { retry: 2, .. })
        ));
    }

    #[test]
    fn a_newer_serial_triggers_a_transfer() {
        let mut secondary = secondary();
        let queries = secondary.timer(0, &mut rng());
        let follow_ups = secondary.handle(
            1,
            &mut rng(),
            primary_addr(),
            Transport::Udp,
            &soa_answer(&queries[0].1, 10),
        );
        assert!(follow_ups.0.is_none());
        assert_eq!(follow_ups.1.len(), 1);
        assert_eq!(follow_ups.1[0].1.question.qtype, Qtype::AXFR);
        assert!(matches!(
            secondary.state(&name("example.")),
            Some(TransferState::RequestedAxfr { .. })
        ));
    }

    #[test]
    fn a_transfer_lands_the_zone_and_settles() {
        let (secondary, when) = transferred_secondary();
        assert_eq!(
            secondary.state(&name("example.")),
            Some(&TransferState::Transferred(when))
        );
        assert_eq!(secondary.data().soa(&name("example.")).unwrap().1.serial, 10);
        assert!(secondary
            .data()
            .get(&name("ns1.example."), Type::A)
            .is_some());
        // The out-of-zone record was filtered.
        assert!(secondary
            .data()
            .get(&name("www.elsewhere."), Type::A)
            .is_none());
    }

    #[test]
    fn an_equal_serial_just_settles() {
        let (mut secondary, _) = transferred_secondary();
        // Refresh comes due; the poll finds the same serial.
        let queries = secondary.timer(200, &mut rng());
        assert_eq!(queries.len(), 1);
        let follow_ups = secondary.handle(
            201,
            &mut rng(),
            primary_addr(),
            Transport::Udp,
            &soa_answer(&queries[0].1, 10),
        );
        assert!(follow_ups.1.is_empty());
        assert_eq!(
            secondary.state(&name("example.")),
            Some(&TransferState::Transferred(201))
        );
    }

    #[test]
    fn answers_from_strangers_are_ignored() {
        let mut secondary = secondary();
        let queries = secondary.timer(0, &mut rng());
        let stranger: SocketAddr = "198.51.100.99:53".parse().unwrap();
        let follow_ups = secondary.handle(
            1,
            &mut rng(),
            stranger,
            Transport::Udp,
            &soa_answer(&queries[0].1, 10),
        );
        assert!(follow_ups.1.is_empty());
        assert!(matches!(
            secondary.state(&name("example.")),
            Some(TransferState::RequestedSoa { .. })
        ));
    }

    #[test]
    fn unsigned_answers_are_ignored() {
        let mut secondary = secondary();
        let queries = secondary.timer(0, &mut rng());
        let mut answer = soa_answer(&queries[0].1, 10);
        answer.tsig = None;
        let follow_ups =
            secondary.handle(1, &mut rng(), primary_addr(), Transport::Udp, &answer);
        assert!(follow_ups.1.is_empty());
    }

    #[test]
    fn answers_with_the_wrong_id_are_ignored() {
        let mut secondary = secondary();
        let queries = secondary.timer(0, &mut rng());
        let mut answer = soa_answer(&queries[0].1, 10);
        answer.header.id = answer.header.id.wrapping_add(1);
        let follow_ups =
            secondary.handle(1, &mut rng(), primary_addr(), Transport::Udp, &answer);
        assert!(follow_ups.1.is_empty());
    }

    #[test]
    fn notify_from_the_primary_triggers_an_immediate_poll() {
        let (mut secondary, _) = transferred_secondary();
        let notify = Packet::notify(9, name("example."), Ttl::from(3600), soa(11));
        let (ack, queries) =
            secondary.handle(50, &mut rng(), primary_addr(), Transport::Udp, &notify);
        assert!(ack.unwrap().header.flags.qr);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].1.question.qtype, Qtype::from(Type::SOA));
        assert!(matches!(
            secondary.state(&name("example.")),
            Some(TransferState::RequestedSoa { .. })
        ));
    }

    #[test]
    fn notify_from_strangers_is_dropped() {
        let (mut secondary, _) = transferred_secondary();
        let notify = Packet::notify(9, name("example."), Ttl::from(3600), soa(11));
        let stranger: SocketAddr = "198.51.100.99:53".parse().unwrap();
        let (ack, queries) =
            secondary.handle(50, &mut rng(), stranger, Transport::Udp, &notify);
        assert!(ack.is_none());
        assert!(queries.is_empty());
        assert!(matches!(
            secondary.state(&name("example.")),
            Some(TransferState::Transferred(_))
        ));
    }

    #[test]
    fn silence_past_expiry_drops_the_zone() {
        let (mut secondary, _) = transferred_secondary();
        // Refresh fires at 102; the primary never answers again.
        assert_eq!(secondary.timer(200, &mut rng()).len(), 1);
        // Past ts + expire (200 + 1000), the zone is dropped.
        secondary.timer(1300, &mut rng());
        assert!(secondary.data().soa(&name("example.")).is_none());
    }

    #[test]
    fn refresh_is_scheduled_from_the_transfer_time() {
        let (mut secondary, when) = transferred_secondary();
        // Not yet: refresh is 100 seconds.
        assert!(secondary.timer(when + 99, &mut rng()).is_empty());
        assert_eq!(secondary.timer(when + 100, &mut rng()).len(), 1);
    }

    #[test]
    fn stale_transfers_are_not_applied() {
        let (mut secondary, _) = transferred_secondary();
        // Force another transfer cycle with an *older* serial.
        let queries = secondary.timer(200, &mut rng());
        let follow_ups = secondary.handle(
            201,
            &mut rng(),
            primary_addr(),
            Transport::Udp,
            &soa_answer(&queries[0].1, 12),
        );
        let axfr_query = &follow_ups.1[0].1;
        secondary.handle(
            202,
            &mut rng(),
            primary_addr(),
            Transport::Tcp,
            &axfr_answer(axfr_query, 9),
        );
        // The old data is retained.
        assert_eq!(secondary.data().soa(&name("example.")).unwrap().1.serial, 10);
        assert!(matches!(
            secondary.state(&name("example.")),
            Some(TransferState::Transferred(_))
        ));
    }
}
