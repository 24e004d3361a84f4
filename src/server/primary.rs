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

//! The primary role: serving queries, accepting updates, answering
//! transfers, and keeping secondaries informed with NOTIFY
//! ([RFC 1996]).
//!
//! When a zone changes, a NOTIFY is enqueued for every known
//! secondary: the zone's own NS addresses (except the primary itself),
//! the secondary peers named by transfer keys, and whoever has fetched
//! the zone over a transfer-key-signed AXFR. Pending NOTIFYs are
//! retransmitted on a fixed backoff ladder until the peer responds or
//! the ladder runs out.
//!
//! [RFC 1996]: https://datatracker.ietf.org/doc/html/rfc1996

use std::net::{IpAddr, SocketAddr};

use log::warn;
use rand::Rng;

use crate::message::{Opcode, Packet, Qtype, Rcode};
use crate::name::Name;
use crate::rr::{RrData, Type};
use crate::zone::ZoneTree;

use super::{Authenticator, Server, Transport};

/// Seconds between NOTIFY retransmissions: each entry is the delay
/// after the previous send. After the last attempt the notification is
/// dropped.
const RETRANSMITS: [u64; 5] = [5, 12, 25, 40, 60];

////////////////////////////////////////////////////////////////////////
// PRIMARY STATE                                                      //
////////////////////////////////////////////////////////////////////////

/// A NOTIFY subscription recorded from a transfer-key-signed AXFR.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Subscriber {
    zone: Name,
    peer: SocketAddr,
}

/// A NOTIFY awaiting acknowledgement.
#[derive(Clone, Debug)]
struct PendingNotify {
    sent: u64,
    retries: usize,
    peer: SocketAddr,
    packet: Packet,
}

/// A primary authoritative server.
#[derive(Clone, Debug)]
pub struct Primary {
    server: Server,
    subscribers: Vec<Subscriber>,
    pending: Vec<PendingNotify>,
    last_now: u64,
}

impl Primary {
    /// Creates a `Primary` serving the given zone data and keys.
    pub fn new(data: ZoneTree, auth: Authenticator) -> Self {
        Self {
            server: Server::new(data, auth),
            subscribers: Vec::new(),
            pending: Vec::new(),
            last_now: 0,
        }
    }

    /// Returns the zone data.
    pub fn data(&self) -> &ZoneTree {
        self.server.data()
    }

    /// Returns the authenticator.
    pub fn auth(&self) -> &Authenticator {
        self.server.auth()
    }

    /// Handles one received message. Returns the response to send back
    /// to `src` (if any) along with NOTIFY messages to transmit to
    /// other peers.
    pub fn handle<R: Rng>(
        &mut self,
        now: u64,
        rng: &mut R,
        src: SocketAddr,
        transport: Transport,
        packet: &Packet,
    ) -> (Option<Packet>, Vec<(SocketAddr, Packet)>) {
        let now = self.clamp(now);

        if packet.header.flags.qr {
            // The only responses a primary expects are NOTIFY
            // acknowledgements; they clear the matching pending entry.
            if packet.header.opcode == Opcode::Notify {
                self.pending
                    .retain(|p| !(p.peer.ip() == src.ip() && p.packet.header.id == packet.header.id));
            }
            return (None, Vec::new());
        }

        if let Err(rcode) = self.server.preflight(packet) {
            return (Some(packet.reply_error(rcode)), Vec::new());
        }

        match packet.header.opcode {
            Opcode::Query if packet.question.qtype == Qtype::AXFR => {
                let (response, by_transfer_key) = self.server.answer_axfr(transport, packet);
                if by_transfer_key && response.header.rcode == Rcode::NoError {
                    let subscriber = Subscriber {
                        zone: packet.question.qname.clone(),
                        peer: src,
                    };
                    if !self.subscribers.contains(&subscriber) {
                        self.subscribers.push(subscriber);
                    }
                }
                (Some(response), Vec::new())
            }
            Opcode::Query => (Some(self.server.answer_query(packet)), Vec::new()),
            Opcode::Update => {
                let outcome = self.server.apply_update(packet);
                let notifies = if outcome.data_changed {
                    self.notify(now, rng, &outcome.zone)
                } else {
                    Vec::new()
                };
                (Some(packet.reply_error(outcome.rcode)), notifies)
            }
            Opcode::Notify => {
                // RFC 1996 § 4.7: answer with an empty, authoritative
                // NOTIFY response. Nothing else changes on a primary.
                let mut response = packet.reply();
                response.header.flags.aa = true;
                (Some(response), Vec::new())
            }
            Opcode::Unimplemented(_) => {
                (Some(packet.reply_error(Rcode::NotImp)), Vec::new())
            }
        }
    }

    /// Enqueues a NOTIFY for every known secondary of `zone` and
    /// returns the initial transmissions.
    pub fn notify<R: Rng>(
        &mut self,
        now: u64,
        rng: &mut R,
        zone: &Name,
    ) -> Vec<(SocketAddr, Packet)> {
        let (ttl, soa) = match self.server.data.soa(zone) {
            Some((ttl, soa)) => (ttl, soa.clone()),
            None => return Vec::new(),
        };

        let mut out = Vec::new();
        for peer in self.notify_peers(zone, &soa) {
            let packet = Packet::notify(rng.gen(), zone.clone(), ttl, soa.clone());
            out.push((peer, packet.clone()));
            self.pending.push(PendingNotify {
                sent: now,
                retries: 0,
                peer,
                packet,
            });
        }
        out
    }

    /// Retransmits pending NOTIFYs whose deadline has passed, dropping
    /// entries that have exhausted the ladder.
    pub fn timer(&mut self, now: u64) -> Vec<(SocketAddr, Packet)> {
        let now = self.clamp(now);
        let mut out = Vec::new();
        self.pending.retain_mut(|p| {
            if now < p.sent + RETRANSMITS[p.retries] {
                return true;
            }
            out.push((p.peer, p.packet.clone()));
            p.sent = now;
            p.retries += 1;
            if p.retries == RETRANSMITS.len() {
                warn!(
                    "dropping notify of {} to {} after {} attempts",
                    p.packet.question.qname,
                    p.peer,
                    RETRANSMITS.len() + 1
                );
                return false;
            }
            true
        });
        out
    }

    /// The number of NOTIFYs awaiting acknowledgement.
    pub fn pending_notifies(&self) -> usize {
        self.pending.len()
    }

    /// Computes the peers to NOTIFY about `zone`: the addresses of its
    /// NS records (except the primary's own, named by the SOA MNAME),
    /// the secondary peers named by transfer keys, and the recorded
    /// transfer subscribers.
    fn notify_peers(&self, zone: &Name, soa: &crate::rr::Soa) -> Vec<SocketAddr> {
        let mut peers: Vec<SocketAddr> = Vec::new();
        let mut push = |peer: SocketAddr, peers: &mut Vec<SocketAddr>| {
            if !peers.contains(&peer) {
                peers.push(peer);
            }
        };

        if let Some(RrData::Ns(targets)) =
            self.server.data.get(zone, Type::NS).map(|rrset| &rrset.data)
        {
            for target in targets {
                if *target == soa.mname {
                    continue;
                }
                if let Some(RrData::A(addrs)) =
                    self.server.data.get(target, Type::A).map(|rrset| &rrset.data)
                {
                    for &addr in addrs {
                        push(SocketAddr::new(IpAddr::V4(addr), 53), &mut peers);
                    }
                }
            }
        }
        for peer in self.server.auth.secondaries(zone) {
            push(peer, &mut peers);
        }
        for subscriber in &self.subscribers {
            if subscriber.zone == *zone {
                push(subscriber.peer, &mut peers);
            }
        }
        peers
    }

    /// Timer inputs must not move backwards; a stale tick is treated
    /// as the latest one seen.
    fn clamp(&mut self, now: u64) -> u64 {
        self.last_now = self.last_now.max(now);
        self.last_now
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
