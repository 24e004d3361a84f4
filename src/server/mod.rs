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

//! The processing logic of an authoritative DNS server.
//!
//! The [`Server`] structure holds what every authoritative role needs:
//! the data [`ZoneTree`] and the [`Authenticator`] with its key store.
//! It implements the per-message state machine (QUERY answering with
//! referrals and additional-section glue, RFC 2136 UPDATE, AXFR, and
//! NOTIFY) as pure functions from a decoded [`Packet`] to a response
//! and outgoing side effects. The [`Primary`] and [`Secondary`]
//! structures wrap a `Server` with the replication state of their
//! role: a primary fans out and retransmits NOTIFYs, a secondary polls
//! SOAs and applies transfers.
//!
//! Network I/O lives entirely outside: the caller decodes received
//! messages, hands them to [`Primary::handle`] or
//! [`Secondary::handle`] along with the current time and a random
//! source, transmits whatever comes back, and calls the `timer`
//! methods as its clock ticks.

use crate::message::{Packet, Rcode};
use crate::zone::ZoneTree;

pub mod auth;
mod primary;
mod query;
mod secondary;
mod update;

pub use auth::Authenticator;
pub use primary::Primary;
pub use secondary::{Secondary, TransferState};

////////////////////////////////////////////////////////////////////////
// TRANSPORTS                                                         //
////////////////////////////////////////////////////////////////////////

/// Indicates the transport through which a DNS message was received.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Transport {
    Udp,
    Tcp,
}

////////////////////////////////////////////////////////////////////////
// THE SERVER CORE                                                    //
////////////////////////////////////////////////////////////////////////

/// The state shared by every authoritative role: the zone data and the
/// key store.
#[derive(Clone, Debug)]
pub struct Server {
    pub(crate) data: ZoneTree,
    pub(crate) auth: Authenticator,
}

impl Server {
    /// Creates a `Server` holding the given zone data and keys.
    pub fn new(data: ZoneTree, auth: Authenticator) -> Self {
        Self { data, auth }
    }

    /// Returns the zone data.
    pub fn data(&self) -> &ZoneTree {
        &self.data
    }

    /// Returns the authenticator.
    pub fn auth(&self) -> &Authenticator {
        &self.auth
    }

    /// The checks every received request goes through before
    /// opcode-specific handling: the EDNS version (anything but 0 is
    /// `BadVers`, per RFC 6891 § 6.1.3) and the class (only IN is
    /// served).
    pub(crate) fn preflight(&self, packet: &Packet) -> Result<(), Rcode> {
        if let Some(edns) = packet.edns {
            if edns.version != 0 {
                return Err(Rcode::BadVers);
            }
        }
        if !packet.question.qclass.is_internet() {
            return Err(Rcode::Refused);
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::class::Class;
    use crate::message::{
        Edns, Header, Opcode, Payload, Question, Section, TsigInfo, UpdateOp,
    };
    use crate::name::Name;
    use crate::rr::{Dnskey, RrData, Rrset, Soa, Ttl, Type};

    #[test]
    fn preflight_rejects_unknown_edns_versions() {
        let server = Server::new(ZoneTree::new(), Authenticator::default());
        let mut packet = Packet::query(
            1,
            Question::new("example.".parse().unwrap(), Type::A.into()),
        );
        packet.edns = Some(Edns {
            version: 1,
            payload_size: 4096,
        });
        assert_eq!(server.preflight(&packet), Err(Rcode::BadVers));
        packet.edns = Some(Edns {
            version: 0,
            payload_size: 4096,
        });
        assert_eq!(server.preflight(&packet), Ok(()));
    }

    #[test]
    fn preflight_rejects_non_in_classes() {
        let server = Server::new(ZoneTree::new(), Authenticator::default());
        let mut packet = Packet::query(
            1,
            Question::new("example.".parse().unwrap(), Type::A.into()),
        );
        packet.question.qclass = Class::from(3); // CHAOS
        assert_eq!(server.preflight(&packet), Err(Rcode::Refused));
    }

    ////////////////////////////////////////////////////////////////////
    // PRIMARY/SECONDARY CONVERGENCE                                  //
    ////////////////////////////////////////////////////////////////////

    const TRANSFER_KEY: &str = "192\\.0\\.2\\.1.203\\.0\\.113\\.9._transfer.example.";
    const UPDATE_KEY: &str = "laptop._update.example.";

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn dnskey() -> Dnskey {
        Dnskey {
            flags: 0,
            algorithm: 163,
            key: b"not a real secret".to_vec(),
        }
    }

    fn keys() -> Authenticator {
        Authenticator::new([
            (name(TRANSFER_KEY), dnskey()),
            (name(UPDATE_KEY), dnskey()),
        ])
    }

    fn primary() -> Primary {
        let mut tree = ZoneTree::new();
        tree.insert(
            &name("example."),
            Rrset::new(
                Ttl::from(3600),
                RrData::Soa(Soa {
                    mname: name("ns1.example."),
                    rname: name("hostmaster.example."),
                    serial: 10,
                    refresh: 100,
                    retry: 20,
                    expire: 1000,
                    minimum: 300,
                }),
            ),
        );
        tree.insert(
            &name("example."),
            Rrset::new(Ttl::from(3600), RrData::ns(name("ns1.example."))),
        );
        tree.insert(
            &name("ns1.example."),
            Rrset::new(Ttl::from(3600), RrData::a("192.0.2.1".parse().unwrap())),
        );
        Primary::new(tree, keys())
    }

    /// Stands in for the external TSIG layer, which signs a message
    /// with the named key before it goes on the wire.
    fn sign(mut packet: Packet, key: &str) -> Packet {
        packet.tsig = Some(TsigInfo {
            key: name(key),
            mac: Vec::new(),
            original_id: packet.header.id,
        });
        packet
    }

    /// Delivers the secondary's outstanding queries to the primary and
    /// the primary's answers back, until the exchange quiesces.
    fn converge(
        primary: &mut Primary,
        secondary: &mut Secondary,
        mut queries: Vec<(SocketAddr, Packet)>,
        now: u64,
    ) {
        let secondary_addr: SocketAddr = "203.0.113.9:53".parse().unwrap();
        let mut rng = StepRng::new(99, 1);
        for _ in 0..8 {
            let mut next = Vec::new();
            for (peer, query) in queries.drain(..) {
                let transport = if query.question.qtype == crate::message::Qtype::AXFR {
                    Transport::Tcp
                } else {
                    Transport::Udp
                };
                let signed = sign(query, TRANSFER_KEY);
                let (response, _) =
                    primary.handle(now, &mut rng, secondary_addr, transport, &signed);
                if let Some(response) = response {
                    let (_, follow_ups) = secondary.handle(
                        now,
                        &mut rng,
                        peer,
                        transport,
                        &sign(response, TRANSFER_KEY),
                    );
                    next.extend(follow_ups);
                }
            }
            if next.is_empty() {
                break;
            }
            queries = next;
        }
    }

    #[test]
    fn a_secondary_converges_on_the_primary_zone() {
        let mut primary = primary();
        let mut secondary = Secondary::new(keys());
        let mut rng = StepRng::new(3, 1);

        let queries = secondary.timer(0, &mut rng);
        assert_eq!(queries.len(), 1);
        converge(&mut primary, &mut secondary, queries, 1);

        assert_eq!(
            secondary.data().entries(&name("example.")).unwrap(),
            primary.data().entries(&name("example.")).unwrap(),
        );

        // The primary commits an update; its NOTIFY reaches the
        // secondary, which polls and transfers the new contents.
        let update = sign(
            Packet {
                header: Header::request(77, Opcode::Update),
                question: Question::new(name("example."), Type::SOA.into()),
                payload: Payload::Update {
                    prereqs: Vec::new(),
                    updates: vec![UpdateOp::Add(
                        name("www.example."),
                        Rrset::new(Ttl::from(60), RrData::a("192.0.2.80".parse().unwrap())),
                    )],
                },
                additional: Section::new(),
                edns: None,
                tsig: None,
            },
            UPDATE_KEY,
        );
        let client: SocketAddr = "198.51.100.7:5300".parse().unwrap();
        let (response, notifies) =
            primary.handle(10, &mut rng, client, Transport::Udp, &update);
        assert_eq!(response.unwrap().header.rcode, Rcode::NoError);
        let (_, notify) = notifies
            .iter()
            .find(|(peer, _)| *peer == "203.0.113.9:53".parse().unwrap())
            .unwrap();

        let primary_addr: SocketAddr = "192.0.2.1:53".parse().unwrap();
        let (ack, follow_ups) =
            secondary.handle(11, &mut rng, primary_addr, Transport::Udp, notify);
        assert!(ack.is_some());
        converge(&mut primary, &mut secondary, follow_ups, 12);

        assert_eq!(
            secondary.data().soa(&name("example.")).unwrap().1.serial,
            11
        );
        assert_eq!(
            secondary.data().entries(&name("example.")).unwrap(),
            primary.data().entries(&name("example.")).unwrap(),
        );
    }
}
