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

//! Scrubbing of received DNS answers into cache insertions.
//!
//! The scrubber classifies each relevant RRset of a response,
//! following the CNAME chain in the answer section and finding the
//! authority SOA for negative results, and assigns each piece a
//! [`Rank`] reflecting how much the data is to be trusted. The stub
//! ruleset implemented here believes answers from the server it
//! queried; it does not rank authority NS records, harvest glue, or
//! enforce bailiwick the way a full recursive resolver must.
//!
//! When a negative result arrives without any usable SOA in the
//! authority section, one is synthesized under `invalid.<qname>` so
//! that the failure is cached and the same question is not asked again
//! in a tight loop.

use std::collections::BTreeSet;

use log::warn;

use crate::cache::{Cache, Item, Rank};
use crate::message::{find_rrset, Packet, Payload, Qtype, Rcode, Section};
use crate::name::{LabelBuf, Name};
use crate::rr::{RrData, Soa, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// SCRUB RESULTS                                                      //
////////////////////////////////////////////////////////////////////////

/// One cache insertion produced by scrubbing a response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Insertion {
    pub rtype: Type,
    pub owner: Name,
    pub rank: Rank,
    pub item: Item,
}

/// An error that prevents a response from being scrubbed at all.
/// (Problems with individual RRsets only cause those RRsets to be
/// dropped.)
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The response's RCODE is not one the scrubber handles.
    UnexpectedRcode(Rcode),

    /// The response does not carry QUERY answer sections.
    NotAnAnswer,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Self::UnexpectedRcode(rcode) => write!(f, "unexpected RCODE {:?}", rcode),
            Self::NotAnAnswer => f.write_str("the message is not a QUERY response"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// SCRUBBING                                                          //
////////////////////////////////////////////////////////////////////////

/// Scrubs a received response into a list of cache insertions.
pub fn scrub(packet: &Packet) -> Result<Vec<Insertion>, Error> {
    let (answer, authority) = match packet.payload {
        Payload::Query {
            ref answer,
            ref authority,
        } => (answer, authority),
        _ => return Err(Error::NotAnAnswer),
    };

    let qname = &packet.question.qname;
    let qtype = packet.question.qtype;
    let answer_rank = if packet.header.flags.aa {
        Rank::AuthoritativeAnswer
    } else {
        Rank::NonAuthoritativeAnswer
    };

    match packet.header.rcode {
        Rcode::NoError => {
            let mut insertions = Vec::new();
            let terminal = chase_chain(qname, answer, &mut insertions);
            scrub_terminal(
                &terminal,
                qtype,
                answer,
                authority,
                answer_rank,
                &mut insertions,
            );
            Ok(insertions)
        }
        Rcode::NxDomain => {
            let mut insertions = Vec::new();
            let terminal = chase_chain(qname, answer, &mut insertions);
            let (ttl, soa_owner, soa) = match find_soa(&terminal, authority) {
                Some((owner, rrset_ttl, soa)) => {
                    (negative_ttl(rrset_ttl, &soa), owner, soa)
                }
                None => {
                    let soa = invalid_soa(&terminal);
                    (Ttl::from(soa.minimum), terminal.clone(), soa)
                }
            };
            insertions.push(Insertion {
                rtype: Type::CNAME,
                owner: qname.clone(),
                rank: answer_rank,
                item: Item::NoDomain {
                    owner: soa_owner,
                    ttl,
                    soa,
                },
            });
            Ok(insertions)
        }
        Rcode::ServFail => {
            let soa = invalid_soa(qname);
            Ok(vec![Insertion {
                rtype: Type::CNAME,
                owner: qname.clone(),
                rank: Rank::NonAuthoritativeAnswer,
                item: Item::ServFail {
                    owner: qname.clone(),
                    ttl: Ttl::from(soa.minimum),
                    soa,
                },
            }])
        }
        rcode => Err(Error::UnexpectedRcode(rcode)),
    }
}

/// Scrubs `packet` and applies the resulting insertions to `cache`.
pub fn scrub_into(cache: &mut Cache, now: u64, packet: &Packet) -> Result<(), Error> {
    for insertion in scrub(packet)? {
        cache.insert(
            now,
            insertion.rtype,
            &insertion.owner,
            insertion.rank,
            insertion.item,
        );
    }
    Ok(())
}

/// Follows the CNAME chain in the answer section starting at `qname`,
/// emitting an alias insertion per link, and returns the terminal
/// name. Cycles are broken by refusing to revisit a name; the broken
/// link is dropped with a warning.
fn chase_chain(qname: &Name, answer: &Section, insertions: &mut Vec<Insertion>) -> Name {
    let mut seen = BTreeSet::new();
    let mut current = qname.clone();
    while let Some(rrset) = find_rrset(answer, &current, Type::CNAME) {
        let target = match rrset.data {
            RrData::Cname(ref target) => target.clone(),
            _ => break,
        };
        if !seen.insert(current.clone()) {
            warn!("answer for {qname} contains a CNAME loop at {current}; dropping the loop");
            break;
        }
        insertions.push(Insertion {
            rtype: Type::CNAME,
            owner: current.clone(),
            rank: Rank::NonAuthoritativeAnswer,
            item: Item::Entry(rrset.clone()),
        });
        current = target;
    }
    current
}

/// Emits the insertions for the terminal name of a NoError answer:
/// either the RRset(s) present in the answer section, or a NoData
/// marker backed by the authority SOA.
fn scrub_terminal(
    terminal: &Name,
    qtype: Qtype,
    answer: &Section,
    authority: &Section,
    rank: Rank,
    insertions: &mut Vec<Insertion>,
) {
    let mut found = false;
    for entry in answer {
        if entry.owner != *terminal || entry.rrset.rtype() == Type::CNAME {
            continue;
        }
        if qtype != Qtype::ANY && qtype.data_type() != Some(entry.rrset.rtype()) {
            continue;
        }
        found = true;
        insertions.push(Insertion {
            rtype: entry.rrset.rtype(),
            owner: terminal.clone(),
            rank,
            item: Item::Entry(entry.rrset.clone()),
        });
    }
    if !found {
        let (ttl, soa_owner, soa) = match find_soa(terminal, authority) {
            Some((owner, rrset_ttl, soa)) => (negative_ttl(rrset_ttl, &soa), owner, soa),
            None => {
                let soa = invalid_soa(terminal);
                (Ttl::from(soa.minimum), terminal.clone(), soa)
            }
        };
        insertions.push(Insertion {
            rtype: qtype.data_type().unwrap_or(Type::CNAME),
            owner: terminal.clone(),
            rank,
            item: Item::NoData {
                owner: soa_owner,
                ttl,
                soa,
            },
        });
    }
}

/// Walks from `name` toward the root looking for an SOA RRset in the
/// authority section, per [RFC 2308 § 5]'s placement of the negative
/// caching SOA at the enclosing zone.
///
/// [RFC 2308 § 5]: https://datatracker.ietf.org/doc/html/rfc2308#section-5
pub fn find_soa(name: &Name, authority: &Section) -> Option<(Name, Ttl, Soa)> {
    for skip in 0..=name.len() {
        let candidate = name.superdomain(skip).unwrap();
        if let Some(rrset) = find_rrset(authority, &candidate, Type::SOA) {
            if let RrData::Soa(ref soa) = rrset.data {
                return Some((candidate, rrset.ttl, soa.clone()));
            }
        }
    }
    None
}

/// The TTL of a negative result, per [RFC 2308 § 3]: the smaller of
/// the SOA RRset's own TTL and the SOA MINIMUM field.
///
/// [RFC 2308 § 3]: https://datatracker.ietf.org/doc/html/rfc2308#section-3
fn negative_ttl(soa_rrset_ttl: Ttl, soa: &Soa) -> Ttl {
    soa_rrset_ttl.min(Ttl::from(soa.minimum))
}

/// Synthesizes a fallback SOA under `invalid.<name>` for caching a
/// negative result that arrived without one. Without this, the same
/// failed question would be re-asked in a loop.
pub fn invalid_soa(name: &Name) -> Soa {
    let under_invalid = |label: &str| {
        name.child(LabelBuf::try_from("invalid").unwrap())
            .and_then(|invalid| invalid.child(LabelBuf::try_from(label).unwrap()))
            .unwrap_or_else(|_| name.clone())
    };
    Soa {
        mname: under_invalid("ns"),
        rname: under_invalid("hostmaster"),
        serial: 1,
        refresh: 16384,
        retry: 2048,
        expire: 1_048_576,
        minimum: 300,
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Question, SectionEntry};
    use crate::rr::Rrset;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn soa() -> Soa {
        Soa {
            mname: name("ns1.example."),
            rname: name("hostmaster.example."),
            serial: 1,
            refresh: 86400,
            retry: 7200,
            expire: 3600000,
            minimum: 300,
        }
    }

    fn a_entry(owner: &str, addr: &str) -> SectionEntry {
        SectionEntry::new(
            name(owner),
            Rrset::new(Ttl::from(60), RrData::a(addr.parse().unwrap())),
        )
    }

    fn cname_entry(owner: &str, target: &str) -> SectionEntry {
        SectionEntry::new(
            name(owner),
            Rrset::new(Ttl::from(60), RrData::Cname(name(target))),
        )
    }

    fn response(qname: &str, qtype: Qtype, rcode: Rcode, answer: Section) -> Packet {
        let mut packet = Packet::query(1, Question::new(name(qname), qtype));
        let mut reply = packet.reply();
        reply.header.rcode = rcode;
        reply.payload = Payload::Query {
            answer,
            authority: Section::new(),
        };
        packet = reply;
        packet
    }

    #[test]
    fn a_plain_answer_yields_one_entry() {
        let packet = response(
            "www.example.",
            Type::A.into(),
            Rcode::NoError,
            vec![a_entry("www.example.", "192.0.2.1")],
        );
        let insertions = scrub(&packet).unwrap();
        assert_eq!(insertions.len(), 1);
        assert_eq!(insertions[0].owner, name("www.example."));
        assert_eq!(insertions[0].rtype, Type::A);
        assert_eq!(insertions[0].rank, Rank::NonAuthoritativeAnswer);
    }

    #[test]
    fn the_authoritative_flag_raises_the_rank() {
        let mut packet = response(
            "www.example.",
            Type::A.into(),
            Rcode::NoError,
            vec![a_entry("www.example.", "192.0.2.1")],
        );
        packet.header.flags.aa = true;
        let insertions = scrub(&packet).unwrap();
        assert_eq!(insertions[0].rank, Rank::AuthoritativeAnswer);
    }

    #[test]
    fn cname_chains_are_walked_to_the_terminal() {
        let packet = response(
            "a.example.",
            Type::A.into(),
            Rcode::NoError,
            vec![
                cname_entry("a.example.", "b.example."),
                cname_entry("b.example.", "c.example."),
                a_entry("c.example.", "192.0.2.7"),
            ],
        );
        let insertions = scrub(&packet).unwrap();
        assert_eq!(insertions.len(), 3);
        assert_eq!(insertions[0].owner, name("a.example."));
        assert_eq!(insertions[0].rtype, Type::CNAME);
        assert_eq!(insertions[1].owner, name("b.example."));
        assert_eq!(insertions[2].owner, name("c.example."));
        assert_eq!(insertions[2].rtype, Type::A);
    }

    #[test]
    fn cname_loops_terminate() {
        let packet = response(
            "a.example.",
            Type::A.into(),
            Rcode::NoError,
            vec![
                cname_entry("a.example.", "b.example."),
                cname_entry("b.example.", "a.example."),
            ],
        );
        let insertions = scrub(&packet).unwrap();
        // Both links are cached, plus a NoData marker for the point
        // where the loop was broken.
        assert!(insertions.len() >= 2);
    }

    #[test]
    fn a_missing_answer_becomes_nodata_with_the_authority_soa() {
        let mut packet = response("www.example.", Type::AAAA.into(), Rcode::NoError, vec![]);
        if let Payload::Query {
            ref mut authority, ..
        } = packet.payload
        {
            authority.push(SectionEntry::new(
                name("example."),
                Rrset::new(Ttl::from(3600), RrData::Soa(soa())),
            ));
        }
        let insertions = scrub(&packet).unwrap();
        assert_eq!(insertions.len(), 1);
        assert_eq!(insertions[0].rtype, Type::AAAA);
        match insertions[0].item {
            Item::NoData {
                ref owner, ttl, ..
            } => {
                assert_eq!(*owner, name("example."));
                // min(SOA RRset TTL, SOA MINIMUM)
                assert_eq!(ttl, Ttl::from(300));
            }
            ref other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[test]
    fn a_missing_soa_synthesizes_an_invalid_one() {
        let packet = response("www.example.", Type::A.into(), Rcode::NoError, vec![]);
        let insertions = scrub(&packet).unwrap();
        match insertions[0].item {
            Item::NoData { ref soa, .. } => {
                assert_eq!(soa.mname, name("ns.invalid.www.example."));
                assert_eq!(soa.rname, name("hostmaster.invalid.www.example."));
                assert_eq!(soa.serial, 1);
                assert_eq!(soa.minimum, 300);
            }
            ref other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[test]
    fn nxdomain_is_cached_at_the_query_name() {
        let mut packet = response("gone.example.", Type::A.into(), Rcode::NxDomain, vec![]);
        packet.header.flags.aa = true;
        if let Payload::Query {
            ref mut authority, ..
        } = packet.payload
        {
            authority.push(SectionEntry::new(
                name("example."),
                Rrset::new(Ttl::from(3600), RrData::Soa(soa())),
            ));
        }
        let insertions = scrub(&packet).unwrap();
        assert_eq!(insertions.len(), 1);
        assert_eq!(insertions[0].owner, name("gone.example."));
        assert_eq!(insertions[0].rtype, Type::CNAME);
        assert_eq!(insertions[0].rank, Rank::AuthoritativeAnswer);
        assert!(matches!(insertions[0].item, Item::NoDomain { .. }));
    }

    #[test]
    fn servfail_is_cached_against_a_synthetic_soa() {
        let packet = response("www.example.", Type::A.into(), Rcode::ServFail, vec![]);
        let insertions = scrub(&packet).unwrap();
        assert_eq!(insertions.len(), 1);
        match insertions[0].item {
            Item::ServFail { ttl, .. } => assert_eq!(ttl, Ttl::from(300)),
            ref other => panic!("expected ServFail, got {other:?}"),
        }
    }

    #[test]
    fn other_rcodes_are_an_error() {
        let packet = response("www.example.", Type::A.into(), Rcode::Refused, vec![]);
        assert_eq!(
            scrub(&packet),
            Err(Error::UnexpectedRcode(Rcode::Refused))
        );
    }
}
