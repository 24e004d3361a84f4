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

//! The resolver engine: answering questions from the cache, and
//! telling the caller which query to send next when the cache is not
//! enough.
//!
//! [`resolve`] is the single entry point. It consults the [`Cache`]
//! and produces either a finished [`Reply`] or an [`OutboundQuery`]
//! the caller must transmit. The response to an outbound query is
//! [scrubbed](scrub) into the cache, after which the caller drives
//! [`resolve`] again with the original question; resolution therefore
//! makes progress one network round-trip at a time, with all state in
//! the cache.
//!
//! Alias chains are chased through the cache with cycle detection, and
//! nameserver selection walks from the query name toward the root
//! looking for a cached NS RRset with a usable address, choosing
//! uniformly at random (with the caller's random source) among the
//! addresses available.

use std::net::IpAddr;

use arrayvec::ArrayVec;
use rand::Rng;

use crate::cache::{self, Cache, Response};
use crate::message::{Flags, Qtype, Question, Rcode, Section, SectionEntry};
use crate::name::Name;
use crate::rr::{RrData, Rrset, Soa, Ttl, Type};

pub mod scrub;

/// The maximum number of links in an alias chain that we will follow
/// before giving up and returning SERVFAIL.
const MAX_CNAME_CHAIN_LEN: usize = 8;

/// The maximum number of times resolution may recurse internally (one
/// alias chain hop or nameserver-address indirection per level).
const MAX_INDIRECTIONS: usize = 8;

////////////////////////////////////////////////////////////////////////
// RESULT TYPES                                                       //
////////////////////////////////////////////////////////////////////////

/// A finished response, assembled entirely from the cache.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub rcode: Rcode,
    pub flags: Flags,
    pub answer: Section,
    pub authority: Section,
}

/// A query the caller must transmit to make progress.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutboundQuery {
    /// The zone whose nameserver is being asked.
    pub zone: Name,
    pub qname: Name,
    pub qtype: Qtype,
    pub server: IpAddr,
}

/// The outcome of one step of resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Progress {
    Reply(Reply),
    Query(OutboundQuery),
}

/// An error that stops resolution entirely.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// No root server is reachable through the cache. Root hints are
    /// loaded by the caller at startup, so this is a configuration
    /// fault.
    NoRootServer,

    /// An SRV question whose name does not have the
    /// `_service._proto.owner` shape.
    NotAServiceName(Name),

    /// Resolution recursed too deeply (runaway alias or nameserver
    /// indirection).
    TooManyIndirections,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Self::NoRootServer => f.write_str("no root server address is cached"),
            Self::NotAServiceName(ref name) => {
                write!(f, "{name} is not a service (_service._proto) name")
            }
            Self::TooManyIndirections => f.write_str("resolution recursed too deeply"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// THE ENGINE                                                         //
////////////////////////////////////////////////////////////////////////

/// Performs one step of resolution for `question` against `cache`.
pub fn resolve<R: Rng>(
    cache: &mut Cache,
    now: u64,
    rng: &mut R,
    question: &Question,
) -> Result<Progress, Error> {
    answer(cache, now, rng, &question.qname, question.qtype, 0)
}

/// Step 1: try to answer `(qtype, qname)` from the cache.
fn answer<R: Rng>(
    cache: &mut Cache,
    now: u64,
    rng: &mut R,
    qname: &Name,
    qtype: Qtype,
    depth: usize,
) -> Result<Progress, Error> {
    if depth > MAX_INDIRECTIONS {
        return Err(Error::TooManyIndirections);
    }
    match cache.query(now, qtype, qname) {
        Ok(Response::Entry(rrset)) => Ok(reply(
            Rcode::NoError,
            vec![SectionEntry::new(qname.clone(), rrset)],
            Section::new(),
        )),
        Ok(Response::Entries(entries)) => Ok(reply(
            Rcode::NoError,
            entries
                .into_values()
                .map(|rrset| SectionEntry::new(qname.clone(), rrset))
                .collect(),
            Section::new(),
        )),
        Ok(Response::NoData { owner, ttl, soa }) => Ok(reply(
            Rcode::NoError,
            Section::new(),
            vec![soa_entry(owner, ttl, soa)],
        )),
        Ok(Response::NoDomain { owner, ttl, soa }) => Ok(reply(
            Rcode::NxDomain,
            Section::new(),
            vec![soa_entry(owner, ttl, soa)],
        )),
        Ok(Response::ServFail { .. }) => {
            Ok(reply(Rcode::ServFail, Section::new(), Section::new()))
        }
        Ok(Response::Alias { ttl, target }) => {
            if qtype == Qtype::from(Type::CNAME) {
                let rrset = Rrset::new(ttl, RrData::Cname(target));
                Ok(reply(
                    Rcode::NoError,
                    vec![SectionEntry::new(qname.clone(), rrset)],
                    Section::new(),
                ))
            } else {
                follow_cname(cache, now, rng, qname, qtype, ttl, target, depth)
            }
        }
        Err(cache::Error::Miss | cache::Error::Drop) => {
            out_of_cache(cache, now, rng, qname, qtype, depth)
        }
    }
}

/// Step 2: chase an alias chain through the cache, accumulating each
/// link into the answer section. Cycles terminate the chain with the
/// links collected so far; chains longer than [`MAX_CNAME_CHAIN_LEN`]
/// give up with SERVFAIL.
#[allow(clippy::too_many_arguments)]
fn follow_cname<R: Rng>(
    cache: &mut Cache,
    now: u64,
    rng: &mut R,
    qname: &Name,
    qtype: Qtype,
    first_ttl: Ttl,
    first_target: Name,
    depth: usize,
) -> Result<Progress, Error> {
    let mut answer_section = vec![SectionEntry::new(
        qname.clone(),
        Rrset::new(first_ttl, RrData::Cname(first_target.clone())),
    )];
    let mut seen: ArrayVec<Name, MAX_CNAME_CHAIN_LEN> = ArrayVec::new();
    seen.push(qname.clone());
    let mut current = first_target;

    loop {
        if seen.contains(&current) {
            // The chain loops; answer with the links collected.
            return Ok(reply(Rcode::NoError, answer_section, Section::new()));
        }
        match cache.query(now, qtype, &current) {
            Ok(Response::Alias { ttl, target }) => {
                answer_section.push(SectionEntry::new(
                    current.clone(),
                    Rrset::new(ttl, RrData::Cname(target.clone())),
                ));
                if seen.try_push(current).is_err() {
                    return Ok(reply(Rcode::ServFail, Section::new(), Section::new()));
                }
                current = target;
            }
            Ok(Response::Entry(rrset)) => {
                answer_section.push(SectionEntry::new(current, rrset));
                return Ok(reply(Rcode::NoError, answer_section, Section::new()));
            }
            Ok(Response::Entries(entries)) => {
                for rrset in entries.into_values() {
                    answer_section.push(SectionEntry::new(current.clone(), rrset));
                }
                return Ok(reply(Rcode::NoError, answer_section, Section::new()));
            }
            Ok(Response::NoData { owner, ttl, soa }) => {
                return Ok(reply(
                    Rcode::NoError,
                    answer_section,
                    vec![soa_entry(owner, ttl, soa)],
                ));
            }
            Ok(Response::NoDomain { owner, ttl, soa }) => {
                return Ok(reply(
                    Rcode::NxDomain,
                    answer_section,
                    vec![soa_entry(owner, ttl, soa)],
                ));
            }
            Ok(Response::ServFail { .. }) => {
                return Ok(reply(Rcode::ServFail, Section::new(), Section::new()));
            }
            Err(cache::Error::Miss | cache::Error::Drop) => {
                return out_of_cache(cache, now, rng, &current, qtype, depth + 1);
            }
        }
    }
}

/// Step 3: the cache cannot answer, so pick the nearest known
/// nameserver and emit the query to send.
fn out_of_cache<R: Rng>(
    cache: &mut Cache,
    now: u64,
    rng: &mut R,
    qname: &Name,
    qtype: Qtype,
    depth: usize,
) -> Result<Progress, Error> {
    if depth > MAX_INDIRECTIONS {
        return Err(Error::TooManyIndirections);
    }

    // Service-name shortcut: an SRV question is resolved by querying
    // the NS of the owner under the `_service._proto` labels. Any
    // other SRV question is malformed.
    let (qname, qtype) = if qtype == Qtype::from(Type::SRV) {
        if is_service_name(qname) {
            (qname.superdomain(2).unwrap(), Qtype::from(Type::NS))
        } else {
            return Err(Error::NotAServiceName(qname.clone()));
        }
    } else {
        (qname.clone(), qtype)
    };

    match find_nearest_ns(cache, now, rng, &qname)? {
        NsChoice::Server { zone, server } => Ok(Progress::Query(OutboundQuery {
            zone,
            qname,
            qtype,
            server,
        })),
        NsChoice::NeedAddress(ns_name) => {
            // A nameserver is known by name only; resolve its address
            // first. The caller re-drives us with the original
            // question once the address lands in the cache.
            match answer(cache, now, rng, &ns_name, Type::A.into(), depth + 1)? {
                progress @ Progress::Query(_) => Ok(progress),
                Progress::Reply(_) => {
                    // The cache answered the address question in a
                    // roundabout way (e.g. through an alias); retry
                    // the selection with whatever landed.
                    out_of_cache(cache, now, rng, &qname, qtype, depth + 1)
                }
            }
        }
    }
}

/// The result of nameserver selection.
enum NsChoice {
    /// A server for `zone` with a cached address.
    Server { zone: Name, server: IpAddr },

    /// A nameserver is known, but no address for it is cached.
    NeedAddress(Name),
}

/// Walks from `qname` toward the root looking for a cached NS RRset
/// whose servers have cached addresses, choosing uniformly at random
/// among the addresses found. A delegation whose in-zone servers lack
/// glue is useless, so it is skipped in favor of the next zone up;
/// out-of-zone servers without cached addresses are reported as
/// [`NsChoice::NeedAddress`] for the engine to resolve first.
fn find_nearest_ns<R: Rng>(
    cache: &mut Cache,
    now: u64,
    rng: &mut R,
    qname: &Name,
) -> Result<NsChoice, Error> {
    for skip in 0..=qname.len() {
        let zone = qname.superdomain(skip).unwrap();
        let targets = match cache.query(now, Type::NS.into(), &zone) {
            Ok(Response::Entry(Rrset {
                data: RrData::Ns(targets),
                ..
            })) => targets,
            _ => continue,
        };

        let mut addresses: Vec<IpAddr> = Vec::new();
        let mut unglued: Vec<Name> = Vec::new();
        for target in &targets {
            match cache.query(now, Type::A.into(), target) {
                Ok(Response::Entry(Rrset {
                    data: RrData::A(addrs),
                    ..
                })) => addresses.extend(addrs.iter().map(|&a| IpAddr::V4(a))),
                _ => unglued.push(target.clone()),
            }
        }

        if !addresses.is_empty() {
            let server = addresses[rng.gen_range(0..addresses.len())];
            return Ok(NsChoice::Server { zone, server });
        }

        // No addresses at all. Servers under this zone would need glue
        // that is not there, so they cannot help; an out-of-zone
        // server's address can still be resolved.
        let out_of_zone: Vec<Name> = unglued
            .into_iter()
            .filter(|target| !target.eq_or_subdomain_of(&zone))
            .collect();
        if !out_of_zone.is_empty() {
            let pick = rng.gen_range(0..out_of_zone.len());
            return Ok(NsChoice::NeedAddress(out_of_zone[pick].clone()));
        }
    }
    Err(Error::NoRootServer)
}

/// Returns whether `name` has the `_service._proto.owner` shape.
fn is_service_name(name: &Name) -> bool {
    name.len() >= 3
        && name.label(0).map_or(false, |l| l.octets().starts_with(b"_"))
        && name.label(1).map_or(false, |l| l.octets().starts_with(b"_"))
}

fn reply(rcode: Rcode, answer: Section, authority: Section) -> Progress {
    Progress::Reply(Reply {
        rcode,
        flags: Flags {
            qr: true,
            ra: true,
            ..Flags::default()
        },
        answer,
        authority,
    })
}

fn soa_entry(owner: Name, ttl: Ttl, soa: Soa) -> SectionEntry {
    SectionEntry::new(owner, Rrset::new(ttl, RrData::Soa(soa)))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::cache::{Item, Rank};

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn rng() -> StepRng {
        StepRng::new(0, 1)
    }

    fn a_rrset(addr: &str) -> Rrset {
        Rrset::new(Ttl::from(300), RrData::a(addr.parse().unwrap()))
    }

    fn cname_rrset(target: &str) -> Rrset {
        Rrset::new(Ttl::from(300), RrData::Cname(name(target)))
    }

    fn ns_rrset(target: &str) -> Rrset {
        Rrset::new(Ttl::from(300), RrData::ns(name(target)))
    }

    fn insert_entry(cache: &mut Cache, owner: &str, rrset: Rrset) {
        cache.insert(
            0,
            rrset.rtype(),
            &name(owner),
            Rank::NonAuthoritativeAnswer,
            Item::Entry(rrset),
        );
    }

    /// Seeds a root server into the cache, as the caller would from
    /// root hints.
    fn seed_root(cache: &mut Cache) {
        insert_entry(cache, ".", ns_rrset("a.root-servers.net."));
        insert_entry(cache, "a.root-servers.net.", a_rrset("198.41.0.4"));
    }

    #[test]
    fn cached_entries_answer_directly() {
        let mut cache = Cache::new(64);
        insert_entry(&mut cache, "www.example.", a_rrset("192.0.2.1"));
        let question = Question::new(name("www.example."), Type::A.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Reply(reply) => {
                assert_eq!(reply.rcode, Rcode::NoError);
                assert_eq!(reply.answer.len(), 1);
                assert_eq!(reply.answer[0].owner, name("www.example."));
            }
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn alias_chains_are_assembled_into_the_answer() {
        let mut cache = Cache::new(64);
        insert_entry(&mut cache, "a.example.", cname_rrset("b.example."));
        insert_entry(&mut cache, "b.example.", cname_rrset("c.example."));
        insert_entry(&mut cache, "c.example.", a_rrset("1.2.3.4"));
        let question = Question::new(name("a.example."), Type::A.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Reply(reply) => {
                assert_eq!(reply.rcode, Rcode::NoError);
                let owners: Vec<_> = reply.answer.iter().map(|e| e.owner.clone()).collect();
                assert_eq!(
                    owners,
                    vec![name("a.example."), name("b.example."), name("c.example.")]
                );
                assert_eq!(reply.answer[2].rrset, a_rrset("1.2.3.4"));
            }
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn alias_cycles_terminate_with_the_collected_links() {
        let mut cache = Cache::new(64);
        insert_entry(&mut cache, "a.example.", cname_rrset("b.example."));
        insert_entry(&mut cache, "b.example.", cname_rrset("a.example."));
        let question = Question::new(name("a.example."), Type::A.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Reply(reply) => {
                assert_eq!(reply.rcode, Rcode::NoError);
                assert_eq!(reply.answer.len(), 2);
                assert!(reply.authority.is_empty());
            }
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn a_cname_question_returns_the_alias_itself() {
        let mut cache = Cache::new(64);
        insert_entry(&mut cache, "a.example.", cname_rrset("b.example."));
        let question = Question::new(name("a.example."), Type::CNAME.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Reply(reply) => {
                assert_eq!(reply.answer.len(), 1);
                assert_eq!(reply.answer[0].rrset.rtype(), Type::CNAME);
            }
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn misses_fall_back_to_the_nearest_cached_ns() {
        let mut cache = Cache::new(64);
        seed_root(&mut cache);
        insert_entry(&mut cache, "example.", ns_rrset("ns1.example.net."));
        insert_entry(&mut cache, "ns1.example.net.", a_rrset("203.0.113.53"));

        let question = Question::new(name("www.example."), Type::A.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Query(query) => {
                assert_eq!(query.zone, name("example."));
                assert_eq!(query.qname, name("www.example."));
                assert_eq!(query.server, "203.0.113.53".parse::<IpAddr>().unwrap());
            }
            other => panic!("expected an outbound query, got {other:?}"),
        }
    }

    #[test]
    fn missing_glue_for_in_zone_servers_climbs_toward_the_root() {
        let mut cache = Cache::new(64);
        seed_root(&mut cache);
        // The delegation names an in-zone server but its glue is not
        // cached, so the query must go to the root instead.
        insert_entry(&mut cache, "example.", ns_rrset("ns1.example."));

        let question = Question::new(name("www.example."), Type::A.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Query(query) => {
                assert_eq!(query.zone, Name::root());
                assert_eq!(query.server, "198.41.0.4".parse::<IpAddr>().unwrap());
            }
            other => panic!("expected an outbound query, got {other:?}"),
        }
    }

    #[test]
    fn unglued_out_of_zone_servers_have_their_address_resolved_first() {
        let mut cache = Cache::new(64);
        seed_root(&mut cache);
        insert_entry(&mut cache, "example.", ns_rrset("ns1.example.net."));

        let question = Question::new(name("www.example."), Type::A.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Query(query) => {
                // The engine recursed to resolve the nameserver's
                // address; with nothing better cached, that question
                // goes to the root.
                assert_eq!(query.qname, name("ns1.example.net."));
                assert_eq!(query.qtype, Qtype::from(Type::A));
                assert_eq!(query.zone, Name::root());
            }
            other => panic!("expected an outbound query, got {other:?}"),
        }
    }

    #[test]
    fn an_empty_cache_has_no_root_server() {
        let mut cache = Cache::new(64);
        let question = Question::new(name("www.example."), Type::A.into());
        assert_eq!(
            resolve(&mut cache, 1, &mut rng(), &question),
            Err(Error::NoRootServer)
        );
    }

    #[test]
    fn srv_questions_use_the_service_shortcut() {
        let mut cache = Cache::new(64);
        seed_root(&mut cache);
        let question = Question::new(name("_imap._tcp.example."), Type::SRV.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Query(query) => {
                assert_eq!(query.qname, name("example."));
                assert_eq!(query.qtype, Qtype::from(Type::NS));
            }
            other => panic!("expected an outbound query, got {other:?}"),
        }
    }

    #[test]
    fn non_service_srv_questions_are_rejected() {
        let mut cache = Cache::new(64);
        seed_root(&mut cache);
        let question = Question::new(name("plain.example."), Type::SRV.into());
        assert_eq!(
            resolve(&mut cache, 1, &mut rng(), &question),
            Err(Error::NotAServiceName(name("plain.example.")))
        );
    }

    #[test]
    fn negative_cache_entries_answer_with_authority() {
        let mut cache = Cache::new(64);
        let soa = Soa {
            mname: name("ns1.example."),
            rname: name("hostmaster.example."),
            serial: 1,
            refresh: 86400,
            retry: 7200,
            expire: 3600000,
            minimum: 300,
        };
        cache.insert(
            0,
            Type::CNAME,
            &name("gone.example."),
            Rank::AuthoritativeAnswer,
            Item::NoDomain {
                owner: name("example."),
                ttl: Ttl::from(300),
                soa,
            },
        );
        let question = Question::new(name("gone.example."), Type::A.into());
        match resolve(&mut cache, 1, &mut rng(), &question).unwrap() {
            Progress::Reply(reply) => {
                assert_eq!(reply.rcode, Rcode::NxDomain);
                assert!(reply.answer.is_empty());
                assert_eq!(reply.authority.len(), 1);
                assert_eq!(reply.authority[0].owner, name("example."));
            }
            other => panic!("expected a reply, got {other:?}"),
        }
    }
}
