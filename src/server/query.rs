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

//! Handling of DNS QUERY messages, including AXFR.

use arrayvec::ArrayVec;

use crate::message::{Packet, Payload, Qtype, Rcode, Section, SectionEntry};
use crate::name::Name;
use crate::rr::{RrData, Rrset, Soa, Ttl, Type};
use crate::zone::{LookupError, ZoneTree};

use super::auth::Operation;
use super::{Server, Transport};

/// The maximum number of links in a CNAME chain that we will follow
/// before giving up and returning SERVFAIL.
const MAX_CNAME_CHAIN_LEN: usize = 8;

/// The RR types a query may ask for. Anything else is refused.
const ALLOWED_TYPES: [Type; 13] = [
    Type::A,
    Type::NS,
    Type::CNAME,
    Type::SOA,
    Type::PTR,
    Type::MX,
    Type::TXT,
    Type::AAAA,
    Type::SRV,
    Type::CAA,
    Type::SSHFP,
    Type::TLSA,
    Type::DNSKEY,
];

////////////////////////////////////////////////////////////////////////
// QUERY ENTRY POINTS                                                 //
////////////////////////////////////////////////////////////////////////

impl Server {
    /// Answers a (non-AXFR) QUERY against the zone data, or, when the
    /// message is signed by a key-management key for the QNAME, against
    /// the key store, so that key material can be inspected remotely.
    pub(crate) fn answer_query(&self, packet: &Packet) -> Packet {
        let question = &packet.question;
        let qtype = question.qtype;
        let data_type = qtype.data_type();
        if qtype != Qtype::ANY && !data_type.map_or(false, |t| ALLOWED_TYPES.contains(&t)) {
            return packet.reply_error(Rcode::Refused);
        }

        // A key-management key may inspect the key store remotely; the
        // store has no zone structure, so it is served with raw gets
        // rather than the full lookup algorithm.
        if let Some(ref tsig) = packet.tsig {
            if self
                .auth
                .authorise(&tsig.key, &question.qname, Operation::KeyManagement)
            {
                return self.answer_key_query(packet);
            }
        }

        let mut out = Sections::default();
        if qtype == Qtype::ANY {
            answer_any(&self.data, &question.qname, &mut out);
        } else {
            answer(&self.data, &question.qname, data_type.unwrap(), &mut out);
        }

        let mut response = packet.reply_error(out.rcode);
        response.header.flags.aa = out.aa;
        response.payload = Payload::Query {
            answer: out.answer,
            authority: out.authority,
        };
        response.additional = out.additional;
        response
    }

    /// Answers a query against the key store.
    fn answer_key_query(&self, packet: &Packet) -> Packet {
        let question = &packet.question;
        let mut answer = Section::new();
        let mut rcode = Rcode::NoError;
        if question.qtype == Qtype::ANY {
            match self.auth.keys().get_all(&question.qname) {
                Some(rrsets) => {
                    for (_, rrset) in rrsets.iter() {
                        answer.push(SectionEntry::new(question.qname.clone(), rrset.clone()));
                    }
                }
                None => rcode = Rcode::NxDomain,
            }
        } else {
            match question
                .qtype
                .data_type()
                .and_then(|rtype| self.auth.keys().get(&question.qname, rtype))
            {
                Some(rrset) => {
                    answer.push(SectionEntry::new(question.qname.clone(), rrset.clone()));
                }
                None => rcode = Rcode::NxDomain,
            }
        }
        let mut response = packet.reply_error(rcode);
        response.header.flags.aa = true;
        response.payload = Payload::Query {
            answer,
            authority: Section::new(),
        };
        response
    }

    /// Answers an AXFR request: the zone's SOA followed by every entry
    /// under the apex (the closing SOA is the codec's job). Transfers
    /// are TCP-only and require a key authorized for `Transfer` on the
    /// zone. The second return value reports whether the request was
    /// signed by a transfer key proper (whose owner then subscribes to
    /// NOTIFYs; a key-management key grants the transfer but no
    /// subscription).
    pub(crate) fn answer_axfr(&self, transport: Transport, packet: &Packet) -> (Packet, bool) {
        let zone = &packet.question.qname;
        if transport == Transport::Udp {
            return (packet.reply_error(Rcode::Refused), false);
        }
        let key = match packet.tsig {
            Some(ref tsig) if self.auth.authorise(&tsig.key, zone, Operation::Transfer) => {
                &tsig.key
            }
            _ => return (packet.reply_error(Rcode::NotAuth), false),
        };

        match self.transfer_section(zone) {
            Ok(section) => {
                let mut response = packet.reply();
                response.header.flags.aa = true;
                response.payload = Payload::Axfr(Some(section));
                let by_transfer_key = matches!(
                    super::auth::parse_key_name(key),
                    Some((_, Operation::Transfer))
                );
                (response, by_transfer_key)
            }
            Err(rcode) => (packet.reply_error(rcode), false),
        }
    }

    /// Serializes the zone rooted at `zone` for a transfer.
    pub(crate) fn transfer_section(&self, zone: &Name) -> Result<Section, Rcode> {
        let (soa, entries) = self.data.entries(zone).map_err(|_| Rcode::Refused)?;
        let mut section = vec![SectionEntry::new(zone.clone(), soa)];
        for (owner, rrsets) in entries {
            for (_, rrset) in rrsets.iter() {
                section.push(SectionEntry::new(owner.clone(), rrset.clone()));
            }
        }
        Ok(section)
    }
}

////////////////////////////////////////////////////////////////////////
// ANSWERING LOGIC                                                    //
////////////////////////////////////////////////////////////////////////

/// The sections of a response under construction.
#[derive(Default)]
struct Sections {
    aa: bool,
    rcode: Rcode,
    answer: Section,
    authority: Section,
    additional: Section,
}

/// Answers a query for a specific RR type.
fn answer(tree: &ZoneTree, qname: &Name, rtype: Type, out: &mut Sections) {
    match tree.lookup(qname, rtype) {
        Ok((rrset, authority)) => {
            out.aa = true;
            out.answer
                .push(SectionEntry::new(qname.clone(), rrset.clone()));
            if !(rtype == Type::NS && *qname == authority.zone) {
                add_apex_authority(authority.zone.clone(), authority.ns, out);
            }
            add_additional_addresses(tree, &authority.zone, out);
        }
        Err(LookupError::EmptyNonTerminal { zone, ttl, soa }) => {
            // The requested type is absent; a CNAME at the name still
            // answers the query (RFC 1034 § 3.6.2).
            match tree.get(qname, Type::CNAME) {
                Some(cname_rrset) => {
                    out.aa = true;
                    out.answer
                        .push(SectionEntry::new(qname.clone(), cname_rrset.clone()));
                    if let RrData::Cname(ref target) = cname_rrset.data {
                        follow_cname(tree, qname, target.clone(), rtype, out);
                    }
                }
                None => {
                    out.aa = true;
                    add_negative_caching_soa(zone, ttl, soa, out);
                }
            }
        }
        Err(LookupError::NotFound { zone, ttl, soa }) => {
            out.aa = true;
            out.rcode = Rcode::NxDomain;
            add_negative_caching_soa(zone, ttl, soa, out);
        }
        Err(LookupError::Delegation { zone, ns }) => do_referral(tree, zone, ns, out),
        Err(LookupError::NotAuthoritative) => out.rcode = Rcode::Refused,
    }
}

/// Answers a query with QTYPE * (ANY).
fn answer_any(tree: &ZoneTree, qname: &Name, out: &mut Sections) {
    match tree.lookup_any(qname) {
        Ok((rrsets, authority)) => {
            out.aa = true;
            for (_, rrset) in rrsets.iter() {
                out.answer
                    .push(SectionEntry::new(qname.clone(), rrset.clone()));
            }
            if authority.zone != *qname {
                add_apex_authority(authority.zone.clone(), authority.ns, out);
            }
            add_additional_addresses(tree, &authority.zone, out);
        }
        Err(LookupError::EmptyNonTerminal { zone, ttl, soa }) => {
            out.aa = true;
            add_negative_caching_soa(zone, ttl, soa, out);
        }
        Err(LookupError::NotFound { zone, ttl, soa }) => {
            out.aa = true;
            out.rcode = Rcode::NxDomain;
            add_negative_caching_soa(zone, ttl, soa, out);
        }
        Err(LookupError::Delegation { zone, ns }) => do_referral(tree, zone, ns, out),
        Err(LookupError::NotAuthoritative) => out.rcode = Rcode::Refused,
    }
}

////////////////////////////////////////////////////////////////////////
// ANSWERING LOGIC - CNAME HANDLING                                   //
////////////////////////////////////////////////////////////////////////

/// Follows a CNAME chain within the tree, accumulating each link into
/// the answer section. Per [RFC 6604 § 3], the RCODE reflects the last
/// lookup in the chain. Loops and chains longer than
/// [`MAX_CNAME_CHAIN_LEN`] give up with SERVFAIL.
///
/// [RFC 6604 § 3]: https://datatracker.ietf.org/doc/html/rfc6604#section-3
fn follow_cname(tree: &ZoneTree, qname: &Name, target: Name, rtype: Type, out: &mut Sections) {
    let mut seen: ArrayVec<Name, MAX_CNAME_CHAIN_LEN> = ArrayVec::new();
    seen.push(qname.clone());
    let mut current = target;

    loop {
        if seen.contains(&current) {
            return servfail(out);
        }
        match tree.lookup(&current, rtype) {
            Ok((rrset, authority)) => {
                out.answer
                    .push(SectionEntry::new(current.clone(), rrset.clone()));
                if !(rtype == Type::NS && current == authority.zone) {
                    add_apex_authority(authority.zone.clone(), authority.ns, out);
                }
                add_additional_addresses(tree, &authority.zone, out);
                return;
            }
            Err(LookupError::EmptyNonTerminal { zone, ttl, soa }) => {
                match tree.get(&current, Type::CNAME) {
                    Some(cname_rrset) => {
                        out.answer
                            .push(SectionEntry::new(current.clone(), cname_rrset.clone()));
                        let next = match cname_rrset.data {
                            RrData::Cname(ref next) => next.clone(),
                            _ => return servfail(out),
                        };
                        if seen.try_push(current).is_err() {
                            return servfail(out);
                        }
                        current = next;
                    }
                    None => {
                        add_negative_caching_soa(zone, ttl, soa, out);
                        return;
                    }
                }
            }
            Err(LookupError::NotFound { zone, ttl, soa }) => {
                out.rcode = Rcode::NxDomain;
                add_negative_caching_soa(zone, ttl, soa, out);
                return;
            }
            Err(LookupError::Delegation { zone, ns }) => return do_referral(tree, zone, ns, out),
            // The chain left our data; answer with the links collected.
            Err(LookupError::NotAuthoritative) => return,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ANSWERING LOGIC - REFERRALS AND HELPERS                            //
////////////////////////////////////////////////////////////////////////

/// Creates a referral response: the zone cut's NS RRset goes into the
/// authority section, with glue addresses for in-bailiwick servers in
/// the additional section ([RFC 1034 § 4.3.2] step 3(b)).
///
/// [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
fn do_referral(tree: &ZoneTree, cut: Name, ns: Rrset, out: &mut Sections) {
    out.authority.push(SectionEntry::new(cut.clone(), ns));
    add_additional_addresses(tree, &cut, out);
}

/// Adds the enclosing zone's NS RRset to the authority section of a
/// positive answer. Callers skip this when that very RRset is already
/// the answer.
fn add_apex_authority(zone: Name, ns: Option<&Rrset>, out: &mut Sections) {
    if let Some(ns_rrset) = ns {
        let entry = SectionEntry::new(zone, ns_rrset.clone());
        if !out.authority.contains(&entry) {
            out.authority.push(entry);
        }
    }
}

/// Adds the SOA record of the enclosing zone to the authority section
/// for negative caching. Per [RFC 2308 § 3], the TTL used is the
/// smaller of the SOA RRset's TTL and its MINIMUM field.
///
/// [RFC 2308 § 3]: https://datatracker.ietf.org/doc/html/rfc2308#section-3
fn add_negative_caching_soa(zone: Name, ttl: Ttl, soa: Soa, out: &mut Sections) {
    let ttl = ttl.min(Ttl::from(soa.minimum));
    out.authority
        .push(SectionEntry::new(zone, Rrset::new(ttl, RrData::Soa(soa))));
}

/// Performs additional section processing: for every domain name
/// embedded in the answer and authority RRsets that falls within
/// `bailiwick`, any A and AAAA RRsets in the tree are added to the
/// additional section. Addresses outside the bailiwick are not ours to
/// vouch for and are left for the resolver to chase.
fn add_additional_addresses(tree: &ZoneTree, bailiwick: &Name, out: &mut Sections) {
    let mut wanted: Vec<Name> = Vec::new();
    for entry in out.answer.iter().chain(out.authority.iter()) {
        for name in entry.rrset.data.names() {
            if name.eq_or_subdomain_of(bailiwick) && !wanted.contains(name) {
                wanted.push(name.clone());
            }
        }
    }
    for name in wanted {
        for rtype in [Type::A, Type::AAAA] {
            if let Some(rrset) = tree.get(&name, rtype) {
                let entry = SectionEntry::new(name.clone(), rrset.clone());
                if !out.additional.contains(&entry) {
                    out.additional.push(entry);
                }
            }
        }
    }
}

/// Turns the response into a SERVFAIL, dropping anything composed so
/// far.
fn servfail(out: &mut Sections) {
    out.rcode = Rcode::ServFail;
    out.aa = false;
    out.answer.clear();
    out.authority.clear();
    out.additional.clear();
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
