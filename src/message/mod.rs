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

//! Decoded DNS message structures.
//!
//! The engine does not touch the wire format: an external codec decodes
//! received datagrams into [`Packet`]s and encodes the [`Packet`]s the
//! engine produces. A `Packet` carries the header, the question, a
//! per-opcode [`Payload`], the additional section, and the decoded
//! EDNS OPT and TSIG pseudo-records (if present). TSIG *verification*
//! also happens outside the engine; [`TsigInfo`] reports the verified
//! key name, which is all the engine's authorization logic consumes.

use std::fmt;

use crate::name::Name;
use crate::rr::{RrData, Rrset, Soa, Ttl, Type};

mod opcode;
mod question;
mod rcode;
pub use opcode::Opcode;
pub use question::{Qtype, Question};
pub use rcode::Rcode;

////////////////////////////////////////////////////////////////////////
// HEADERS AND FLAGS                                                  //
////////////////////////////////////////////////////////////////////////

/// The single-bit flags of the DNS message header.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Flags {
    pub qr: bool,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
}

/// The DNS message header, minus the section counts (which the codec
/// derives from the sections themselves).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub id: u16,
    pub opcode: Opcode,
    pub rcode: Rcode,
    pub flags: Flags,
}

impl Header {
    /// Creates a request header with the given id and opcode. All
    /// flags are clear and the RCODE is `NoError`.
    pub fn request(id: u16, opcode: Opcode) -> Self {
        Self {
            id,
            opcode,
            rcode: Rcode::NoError,
            flags: Flags::default(),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SECTIONS                                                           //
////////////////////////////////////////////////////////////////////////

/// One entry of a message section: an owner name and an RRset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SectionEntry {
    pub owner: Name,
    pub rrset: Rrset,
}

impl SectionEntry {
    pub fn new(owner: Name, rrset: Rrset) -> Self {
        Self { owner, rrset }
    }
}

impl fmt::Display for SectionEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.owner, self.rrset.ttl, self.rrset.rtype())
    }
}

/// A message section, in transmission order.
pub type Section = Vec<SectionEntry>;

/// Looks up the RRset for `owner` of type `rtype` in a section.
pub fn find_rrset<'a>(section: &'a Section, owner: &Name, rtype: Type) -> Option<&'a Rrset> {
    section
        .iter()
        .find(|entry| entry.rrset.rtype() == rtype && entry.owner == *owner)
        .map(|entry| &entry.rrset)
}

////////////////////////////////////////////////////////////////////////
// PER-OPCODE PAYLOADS                                                //
////////////////////////////////////////////////////////////////////////

/// The opcode-specific contents of a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Payload {
    /// A QUERY: the answer and authority sections (both empty in
    /// requests).
    Query { answer: Section, authority: Section },

    /// An UPDATE ([RFC 2136]): prerequisites and update operations
    /// (both empty in responses).
    ///
    /// [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136
    Update {
        prereqs: Vec<Prereq>,
        updates: Vec<UpdateOp>,
    },

    /// An AXFR request (`None`) or response (`Some`): the response
    /// carries the zone's records, SOA first. The codec brackets the
    /// records with the second SOA on the wire.
    Axfr(Option<Section>),

    /// A NOTIFY ([RFC 1996]): the serial-bearing SOA is optional in
    /// requests and absent in responses.
    ///
    /// [RFC 1996]: https://datatracker.ietf.org/doc/html/rfc1996
    Notify(Option<(Ttl, Soa)>),
}

impl Payload {
    /// Returns the empty payload appropriate for a response with the
    /// given opcode.
    fn empty_for(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Update => Self::Update {
                prereqs: Vec::new(),
                updates: Vec::new(),
            },
            Opcode::Notify => Self::Notify(None),
            _ => Self::Query {
                answer: Section::new(),
                authority: Section::new(),
            },
        }
    }
}

/// An UPDATE prerequisite ([RFC 2136 § 2.4]).
///
/// [RFC 2136 § 2.4]: https://datatracker.ietf.org/doc/html/rfc2136#section-2.4
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Prereq {
    /// The name owns at least one RRset.
    NameInUse(Name),

    /// An RRset of the given type exists at the name.
    Exists(Name, Type),

    /// An RRset of the data's type exists at the name with exactly the
    /// given values.
    ExistsData(Name, RrData),

    /// The name owns no RRsets.
    NotNameInUse(Name),

    /// No RRset of the given type exists at the name.
    NotExists(Name, Type),
}

/// An UPDATE operation ([RFC 2136 § 2.5]).
///
/// [RFC 2136 § 2.5]: https://datatracker.ietf.org/doc/html/rfc2136#section-2.5
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpdateOp {
    /// Delete the RRset of the given type. Deleting SOA deletes the
    /// zone.
    Remove(Name, Type),

    /// Delete all RRsets at the name.
    RemoveAll(Name),

    /// Delete the given values from the RRset of the data's type; the
    /// RRset itself is deleted when no values remain.
    RemoveSingle(Name, RrData),

    /// Add (union) the RRset into the name.
    Add(Name, Rrset),
}

////////////////////////////////////////////////////////////////////////
// EDNS AND TSIG                                                      //
////////////////////////////////////////////////////////////////////////

/// The decoded EDNS OPT pseudo-record ([RFC 6891]). Only the version
/// and the advertised maximum payload size are carried; EDNS options
/// are not supported.
///
/// [RFC 6891]: https://datatracker.ietf.org/doc/html/rfc6891
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Edns {
    pub version: u8,
    pub payload_size: u16,
}

/// What the engine needs to know about a message's TSIG record
/// ([RFC 2845]), after the external layer has verified the signature:
/// the key name, the message's MAC (carried forward as signing context
/// for multi-message transfers), and the original message id.
///
/// [RFC 2845]: https://datatracker.ietf.org/doc/html/rfc2845
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TsigInfo {
    pub key: Name,
    pub mac: Vec<u8>,
    pub original_id: u16,
}

////////////////////////////////////////////////////////////////////////
// PACKETS                                                            //
////////////////////////////////////////////////////////////////////////

/// A decoded DNS message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub question: Question,
    pub payload: Payload,
    pub additional: Section,
    pub edns: Option<Edns>,
    pub tsig: Option<TsigInfo>,
}

impl Packet {
    /// Creates a QUERY request.
    pub fn query(id: u16, question: Question) -> Self {
        Self {
            header: Header::request(id, Opcode::Query),
            question,
            payload: Payload::Query {
                answer: Section::new(),
                authority: Section::new(),
            },
            additional: Section::new(),
            edns: None,
            tsig: None,
        }
    }

    /// Creates an SOA query for `zone` (used when polling a primary).
    pub fn soa_query(id: u16, zone: Name) -> Self {
        Self::query(id, Question::new(zone, Type::SOA.into()))
    }

    /// Creates an AXFR request for `zone`.
    pub fn axfr_query(id: u16, zone: Name) -> Self {
        let mut packet = Self::query(id, Question::new(zone, Qtype::AXFR));
        packet.payload = Payload::Axfr(None);
        packet
    }

    /// Creates a NOTIFY request for `zone`, carrying its current SOA.
    /// The authoritative flag is set, per RFC 1996 § 3.7.
    pub fn notify(id: u16, zone: Name, ttl: Ttl, soa: Soa) -> Self {
        let mut header = Header::request(id, Opcode::Notify);
        header.flags.aa = true;
        Self {
            header,
            question: Question::new(zone, Type::SOA.into()),
            payload: Payload::Notify(Some((ttl, soa))),
            additional: Section::new(),
            edns: None,
            tsig: None,
        }
    }

    /// Starts a response to this packet: the id, opcode, and question
    /// are carried over, the QR bit is set, and RD is copied for opcode
    /// QUERY (it is not defined for the other opcodes). The payload is
    /// the empty payload for the opcode.
    pub fn reply(&self) -> Self {
        let mut flags = Flags {
            qr: true,
            ..Flags::default()
        };
        if self.header.opcode == Opcode::Query {
            flags.rd = self.header.flags.rd;
        }
        Self {
            header: Header {
                id: self.header.id,
                opcode: self.header.opcode,
                rcode: Rcode::NoError,
                flags,
            },
            question: self.question.clone(),
            payload: Payload::empty_for(self.header.opcode),
            additional: Section::new(),
            edns: None,
            tsig: None,
        }
    }

    /// Starts an error response to this packet: a [`Packet::reply`]
    /// with the given RCODE.
    pub fn reply_error(&self, rcode: Rcode) -> Self {
        let mut response = self.reply();
        response.header.rcode = rcode;
        response
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
