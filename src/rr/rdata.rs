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

//! Typed record data for the RR types the engine stores.
//!
//! The record catalog is a closed set: each supported RR type has a
//! variant of [`RrData`] carrying its concrete payload. Types whose
//! RRsets may hold several records carry a [`BTreeSet`] of values;
//! CNAME, PTR, and SOA are single-valued by definition. Pattern
//! matches on [`RrData`] are exhaustive, so adding a record type is a
//! single-point change.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::Name;

use super::Type;

////////////////////////////////////////////////////////////////////////
// RECORD PAYLOAD STRUCTURES                                          //
////////////////////////////////////////////////////////////////////////

/// The RDATA of an SOA record ([RFC 1035 § 3.3.13]).
///
/// [RFC 1035 § 3.3.13]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.13
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// The RDATA of an MX record ([RFC 1035 § 3.3.9]).
///
/// [RFC 1035 § 3.3.9]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.9
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Mx {
    pub preference: u16,
    pub exchange: Name,
}

/// The RDATA of an SRV record ([RFC 2782]).
///
/// [RFC 2782]: https://datatracker.ietf.org/doc/html/rfc2782
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: Name,
}

/// The RDATA of a CAA record ([RFC 8659]).
///
/// [RFC 8659]: https://datatracker.ietf.org/doc/html/rfc8659
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Caa {
    pub critical: bool,
    pub tag: String,
    pub value: String,
}

/// The RDATA of a TLSA record ([RFC 6698]).
///
/// [RFC 6698]: https://datatracker.ietf.org/doc/html/rfc6698
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tlsa {
    pub usage: u8,
    pub selector: u8,
    pub matching: u8,
    pub data: Vec<u8>,
}

/// The RDATA of an SSHFP record ([RFC 4255]).
///
/// [RFC 4255]: https://datatracker.ietf.org/doc/html/rfc4255
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Sshfp {
    pub algorithm: u8,
    pub fp_type: u8,
    pub fingerprint: Vec<u8>,
}

/// The RDATA of a DNSKEY record ([RFC 4034 § 2]). The engine stores
/// DNSKEYs both as ordinary zone data and as the shared secrets backing
/// TSIG authorization (see [`server::auth`](crate::server::auth)).
///
/// [RFC 4034 § 2]: https://datatracker.ietf.org/doc/html/rfc4034#section-2
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dnskey {
    pub flags: u16,
    pub algorithm: u8,
    pub key: Vec<u8>,
}

////////////////////////////////////////////////////////////////////////
// SERIAL NUMBER ARITHMETIC                                           //
////////////////////////////////////////////////////////////////////////

/// Returns whether `new` is a newer SOA serial than `old`, using the
/// sequence-space arithmetic of [RFC 1982] (comparison modulo 2³²).
///
/// [RFC 1982]: https://datatracker.ietf.org/doc/html/rfc1982
pub fn serial_newer(old: u32, new: u32) -> bool {
    new != old && new.wrapping_sub(old) < 0x8000_0000
}

////////////////////////////////////////////////////////////////////////
// THE RECORD CATALOG                                                 //
////////////////////////////////////////////////////////////////////////

/// The record data of one RRset, tagged by RR type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RrData {
    A(BTreeSet<Ipv4Addr>),
    Ns(BTreeSet<Name>),
    Cname(Name),
    Soa(Soa),
    Ptr(Name),
    Mx(BTreeSet<Mx>),
    Txt(BTreeSet<String>),
    Aaaa(BTreeSet<Ipv6Addr>),
    Srv(BTreeSet<Srv>),
    Sshfp(BTreeSet<Sshfp>),
    Dnskey(BTreeSet<Dnskey>),
    Tlsa(BTreeSet<Tlsa>),
    Caa(BTreeSet<Caa>),
}

impl RrData {
    /// Returns the [`Type`] of this record data.
    pub fn rtype(&self) -> Type {
        match *self {
            Self::A(_) => Type::A,
            Self::Ns(_) => Type::NS,
            Self::Cname(_) => Type::CNAME,
            Self::Soa(_) => Type::SOA,
            Self::Ptr(_) => Type::PTR,
            Self::Mx(_) => Type::MX,
            Self::Txt(_) => Type::TXT,
            Self::Aaaa(_) => Type::AAAA,
            Self::Srv(_) => Type::SRV,
            Self::Sshfp(_) => Type::SSHFP,
            Self::Dnskey(_) => Type::DNSKEY,
            Self::Tlsa(_) => Type::TLSA,
            Self::Caa(_) => Type::CAA,
        }
    }

    /// Returns whether the record data holds no values. Single-valued
    /// variants are never empty.
    pub fn is_empty(&self) -> bool {
        match *self {
            Self::A(ref set) => set.is_empty(),
            Self::Ns(ref set) => set.is_empty(),
            Self::Cname(_) | Self::Soa(_) | Self::Ptr(_) => false,
            Self::Mx(ref set) => set.is_empty(),
            Self::Txt(ref set) => set.is_empty(),
            Self::Aaaa(ref set) => set.is_empty(),
            Self::Srv(ref set) => set.is_empty(),
            Self::Sshfp(ref set) => set.is_empty(),
            Self::Dnskey(ref set) => set.is_empty(),
            Self::Tlsa(ref set) => set.is_empty(),
            Self::Caa(ref set) => set.is_empty(),
        }
    }

    /// Unions `other` into this record data. Set-valued variants merge
    /// their values; single-valued variants are replaced. Returns
    /// `false` (leaving `self` unchanged) if the variants differ.
    pub fn merge(&mut self, other: RrData) -> bool {
        match (self, other) {
            (Self::A(set), Self::A(new)) => set.extend(new),
            (Self::Ns(set), Self::Ns(new)) => set.extend(new),
            (this @ Self::Cname(_), new @ Self::Cname(_)) => *this = new,
            (this @ Self::Soa(_), new @ Self::Soa(_)) => *this = new,
            (this @ Self::Ptr(_), new @ Self::Ptr(_)) => *this = new,
            (Self::Mx(set), Self::Mx(new)) => set.extend(new),
            (Self::Txt(set), Self::Txt(new)) => set.extend(new),
            (Self::Aaaa(set), Self::Aaaa(new)) => set.extend(new),
            (Self::Srv(set), Self::Srv(new)) => set.extend(new),
            (Self::Sshfp(set), Self::Sshfp(new)) => set.extend(new),
            (Self::Dnskey(set), Self::Dnskey(new)) => set.extend(new),
            (Self::Tlsa(set), Self::Tlsa(new)) => set.extend(new),
            (Self::Caa(set), Self::Caa(new)) => set.extend(new),
            _ => return false,
        }
        true
    }

    /// Subtracts the values of `other` from this record data, and
    /// returns `true` when the subtraction leaves nothing behind (the
    /// caller then removes the RRset as a whole). For single-valued
    /// variants the value itself is untouched: subtraction "empties"
    /// them exactly when the values are equal.
    pub fn subtract(&mut self, other: &RrData) -> bool {
        match (&mut *self, other) {
            (Self::A(set), Self::A(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Ns(set), Self::Ns(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Cname(this), Self::Cname(del)) => this == del,
            (Self::Soa(this), Self::Soa(del)) => this == del,
            (Self::Ptr(this), Self::Ptr(del)) => this == del,
            (Self::Mx(set), Self::Mx(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Txt(set), Self::Txt(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Aaaa(set), Self::Aaaa(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Srv(set), Self::Srv(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Sshfp(set), Self::Sshfp(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Dnskey(set), Self::Dnskey(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Tlsa(set), Self::Tlsa(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            (Self::Caa(set), Self::Caa(del)) => {
                set.retain(|v| !del.contains(v));
                set.is_empty()
            }
            _ => false,
        }
    }

    /// Returns the domain names embedded in the record data. These are
    /// the names eligible for additional-section processing (address
    /// lookup for NS, MX, and SRV targets) and for CNAME chasing.
    pub fn names(&self) -> Vec<&Name> {
        match *self {
            Self::Ns(ref set) => set.iter().collect(),
            Self::Cname(ref name) | Self::Ptr(ref name) => vec![name],
            Self::Mx(ref set) => set.iter().map(|mx| &mx.exchange).collect(),
            Self::Srv(ref set) => set.iter().map(|srv| &srv.target).collect(),
            _ => Vec::new(),
        }
    }

    /// Convenience constructor for a single-address A RRset.
    pub fn a(addr: Ipv4Addr) -> Self {
        Self::A(BTreeSet::from([addr]))
    }

    /// Convenience constructor for a single-target NS RRset.
    pub fn ns(target: Name) -> Self {
        Self::Ns(BTreeSet::from([target]))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
