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

//! Implementation of types relating to DNS questions.

use std::fmt;

use crate::class::Class;
use crate::name::Name;
use crate::rr::Type;

////////////////////////////////////////////////////////////////////////
// QUESTIONS                                                          //
////////////////////////////////////////////////////////////////////////

/// The question of a DNS query.
///
/// Defined in [RFC 1035 § 4.1.2], a DNS question includes
///
/// * the QNAME, which is the domain name whose records are being
///   queried;
/// * the [QTYPE](Qtype), which specifies what types of records are
///   desired; and
/// * the QCLASS, which specifies which DNS class to search.
///
/// While the original specification does not rule out having multiple
/// questions per message, in practice only one question per message is
/// used.
///
/// [RFC 1035 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.2
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    pub qname: Name,
    pub qtype: Qtype,
    pub qclass: Class,
}

impl Question {
    /// Creates a new IN-class `Question`.
    pub fn new(qname: Name, qtype: Qtype) -> Self {
        Self {
            qname,
            qtype,
            qclass: Class::IN,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

////////////////////////////////////////////////////////////////////////
// QTYPES                                                             //
////////////////////////////////////////////////////////////////////////

/// The QTYPE of a DNS [question](Question).
///
/// The QTYPE determines what type of DNS records are desired. QTYPE
/// values include data TYPEs (see [`Type`]), but may also include
/// other values: [*](Qtype::ANY) asks for all records of a name, and
/// [AXFR](Qtype::AXFR) asks for a zone transfer.
///
/// A QTYPE is represented on the wire as an unsigned 16-bit integer.
/// Hence this is basically a wrapper around [`u16`] with nice
/// [`Debug`](fmt::Debug) and [`Display`](fmt::Display) implementations
/// and constants for the QTYPEs not covered by [`Type`].
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Qtype(u16);

impl Qtype {
    // RFC 1035
    pub const AXFR: Self = Self(252);
    pub const ANY: Self = Self(255);

    /// Returns the data [`Type`] corresponding to this QTYPE, or
    /// `None` if the QTYPE does not name a single record type.
    pub fn data_type(self) -> Option<Type> {
        match self {
            Self::AXFR | Self::ANY => None,
            Self(value) => Some(Type::from(value)),
        }
    }
}

impl From<u16> for Qtype {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Qtype> for u16 {
    fn from(qtype: Qtype) -> Self {
        qtype.0
    }
}

impl From<Type> for Qtype {
    fn from(rr_type: Type) -> Self {
        Self(rr_type.into())
    }
}

impl fmt::Display for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::AXFR => f.write_str("AXFR"),
            Self::ANY => f.write_str("*"),
            Self(value) => Type::from(value).fmt(f),
        }
    }
}

impl fmt::Debug for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_covers_data_qtypes_only() {
        assert_eq!(Qtype::from(Type::A).data_type(), Some(Type::A));
        assert_eq!(Qtype::ANY.data_type(), None);
        assert_eq!(Qtype::AXFR.data_type(), None);
    }

    #[test]
    fn display_works() {
        assert_eq!(Qtype::ANY.to_string(), "*");
        assert_eq!(Qtype::AXFR.to_string(), "AXFR");
        assert_eq!(Qtype::from(Type::MX).to_string(), "MX");
    }
}
