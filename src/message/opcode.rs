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

//! Implementation of the [`Opcode`] type.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// OPCODES                                                            //
////////////////////////////////////////////////////////////////////////

/// The opcode of the DNS message header, shaped the way the engine
/// dispatches on it.
///
/// [RFC 1035 § 4.1.1] defines the opcode as a four-bit field naming
/// the kind of query being made. The engine implements exactly three:
/// QUERY, NOTIFY ([RFC 1996]), and UPDATE ([RFC 2136]), so those are
/// the named variants the per-role handlers match on. Every other
/// four-bit value (IQUERY, STATUS, the unassigned range) decodes to
/// [`Opcode::Unimplemented`], which keeps the raw value so the
/// `NotImp` response can echo it in its header.
///
/// Decode opcodes through the [`TryFrom<u8>`] implementation; it never
/// produces an `Unimplemented` carrying an implemented value, which is
/// what keeps equality on this type meaningful.
///
/// [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
/// [RFC 1996]: https://datatracker.ietf.org/doc/html/rfc1996
/// [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Opcode {
    Query,
    Notify,
    Update,

    /// An opcode the engine has no handler for.
    Unimplemented(u8),
}

impl TryFrom<u8> for Opcode {
    type Error = IntoOpcodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Query),
            4 => Ok(Self::Notify),
            5 => Ok(Self::Update),
            1..=15 => Ok(Self::Unimplemented(value)),
            _ => Err(IntoOpcodeError),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unimplemented(raw) => raw,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Query => f.write_str("QUERY"),
            Self::Notify => f.write_str("NOTIFY"),
            Self::Update => f.write_str("UPDATE"),
            Self::Unimplemented(raw) => write!(f, "opcode {raw}"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that the provided value does not fit in the
/// four-bit opcode field.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IntoOpcodeError;

impl fmt::Display for IntoOpcodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("not a valid opcode")
    }
}

impl std::error::Error for IntoOpcodeError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
