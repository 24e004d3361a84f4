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

//! Implementation of the [`Class`] type for DNS classes.

use std::fmt;
use std::str::FromStr;

/// Represents a class in the DNS.
///
/// The engine serves the Internet class and nothing else: a question
/// in any other class is refused in
/// [`Server`](crate::server)-side preflight, and master-file data in
/// any other class does not parse. The type nevertheless wraps the
/// full 16-bit wire value rather than being a unit: decoded messages
/// must be able to carry whatever QCLASS was actually received, so
/// that the refusal can be made (and logged) faithfully.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Class(u16);

impl Class {
    /// The Internet class, the only one the engine serves.
    pub const IN: Self = Self(1);

    /// Returns whether this is the Internet class.
    pub fn is_internet(self) -> bool {
        self == Self::IN
    }
}

impl From<u16> for Class {
    fn from(value: u16) -> Self {
        Class(value)
    }
}

impl From<Class> for u16 {
    fn from(class: Class) -> Self {
        class.0
    }
}

/// Only `IN` (ASCII-case-insensitively) parses. CHAOS, HESIOD, and the
/// RFC 3597 `CLASS` syntax are all rejected: a master file for a class
/// the engine will never serve is a configuration mistake, and it is
/// reported at parse time rather than at query time.
impl FromStr for Class {
    type Err = UnsupportedClassError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.eq_ignore_ascii_case("IN") {
            Ok(Self::IN)
        } else {
            Err(UnsupportedClassError)
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_internet() {
            f.write_str("IN")
        } else {
            // RFC 3597 § 5 spelling, for naming a refused class.
            write!(f, "CLASS{}", self.0)
        }
    }
}

/// An error signaling that a textual class is not one the engine
/// serves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnsupportedClassError;

impl fmt::Display for UnsupportedClassError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("only class IN is supported")
    }
}

impl std::error::Error for UnsupportedClassError {}
