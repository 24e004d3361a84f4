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

//! Implementation of the [`Error`] type for zone-tree errors.

use std::fmt;

use crate::name::Name;

/// An error type for zone-tree operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The name passed to a whole-zone operation is not a zone apex
    /// (it owns no SOA record).
    NotAZone(Name),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NotAZone(ref name) => write!(f, "{name} is not a zone apex"),
        }
    }
}

impl std::error::Error for Error {}
