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

//! Implementation of RRset-related data structures.

use std::collections::btree_map::{BTreeMap, Entry};

use super::{RrData, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// RRSETS                                                             //
////////////////////////////////////////////////////////////////////////

/// A resource record set: a TTL shared by all member records, plus the
/// typed record data.
///
/// [RFC 2181 § 5] defined an RRset as a group of records with the same
/// owner, class, and type, and also stipulated that all records in an
/// RRset have the same TTL. Since DNS records are looked up through
/// RRsets, the engine stores records only in this grouped form. The
/// owner of an `Rrset` is not stored in the structure itself, but
/// rather is kept track of separately by its owner (a tree node, cache
/// entry, or message section).
///
/// [RFC 2181 § 5]: https://datatracker.ietf.org/doc/html/rfc2181#section-5
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rrset {
    pub ttl: Ttl,
    pub data: RrData,
}

impl Rrset {
    /// Creates a new `Rrset` with the given TTL and record data.
    pub fn new(ttl: Ttl, data: RrData) -> Self {
        Self { ttl, data }
    }

    /// Returns the RR type of this `Rrset`.
    pub fn rtype(&self) -> Type {
        self.data.rtype()
    }
}

////////////////////////////////////////////////////////////////////////
// PER-OWNER RRSET MAPS                                               //
////////////////////////////////////////////////////////////////////////

/// The [`Rrset`]s of a single owner name, keyed by RR type.
///
/// There is at most one `Rrset` per type. The map itself does not
/// enforce the CNAME-exclusivity rule (a name with a CNAME record may
/// own no other records): dynamic updates can pass through transiently
/// inconsistent states, so that rule is checked by
/// [`ZoneTree::check`](crate::zone::ZoneTree::check) at commit points
/// instead.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RrMap {
    rrsets: BTreeMap<Type, Rrset>,
}

impl RrMap {
    /// Returns a new, empty `RrMap`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Looks up the [`Rrset`] of type `rtype`.
    pub fn get(&self, rtype: Type) -> Option<&Rrset> {
        self.rrsets.get(&rtype)
    }

    /// Returns whether the map holds an [`Rrset`] of type `rtype`.
    pub fn contains(&self, rtype: Type) -> bool {
        self.rrsets.contains_key(&rtype)
    }

    /// Inserts `rrset`, replacing and returning any existing `Rrset`
    /// of the same type.
    pub fn insert(&mut self, rrset: Rrset) -> Option<Rrset> {
        self.rrsets.insert(rrset.rtype(), rrset)
    }

    /// Unions `rrset` into the map: if an `Rrset` of the same type
    /// exists, its values are merged with the incoming ones (the
    /// incoming TTL wins); otherwise the `Rrset` is inserted fresh.
    pub fn merge(&mut self, rrset: Rrset) {
        match self.rrsets.entry(rrset.rtype()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.ttl = rrset.ttl;
                existing.data.merge(rrset.data);
            }
            Entry::Vacant(entry) => {
                entry.insert(rrset);
            }
        }
    }

    /// Subtracts the values of `data` from the `Rrset` of the matching
    /// type. If nothing remains afterwards, the `Rrset` is removed
    /// entirely.
    pub fn subtract(&mut self, data: &RrData) {
        if let Some(rrset) = self.rrsets.get_mut(&data.rtype()) {
            if rrset.data.subtract(data) {
                self.rrsets.remove(&data.rtype());
            }
        }
    }

    /// Removes and returns the [`Rrset`] of type `rtype`.
    pub fn remove(&mut self, rtype: Type) -> Option<Rrset> {
        self.rrsets.remove(&rtype)
    }

    /// Returns an iterator over the `(Type, Rrset)` entries of the map.
    pub fn iter(&self) -> impl Iterator<Item = (Type, &Rrset)> {
        self.rrsets.iter().map(|(&t, rrset)| (t, rrset))
    }

    /// Returns the number of [`Rrset`]s in the map.
    pub fn len(&self) -> usize {
        self.rrsets.len()
    }

    /// Returns whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }
}

impl FromIterator<Rrset> for RrMap {
    fn from_iter<I: IntoIterator<Item = Rrset>>(iter: I) -> Self {
        let mut map = Self::new();
        for rrset in iter {
            map.merge(rrset);
        }
        map
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
