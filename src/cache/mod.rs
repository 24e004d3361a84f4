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

//! The resolver cache: a fixed-capacity LRU of per-name results with
//! TTL aging and ranked replacement.
//!
//! Each cached name holds one of three shapes: an alias (the name is a
//! CNAME), a whole-name negative result (NXDOMAIN), or a map from RR
//! type to positive or negative per-type results. Every stored result
//! carries the monotonic instant it was created and the [`Rank`] of
//! the data's source; a later insert with a *strictly lower* rank than
//! the live data it would replace is suppressed, so that (for
//! instance) a glue record gleaned from a referral never overwrites an
//! authoritative answer.
//!
//! Reads age entries by TTL: an entry whose TTL has run out is
//! invisible (reported as a [drop](Error::Drop), not a miss) and is
//! physically removed on the next write to its slot or by LRU
//! eviction. Reads also refresh the entry's LRU position.

use std::collections::BTreeMap;

use lru_cache::LruCache;

use crate::message::Qtype;
use crate::name::Name;
use crate::rr::{RrData, Rrset, Soa, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// RANKS                                                              //
////////////////////////////////////////////////////////////////////////

/// How trustworthy a cached result is, by the provenance of the data.
/// The order is total, and replacement is decided by it: larger ranks
/// win.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Rank {
    Additional,
    NonAuthoritativeAnswer,
    ZoneGlue,
    AuthoritativeAuthority,
    AuthoritativeAnswer,
    ZoneTransfer,
    ZoneFile,
}

////////////////////////////////////////////////////////////////////////
// CACHED VALUES                                                      //
////////////////////////////////////////////////////////////////////////

/// A result to store in the cache.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Item {
    /// A positive RRset. A CNAME RRset makes the whole name an alias.
    Entry(Rrset),

    /// The name exists but has no data of this type; the enclosing
    /// zone's SOA backs the negative answer.
    NoData { owner: Name, ttl: Ttl, soa: Soa },

    /// The name does not exist. Stored for the whole name.
    NoDomain { owner: Name, ttl: Ttl, soa: Soa },

    /// The upstream server failed on this question.
    ServFail { owner: Name, ttl: Ttl, soa: Soa },
}

/// A result read back out of the cache, with TTLs aged to the time of
/// the read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// The positive RRset for the requested type.
    Entry(Rrset),

    /// All live positive RRsets at the name (for `ANY` queries).
    Entries(BTreeMap<Type, Rrset>),

    /// The name is an alias for `target`.
    Alias { ttl: Ttl, target: Name },

    /// The name exists but has no data of the requested type.
    NoData { owner: Name, ttl: Ttl, soa: Soa },

    /// The name does not exist.
    NoDomain { owner: Name, ttl: Ttl, soa: Soa },

    /// The upstream server failed on this question.
    ServFail { owner: Name, ttl: Ttl, soa: Soa },
}

/// The unproductive outcomes of a cache read. These are internal
/// statuses consumed by the resolver engine; they are never surfaced
/// to the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// Nothing is cached for the question.
    Miss,

    /// Something was cached for the question, but its TTL has run out.
    Drop,
}

/// Running counters of cache activity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub hit: u64,
    pub miss: u64,
    pub drop: u64,
    pub insert: u64,
}

////////////////////////////////////////////////////////////////////////
// INTERNAL REPRESENTATION                                            //
////////////////////////////////////////////////////////////////////////

/// Creation time and provenance of a cached result.
#[derive(Clone, Copy, Debug)]
struct Meta {
    created: u64,
    rank: Rank,
}

/// A per-type slot in a cached name's map.
#[derive(Clone, Debug)]
enum Slot {
    Entry(Rrset),
    NoData { owner: Name, ttl: Ttl, soa: Soa },
    ServFail { owner: Name, ttl: Ttl, soa: Soa },
}

impl Slot {
    fn ttl(&self) -> Ttl {
        match *self {
            Self::Entry(ref rrset) => rrset.ttl,
            Self::NoData { ttl, .. } | Self::ServFail { ttl, .. } => ttl,
        }
    }
}

/// Everything cached under one name.
#[derive(Clone, Debug)]
enum CacheEntry {
    Alias {
        meta: Meta,
        ttl: Ttl,
        target: Name,
    },
    NoDomain {
        meta: Meta,
        owner: Name,
        ttl: Ttl,
        soa: Soa,
    },
    RrMap(BTreeMap<Type, (Meta, Slot)>),
}

impl CacheEntry {
    /// Returns the rank governing replacement of the slot for `rtype`,
    /// ignoring data whose TTL has already run out at `now`.
    fn live_rank(&self, now: u64, rtype: Type) -> Option<Rank> {
        match *self {
            Self::Alias { meta, ttl, .. } => {
                live(now, meta, ttl).then_some(meta.rank)
            }
            Self::NoDomain { meta, ttl, .. } => {
                live(now, meta, ttl).then_some(meta.rank)
            }
            Self::RrMap(ref map) => map
                .get(&rtype)
                .filter(|(meta, slot)| live(now, *meta, slot.ttl()))
                .map(|(meta, _)| meta.rank),
        }
    }
}

/// Returns whether data created at `meta.created` with TTL `ttl` is
/// still live at `now`.
fn live(now: u64, meta: Meta, ttl: Ttl) -> bool {
    ttl.remaining(now.saturating_sub(meta.created)).is_some()
}

////////////////////////////////////////////////////////////////////////
// THE CACHE                                                          //
////////////////////////////////////////////////////////////////////////

/// An LRU cache of resolver results, keyed by owner name.
pub struct Cache {
    entries: LruCache<Name, CacheEntry>,
    stats: Stats,
}

impl Cache {
    /// Creates a new `Cache` holding at most `capacity` names.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: Stats::default(),
        }
    }

    /// Returns the number of names currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of names the cache will hold.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Returns the cache's activity counters.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Looks up the cached result for `(qtype, name)` at time `now`,
    /// aging TTLs and refreshing the name's LRU position. `ANY`
    /// returns every live positive RRset at the name.
    pub fn query(&mut self, now: u64, qtype: Qtype, name: &Name) -> Result<Response, Error> {
        let entry = match self.entries.get_mut(name) {
            Some(entry) => entry,
            None => {
                self.stats.miss += 1;
                return Err(Error::Miss);
            }
        };

        let result = match *entry {
            CacheEntry::Alias {
                meta,
                ttl,
                ref target,
            } => match ttl.remaining(now.saturating_sub(meta.created)) {
                Some(left) => Ok(Response::Alias {
                    ttl: left,
                    target: target.clone(),
                }),
                None => Err(Error::Drop),
            },
            CacheEntry::NoDomain {
                meta,
                ref owner,
                ttl,
                ref soa,
            } => match ttl.remaining(now.saturating_sub(meta.created)) {
                Some(left) => Ok(Response::NoDomain {
                    owner: owner.clone(),
                    ttl: left,
                    soa: soa.clone(),
                }),
                None => Err(Error::Drop),
            },
            CacheEntry::RrMap(ref map) => {
                if qtype == Qtype::ANY {
                    query_any(now, map)
                } else {
                    match qtype.data_type() {
                        Some(rtype) => query_type(now, map, rtype),
                        None => Err(Error::Miss),
                    }
                }
            }
        };

        match result {
            Ok(_) => self.stats.hit += 1,
            Err(Error::Miss) => self.stats.miss += 1,
            Err(Error::Drop) => self.stats.drop += 1,
        }
        result
    }

    /// Inserts `item` for `(rtype, name)` with the given rank.
    ///
    /// If live data already occupies the slot with a *strictly
    /// greater* rank, the insert is suppressed. TTLs are smoothed down
    /// to one week ([`Ttl::CACHE_CEILING`]) before storage. A CNAME
    /// entry converts the whole name into an alias, and an NXDOMAIN
    /// result replaces everything cached at the name.
    pub fn insert(&mut self, now: u64, rtype: Type, name: &Name, rank: Rank, item: Item) {
        if let Some(existing) = self.entries.get_mut(name) {
            if existing
                .live_rank(now, rtype)
                .map_or(false, |existing_rank| existing_rank > rank)
            {
                return;
            }
        }

        let meta = Meta { created: now, rank };
        match item {
            Item::Entry(rrset) => {
                let ttl = rrset.ttl.smoothed(Ttl::CACHE_CEILING);
                match rrset.data {
                    RrData::Cname(target) => {
                        self.entries
                            .insert(name.clone(), CacheEntry::Alias { meta, ttl, target });
                    }
                    data => {
                        let rtype = data.rtype();
                        self.slot(now, name, rtype, meta, Slot::Entry(Rrset::new(ttl, data)));
                    }
                }
            }
            Item::NoData { owner, ttl, soa } => {
                let slot = Slot::NoData {
                    owner,
                    ttl: ttl.smoothed(Ttl::CACHE_CEILING),
                    soa,
                };
                self.slot(now, name, rtype, meta, slot);
            }
            Item::NoDomain { owner, ttl, soa } => {
                self.entries.insert(
                    name.clone(),
                    CacheEntry::NoDomain {
                        meta,
                        owner,
                        ttl: ttl.smoothed(Ttl::CACHE_CEILING),
                        soa,
                    },
                );
            }
            Item::ServFail { owner, ttl, soa } => {
                let slot = Slot::ServFail {
                    owner,
                    ttl: ttl.smoothed(Ttl::CACHE_CEILING),
                    soa,
                };
                self.slot(now, name, rtype, meta, slot);
            }
        }
        self.stats.insert += 1;
    }

    /// Stores a per-type slot, converting the name's entry to an RR
    /// map if it currently holds an alias or an NXDOMAIN. Expired
    /// slots encountered along the way are discarded.
    fn slot(&mut self, now: u64, name: &Name, rtype: Type, meta: Meta, slot: Slot) {
        if let Some(CacheEntry::RrMap(map)) = self.entries.get_mut(name) {
            map.retain(|_, (meta, slot)| live(now, *meta, slot.ttl()));
            map.insert(rtype, (meta, slot));
            return;
        }
        let mut map = BTreeMap::new();
        map.insert(rtype, (meta, slot));
        self.entries.insert(name.clone(), CacheEntry::RrMap(map));
    }
}

/// Reads the slot for a specific type out of an RR map.
fn query_type(
    now: u64,
    map: &BTreeMap<Type, (Meta, Slot)>,
    rtype: Type,
) -> Result<Response, Error> {
    let (meta, slot) = map.get(&rtype).ok_or(Error::Miss)?;
    let left = slot
        .ttl()
        .remaining(now.saturating_sub(meta.created))
        .ok_or(Error::Drop)?;
    Ok(match *slot {
        Slot::Entry(ref rrset) => Response::Entry(Rrset::new(left, rrset.data.clone())),
        Slot::NoData {
            ref owner,
            ref soa,
            ..
        } => Response::NoData {
            owner: owner.clone(),
            ttl: left,
            soa: soa.clone(),
        },
        Slot::ServFail {
            ref owner,
            ref soa,
            ..
        } => Response::ServFail {
            owner: owner.clone(),
            ttl: left,
            soa: soa.clone(),
        },
    })
}

/// Reads all live positive slots out of an RR map (for `ANY`).
fn query_any(now: u64, map: &BTreeMap<Type, (Meta, Slot)>) -> Result<Response, Error> {
    let mut entries = BTreeMap::new();
    let mut any_live = false;
    for (&rtype, (meta, slot)) in map {
        if let Some(left) = slot.ttl().remaining(now.saturating_sub(meta.created)) {
            any_live = true;
            if let Slot::Entry(ref rrset) = *slot {
                entries.insert(rtype, Rrset::new(left, rrset.data.clone()));
            }
        }
    }
    if any_live {
        Ok(Response::Entries(entries))
    } else if map.is_empty() {
        Err(Error::Miss)
    } else {
        Err(Error::Drop)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
