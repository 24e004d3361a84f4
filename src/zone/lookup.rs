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

//! Implementation of the lookup process for nameservers, as described
//! in [RFC 1034 § 4.3.2].
//!
//! Resolution walks from the root of the tree toward the target name,
//! matching labels right to left, and keeps track of two things along
//! the way: the nearest enclosing zone apex (the deepest node carrying
//! an SOA record) and any zone cut it crosses (a non-apex node
//! carrying NS records). Crossing a cut before reaching the target
//! means the target lies in delegated, non-authoritative data, and the
//! lookup fails with [`LookupError::Delegation`] carrying what a
//! referral response needs. Reaching the target yields the requested
//! RRset together with an [`Authority`] describing the enclosing zone;
//! the remaining failures distinguish a name that exists without the
//! requested type ([`LookupError::EmptyNonTerminal`]), a name that
//! does not exist ([`LookupError::NotFound`]), both of which carry the
//! enclosing zone's SOA for negative caching per [RFC 2308 § 3], and
//! a name for which the tree holds no enclosing zone at all
//! ([`LookupError::NotAuthoritative`]).
//!
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
//! [RFC 2308 § 3]: https://datatracker.ietf.org/doc/html/rfc2308#section-3

use crate::name::Name;
use crate::rr::{RrData, RrMap, Rrset, Soa, Ttl, Type};

use super::{Node, ZoneTree};

////////////////////////////////////////////////////////////////////////
// LOOKUP RESULT TYPES                                                //
////////////////////////////////////////////////////////////////////////

/// The delegation context accompanying a successful lookup: the
/// enclosing zone's apex name and (if present) its apex NS RRset, for
/// filling the authority section of a response.
#[derive(Debug, Eq, PartialEq)]
pub struct Authority<'a> {
    pub zone: Name,
    pub ns: Option<&'a Rrset>,
}

/// The ways a lookup can fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LookupError {
    /// The name lies below a zone cut, in data this tree is not
    /// authoritative for. The cut's name and NS RRset are provided for
    /// composing a referral.
    Delegation { zone: Name, ns: Rrset },

    /// The name exists, but owns no RRset of the requested type.
    EmptyNonTerminal { zone: Name, ttl: Ttl, soa: Soa },

    /// The name does not exist. The enclosing zone's SOA is provided
    /// for negative caching.
    NotFound { zone: Name, ttl: Ttl, soa: Soa },

    /// No zone in this tree encloses the name.
    NotAuthoritative,
}

////////////////////////////////////////////////////////////////////////
// LOOKUP IMPLEMENTATION                                              //
////////////////////////////////////////////////////////////////////////

/// The outcome of walking the tree toward a target name.
enum Walk<'a> {
    /// The target node was reached. The apex, if any, is the nearest
    /// enclosing zone apex (possibly the target itself).
    Reached {
        node: &'a Node,
        apex: Option<(Name, &'a Node)>,
    },

    /// The walk ran out of tree before reaching the target.
    RanOut { apex: Option<(Name, &'a Node)> },

    /// The walk crossed a zone cut strictly above the target.
    Cut { zone: Name, ns: Rrset },
}

impl ZoneTree {
    /// Looks up the RRset of type `rtype` at `name`, returning it
    /// together with the enclosing zone's [`Authority`].
    pub fn lookup(&self, name: &Name, rtype: Type) -> Result<(&Rrset, Authority), LookupError> {
        match self.walk(name) {
            Walk::Reached { node, apex } => {
                let (zone, ttl, soa, ns) = unpack_apex(apex)?;
                match node.rrsets.get(rtype) {
                    Some(rrset) => Ok((rrset, Authority { zone, ns })),
                    None => Err(LookupError::EmptyNonTerminal {
                        zone,
                        ttl,
                        soa: soa.clone(),
                    }),
                }
            }
            Walk::RanOut { apex } => {
                let (zone, ttl, soa, _) = unpack_apex(apex)?;
                Err(LookupError::NotFound {
                    zone,
                    ttl,
                    soa: soa.clone(),
                })
            }
            Walk::Cut { zone, ns } => Err(LookupError::Delegation { zone, ns }),
        }
    }

    /// Looks up *all* RRsets at `name` (for `ANY` queries), with the
    /// same failure taxonomy as [`ZoneTree::lookup`]. A name whose map
    /// is empty is an empty non-terminal.
    pub fn lookup_any(&self, name: &Name) -> Result<(&RrMap, Authority), LookupError> {
        match self.walk(name) {
            Walk::Reached { node, apex } => {
                let (zone, ttl, soa, ns) = unpack_apex(apex)?;
                if node.rrsets.is_empty() {
                    Err(LookupError::EmptyNonTerminal {
                        zone,
                        ttl,
                        soa: soa.clone(),
                    })
                } else {
                    Ok((&node.rrsets, Authority { zone, ns }))
                }
            }
            Walk::RanOut { apex } => {
                let (zone, ttl, soa, _) = unpack_apex(apex)?;
                Err(LookupError::NotFound {
                    zone,
                    ttl,
                    soa: soa.clone(),
                })
            }
            Walk::Cut { zone, ns } => Err(LookupError::Delegation { zone, ns }),
        }
    }

    /// Walks from the root toward `name`, recording the nearest
    /// enclosing apex and stopping early at a zone cut. A node
    /// carrying NS but no SOA triggers the cut only when it lies
    /// *strictly above* the target: a query for the cut name itself is
    /// answered from the parent zone's data.
    fn walk(&self, name: &Name) -> Walk {
        let mut node = &self.root;
        let mut apex: Option<(Name, &Node)> = None;
        for level in (0..=name.len()).rev() {
            if node.rrsets.contains(Type::SOA) {
                apex = Some((name.superdomain(level).unwrap(), node));
            } else if level < name.len()
                && level > 0
                && node.rrsets.contains(Type::NS)
            {
                let ns = node.rrsets.get(Type::NS).unwrap().clone();
                return Walk::Cut {
                    zone: name.superdomain(level).unwrap(),
                    ns,
                };
            }
            if level == 0 {
                return Walk::Reached { node, apex };
            }
            match node.children.get(name.label(level - 1).unwrap()) {
                Some(child) => node = child,
                None => return Walk::RanOut { apex },
            }
        }
        unreachable!()
    }
}

/// Extracts the authority data from the apex recorded during a walk,
/// failing with [`LookupError::NotAuthoritative`] when there is none.
fn unpack_apex(
    apex: Option<(Name, &Node)>,
) -> Result<(Name, Ttl, &Soa, Option<&Rrset>), LookupError> {
    let (zone, node) = apex.ok_or(LookupError::NotAuthoritative)?;
    match node.rrsets.get(Type::SOA) {
        Some(Rrset {
            ttl,
            data: RrData::Soa(soa),
        }) => Ok((zone, *ttl, soa, node.rrsets.get(Type::NS))),
        _ => Err(LookupError::NotAuthoritative),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
