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

//! Whole-tree invariant checking, run at commit points (after dynamic
//! updates and incoming zone transfers).
//!
//! The checks implemented here are the ones the data structures cannot
//! enforce on their own:
//!
//! 1. A name owning a CNAME record owns no other records.
//! 2. Every zone apex (SOA owner) also owns an NS RRset.
//! 3. An NS record whose server name falls at or below the NS record's
//!    own owner requires address records (glue) for that server, and
//!    the glue must actually be present in the tree. This is the
//!    "narrow" glue rule of [RFC 1034 § 4.2.1]: without the glue, the
//!    delegation (or the zone itself) cannot be reached.
//!
//! Occluded data below zone cuts is deliberately *not* flagged: it can
//! legitimately arise from dynamic updates (see [RFC 2136] paragraph
//! 7.13) and from out-of-zone additions, and other nameservers'
//! checkers skip it too.
//!
//! [RFC 1034 § 4.2.1]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.2.1
//! [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136

use std::fmt;

use crate::name::Name;
use crate::rr::{RrData, Type};

use super::{Node, ZoneTree};

////////////////////////////////////////////////////////////////////////
// CHECK ISSUES                                                       //
////////////////////////////////////////////////////////////////////////

/// A semantic error found in the tree by [`ZoneTree::check`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CheckIssue {
    /// The name owns a CNAME record alongside records of other types.
    CnameAndOtherData(Name),

    /// The zone apex owns no NS RRset.
    MissingApexNs(Name),

    /// An in-bailiwick nameserver has no address records in the tree.
    MissingNsAddress(Name),
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CnameAndOtherData(ref name) => write!(
                f,
                "the name {name}, which has a CNAME record, cannot have other records"
            ),
            Self::MissingApexNs(ref name) => {
                write!(f, "the zone {name} is missing an NS record")
            }
            Self::MissingNsAddress(ref name) => write!(
                f,
                "the in-bailiwick nameserver {name} is missing an address record"
            ),
        }
    }
}

impl std::error::Error for CheckIssue {}

////////////////////////////////////////////////////////////////////////
// CHECK IMPLEMENTATION                                               //
////////////////////////////////////////////////////////////////////////

impl ZoneTree {
    /// Checks the whole tree for semantic errors, failing on the first
    /// one found. Callers applying a transaction run this on the
    /// mutated clone before swapping it in.
    pub fn check(&self) -> Result<(), CheckIssue> {
        self.scan(&self.root, Name::root())
    }

    fn scan(&self, node: &Node, name: Name) -> Result<(), CheckIssue> {
        if node.rrsets.contains(Type::CNAME) && node.rrsets.len() > 1 {
            return Err(CheckIssue::CnameAndOtherData(name));
        }
        if node.rrsets.contains(Type::SOA) && !node.rrsets.contains(Type::NS) {
            return Err(CheckIssue::MissingApexNs(name));
        }
        if let Some(RrData::Ns(targets)) = node.rrsets.get(Type::NS).map(|rrset| &rrset.data) {
            for target in targets {
                if target.eq_or_subdomain_of(&name) && !self.has_address(target) {
                    return Err(CheckIssue::MissingNsAddress(target.clone()));
                }
            }
        }
        for (label, child) in &node.children {
            let child_name = name.child(label.clone()).unwrap();
            self.scan(child, child_name)?;
        }
        Ok(())
    }

    /// Returns whether the tree holds an A or AAAA RRset at `name`,
    /// searching the raw tree (below zone cuts, where glue lives).
    fn has_address(&self, name: &Name) -> bool {
        self.root
            .descendant(name, name.len())
            .map(|node| node.rrsets.contains(Type::A) || node.rrsets.contains(Type::AAAA))
            .unwrap_or(false)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::{Rrset, Soa, Ttl};

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn soa_rrset() -> Rrset {
        Rrset::new(
            Ttl::from(3600),
            RrData::Soa(Soa {
                mname: name("ns1.example."),
                rname: name("hostmaster.example."),
                serial: 1,
                refresh: 86400,
                retry: 7200,
                expire: 3600000,
                minimum: 3600,
            }),
        )
    }

    fn a_rrset() -> Rrset {
        Rrset::new(Ttl::from(3600), RrData::a("192.0.2.1".parse().unwrap()))
    }

    fn ns_rrset(target: &str) -> Rrset {
        Rrset::new(Ttl::from(3600), RrData::ns(name(target)))
    }

    fn valid_zone() -> ZoneTree {
        let mut tree = ZoneTree::new();
        tree.insert(&name("example."), soa_rrset());
        tree.insert(&name("example."), ns_rrset("ns1.example."));
        tree.insert(&name("ns1.example."), a_rrset());
        tree
    }

    #[test]
    fn a_valid_zone_passes() {
        assert_eq!(valid_zone().check(), Ok(()));
    }

    #[test]
    fn cname_may_not_coexist_with_other_data() {
        let mut tree = valid_zone();
        let www = name("www.example.");
        tree.insert(
            &www,
            Rrset::new(Ttl::from(3600), RrData::Cname(name("ns1.example."))),
        );
        assert_eq!(tree.check(), Ok(()));
        tree.insert(&www, a_rrset());
        assert_eq!(tree.check(), Err(CheckIssue::CnameAndOtherData(www)));
    }

    #[test]
    fn an_apex_needs_ns() {
        let mut tree = ZoneTree::new();
        tree.insert(&name("example."), soa_rrset());
        assert_eq!(
            tree.check(),
            Err(CheckIssue::MissingApexNs(name("example.")))
        );
    }

    #[test]
    fn in_bailiwick_nameservers_need_glue() {
        let mut tree = valid_zone();
        tree.insert(&name("sub.example."), ns_rrset("ns.sub.example."));
        assert_eq!(
            tree.check(),
            Err(CheckIssue::MissingNsAddress(name("ns.sub.example.")))
        );
        tree.insert(&name("ns.sub.example."), a_rrset());
        assert_eq!(tree.check(), Ok(()));
    }

    #[test]
    fn out_of_bailiwick_nameservers_need_no_glue() {
        let mut tree = valid_zone();
        tree.insert(&name("sub.example."), ns_rrset("ns.elsewhere.test."));
        assert_eq!(tree.check(), Ok(()));
    }
}
