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

//! The authoritative zone store: a trie of domain names holding
//! RRsets, for keeping DNS zones loaded in memory.

use std::collections::{BTreeMap, HashMap};

use crate::name::{LabelBuf, Name};
use crate::rr::{RrData, RrMap, Rrset, Soa, Ttl, Type};

mod error;
mod lookup;
mod validation;
pub use error::Error;
pub use lookup::{Authority, LookupError};
pub use validation::CheckIssue;

////////////////////////////////////////////////////////////////////////
// THE ZONE TREE                                                      //
////////////////////////////////////////////////////////////////////////

/// An in-memory store of authoritative DNS data.
///
/// The `ZoneTree` mirrors the DNS name hierarchy: a tree of nodes keyed
/// by label, each node owning the [`RrMap`] of one domain name. A node
/// whose map holds an SOA record is a zone apex, and the subtree it
/// dominates (up to any deeper apex) is that zone's data. One tree may
/// therefore hold many zones, and the lookup methods (see the `lookup`
/// module) identify the enclosing zone and any intervening zone cut as
/// they descend.
///
/// `ZoneTree` is `Clone`, and transactional callers rely on that:
/// dynamic updates and incoming zone transfers are applied to a clone,
/// verified with [`ZoneTree::check`], and committed by swapping the
/// clone into place, or dropped, leaving the original untouched.
#[derive(Clone, Debug, Default)]
pub struct ZoneTree {
    root: Node,
}

/// A node in the DNS tree, which may own RRsets.
///
/// Nodes do not record their own names; every operation descends from
/// the root matching labels right to left, so the name of any node it
/// reaches is a suffix of the name being operated on.
#[derive(Clone, Debug, Default)]
struct Node {
    rrsets: RrMap,
    children: HashMap<LabelBuf, Node>,
}

impl Node {
    /// Returns the descendant node corresponding to `name`, if it
    /// exists. `level` should be set so that `self` corresponds to the
    /// label `name.label(level)` (or to the root when
    /// `level == name.len()`).
    fn descendant(&self, name: &Name, level: usize) -> Option<&Node> {
        if level == 0 {
            Some(self)
        } else {
            self.children
                .get(name.label(level - 1).unwrap())
                .and_then(|child| child.descendant(name, level - 1))
        }
    }

    /// Gets or creates a descendant node corresponding to `name`. Any
    /// nodes between the target descendant node and `self` will also
    /// be created.
    fn get_or_create_descendant(&mut self, name: &Name, level: usize) -> &mut Node {
        if level == 0 {
            self
        } else {
            self.children
                .entry(name.label(level - 1).unwrap().to_owned())
                .or_default()
                .get_or_create_descendant(name, level - 1)
        }
    }

    /// Runs `f` on the descendant node corresponding to `name`, if it
    /// exists, and prunes any nodes left empty behind it. Interior
    /// nodes with neither RRsets nor children must not linger: a
    /// leftover empty node would turn an NXDOMAIN into an empty
    /// non-terminal.
    fn with_descendant(&mut self, name: &Name, level: usize, f: &mut dyn FnMut(&mut Node)) {
        if level == 0 {
            f(self);
        } else if let Some(label) = name.label(level - 1) {
            if let Some(child) = self.children.get_mut(label) {
                child.with_descendant(name, level - 1, f);
                if child.rrsets.is_empty() && child.children.is_empty() {
                    self.children.remove(label);
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// MUTATION                                                           //
////////////////////////////////////////////////////////////////////////

impl ZoneTree {
    /// Creates a new, initially empty `ZoneTree`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `rrset` at `name`, replacing and returning any existing
    /// RRset of the same type. Intermediate names exist implicitly:
    /// inserting at `a.b.c.` materializes nodes for `b.c.` and `c.` as
    /// empty non-terminals.
    pub fn insert(&mut self, name: &Name, rrset: Rrset) -> Option<Rrset> {
        self.root
            .get_or_create_descendant(name, name.len())
            .rrsets
            .insert(rrset)
    }

    /// Unions `rrset` into the RRsets at `name` (see [`RrMap::merge`]).
    pub fn merge(&mut self, name: &Name, rrset: Rrset) {
        self.root
            .get_or_create_descendant(name, name.len())
            .rrsets
            .merge(rrset);
    }

    /// Subtracts the values of `data` from the RRset of the matching
    /// type at `name` (see [`RrMap::subtract`]).
    pub fn subtract(&mut self, name: &Name, data: &RrData) {
        self.root.with_descendant(name, name.len(), &mut |node| {
            node.rrsets.subtract(data);
        });
    }

    /// Removes and returns the RRset of type `rtype` at `name`.
    pub fn remove(&mut self, name: &Name, rtype: Type) -> Option<Rrset> {
        let mut removed = None;
        self.root.with_descendant(name, name.len(), &mut |node| {
            removed = node.rrsets.remove(rtype);
        });
        removed
    }

    /// Removes all RRsets at `name`. Descendants of `name` are not
    /// touched.
    pub fn remove_all(&mut self, name: &Name) {
        self.root.with_descendant(name, name.len(), &mut |node| {
            node.rrsets = RrMap::new();
        });
    }

    /// Bulk-loads a dictionary of owner names and their RRset maps, as
    /// produced by a zone-file parser, unioning it into the tree.
    pub fn load(&mut self, entries: impl IntoIterator<Item = (Name, RrMap)>) {
        for (name, rrsets) in entries {
            let node = self.root.get_or_create_descendant(&name, name.len());
            for (_, rrset) in rrsets.iter() {
                node.rrsets.merge(rrset.clone());
            }
        }
    }

    /// Erases the zone rooted at `apex`: the apex's RRsets and the
    /// whole subtree under it, *except* that any sub-zone with its own
    /// SOA record is independent and survives (along with everything
    /// below it).
    pub fn remove_zone(&mut self, apex: &Name) {
        self.root.with_descendant(apex, apex.len(), &mut |node| {
            node.rrsets = RrMap::new();
            prune_zone_children(node);
        });
    }
}

/// Removes `node`'s descendants, stopping at (and keeping) any
/// re-rooted sub-zone.
fn prune_zone_children(node: &mut Node) {
    node.children.retain(|_, child| {
        if child.rrsets.contains(Type::SOA) {
            true
        } else {
            child.rrsets = RrMap::new();
            prune_zone_children(child);
            !child.children.is_empty()
        }
    });
}

////////////////////////////////////////////////////////////////////////
// WHOLE-ZONE TRAVERSAL                                               //
////////////////////////////////////////////////////////////////////////

impl ZoneTree {
    /// Returns the RRset of type `rtype` stored at `name`. This reads
    /// the raw tree (below zone cuts too), which is what glue lookup
    /// and update prerequisites need; query answering goes through the
    /// `lookup` module instead.
    pub fn get(&self, name: &Name, rtype: Type) -> Option<&Rrset> {
        self.root
            .descendant(name, name.len())
            .and_then(|node| node.rrsets.get(rtype))
    }

    /// Returns all RRsets stored at `name`, reading the raw tree like
    /// [`ZoneTree::get`].
    pub fn get_all(&self, name: &Name) -> Option<&RrMap> {
        self.root
            .descendant(name, name.len())
            .map(|node| &node.rrsets)
            .filter(|rrsets| !rrsets.is_empty())
    }

    /// Returns every name in the tree owning at least one RRset.
    pub fn names(&self) -> Vec<Name> {
        fn visit(node: &Node, name: Name, out: &mut Vec<Name>) {
            if !node.rrsets.is_empty() {
                out.push(name.clone());
            }
            for (label, child) in &node.children {
                visit(child, name.child(label.clone()).unwrap(), out);
            }
        }
        let mut out = Vec::new();
        visit(&self.root, Name::root(), &mut out);
        out
    }

    /// Returns the SOA RRset at `zone`, if `zone` is a zone apex.
    pub fn soa(&self, zone: &Name) -> Option<(Ttl, &Soa)> {
        let node = self.root.descendant(zone, zone.len())?;
        match node.rrsets.get(Type::SOA) {
            Some(Rrset {
                ttl,
                data: RrData::Soa(soa),
            }) => Some((*ttl, soa)),
            _ => None,
        }
    }

    /// Returns the apex name and SOA of the nearest enclosing zone of
    /// `name`, if this tree is authoritative for it.
    pub fn zone_of(&self, name: &Name) -> Option<(Name, Ttl, &Soa)> {
        let mut node = &self.root;
        let mut apex = None;
        for level in (0..=name.len()).rev() {
            if let Some(Rrset {
                ttl,
                data: RrData::Soa(soa),
            }) = node.rrsets.get(Type::SOA)
            {
                apex = Some((name.len() - level, *ttl, soa));
            }
            if level == 0 {
                break;
            }
            match node.children.get(name.label(level - 1).unwrap()) {
                Some(child) => node = child,
                None => break,
            }
        }
        apex.map(|(depth, ttl, soa)| (name.superdomain(name.len() - depth).unwrap(), ttl, soa))
    }

    /// Returns the zone's SOA RRset along with the RRsets of every
    /// name under `apex`, keyed by owner. The apex SOA itself is kept
    /// out of the map (zone transfers emit it separately), and
    /// independent sub-zones (deeper names with their own SOA) are
    /// skipped. This fails if `apex` does not own an SOA record.
    pub fn entries(&self, apex: &Name) -> Result<(Rrset, BTreeMap<Name, RrMap>), Error> {
        let node = self
            .root
            .descendant(apex, apex.len())
            .ok_or_else(|| Error::NotAZone(apex.clone()))?;
        let soa = node
            .rrsets
            .get(Type::SOA)
            .cloned()
            .ok_or_else(|| Error::NotAZone(apex.clone()))?;

        let mut entries = BTreeMap::new();
        collect_entries(node, apex.clone(), true, &mut entries);
        Ok((soa, entries))
    }

    /// Folds `f` over every RRset of type `rtype` under `apex`, in
    /// canonical name order. This fails if `apex` does not own an SOA
    /// record.
    pub fn fold<B>(
        &self,
        apex: &Name,
        rtype: Type,
        mut f: impl FnMut(B, &Name, &Rrset) -> B,
        init: B,
    ) -> Result<B, Error> {
        let (_, entries) = self.entries(apex)?;
        let mut acc = init;
        for (name, rrsets) in &entries {
            if let Some(rrset) = rrsets.get(rtype) {
                acc = f(acc, name, rrset);
            }
        }
        if rtype == Type::SOA {
            // entries() withholds the apex SOA; fold should see it.
            if let Some(node) = self.root.descendant(apex, apex.len()) {
                if let Some(rrset) = node.rrsets.get(Type::SOA) {
                    acc = f(acc, apex, rrset);
                }
            }
        }
        Ok(acc)
    }
}

/// Collects the RRsets of `node` and its descendants into `entries`,
/// stopping at independent sub-zones.
fn collect_entries(node: &Node, name: Name, at_apex: bool, entries: &mut BTreeMap<Name, RrMap>) {
    if !at_apex && node.rrsets.contains(Type::SOA) {
        return;
    }
    let mut rrsets = node.rrsets.clone();
    if at_apex {
        rrsets.remove(Type::SOA);
    }
    if !rrsets.is_empty() {
        entries.insert(name.clone(), rrsets);
    }
    for (label, child) in &node.children {
        let child_name = name.child(label.clone()).unwrap();
        collect_entries(child, child_name, false, entries);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn soa_rrset(serial: u32) -> Rrset {
        Rrset::new(
            Ttl::from(3600),
            RrData::Soa(Soa {
                mname: name("ns1.example."),
                rname: name("hostmaster.example."),
                serial,
                refresh: 86400,
                retry: 7200,
                expire: 3600000,
                minimum: 3600,
            }),
        )
    }

    fn a_rrset(addr: &str) -> Rrset {
        Rrset::new(Ttl::from(3600), RrData::a(addr.parse().unwrap()))
    }

    fn ns_rrset(target: &str) -> Rrset {
        Rrset::new(Ttl::from(3600), RrData::ns(name(target)))
    }

    #[test]
    fn insert_replaces_by_type() {
        let mut tree = ZoneTree::new();
        let www = name("www.example.");
        assert!(tree.insert(&www, a_rrset("192.0.2.1")).is_none());
        let old = tree.insert(&www, a_rrset("192.0.2.2")).unwrap();
        assert_eq!(old, a_rrset("192.0.2.1"));
    }

    #[test]
    fn inserted_rrsets_are_found_again() {
        // A round-trip over a batch of inserts: every RRset that was
        // not later overwritten comes back out of lookup.
        let inserts: Vec<(Name, Rrset)> = vec![
            (name("example."), soa_rrset(1)),
            (name("example."), ns_rrset("ns1.example.")),
            (name("ns1.example."), a_rrset("192.0.2.1")),
            (name("a.example."), a_rrset("192.0.2.10")),
            (name("b.a.example."), a_rrset("192.0.2.11")),
            (name("a.example."), ns_rrset("ns1.example.")),
            // Overwrites the earlier RRset at the same (name, type).
            (name("a.example."), a_rrset("192.0.2.12")),
        ];
        let mut tree = ZoneTree::new();
        for (owner, rrset) in &inserts {
            tree.insert(owner, rrset.clone());
        }
        for (i, (owner, rrset)) in inserts.iter().enumerate() {
            let overwritten = inserts[i + 1..]
                .iter()
                .any(|(o, r)| o == owner && r.rtype() == rrset.rtype());
            if !overwritten {
                assert_eq!(tree.get(owner, rrset.rtype()), Some(rrset));
            }
        }
        assert_eq!(
            tree.get(&name("a.example."), Type::A),
            Some(&a_rrset("192.0.2.12"))
        );
    }

    #[test]
    fn load_merges_a_parsed_dictionary() {
        let mut parsed: BTreeMap<Name, RrMap> = BTreeMap::new();
        parsed.insert(
            name("example."),
            [soa_rrset(1), ns_rrset("ns1.example.")]
                .into_iter()
                .collect(),
        );
        parsed.insert(
            name("ns1.example."),
            [a_rrset("192.0.2.1")].into_iter().collect(),
        );
        let mut tree = ZoneTree::new();
        tree.load(parsed);
        assert!(tree.soa(&name("example.")).is_some());
        assert_eq!(
            tree.get(&name("ns1.example."), Type::A),
            Some(&a_rrset("192.0.2.1"))
        );
        assert_eq!(tree.check(), Ok(()));
    }

    #[test]
    fn remove_prunes_empty_branches() {
        let mut tree = ZoneTree::new();
        let apex = name("example.");
        let www = name("www.deep.example.");
        tree.insert(&apex, soa_rrset(1));
        tree.insert(&www, a_rrset("192.0.2.1"));
        assert_eq!(tree.remove(&www, Type::A), Some(a_rrset("192.0.2.1")));

        // With the branch pruned, the intermediate name must be gone,
        // not an empty non-terminal.
        assert!(matches!(
            tree.lookup(&name("deep.example."), Type::A),
            Err(LookupError::NotFound { .. })
        ));
    }

    #[test]
    fn remove_all_keeps_descendants() {
        let mut tree = ZoneTree::new();
        tree.insert(&name("mid.example."), a_rrset("192.0.2.1"));
        tree.insert(&name("low.mid.example."), a_rrset("192.0.2.2"));
        tree.remove_all(&name("mid.example."));
        assert!(tree
            .root
            .descendant(&name("low.mid.example."), 3)
            .is_some());
        let mid = tree.root.descendant(&name("mid.example."), 2).unwrap();
        assert!(mid.rrsets.is_empty());
    }

    #[test]
    fn remove_zone_spares_rerooted_subzones() {
        let mut tree = ZoneTree::new();
        tree.insert(&name("example."), soa_rrset(1));
        tree.insert(&name("example."), ns_rrset("ns1.example."));
        tree.insert(&name("ns1.example."), a_rrset("192.0.2.1"));
        tree.insert(&name("sub.example."), soa_rrset(5));
        tree.insert(&name("www.sub.example."), a_rrset("192.0.2.53"));

        tree.remove_zone(&name("example."));

        // The parent zone's data is gone...
        assert!(tree.soa(&name("example.")).is_none());
        assert!(tree
            .root
            .descendant(&name("ns1.example."), 2)
            .is_none());
        // ...but the re-rooted sub-zone survives in full.
        assert!(tree.soa(&name("sub.example.")).is_some());
        assert!(tree
            .root
            .descendant(&name("www.sub.example."), 3)
            .is_some());
    }

    #[test]
    fn zone_of_finds_the_nearest_apex() {
        let mut tree = ZoneTree::new();
        tree.insert(&name("example."), soa_rrset(1));
        tree.insert(&name("sub.example."), soa_rrset(2));

        let (apex, _, soa) = tree.zone_of(&name("www.example.")).unwrap();
        assert_eq!(apex, name("example."));
        assert_eq!(soa.serial, 1);

        let (apex, _, soa) = tree.zone_of(&name("www.sub.example.")).unwrap();
        assert_eq!(apex, name("sub.example."));
        assert_eq!(soa.serial, 2);

        assert!(tree.zone_of(&name("other.")).is_none());
    }

    #[test]
    fn entries_covers_the_zone_and_stops_at_subzones() {
        let mut tree = ZoneTree::new();
        tree.insert(&name("example."), soa_rrset(1));
        tree.insert(&name("example."), ns_rrset("ns1.example."));
        tree.insert(&name("ns1.example."), a_rrset("192.0.2.1"));
        tree.insert(&name("child.example."), soa_rrset(9));
        tree.insert(&name("www.child.example."), a_rrset("192.0.2.99"));

        let (soa, entries) = tree.entries(&name("example.")).unwrap();
        assert_eq!(soa, soa_rrset(1));
        let owners: BTreeSet<_> = entries.keys().cloned().collect();
        assert_eq!(
            owners,
            BTreeSet::from([name("example."), name("ns1.example.")])
        );
        // The apex SOA is withheld from the map.
        assert!(!entries[&name("example.")].contains(Type::SOA));
        assert!(entries[&name("example.")].contains(Type::NS));
    }

    #[test]
    fn entries_rejects_non_apexes() {
        let mut tree = ZoneTree::new();
        tree.insert(&name("example."), soa_rrset(1));
        assert_eq!(
            tree.entries(&name("www.example.")),
            Err(Error::NotAZone(name("www.example.")))
        );
    }

    #[test]
    fn fold_visits_matching_rrsets_in_order() {
        let mut tree = ZoneTree::new();
        tree.insert(&name("example."), soa_rrset(1));
        tree.insert(&name("a.example."), a_rrset("192.0.2.1"));
        tree.insert(&name("b.example."), a_rrset("192.0.2.2"));
        tree.insert(&name("b.example."), ns_rrset("ns1.example."));

        let owners = tree
            .fold(
                &name("example."),
                Type::A,
                |mut acc: Vec<Name>, owner, _| {
                    acc.push(owner.clone());
                    acc
                },
                Vec::new(),
            )
            .unwrap();
        assert_eq!(owners, vec![name("a.example."), name("b.example.")]);
    }
}
