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

//! Key storage and zone/operation authorization.
//!
//! TSIG keys are DNSKEY records kept in their own [`ZoneTree`], and a
//! key's *name* encodes what it is allowed to do: an operation label
//! (`_transfer`, `_update`, or `_key-management`) followed by the zone
//! the key grants rights over. For example,
//! `laptop._update.example.com.` may update `example.com.`, and a key
//! under `_key-management.example.com.` may do anything to
//! `example.com.` and its sub-zones.
//!
//! Transfer keys additionally carry the replication peers in the
//! labels before the operation label:
//! `<primary-ip>[_port].<secondary-ip>[_port]._transfer.<zone>`. The
//! [`Authenticator::primaries`] and [`Authenticator::secondaries`]
//! accessors parse these out to drive the replication state machines.
//!
//! TSIG signing and verification are external; by the time a packet
//! reaches the engine, its key name is verified, and that name is all
//! authorization needs.

use std::net::{IpAddr, SocketAddr};

use log::warn;

use crate::message::UpdateOp;
use crate::name::{Label, Name};
use crate::rr::{Dnskey, RrData, Rrset, Ttl, Type};
use crate::zone::ZoneTree;

////////////////////////////////////////////////////////////////////////
// OPERATIONS                                                         //
////////////////////////////////////////////////////////////////////////

/// The operations a key can be authorized for, in increasing order of
/// privilege.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    Transfer,
    Update,
    KeyManagement,
}

impl Operation {
    /// Parses an operation label (`_transfer`, `_update`, or
    /// `_key-management`).
    fn from_label(label: &Label) -> Option<Self> {
        if label.eq_str("_transfer") {
            Some(Self::Transfer)
        } else if label.eq_str("_update") {
            Some(Self::Update)
        } else if label.eq_str("_key-management") {
            Some(Self::KeyManagement)
        } else {
            None
        }
    }
}

/// A change to the key store made by [`Authenticator::handle_update`].
/// Secondaries watch for these to bootstrap (or drop) zones whose
/// transfer keys come and go.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyAction {
    Added(Name),
    Removed(Name),
}

////////////////////////////////////////////////////////////////////////
// THE AUTHENTICATOR                                                  //
////////////////////////////////////////////////////////////////////////

/// The key store and authorization logic.
#[derive(Clone, Debug, Default)]
pub struct Authenticator {
    keys: ZoneTree,
}

impl Authenticator {
    /// Creates an `Authenticator` holding the given keys.
    pub fn new(keys: impl IntoIterator<Item = (Name, Dnskey)>) -> Self {
        let mut tree = ZoneTree::new();
        for (name, key) in keys {
            tree.merge(
                &name,
                Rrset::new(
                    Ttl::from(0),
                    RrData::Dnskey([key].into_iter().collect()),
                ),
            );
        }
        Self { keys: tree }
    }

    /// Returns the key tree (for serving key material to key-management
    /// queries).
    pub fn keys(&self) -> &ZoneTree {
        &self.keys
    }

    /// Returns the DNSKEY stored under `name`. A name is required to
    /// hold exactly one key; any other arrangement yields `None` with
    /// a warning.
    pub fn find_key(&self, name: &Name) -> Option<&Dnskey> {
        let rrset = self.keys.get(name, Type::DNSKEY)?;
        match rrset.data {
            RrData::Dnskey(ref set) if set.len() == 1 => set.iter().next(),
            RrData::Dnskey(ref set) => {
                warn!("{} keys stored under {name}; refusing to pick one", set.len());
                None
            }
            _ => None,
        }
    }

    /// Returns whether the key named `key_name` is authorized to
    /// perform `op` on `zone`.
    ///
    /// A key grants the operation named in its own name on the zone
    /// named after the operation label. Key-management keys are
    /// authorized for *every* operation on their zone and on any
    /// sub-zone.
    pub fn authorise(&self, key_name: &Name, zone: &Name, op: Operation) -> bool {
        let (key_zone, key_op) = match parse_key_name(key_name) {
            Some(parsed) => parsed,
            None => return false,
        };
        match key_op {
            Operation::KeyManagement => zone.eq_or_subdomain_of(&key_zone),
            _ => key_op == op && *zone == key_zone,
        }
    }

    /// Applies the DNSKEY operations of an UPDATE to the key store and
    /// reports what changed.
    pub fn handle_update(&mut self, updates: &[UpdateOp]) -> Vec<KeyAction> {
        let mut actions = Vec::new();
        for update in updates {
            match update {
                UpdateOp::Add(name, rrset) => {
                    if rrset.rtype() == Type::DNSKEY {
                        self.keys.merge(name, rrset.clone());
                        actions.push(KeyAction::Added(name.clone()));
                    }
                }
                UpdateOp::Remove(name, rtype) => {
                    if *rtype == Type::DNSKEY && self.keys.remove(name, Type::DNSKEY).is_some() {
                        actions.push(KeyAction::Removed(name.clone()));
                    }
                }
                UpdateOp::RemoveAll(name) => {
                    if self.keys.remove(name, Type::DNSKEY).is_some() {
                        actions.push(KeyAction::Removed(name.clone()));
                    }
                }
                UpdateOp::RemoveSingle(name, data) => {
                    if data.rtype() == Type::DNSKEY {
                        self.keys.subtract(name, data);
                        if self.keys.get(name, Type::DNSKEY).is_none() {
                            actions.push(KeyAction::Removed(name.clone()));
                        }
                    }
                }
            }
        }
        actions
    }

    /// Returns the primary peers configured for `zone` by its transfer
    /// keys.
    pub fn primaries(&self, zone: &Name) -> Vec<SocketAddr> {
        self.transfer_peers(zone, 0)
    }

    /// Returns the secondary peers configured for `zone` by its
    /// transfer keys.
    pub fn secondaries(&self, zone: &Name) -> Vec<SocketAddr> {
        self.transfer_peers(zone, 1)
    }

    /// Returns every `(zone, primary, key name)` triple named by a
    /// transfer key in the store. This is what a secondary bootstraps
    /// from.
    pub fn transfer_zones(&self) -> Vec<(Name, SocketAddr, Name)> {
        let mut out = Vec::new();
        self.walk_keys(&mut |key_name| {
            if let Some((zone, primary, _)) = parse_transfer_key(key_name) {
                out.push((zone, primary, key_name.clone()));
            }
        });
        out
    }

    /// Extracts peer addresses from the transfer keys of `zone`;
    /// `index` 0 takes the primary label, 1 the secondary label.
    fn transfer_peers(&self, zone: &Name, index: usize) -> Vec<SocketAddr> {
        let mut out = Vec::new();
        self.walk_keys(&mut |key_name| {
            if let Some((key_zone, primary, secondary)) = parse_transfer_key(key_name) {
                if key_zone == *zone {
                    out.push(if index == 0 { primary } else { secondary });
                }
            }
        });
        out
    }

    /// Calls `f` with the name of every key in the store.
    fn walk_keys(&self, f: &mut impl FnMut(&Name)) {
        for name in self.keys.names() {
            if self.keys.get(&name, Type::DNSKEY).is_some() {
                f(&name);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// KEY NAME PARSING                                                   //
////////////////////////////////////////////////////////////////////////

/// Parses a key name into the zone it grants rights over and the
/// operation it grants. The zone is the suffix after the operation
/// label.
pub(crate) fn parse_key_name(key_name: &Name) -> Option<(Name, Operation)> {
    for (index, label) in key_name.labels().enumerate() {
        if let Some(op) = Operation::from_label(label) {
            return Some((key_name.superdomain(index + 1).unwrap(), op));
        }
    }
    None
}

/// Parses a transfer key of the shape
/// `<pip>[_<pport>].<sip>[_<sport>]._transfer.<zone>` into
/// `(zone, primary, secondary)`.
pub(crate) fn parse_transfer_key(key_name: &Name) -> Option<(Name, SocketAddr, SocketAddr)> {
    if key_name.len() < 3 || Operation::from_label(key_name.label(2)?) != Some(Operation::Transfer)
    {
        return None;
    }
    let primary = parse_peer_label(key_name.label(0)?)?;
    let secondary = parse_peer_label(key_name.label(1)?)?;
    let zone = key_name.superdomain(3).unwrap();
    Some((zone, primary, secondary))
}

/// Parses an `<ip>[_<port>]` label. The port defaults to 53.
fn parse_peer_label(label: &Label) -> Option<SocketAddr> {
    let text = std::str::from_utf8(label.octets()).ok()?;
    let (ip_text, port) = match text.split_once('_') {
        Some((ip_text, port_text)) => (ip_text, port_text.parse::<u16>().ok()?),
        None => (text, 53),
    };
    let ip: IpAddr = ip_text.parse().ok()?;
    Some(SocketAddr::new(ip, port))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
