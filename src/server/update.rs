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

//! Handling of DNS UPDATE messages ([RFC 2136]).
//!
//! An update is a transaction: every prerequisite is validated against
//! the pre-update tree, the update operations are applied to a clone,
//! and the clone replaces the live tree only if it passes
//! [`ZoneTree::check`](crate::zone::ZoneTree::check). A failure at any
//! point leaves the server byte-for-byte as it was.
//!
//! DNSKEY operations are routed to the key store instead of the zone
//! data; the [`KeyAction`]s they produce are how secondaries learn
//! about new or withdrawn transfer keys.
//!
//! [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136

use log::warn;

use crate::message::{Packet, Payload, Prereq, Rcode, UpdateOp};
use crate::name::Name;
use crate::rr::{serial_newer, RrData, Rrset, Type};
use crate::zone::ZoneTree;

use super::auth::{KeyAction, Operation};
use super::Server;

////////////////////////////////////////////////////////////////////////
// UPDATE OUTCOMES                                                    //
////////////////////////////////////////////////////////////////////////

/// What processing an UPDATE produced: the RCODE for the response,
/// and, on success, whether zone data changed (so the primary must
/// NOTIFY) and any key store changes.
pub(crate) struct UpdateOutcome {
    pub rcode: Rcode,
    pub zone: Name,
    pub data_changed: bool,
    pub key_actions: Vec<KeyAction>,
}

impl UpdateOutcome {
    fn failed(zone: &Name, rcode: Rcode) -> Self {
        Self {
            rcode,
            zone: zone.clone(),
            data_changed: false,
            key_actions: Vec::new(),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// UPDATE PROCESSING                                                  //
////////////////////////////////////////////////////////////////////////

impl Server {
    /// Processes an UPDATE transaction.
    pub(crate) fn apply_update(&mut self, packet: &Packet) -> UpdateOutcome {
        let zone = packet.question.qname.clone();
        let (prereqs, updates) = match packet.payload {
            Payload::Update {
                ref prereqs,
                ref updates,
            } => (prereqs, updates),
            _ => return UpdateOutcome::failed(&zone, Rcode::FormErr),
        };

        let authorized = packet.tsig.as_ref().map_or(false, |tsig| {
            self.auth.authorise(&tsig.key, &zone, Operation::Update)
        });
        if !authorized {
            return UpdateOutcome::failed(&zone, Rcode::NotAuth);
        }

        // DNSKEY operations maintain the key store; everything else is
        // zone data.
        let (key_ops, data_ops): (Vec<UpdateOp>, Vec<UpdateOp>) =
            updates.iter().cloned().partition(is_key_op);

        // Data operations and prerequisites need a zone to operate on.
        if (!data_ops.is_empty() || !prereqs.is_empty()) && self.data.soa(&zone).is_none() {
            return UpdateOutcome::failed(&zone, Rcode::NotAuth);
        }

        // All prerequisites are validated (against the pre-update
        // tree) before anything is applied (RFC 2136 § 3.2).
        for prereq in prereqs {
            if !prereq_name(prereq).eq_or_subdomain_of(&zone) {
                return UpdateOutcome::failed(&zone, Rcode::NotZone);
            }
            if let Err(rcode) = self.check_prereq(prereq) {
                return UpdateOutcome::failed(&zone, rcode);
            }
        }

        // Removals must stay within the zone. Additions may reach
        // outside it: installing glue for a delegated sub-resolver
        // requires exactly that.
        for op in &data_ops {
            if !matches!(op, UpdateOp::Add(_, _)) && !update_name(op).eq_or_subdomain_of(&zone) {
                return UpdateOutcome::failed(&zone, Rcode::NotZone);
            }
        }

        let old_serial = self.data.soa(&zone).map(|(_, soa)| soa.serial);
        let mut next = self.data.clone();
        for op in &data_ops {
            apply_op(&mut next, op);
        }
        if let Err(issue) = next.check() {
            warn!("rejecting update to {zone}: {issue}");
            return UpdateOutcome::failed(&zone, Rcode::FormErr);
        }

        // The zone's serial must move forward so that secondaries poll
        // the new contents; bump it if the update itself did not.
        if !data_ops.is_empty() {
            if let Some(old) = old_serial {
                if let Some((ttl, soa)) = next.soa(&zone) {
                    if !serial_newer(old, soa.serial) {
                        let mut bumped = soa.clone();
                        bumped.serial = old.wrapping_add(1);
                        next.insert(&zone, Rrset::new(ttl, RrData::Soa(bumped)));
                    }
                }
            }
        }

        self.data = next;
        let key_actions = self.auth.handle_update(&key_ops);
        UpdateOutcome {
            rcode: Rcode::NoError,
            zone,
            data_changed: !data_ops.is_empty(),
            key_actions,
        }
    }

    /// Validates one prerequisite against the current tree, returning
    /// the RCODE its failure calls for (RFC 2136 § 3.2.5).
    fn check_prereq(&self, prereq: &Prereq) -> Result<(), Rcode> {
        match prereq {
            Prereq::NameInUse(name) => match self.data.get_all(name) {
                Some(_) => Ok(()),
                None => Err(Rcode::NxDomain),
            },
            Prereq::NotNameInUse(name) => match self.data.get_all(name) {
                Some(_) => Err(Rcode::YxDomain),
                None => Ok(()),
            },
            Prereq::Exists(name, rtype) => match self.data.get(name, *rtype) {
                Some(_) => Ok(()),
                None => Err(Rcode::NxRrset),
            },
            Prereq::NotExists(name, rtype) => match self.data.get(name, *rtype) {
                Some(_) => Err(Rcode::YxRrset),
                None => Ok(()),
            },
            Prereq::ExistsData(name, data) => match self.data.get(name, data.rtype()) {
                Some(rrset) if rrset.data == *data => Ok(()),
                _ => Err(Rcode::NxRrset),
            },
        }
    }
}

/// Returns whether an operation maintains the key store.
fn is_key_op(op: &UpdateOp) -> bool {
    match op {
        UpdateOp::Add(_, rrset) => rrset.rtype() == Type::DNSKEY,
        UpdateOp::Remove(_, rtype) => *rtype == Type::DNSKEY,
        UpdateOp::RemoveSingle(_, data) => data.rtype() == Type::DNSKEY,
        UpdateOp::RemoveAll(_) => false,
    }
}

/// The owner name an operation touches.
fn update_name(op: &UpdateOp) -> &Name {
    match op {
        UpdateOp::Remove(name, _)
        | UpdateOp::RemoveAll(name)
        | UpdateOp::RemoveSingle(name, _)
        | UpdateOp::Add(name, _) => name,
    }
}

/// The owner name a prerequisite tests.
fn prereq_name(prereq: &Prereq) -> &Name {
    match prereq {
        Prereq::NameInUse(name)
        | Prereq::NotNameInUse(name)
        | Prereq::Exists(name, _)
        | Prereq::NotExists(name, _)
        | Prereq::ExistsData(name, _) => name,
    }
}

/// Applies one operation to the tree. Removing a zone's SOA removes
/// the zone.
fn apply_op(tree: &mut ZoneTree, op: &UpdateOp) {
    match op {
        UpdateOp::Remove(name, rtype) if *rtype == Type::SOA => tree.remove_zone(name),
        UpdateOp::Remove(name, rtype) => {
            tree.remove(name, *rtype);
        }
        UpdateOp::RemoveAll(name) => tree.remove_all(name),
        UpdateOp::RemoveSingle(name, data) => tree.subtract(name, data),
        UpdateOp::Add(name, rrset) => tree.merge(name, rrset.clone()),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
