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

//! The core of a DNS engine, suitable for building authoritative
//! nameservers (primary and secondary) and stub resolvers.
//!
//! This crate implements the data structures and per-message processing
//! of a DNS server, deliberately leaving I/O to its caller:
//!
//! * the [`zone`] module provides the authoritative zone store, a trie
//!   of domain names with lookup semantics per [RFC 1034 § 4.3.2];
//! * the [`cache`] module provides a ranked, TTL-aging LRU of resolver
//!   results;
//! * the [`resolver`] module drives iterative resolution against the
//!   cache, and scrubs received answers into it;
//! * the [`server`] module processes decoded DNS messages against the
//!   zone store (queries, RFC 2136 dynamic updates, zone transfers,
//!   and NOTIFY) and keeps the primary/secondary replication state
//!   machines.
//!
//! Everything here is a pure state machine: entry points consume a
//! decoded message (see [`message`]), the current time, and a
//! caller-supplied random source, and produce a response plus any
//! messages to transmit. Wire-format encoding and decoding, TSIG
//! signing and verification, and the network transport are external
//! collaborators.
//!
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2

pub mod cache;
pub mod class;
pub mod message;
pub mod name;
pub mod resolver;
pub mod rr;
pub mod server;
pub mod zone;

mod util;
