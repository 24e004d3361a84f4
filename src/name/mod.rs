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

//! Implementation of data structures related to domain names.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

mod error;
mod label;
pub use error::Error;
pub use label::{Label, LabelBuf};

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A domain name: an ordered sequence of [`Label`]s, leftmost (deepest)
/// label first. The root is the empty sequence.
///
/// A `Name` can only be constructed if its on-the-wire form would fit
/// in 255 octets, and comparisons between `Name`s are
/// ASCII-case-insensitive (following the [`Label`] comparison rules).
/// The [`Ord`] implementation employs DNSSEC's canonical ordering of
/// domain names: per [RFC 4034 § 6.1], `Name`s are ordered as strings
/// of labels read from right to left.
///
/// `Name`s are constructed through the [`FromStr`] implementation, from
/// label sequences through [`Name::from_labels`], or derived from other
/// `Name`s through [`Name::parent`], [`Name::child`], and
/// [`Name::superdomain`].
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
#[derive(Clone)]
pub struct Name {
    labels: Vec<LabelBuf>,
}

impl Name {
    /// Returns the DNS root, `.`.
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Constructs a `Name` from a sequence of labels, leftmost first.
    /// This fails if the resulting name would not fit in 255 octets on
    /// the wire.
    pub fn from_labels(labels: Vec<LabelBuf>) -> Result<Self, Error> {
        let wire_len = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
        if wire_len > MAX_WIRE_LEN {
            Err(Error::NameTooLong)
        } else {
            Ok(Self { labels })
        }
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns whether the `Name` is a wildcard domain name (i.e.,
    /// whether its first label is `*`).
    pub fn is_wildcard(&self) -> bool {
        self.labels.first().is_some_and(|l| l.is_asterisk())
    }

    /// Returns the number of labels in this `Name`. The root has zero.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns whether the `Name` has no labels; equivalent to
    /// [`Name::is_root`].
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the label at position `index` (leftmost is zero), if
    /// there is one.
    pub fn label(&self, index: usize) -> Option<&Label> {
        self.labels.get(index).map(|l| &**l)
    }

    /// Returns an iterator over the labels of this `Name`, leftmost
    /// first.
    pub fn labels(&self) -> impl DoubleEndedIterator<Item = &Label> + ExactSizeIterator {
        self.labels.iter().map(|l| &**l)
    }

    /// Returns the length of the uncompressed on-the-wire
    /// representation of this `Name`.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Returns the parent of this `Name` (the name without its leftmost
    /// label). The root has no parent.
    pub fn parent(&self) -> Result<Self, Error> {
        if self.is_root() {
            Err(Error::RootHasNoParent)
        } else {
            Ok(Self {
                labels: self.labels[1..].to_vec(),
            })
        }
    }

    /// Returns the name obtained by prepending `label` to this `Name`.
    /// This fails if the resulting name would be too long.
    pub fn child(&self, label: LabelBuf) -> Result<Self, Error> {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(label);
        labels.extend_from_slice(&self.labels);
        Self::from_labels(labels)
    }

    /// Returns the superdomain obtained by skipping the first `skip`
    /// labels of the `Name`, or `None` if there aren't enough labels.
    /// `skip == self.len()` yields the root.
    pub fn superdomain(&self, skip: usize) -> Option<Self> {
        if skip <= self.len() {
            Some(Self {
                labels: self.labels[skip..].to_vec(),
            })
        } else {
            None
        }
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.len() >= other.len()
            && self
                .labels()
                .rev()
                .zip(other.labels().rev())
                .all(|(a, b)| a == b)
    }

    /// Returns whether this `Name` is a strict subdomain of `other`
    /// (equal names do not qualify).
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        self.len() > other.len() && self.eq_or_subdomain_of(other)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            for label in self.labels() {
                write!(f, "{label}.")?;
            }
            Ok(())
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.labels().zip(other.labels()).all(|(a, b)| a == b)
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels()
            .rev()
            .zip(other.labels().rev())
            .find_map(|(a, b)| Some(a.cmp(b)).filter(|ordering| ordering.is_ne()))
            .unwrap_or_else(|| self.len().cmp(&other.len()))
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in self.labels() {
            state.write_usize(label.len());
            label.hash(state);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The passed
/// string must be strictly ASCII and absolute (ending with a `.`).
/// Escape sequences as defined by [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut remaining_octets: &[u8] = s.as_ref();
        let mut labels = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut absolute = false;

        // NOTE: to check that the string is ASCII, it suffices to check
        // that each octet is ASCII as we go. This is because all
        // multi-byte characters start with an octet that is not ASCII.
        while let Some(&octet) = remaining_octets.first() {
            absolute = false;
            if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                current.push(value);
                remaining_octets = &remaining_octets[consumed + 1..];
            } else if octet == b'.' {
                labels.push(LabelBuf::try_from(current.as_slice())?);
                current.clear();
                absolute = true;
                remaining_octets = &remaining_octets[1..];
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                current.push(octet);
                remaining_octets = &remaining_octets[1..];
            }
        }
        if !absolute {
            return Err(Error::StrNotAbsolute);
        }
        Self::from_labels(labels)
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    if remaining_octets.is_empty() {
        Err(Error::InvalidEscape)
    } else if remaining_octets[0].is_ascii_digit() {
        if remaining_octets.len() < 3
            || !remaining_octets[1].is_ascii_digit()
            || !remaining_octets[2].is_ascii_digit()
        {
            Err(Error::InvalidEscape)
        } else {
            let hundreds = (remaining_octets[0] - b'0') as usize;
            let tens = (remaining_octets[1] - b'0') as usize;
            let ones = (remaining_octets[2] - b'0') as usize;
            let value = 100 * hundreds + 10 * tens + ones;
            if value > 255 {
                Err(Error::InvalidEscape)
            } else {
                Ok((value as u8, 3))
            }
        }
    } else {
        Ok((remaining_octets[0], 1))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_expected_characteristics() {
        let root = Name::root();
        assert!(root.is_root());
        assert_eq!(root.len(), 0);
        assert_eq!(root.wire_len(), 1);
        assert_eq!(root.to_string(), ".");
    }

    #[test]
    fn is_wildcard_works() {
        let wildcard: Name = "*.signpost.test.".parse().unwrap();
        let not_a_wildcard: Name = "signpost.test.".parse().unwrap();
        let inner_asterisk: Name = "x.*.signpost.test.".parse().unwrap();
        assert!(wildcard.is_wildcard());
        assert!(!not_a_wildcard.is_wildcard());
        assert!(!inner_asterisk.is_wildcard());
    }

    #[test]
    fn parent_works() {
        let name: Name = "a.b.c.".parse().unwrap();
        let parent = name.parent().unwrap();
        assert_eq!(parent, "b.c.".parse().unwrap());
        assert_eq!(parent.parent().unwrap().parent().unwrap(), Name::root());
        assert_eq!(Name::root().parent(), Err(Error::RootHasNoParent));
    }

    #[test]
    fn child_works() {
        let name: Name = "example.test.".parse().unwrap();
        let child = name.child(LabelBuf::try_from("www").unwrap()).unwrap();
        assert_eq!(child, "www.example.test.".parse().unwrap());
    }

    #[test]
    fn superdomain_works() {
        let subdomain: Name = "subdomain.example.test.".parse().unwrap();
        assert_eq!(subdomain.superdomain(0).as_ref(), Some(&subdomain));
        assert_eq!(subdomain.superdomain(1), "example.test.".parse().ok());
        assert_eq!(subdomain.superdomain(2), "test.".parse().ok());
        assert_eq!(subdomain.superdomain(3), Some(Name::root()));
        assert_eq!(subdomain.superdomain(4), None);
    }

    #[test]
    fn eq_or_subdomain_of_works() {
        let subdomain: Name = "subdomain.example.test.".parse().unwrap();
        let domain: Name = "example.test.".parse().unwrap();
        let tld: Name = "test.".parse().unwrap();
        let root = Name::root();
        assert!(subdomain.eq_or_subdomain_of(&subdomain));
        assert!(subdomain.eq_or_subdomain_of(&domain));
        assert!(subdomain.eq_or_subdomain_of(&tld));
        assert!(subdomain.eq_or_subdomain_of(&root));
        assert!(!domain.eq_or_subdomain_of(&subdomain));
        assert!(domain.eq_or_subdomain_of(&domain));
        assert!(!tld.eq_or_subdomain_of(&subdomain));
        assert!(root.eq_or_subdomain_of(&root));
        assert!(!root.eq_or_subdomain_of(&tld));

        let other_test: Name = "other.test.".parse().unwrap();
        assert!(!domain.eq_or_subdomain_of(&other_test));
        assert!(!other_test.eq_or_subdomain_of(&domain));
    }

    #[test]
    fn is_subdomain_of_is_strict() {
        let domain: Name = "example.test.".parse().unwrap();
        let tld: Name = "test.".parse().unwrap();
        assert!(domain.is_subdomain_of(&tld));
        assert!(!domain.is_subdomain_of(&domain));
        assert!(!tld.is_subdomain_of(&domain));
    }

    #[test]
    fn ord_works() {
        // This ordered list is from RFC 4034 § 6.1, which defines the
        // canonical ordering of domain names.
        let names: Vec<Name> = [
            "example.",
            "a.example.",
            "yljkjljk.a.example.",
            "Z.a.example.",
            "zABC.a.EXAMPLE.",
            "z.example.",
            "\\001.z.example.",
            "*.z.example.",
            "\\200.z.example.",
        ]
        .into_iter()
        .map(|n| n.parse().unwrap())
        .collect();

        for (i, ni) in names.iter().enumerate() {
            for (j, nj) in names.iter().enumerate() {
                assert_eq!(i.cmp(&j), ni.cmp(nj));
            }
        }
    }

    #[test]
    fn fromstr_works() {
        let name: Name = "example.test.".parse().unwrap();
        assert_eq!(name.len(), 2);
        assert_eq!(name.to_string(), "example.test.");
    }

    #[test]
    fn fromstr_is_case_preserving() {
        let name: Name = "eXaMpLe.TEST.".parse().unwrap();
        assert_eq!(name.to_string(), "eXaMpLe.TEST.");
        assert_eq!(name, "example.test.".parse().unwrap());
    }

    #[test]
    fn fromstr_rejects_empty() {
        assert_eq!("".parse::<Name>(), Err(Error::StrEmpty));
    }

    #[test]
    fn fromstr_rejects_non_ascii() {
        assert_eq!("✈.aero.".parse::<Name>(), Err(Error::StrNotAscii));
    }

    #[test]
    fn fromstr_rejects_relative_names() {
        assert_eq!("non.fqdn".parse::<Name>(), Err(Error::StrNotAbsolute));
    }

    #[test]
    fn fromstr_rejects_long_label() {
        assert_eq!(
            "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx."
                .parse::<Name>(),
            Err(Error::LabelTooLong)
        );
    }

    #[test]
    fn fromstr_rejects_long_name() {
        assert_eq!(
            "x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x."
                .parse::<Name>(),
            Err(Error::NameTooLong)
        );
    }

    #[test]
    fn fromstr_rejects_empty_interior_label() {
        assert_eq!("a.b..c.".parse::<Name>(), Err(Error::EmptyLabel));
    }

    #[test]
    fn fromstr_escaping_works() {
        let escaped: Name = "\\000.\\\\\\..".parse().unwrap();
        assert_eq!(escaped.len(), 2);
        assert_eq!(escaped.label(0).unwrap().octets(), b"\x00");
        assert_eq!(escaped.label(1).unwrap().octets(), b"\\.");
    }

    #[test]
    fn fromstr_rejects_invalid_escapes() {
        assert_eq!("\\00".parse::<Name>(), Err(Error::InvalidEscape));
        assert_eq!("\\00x.".parse::<Name>(), Err(Error::InvalidEscape));
        assert_eq!("\\256.".parse::<Name>(), Err(Error::InvalidEscape));
    }
}
