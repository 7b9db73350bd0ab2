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

//! Implementation of the [`Name`] type for domain names.

use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

mod error;
mod wire;
pub use error::Error;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A fully-qualified domain name.
///
/// A `Name` stores the uncompressed on-the-wire representation of the
/// name defined in [RFC 1035 § 3.1], with every ASCII letter folded to
/// lowercase when the name is constructed. Comparison of names in the
/// DNS is ASCII-case-insensitive ([RFC 4343]), so folding once up front
/// lets the derived [`PartialEq`] and [`Hash`] implementations do the
/// right thing with plain octet comparisons. Record owners in the zone
/// store are therefore always lowercase.
///
/// `Name`s are constructed
///
/// * through the [`FromStr`] implementation, which treats its input as
///   absolute whether or not it ends with a dot;
/// * relative to an origin with [`Name::qualify`], which follows the
///   zone file conventions (`@` is the origin; a trailing dot makes a
///   name absolute); and
/// * from DNS messages with [`Name::try_from_compressed`].
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
/// [RFC 4343]: https://datatracker.ietf.org/doc/html/rfc4343
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Name {
    wire: Box<[u8]>,
}

impl Name {
    /// Returns the root name (`.`).
    pub fn root() -> Self {
        Self {
            wire: Box::new([0]),
        }
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Returns the on-the-wire representation of the name.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire
    }

    /// Returns the number of labels in the name, not counting the null
    /// label. The root name thus has zero labels.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Returns an iterator over the non-null labels of the name, from
    /// left to right.
    pub fn labels(&self) -> Labels {
        Labels {
            wire: &self.wire,
            offset: 0,
        }
    }

    /// Returns the leftmost label, or `None` for the root.
    pub fn first_label(&self) -> Option<&[u8]> {
        self.labels().next()
    }

    /// Returns the name with its leftmost label removed, or `None` if
    /// this is the root.
    pub fn parent(&self) -> Option<Name> {
        if self.is_root() {
            None
        } else {
            let first_len = self.wire[0] as usize;
            Some(Self {
                wire: self.wire[1 + first_len..].into(),
            })
        }
    }

    /// Returns whether this name is equal to `other` or is a subdomain
    /// of it.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        let mut offset = 0;
        loop {
            let remaining = &self.wire[offset..];
            if remaining.len() == other.wire.len() {
                return remaining == &other.wire[..];
            } else if remaining.len() < other.wire.len() || remaining[0] == 0 {
                return false;
            }
            offset += 1 + remaining[0] as usize;
        }
    }

    /// Returns a new name consisting of `label` followed by this name.
    pub fn prepend_label(&self, label: &[u8]) -> Result<Name, Error> {
        if label.is_empty() {
            return Err(Error::NullNonTerminal);
        } else if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        } else if label.len() + 1 + self.wire.len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        let mut wire = Vec::with_capacity(label.len() + 1 + self.wire.len());
        wire.push(label.len() as u8);
        wire.extend(label.iter().map(u8::to_ascii_lowercase));
        wire.extend_from_slice(&self.wire);
        Ok(Self { wire: wire.into() })
    }

    /// Parses `text` as a name relative to `origin`, following zone
    /// file conventions: `@` stands for the origin itself, a name ending
    /// with a dot is absolute, and any other name has the origin
    /// appended to it.
    pub fn qualify(text: &str, origin: &Name) -> Result<Name, Error> {
        if text == "@" {
            return Ok(origin.clone());
        }
        let (labels, absolute) = parse_labels(text)?;
        let suffix: &[u8] = if absolute { &[0] } else { &origin.wire };
        from_labels(&labels, suffix)
    }
}

////////////////////////////////////////////////////////////////////////
// TEXT PARSING                                                       //
////////////////////////////////////////////////////////////////////////

impl FromStr for Name {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (labels, _) = parse_labels(text)?;
        from_labels(&labels, &[0])
    }
}

/// Splits `text` into lowercase labels, processing `\X` and `\DDD`
/// escapes. Also returns whether the text ended with an unescaped dot
/// (i.e., whether it was written as an absolute name).
fn parse_labels(text: &str) -> Result<(Vec<Vec<u8>>, bool), Error> {
    if text.is_empty() {
        return Err(Error::StrEmpty);
    } else if !text.is_ascii() {
        return Err(Error::StrNotAscii);
    } else if text == "." {
        return Ok((Vec::new(), true));
    }

    let octets = text.as_bytes();
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut absolute = false;
    let mut i = 0;
    while i < octets.len() {
        match octets[i] {
            b'.' => {
                if label.is_empty() {
                    return Err(Error::NullNonTerminal);
                }
                labels.push(std::mem::take(&mut label));
                absolute = i == octets.len() - 1;
                i += 1;
            }
            b'\\' => {
                let (octet, consumed) = parse_escape(&octets[i + 1..])?;
                label.push(octet.to_ascii_lowercase());
                i += 1 + consumed;
            }
            octet => {
                label.push(octet.to_ascii_lowercase());
                i += 1;
            }
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }
    }
    if !label.is_empty() {
        labels.push(label);
    }
    Ok((labels, absolute))
}

/// Parses the part of an escape sequence after the backslash. Returns
/// the escaped octet and the number of characters consumed.
fn parse_escape(rest: &[u8]) -> Result<(u8, usize), Error> {
    match rest {
        [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
            let value = (a - b'0') as u16 * 100 + (b - b'0') as u16 * 10 + (c - b'0') as u16;
            u8::try_from(value)
                .map(|octet| (octet, 3))
                .or(Err(Error::InvalidEscape))
        }
        [a, ..] if !a.is_ascii_digit() => Ok((*a, 1)),
        _ => Err(Error::InvalidEscape),
    }
}

/// Assembles a `Name` from labels followed by an already-encoded
/// suffix (which must end with the null label).
fn from_labels(labels: &[Vec<u8>], suffix: &[u8]) -> Result<Name, Error> {
    let len = labels.iter().map(|l| l.len() + 1).sum::<usize>() + suffix.len();
    if len > MAX_WIRE_LEN {
        return Err(Error::NameTooLong);
    }
    let mut wire = Vec::with_capacity(len);
    for label in labels {
        wire.push(label.len() as u8);
        wire.extend_from_slice(label);
    }
    wire.extend_from_slice(suffix);
    Ok(Name { wire: wire.into() })
}

////////////////////////////////////////////////////////////////////////
// LABEL ITERATION                                                    //
////////////////////////////////////////////////////////////////////////

/// An iterator over the non-null labels of a [`Name`].
pub struct Labels<'a> {
    wire: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.wire[self.offset] as usize;
        if len == 0 {
            None
        } else {
            let label = &self.wire[self.offset + 1..self.offset + 1 + len];
            self.offset += 1 + len;
            Some(label)
        }
    }
}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// FORMATTING                                                         //
////////////////////////////////////////////////////////////////////////

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &octet in label {
                match octet {
                    b'.' | b'\\' | b'"' | b'(' | b')' | b';' | b'@' | b'$' => {
                        write!(f, "\\{}", octet as char)?
                    }
                    0x21..=0x7e => write!(f, "{}", octet as char)?,
                    _ => write!(f, "\\{:03}", octet)?,
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_folds_case_and_accepts_missing_trailing_dot() {
        let with_dot: Name = "Test.If.LastMile.SK.".parse().unwrap();
        let without_dot: Name = "test.if.lastmile.sk".parse().unwrap();
        assert_eq!(with_dot, without_dot);
        assert_eq!(with_dot.to_string(), "test.if.lastmile.sk.");
    }

    #[test]
    fn parsing_rejects_bad_names() {
        assert_eq!("".parse::<Name>(), Err(Error::StrEmpty));
        assert_eq!("a..b.".parse::<Name>(), Err(Error::NullNonTerminal));
        assert_eq!(
            format!("{}.test.", "a".repeat(64)).parse::<Name>(),
            Err(Error::LabelTooLong)
        );
        let long = format!("{}.", ["abcdefghi"; 26].join("."));
        assert_eq!(long.parse::<Name>(), Err(Error::NameTooLong));
    }

    #[test]
    fn escapes_round_trip_through_display() {
        let name: Name = r"a\.b.c\032d.test.".parse().unwrap();
        assert_eq!(name.label_count(), 3);
        assert_eq!(name.first_label(), Some(&b"a.b"[..]));
        assert_eq!(name.to_string(), r"a\.b.c\032d.test.");
    }

    #[test]
    fn qualify_follows_zone_file_conventions() {
        let origin: Name = "example.org.".parse().unwrap();
        assert_eq!(Name::qualify("@", &origin).unwrap(), origin);
        assert_eq!(
            Name::qualify("Host", &origin).unwrap().to_string(),
            "host.example.org."
        );
        assert_eq!(
            Name::qualify("ns1.other.net.", &origin).unwrap().to_string(),
            "ns1.other.net."
        );
    }

    #[test]
    fn parent_strips_the_leftmost_label() {
        let name: Name = "test.if.lastmile.sk.".parse().unwrap();
        assert_eq!(name.parent().unwrap().to_string(), "if.lastmile.sk.");
        assert_eq!(Name::root().parent(), None);
    }

    #[test]
    fn eq_or_subdomain_of_respects_label_boundaries() {
        let zone: Name = "example.org.".parse().unwrap();
        let inside: Name = "a.b.example.org.".parse().unwrap();
        let lookalike: Name = "badexample.org.".parse().unwrap();
        assert!(zone.eq_or_subdomain_of(&zone));
        assert!(inside.eq_or_subdomain_of(&zone));
        assert!(inside.eq_or_subdomain_of(&Name::root()));
        assert!(!lookalike.eq_or_subdomain_of(&zone));
        assert!(!zone.eq_or_subdomain_of(&inside));
    }
}
