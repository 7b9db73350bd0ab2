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

//! Implementation of the [`Class`] type for DNS classes.

use std::fmt;

/// A DNS class.
///
/// Every record this server holds is in the Internet class, so the only
/// values with names here are [`IN`](Class::IN) and the query-only
/// [`ANY`](Class::ANY). Other values are carried through from the wire
/// so that they can be reported, but queries for them are refused.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Class(u16);

impl Class {
    pub const IN: Self = Self(1);
    pub const ANY: Self = Self(255); // RFC 1035 § 3.2.5 QCLASS

    /// Returns whether a question with this class can match records in
    /// the Internet class.
    pub fn matches_in(self) -> bool {
        self == Self::IN || self == Self::ANY
    }
}

impl From<u16> for Class {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Class> for u16 {
    fn from(class: Class) -> Self {
        class.0
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::IN => f.write_str("IN"),
            Self::ANY => f.write_str("ANY"),
            Self(value) => write!(f, "CLASS{value}"), // RFC 3597 § 5
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Class;

    #[test]
    fn only_in_and_any_match_internet_records() {
        assert!(Class::IN.matches_in());
        assert!(Class::ANY.matches_in());
        assert!(!Class::from(3).matches_in());
    }

    #[test]
    fn unknown_classes_display_according_to_rfc3597() {
        assert_eq!(Class::from(0xff00).to_string(), "CLASS65280");
    }
}
