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

//! Provides the [`Type`] structure for DNS RR types.

use std::fmt;
use std::str::FromStr;

use crate::util::Caseless;

/// The RR type of a DNS record.
///
/// On the wire an RR type is an unsigned 16-bit integer, so this wraps
/// [`u16`]. Constants are provided for the types the zone store can
/// hold; any other value can still be carried (e.g. as a query type)
/// and is rendered in the `TYPEnnn` form of [RFC 3597 § 5].
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Type(u16);

impl Type {
    pub const A: Type = Type(1);
    pub const NS: Type = Type(2);
    pub const CNAME: Type = Type(5);
    pub const SOA: Type = Type(6);
    pub const PTR: Type = Type(12);
    pub const AAAA: Type = Type(28);
}

impl From<u16> for Type {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Type> for u16 {
    fn from(rr_type: Type) -> Self {
        rr_type.0
    }
}

impl FromStr for Type {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let caseless = Caseless(text);
        if caseless == Caseless("A") {
            Ok(Self::A)
        } else if caseless == Caseless("NS") {
            Ok(Self::NS)
        } else if caseless == Caseless("CNAME") {
            Ok(Self::CNAME)
        } else if caseless == Caseless("SOA") {
            Ok(Self::SOA)
        } else if caseless == Caseless("PTR") {
            Ok(Self::PTR)
        } else if caseless == Caseless("AAAA") {
            Ok(Self::AAAA)
        } else {
            match text.get(0..4) {
                Some(prefix) if prefix.eq_ignore_ascii_case("TYPE") => text[4..]
                    .parse::<u16>()
                    .map(Self::from)
                    .or(Err("type value is not a valid unsigned 16-bit integer")),
                _ => Err("unknown type"),
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::A => f.write_str("A"),
            Self::NS => f.write_str("NS"),
            Self::CNAME => f.write_str("CNAME"),
            Self::SOA => f.write_str("SOA"),
            Self::PTR => f.write_str("PTR"),
            Self::AAAA => f.write_str("AAAA"),
            Self(value) => write!(f, "TYPE{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_parse_case_insensitively() {
        assert_eq!("aaaa".parse::<Type>(), Ok(Type::AAAA));
        assert_eq!("Ptr".parse::<Type>(), Ok(Type::PTR));
        assert_eq!("TYPE6".parse::<Type>(), Ok(Type::SOA));
        assert!("MX".parse::<Type>().is_err());
        assert!("TYPE70000".parse::<Type>().is_err());
    }

    #[test]
    fn unknown_types_display_according_to_rfc3597() {
        assert_eq!(Type::from(65280).to_string(), "TYPE65280");
        assert_eq!(Type::CNAME.to_string(), "CNAME");
    }
}
