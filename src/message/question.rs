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

//! Implementation of types relating to DNS questions.

use std::fmt;

use crate::class::Class;
use crate::name::Name;
use crate::rr::Type;

/// The question of a DNS query ([RFC 1035 § 4.1.2]).
///
/// [RFC 1035 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.2
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    pub qname: Name,
    pub qtype: Qtype,
    pub qclass: Class,
}

/// The QTYPE of a DNS [question](Question).
///
/// QTYPE values include every RR [`Type`], plus values that ask for
/// several types at once ([`ANY`](Qtype::ANY)) or for zone transfers
/// ([`AXFR`](Qtype::AXFR) and [`IXFR`](Qtype::IXFR)).
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Qtype(u16);

impl Qtype {
    pub const IXFR: Self = Self(251); // RFC 1995
    pub const AXFR: Self = Self(252);
    pub const ANY: Self = Self(255);

    /// Returns whether this QTYPE asks for a zone transfer.
    pub fn is_transfer(self) -> bool {
        self == Self::AXFR || self == Self::IXFR
    }

    /// Returns whether records of type `rr_type` answer this QTYPE.
    pub fn matches(self, rr_type: Type) -> bool {
        self == Self::ANY || self.0 == u16::from(rr_type)
    }
}

impl From<u16> for Qtype {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Qtype> for u16 {
    fn from(qtype: Qtype) -> Self {
        qtype.0
    }
}

impl From<Type> for Qtype {
    fn from(rr_type: Type) -> Self {
        Self(rr_type.into())
    }
}

impl From<Qtype> for Type {
    fn from(qtype: Qtype) -> Self {
        Type::from(qtype.0)
    }
}

impl fmt::Display for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::IXFR => f.write_str("IXFR"),
            Self::AXFR => f.write_str("AXFR"),
            Self::ANY => f.write_str("ANY"),
            _ => write!(f, "{}", Type::from(*self)),
        }
    }
}

impl fmt::Debug for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}
