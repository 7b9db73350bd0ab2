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

//! Provides the [`Ttl`] structure for DNS RR TTLs.

use std::fmt;
use std::str::FromStr;

/// The time to live (TTL) of a DNS record, in seconds.
///
/// [RFC 2181 § 8] restricts TTLs to the range 0 to 2³¹ - 1. Values
/// above that range are treated as zero when converted from [`u32`],
/// and rejected when parsed from text.
///
/// [RFC 2181 § 8]: https://datatracker.ietf.org/doc/html/rfc2181#section-8
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Ttl(u32);

impl Ttl {
    /// The TTL given to records whose descriptors do not name one.
    pub const DEFAULT: Ttl = Ttl(60);
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for Ttl {
    fn from(raw: u32) -> Self {
        if raw > i32::MAX as u32 {
            Self(0)
        } else {
            Self(raw)
        }
    }
}

impl From<Ttl> for u32 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl FromStr for Ttl {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.parse::<u32>() {
            Ok(value) if value <= i32::MAX as u32 => Ok(Self(value)),
            _ => Err("TTL is not an integer between 0 and 2147483647"),
        }
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
