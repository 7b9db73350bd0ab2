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

//! The [`Record`] type and its data.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{Ttl, Type};
use crate::class::Class;
use crate::name::Name;

////////////////////////////////////////////////////////////////////////
// RDATA                                                              //
////////////////////////////////////////////////////////////////////////

/// The data of an SOA record ([RFC 1035 § 3.3.13]).
///
/// [RFC 1035 § 3.3.13]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.13
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// Type-specific record data.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Rdata {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Soa(Box<Soa>),
}

impl Rdata {
    /// Returns the RR type this data belongs to.
    pub fn rr_type(&self) -> Type {
        match self {
            Self::A(_) => Type::A,
            Self::Aaaa(_) => Type::AAAA,
            Self::Ns(_) => Type::NS,
            Self::Cname(_) => Type::CNAME,
            Self::Ptr(_) => Type::PTR,
            Self::Soa(_) => Type::SOA,
        }
    }
}

impl fmt::Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::A(address) => write!(f, "{address}"),
            Self::Aaaa(address) => write!(f, "{address}"),
            Self::Ns(name) | Self::Cname(name) | Self::Ptr(name) => write!(f, "{name}"),
            Self::Soa(soa) => write!(
                f,
                "{} {} {} {} {} {} {}",
                soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum,
            ),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A DNS resource record.
///
/// The derived [`PartialEq`] compares every field. Zone maintenance
/// instead uses [`Record::is_duplicate_of`], which ignores the TTL and
/// class.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Record {
    pub owner: Name,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Rdata,
}

impl Record {
    /// Creates a new record in the Internet class.
    pub fn new(owner: Name, ttl: Ttl, rdata: Rdata) -> Self {
        Self {
            owner,
            class: Class::IN,
            ttl,
            rdata,
        }
    }

    /// Returns the record's RR type.
    pub fn rr_type(&self) -> Type {
        self.rdata.rr_type()
    }

    /// Returns whether `self` and `other` have the same owner, type,
    /// and data.
    pub fn is_duplicate_of(&self, other: &Record) -> bool {
        self.owner == other.owner && self.rdata == other.rdata
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.owner,
            self.ttl,
            self.class,
            self.rr_type(),
            self.rdata,
        )
    }
}
