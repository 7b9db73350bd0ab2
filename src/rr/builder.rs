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

//! Construction of records from compact textual descriptors.
//!
//! A descriptor is a single line in the style of a zone file entry:
//!
//! ```text
//! <owner> [<ttl>] [IN] <type> <rdata...>
//! ```
//!
//! The owner and any names in the data are qualified against the zone
//! origin (`@` is the origin itself; names ending in a dot are
//! absolute). Only the record types held by the zone store are
//! accepted: SOA, NS, A, AAAA, PTR, and CNAME.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::{BuildError, Rdata, Record, Soa, Ttl, Type};
use crate::name::Name;
use crate::util::Caseless;

/// Builds a record from `descriptor`, qualifying names against
/// `origin`. Records without an explicit TTL get [`Ttl::DEFAULT`].
pub fn build(origin: &Name, descriptor: &str) -> Result<Record, BuildError> {
    build_with_ttl(origin, descriptor, Ttl::DEFAULT)
}

/// Like [`build`], but records without an explicit TTL get
/// `default_ttl`.
pub fn build_with_ttl(
    origin: &Name,
    descriptor: &str,
    default_ttl: Ttl,
) -> Result<Record, BuildError> {
    let malformed = |reason| BuildError::MalformedRecord {
        descriptor: descriptor.to_owned(),
        reason,
    };

    let mut fields = descriptor.split_whitespace();
    let owner = fields.next().ok_or_else(|| malformed("empty descriptor"))?;
    let owner = Name::qualify(owner, origin).map_err(|_| malformed("invalid owner name"))?;

    // The TTL and class may appear in either order before the type, as
    // in RFC 1035 master files.
    let mut ttl = None;
    let mut seen_class = false;
    let rr_type = loop {
        let field = fields.next().ok_or_else(|| malformed("missing type"))?;
        if field.starts_with(|c: char| c.is_ascii_digit()) && ttl.is_none() {
            ttl = Some(field.parse::<Ttl>().map_err(malformed)?);
        } else if Caseless(field) == Caseless("IN") && !seen_class {
            seen_class = true;
        } else {
            break field.parse::<Type>().map_err(malformed)?;
        }
    };

    let rdata_fields: Vec<&str> = fields.collect();
    let rdata = parse_rdata(rr_type, &rdata_fields, origin).map_err(malformed)?;
    Ok(Record::new(owner, ttl.unwrap_or(default_ttl), rdata))
}

fn parse_rdata(rr_type: Type, fields: &[&str], origin: &Name) -> Result<Rdata, &'static str> {
    let name = |text: &str| Name::qualify(text, origin).or(Err("invalid domain name in data"));
    let number = |text: &str| text.parse::<u32>().or(Err("invalid integer in SOA data"));

    match (rr_type, fields) {
        (Type::A, &[address]) => address
            .parse::<Ipv4Addr>()
            .map(Rdata::A)
            .or(Err("invalid IPv4 address")),
        (Type::AAAA, &[address]) => address
            .parse::<Ipv6Addr>()
            .map(Rdata::Aaaa)
            .or(Err("invalid IPv6 address")),
        (Type::NS, &[target]) => Ok(Rdata::Ns(name(target)?)),
        (Type::CNAME, &[target]) => Ok(Rdata::Cname(name(target)?)),
        (Type::PTR, &[target]) => Ok(Rdata::Ptr(name(target)?)),
        (Type::SOA, &[mname, rname, serial, refresh, retry, expire, minimum]) => {
            Ok(Rdata::Soa(Box::new(Soa {
                mname: name(mname)?,
                rname: name(rname)?,
                serial: number(serial)?,
                refresh: number(refresh)?,
                retry: number(retry)?,
                expire: number(expire)?,
                minimum: number(minimum)?,
            })))
        }
        (Type::A | Type::AAAA | Type::NS | Type::CNAME | Type::PTR | Type::SOA, _) => {
            Err("wrong number of data fields")
        }
        _ => Err("unsupported record type"),
    }
}

/// Removes the prefix length from an address in CIDR notation
/// (`192.0.2.10/24` becomes `192.0.2.10`). A bare address is accepted
/// as is.
pub fn strip_mask(cidr: &str) -> Result<IpAddr, BuildError> {
    let invalid = || BuildError::InvalidAddress(cidr.to_owned());
    let (address, prefix_len) = match cidr.split_once('/') {
        Some((address, prefix_len)) => (address, Some(prefix_len)),
        None => (cidr, None),
    };
    let address: IpAddr = address.trim().parse().map_err(|_| invalid())?;
    if let Some(prefix_len) = prefix_len {
        let max = if address.is_ipv4() { 32 } else { 128 };
        match prefix_len.trim().parse::<u8>() {
            Ok(len) if len <= max => (),
            _ => return Err(invalid()),
        }
    }
    Ok(address)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use lazy_static::lazy_static;

    lazy_static! {
        static ref ORIGIN: Name = "if.lastmile.sk.".parse().unwrap();
    }

    #[test]
    fn build_qualifies_and_lowercases_the_owner() {
        let record = build(&ORIGIN, "Test A 192.168.1.1").unwrap();
        assert_eq!(record.owner.to_string(), "test.if.lastmile.sk.");
        assert_eq!(record.rr_type(), Type::A);
        assert_eq!(record.ttl, Ttl::DEFAULT);
        assert_eq!(record.rdata, Rdata::A(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn build_accepts_ttl_and_class_in_either_order() {
        let a = build(&ORIGIN, "test.if.lastmile.sk. 3600 IN A 192.168.1.1").unwrap();
        let b = build(&ORIGIN, "test IN 3600 A 192.168.1.1").unwrap();
        assert_eq!(a, b);
        assert_eq!(u32::from(a.ttl), 3600);
    }

    #[test]
    fn build_applies_the_default_ttl() {
        let record = build_with_ttl(&ORIGIN, "@ NS ns1", Ttl::from(3600)).unwrap();
        assert_eq!(u32::from(record.ttl), 3600);
        assert_eq!(record.owner, *ORIGIN);
        assert_eq!(
            record.rdata,
            Rdata::Ns("ns1.if.lastmile.sk.".parse().unwrap())
        );
    }

    #[test]
    fn build_parses_soa_records() {
        let record = build(
            &ORIGIN,
            "@ SOA ns1 dns-admin 1667000000 7200 3600 1209600 3600",
        )
        .unwrap();
        match record.rdata {
            Rdata::Soa(soa) => {
                assert_eq!(soa.mname.to_string(), "ns1.if.lastmile.sk.");
                assert_eq!(soa.rname.to_string(), "dns-admin.if.lastmile.sk.");
                assert_eq!(soa.serial, 1667000000);
                assert_eq!(soa.expire, 1209600);
            }
            other => panic!("expected SOA data, got {other:?}"),
        }
    }

    #[test]
    fn build_parses_reverse_and_alias_records() {
        let origin: Name = "1.168.192.in-addr.arpa.".parse().unwrap();
        let ptr = build(&origin, "1.1.168.192.in-addr.arpa. PTR test.if.lastmile.sk.").unwrap();
        assert_eq!(ptr.owner.to_string(), "1.1.168.192.in-addr.arpa.");
        let cname = build(&ORIGIN, "www CNAME test").unwrap();
        assert_eq!(
            cname.rdata,
            Rdata::Cname("test.if.lastmile.sk.".parse().unwrap())
        );
        let aaaa = build(&ORIGIN, "v6 AAAA 2001:db8::1").unwrap();
        assert_eq!(aaaa.rr_type(), Type::AAAA);
    }

    #[test]
    fn build_rejects_malformed_descriptors() {
        for descriptor in [
            "",
            "test",
            "test A",
            "test A 192.168.1.300",
            "test A 2001:db8::1",
            "test AAAA 192.168.1.1",
            "test A 192.168.1.1 extra",
            "test MX 10 mail",
            "@ SOA ns1 dns-admin serial 7200 3600 1209600 3600",
            "a..b A 192.168.1.1",
        ] {
            assert!(
                matches!(
                    build(&ORIGIN, descriptor),
                    Err(BuildError::MalformedRecord { .. })
                ),
                "{descriptor:?} was accepted"
            );
        }
    }

    #[test]
    fn strip_mask_removes_prefix_lengths() {
        assert_eq!(
            strip_mask("192.168.1.1/24"),
            Ok(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)))
        );
        assert_eq!(
            strip_mask("2001:db8::1/64"),
            Ok("2001:db8::1".parse::<IpAddr>().unwrap())
        );
        assert_eq!(
            strip_mask("10.0.0.1"),
            Ok(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        );
    }

    #[test]
    fn strip_mask_rejects_invalid_addresses() {
        for cidr in ["", "not-an-ip/24", "192.168.1.1/33", "2001:db8::1/129", "10.0.0.1/x"] {
            assert_eq!(
                strip_mask(cidr),
                Err(BuildError::InvalidAddress(cidr.to_owned()))
            );
        }
    }
}
