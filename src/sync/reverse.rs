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

//! Derivation of reverse-mapping (PTR) names from addresses.
//!
//! Reverse zones are cut at fixed boundaries: IPv4 addresses belong to
//! the zone for their /24 network under `in-addr.arpa.`
//! ([RFC 1035 § 3.5]), and IPv6 addresses to the zone for their /32
//! network under `ip6.arpa.` ([RFC 3596 § 2.5]).
//!
//! [RFC 1035 § 3.5]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.5
//! [RFC 3596 § 2.5]: https://datatracker.ietf.org/doc/html/rfc3596#section-2.5

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::name::{Error, Name};
use crate::util::nibble_to_ascii_hex_digit;

/// The prefix length, in bits, of IPv4 reverse zones.
pub const IPV4_ZONE_PREFIX_LEN: usize = 24;

/// The prefix length, in bits, of IPv6 reverse zones.
pub const IPV6_ZONE_PREFIX_LEN: usize = 32;

/// Returns the name of the reverse zone that `address` belongs to.
pub fn ptr_zone(address: IpAddr) -> Result<Name, Error> {
    match address {
        IpAddr::V4(v4) => v4_name(v4, IPV4_ZONE_PREFIX_LEN / 8),
        IpAddr::V6(v6) => v6_name(v6, IPV6_ZONE_PREFIX_LEN / 4),
    }
}

/// Returns the owner name of the PTR record for `address`.
pub fn reverse_name(address: IpAddr) -> Result<Name, Error> {
    match address {
        IpAddr::V4(v4) => v4_name(v4, 4),
        IpAddr::V6(v6) => v6_name(v6, 32),
    }
}

/// Builds the `in-addr.arpa.` name for the first `n_octets` octets of
/// `address`.
fn v4_name(address: Ipv4Addr, n_octets: usize) -> Result<Name, Error> {
    let mut name: Name = "in-addr.arpa.".parse()?;
    for octet in &address.octets()[..n_octets] {
        name = name.prepend_label(octet.to_string().as_bytes())?;
    }
    Ok(name)
}

/// Builds the `ip6.arpa.` name for the first `n_nibbles` nibbles of
/// `address`.
fn v6_name(address: Ipv6Addr, n_nibbles: usize) -> Result<Name, Error> {
    let mut name: Name = "ip6.arpa.".parse()?;
    let nibbles = address
        .octets()
        .into_iter()
        .flat_map(|octet| [octet >> 4, octet & 0xf])
        .take(n_nibbles);
    for nibble in nibbles {
        name = name.prepend_label(&[nibble_to_ascii_hex_digit(nibble)])?;
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn ipv4_zones_are_slash_24() {
        assert_eq!(
            ptr_zone(ip("192.168.1.1")).unwrap().to_string(),
            "1.168.192.in-addr.arpa."
        );
        assert_eq!(
            ptr_zone(ip("10.0.0.255")).unwrap(),
            ptr_zone(ip("10.0.0.1")).unwrap()
        );
    }

    #[test]
    fn ipv4_reverse_names_have_all_four_octets() {
        assert_eq!(
            reverse_name(ip("192.168.1.1")).unwrap().to_string(),
            "1.1.168.192.in-addr.arpa."
        );
    }

    #[test]
    fn ipv6_zones_are_slash_32() {
        let address = ip("2001:db8:aaaa::1");
        assert_eq!(
            ptr_zone(address).unwrap().to_string(),
            "8.b.d.0.1.0.0.2.ip6.arpa."
        );
    }

    #[test]
    fn ipv6_reverse_names_have_32_nibbles() {
        let address = ip("2001:db8::567:89ab");
        let name = reverse_name(address).unwrap();
        assert_eq!(
            name.to_string(),
            "b.a.9.8.7.6.5.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6.arpa."
        );
        assert!(name.eq_or_subdomain_of(&ptr_zone(address).unwrap()));
    }
}
