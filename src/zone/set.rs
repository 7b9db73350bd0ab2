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

//! Implementation of the [`ZoneSet`] structure.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use super::{Upstream, Zone};
use crate::name::Name;
use crate::rr::{build_with_ttl, Record, Ttl};

////////////////////////////////////////////////////////////////////////
// ZONE DEFAULTS                                                      //
////////////////////////////////////////////////////////////////////////

/// The parameters used to populate the apex of newly created zones.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneDefaults {
    /// The TTL of generated records.
    pub ttl: Ttl,

    /// The responsible mailbox for SOA records, relative to the
    /// forward zone unless absolute.
    pub admin: String,

    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,

    /// The authoritative name servers placed at the apex of every zone.
    /// The first one is also used as the SOA MNAME.
    pub name_servers: Vec<NameServer>,
}

impl Default for ZoneDefaults {
    fn default() -> Self {
        Self {
            ttl: Ttl::DEFAULT,
            admin: "dns-admin".to_owned(),
            refresh: 7200,
            retry: 3600,
            expire: 1209600,
            minimum: 3600,
            name_servers: Vec::new(),
        }
    }
}

/// A name server to list at zone apexes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NameServer {
    /// The server's name, relative to the forward zone unless absolute.
    pub name: String,

    /// The server's address. Forward zones that contain the server's
    /// name get a glue record for it.
    pub address: Option<IpAddr>,
}

////////////////////////////////////////////////////////////////////////
// ZONE SETS                                                          //
////////////////////////////////////////////////////////////////////////

/// The set of zones served, keyed by name.
///
/// Zones are created lazily through [`ZoneSet::ensure_zone`] and never
/// removed. The map of zones and the list of zone names used for suffix
/// matching sit behind one lock, so they always hold the same names and
/// creation can race safely with [`ZoneSet::find`]. `ZoneSet` is meant
/// to be shared (through an [`Arc`]) by the code that mutates zones and
/// the code that answers queries.
pub struct ZoneSet {
    defaults: ZoneDefaults,
    upstream: Option<Arc<dyn Upstream>>,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    zones: HashMap<Name, Arc<Zone>>,
    names: Vec<Name>,
}

impl ZoneSet {
    /// Creates an empty `ZoneSet` that will populate new zones
    /// according to `defaults`.
    pub fn new(defaults: ZoneDefaults) -> Self {
        Self::with_upstream(defaults, None)
    }

    /// Like [`ZoneSet::new`], but new zones get the given [`Upstream`]
    /// handle.
    pub fn with_upstream(defaults: ZoneDefaults, upstream: Option<Arc<dyn Upstream>>) -> Self {
        Self {
            defaults,
            upstream,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Returns the defaults used for new zones.
    pub fn defaults(&self) -> &ZoneDefaults {
        &self.defaults
    }

    /// Returns the zone called `name`, creating it first if necessary.
    ///
    /// A new zone gets an SOA record and an NS record for each
    /// configured name server, exactly once. Reverse (PTR) zones are
    /// created with `forward` set to the forward zone whose records
    /// they mirror: their name servers, like their SOA names, are then
    /// qualified against that forward zone, and they get no glue. For
    /// forward zones, `forward` is `None` and glue is added for name
    /// servers inside the zone.
    ///
    /// Calling this again for an existing zone returns it unchanged.
    pub fn ensure_zone(&self, name: &Name, forward: Option<&Name>) -> Arc<Zone> {
        if let Some(zone) = self.get(name) {
            return zone;
        }

        let mut inner = self.inner.write().unwrap();
        if let Some(zone) = inner.zones.get(name) {
            // Someone else created it between our two lock acquisitions.
            return zone.clone();
        }
        let zone = Arc::new(Zone::with_upstream(name.clone(), self.upstream.clone()));
        self.populate_apex(&zone, forward);
        inner.zones.insert(name.clone(), zone.clone());
        inner.names.push(name.clone());
        debug!(
            "Created zone {} with {} records ({} zones total)",
            name,
            zone.len(),
            inner.names.len()
        );
        zone
    }

    /// Inserts the SOA, NS, and glue records of a new zone.
    fn populate_apex(&self, zone: &Zone, forward: Option<&Name>) {
        let defaults = &self.defaults;
        let origin = zone.origin();
        let base = forward.unwrap_or(origin);
        let qualified = |text: &str| Name::qualify(text, base).map(|n| n.to_string());

        let mname = defaults
            .name_servers
            .first()
            .map_or("ns", |ns| ns.name.as_str());
        let soa = match (qualified(mname), qualified(&defaults.admin)) {
            (Ok(mname), Ok(rname)) => format!(
                "@ SOA {} {} {} {} {} {} {}",
                mname,
                rname,
                current_serial(),
                defaults.refresh,
                defaults.retry,
                defaults.expire,
                defaults.minimum,
            ),
            _ => {
                warn!("Zone {}: invalid SOA names {:?}", origin, (mname, &defaults.admin));
                return;
            }
        };
        self.insert_built(zone, &soa);

        for ns in &defaults.name_servers {
            let target = match qualified(&ns.name) {
                Ok(target) => target,
                Err(error) => {
                    warn!("Zone {}: invalid name server {:?}: {}", origin, ns.name, error);
                    continue;
                }
            };
            self.insert_built(zone, &format!("@ NS {target}"));

            if let (None, Some(address)) = (forward, ns.address) {
                let glue_type = if address.is_ipv4() { "A" } else { "AAAA" };
                let in_zone = target
                    .parse::<Name>()
                    .map_or(false, |t| t.eq_or_subdomain_of(origin));
                if in_zone {
                    self.insert_built(zone, &format!("{target} {glue_type} {address}"));
                }
            }
        }
    }

    /// Builds a record from `descriptor` and inserts it into `zone`,
    /// logging (and otherwise ignoring) failures.
    fn insert_built(&self, zone: &Zone, descriptor: &str) {
        let record: Option<Record> = build_with_ttl(zone.origin(), descriptor, self.defaults.ttl)
            .map_err(|error| warn!("Zone {}: {}", zone.origin(), error))
            .ok();
        if let Err(error) = zone.insert(record) {
            warn!("Zone {}: could not insert {:?}: {}", zone.origin(), descriptor, error);
        }
    }

    /// Returns the zone called exactly `name`, if it exists.
    pub fn get(&self, name: &Name) -> Option<Arc<Zone>> {
        self.inner.read().unwrap().zones.get(name).cloned()
    }

    /// Finds the zone that is the nearest ancestor of `qname` (i.e.,
    /// the zone whose name matches the most labels of `qname`, starting
    /// from the right). This is step 2 of the lookup algorithm given in
    /// [RFC 1034 § 4.3.2].
    ///
    /// [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
    pub fn find(&self, qname: &Name) -> Option<Arc<Zone>> {
        let inner = self.inner.read().unwrap();
        inner
            .names
            .iter()
            .filter(|name| qname.eq_or_subdomain_of(name))
            .max_by_key(|name| name.label_count())
            .and_then(|name| inner.zones.get(name).cloned())
    }

    /// Returns the names of all zones, in order of creation.
    pub fn names(&self) -> Vec<Name> {
        self.inner.read().unwrap().names.clone()
    }

    /// Returns the number of zones.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().names.len()
    }

    /// Returns whether there are no zones.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns the serial number for a zone created now: the number of
/// seconds since the Unix epoch.
fn current_serial() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(1, |elapsed| elapsed.as_secs() as u32)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::{Rdata, Type};
    use lazy_static::lazy_static;
    use std::thread;

    lazy_static! {
        static ref FORWARD: Name = "if.lastmile.sk.".parse().unwrap();
        static ref REVERSE: Name = "1.168.192.in-addr.arpa.".parse().unwrap();
        static ref DEFAULTS: ZoneDefaults = ZoneDefaults {
            ttl: Ttl::from(3600),
            name_servers: vec![
                NameServer {
                    name: "ns1".to_owned(),
                    address: Some("172.16.5.90".parse().unwrap()),
                },
                NameServer {
                    name: "ns2.other.net.".to_owned(),
                    address: Some("2001:db8::53".parse().unwrap()),
                },
            ],
            ..ZoneDefaults::default()
        };
    }

    #[test]
    fn forward_zones_get_soa_ns_and_glue() {
        let set = ZoneSet::new(DEFAULTS.clone());
        let zone = set.ensure_zone(&FORWARD, None);

        let soa = zone.lookup(&FORWARD, Type::SOA);
        assert_eq!(soa.len(), 1);
        match &soa[0].rdata {
            Rdata::Soa(soa) => {
                assert_eq!(soa.mname.to_string(), "ns1.if.lastmile.sk.");
                assert_eq!(soa.rname.to_string(), "dns-admin.if.lastmile.sk.");
                assert_eq!(soa.refresh, 7200);
                assert!(soa.serial > 0);
            }
            other => panic!("expected SOA data, got {other:?}"),
        }
        assert_eq!(u32::from(soa[0].ttl), 3600);

        let ns = zone.lookup(&FORWARD, Type::NS);
        assert_eq!(ns.len(), 2);
        assert!(zone.has_apex_ns());

        // Only the in-zone name server gets glue.
        let ns1: Name = "ns1.if.lastmile.sk.".parse().unwrap();
        assert_eq!(zone.lookup(&ns1, Type::A).len(), 1);
        assert_eq!(zone.len(), 4);
    }

    #[test]
    fn reverse_zones_use_forward_name_servers() {
        let set = ZoneSet::new(DEFAULTS.clone());
        let zone = set.ensure_zone(&REVERSE, Some(&FORWARD));
        let targets: Vec<String> = zone
            .lookup(&REVERSE, Type::NS)
            .iter()
            .map(|r| r.rdata.to_string())
            .collect();
        assert_eq!(targets, ["ns1.if.lastmile.sk.", "ns2.other.net."]);
        assert_eq!(zone.len(), 3);
    }

    #[test]
    fn ensure_zone_is_idempotent() {
        let set = ZoneSet::new(DEFAULTS.clone());
        let first = set.ensure_zone(&FORWARD, None);
        let second = set.ensure_zone(&FORWARD, None);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 4);
        assert_eq!(set.len(), 1);
        assert_eq!(set.names(), vec![FORWARD.clone()]);
    }

    #[test]
    fn concurrent_creation_makes_one_zone() {
        let set = Arc::new(ZoneSet::new(DEFAULTS.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = set.clone();
                thread::spawn(move || set.ensure_zone(&FORWARD, None))
            })
            .collect();
        let zones: Vec<Arc<Zone>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(zones.iter().all(|z| Arc::ptr_eq(z, &zones[0])));
        assert_eq!(set.len(), 1);
        assert_eq!(zones[0].lookup(&FORWARD, Type::SOA).len(), 1);
    }

    #[test]
    fn zones_without_name_servers_still_get_an_soa() {
        let set = ZoneSet::new(ZoneDefaults::default());
        let zone = set.ensure_zone(&FORWARD, None);
        assert_eq!(zone.len(), 1);
        assert!(!zone.has_apex_ns());
        assert!(zone.soa_serial().is_some());
    }

    #[test]
    fn find_uses_the_longest_suffix() {
        let set = ZoneSet::new(ZoneDefaults::default());
        let sk: Name = "sk.".parse().unwrap();
        set.ensure_zone(&sk, None);
        set.ensure_zone(&FORWARD, None);

        let host: Name = "test.if.lastmile.sk.".parse().unwrap();
        let other: Name = "www.lastmile.sk.".parse().unwrap();
        let outside: Name = "example.org.".parse().unwrap();
        assert_eq!(set.find(&host).unwrap().origin(), &*FORWARD);
        assert_eq!(set.find(&FORWARD).unwrap().origin(), &*FORWARD);
        assert_eq!(set.find(&other).unwrap().origin(), &sk);
        assert!(set.find(&outside).is_none());
        assert!(set.find(&Name::root()).is_none());
    }
}
