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

//! Synchronization of zones with an IP address management system.
//!
//! The [`Synchronizer`] turns [`IpAddressEvent`]s into zone mutations.
//! Each address known to the IPAM system maps a host name to an
//! address; this becomes a forward (A or AAAA) record in the host's
//! parent zone plus a PTR record in the reverse zone for the address
//! (see the [`reverse`] module for how reverse zones are cut). The two
//! records of a binding are always added and removed together.

use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, warn};

use crate::name::Name;
use crate::rr::{build_with_ttl, strip_mask, Rdata, Record, Type};
use crate::zone::{Zone, ZoneSet};

mod error;
mod event;
pub mod reverse;
pub use error::{Error, Failures};
pub use event::{Binding, EventKind, Family, IpAddressEvent};

/// Applies IPAM change events to a [`ZoneSet`].
///
/// Events are meant to be applied one at a time (typically by a single
/// task draining a queue), while queries are answered concurrently from
/// the same [`ZoneSet`].
pub struct Synchronizer {
    zones: Arc<ZoneSet>,
}

/// A parsed host name and the forward zone it lives in.
struct Host {
    name: Name,
    forward: Name,
}

impl Synchronizer {
    /// Creates a `Synchronizer` that mutates `zones`.
    pub fn new(zones: Arc<ZoneSet>) -> Self {
        Self { zones }
    }

    /// Returns the zones this `Synchronizer` mutates.
    pub fn zones(&self) -> &Arc<ZoneSet> {
        &self.zones
    }

    /// Applies one event.
    ///
    /// * `created` ensures the host's forward zone exists, adds the
    ///   forward record, ensures the reverse zone exists, and adds the
    ///   PTR record.
    /// * `deleted` removes the forward and PTR records. Records (or
    ///   zones) that do not exist are ignored.
    /// * `updated` compares the binding with the previous one (from the
    ///   event, or else from the forward zone's current records). If the
    ///   address changed, the old binding is deleted and the new one
    ///   created; otherwise nothing happens.
    ///
    /// A failing step does not stop the steps that do not depend on it.
    /// All failures are logged and returned together.
    pub fn apply(&self, event: &IpAddressEvent) -> Result<(), Failures> {
        let mut failures = Vec::new();
        match &event.kind {
            EventKind::Created => self.create(&event.binding, &mut failures),
            EventKind::Deleted => self.delete(&event.binding, &mut failures),
            EventKind::Updated => self.update(event, &mut failures),
            EventKind::Unknown(kind) => failures.push(Error::UnsupportedEvent(kind.clone())),
        }

        if failures.is_empty() {
            debug!("Applied IPAM event: {}", event);
            Ok(())
        } else {
            for failure in &failures {
                warn!("IPAM event {}: {}", event, failure);
            }
            Err(Failures(failures))
        }
    }

    fn create(&self, binding: &Binding, failures: &mut Vec<Error>) {
        let host = note(parse_host(&binding.dns_name), failures);
        let address = note(parse_address(binding), failures);
        let Some(host) = host else { return };

        let forward_zone = self.zones.ensure_zone(&host.forward, None);
        let Some(address) = address else { return };
        note(
            self.forward_record(&host, address)
                .and_then(|record| add_once(&forward_zone, record)),
            failures,
        );

        let ptr_zone = match reverse::ptr_zone(address) {
            Ok(name) => self.zones.ensure_zone(&name, Some(&host.forward)),
            Err(error) => return failures.push(Error::ReverseName(error)),
        };
        note(
            self.ptr_record(&host, address, ptr_zone.origin())
                .and_then(|record| add_once(&ptr_zone, record)),
            failures,
        );
    }

    fn delete(&self, binding: &Binding, failures: &mut Vec<Error>) {
        let host = note(parse_host(&binding.dns_name), failures);
        let address = note(parse_address(binding), failures);
        let (Some(host), Some(address)) = (host, address) else {
            return;
        };

        if let Some(zone) = self.zones.get(&host.forward) {
            if let Some(record) = note(self.forward_record(&host, address), failures) {
                if !zone.remove(&record) {
                    debug!("No forward record to delete for {}", binding);
                }
            }
        }

        match reverse::ptr_zone(address) {
            Ok(name) => {
                if let Some(zone) = self.zones.get(&name) {
                    if let Some(record) = note(self.ptr_record(&host, address, &name), failures) {
                        if !zone.remove(&record) {
                            debug!("No PTR record to delete for {}", binding);
                        }
                    }
                }
            }
            Err(error) => failures.push(Error::ReverseName(error)),
        }
    }

    fn update(&self, event: &IpAddressEvent, failures: &mut Vec<Error>) {
        let new = &event.binding;
        let old = match &event.previous {
            Some(previous) => Some(previous.clone()),
            None => self.current_binding(new),
        };
        match old {
            Some(old) if same_binding(&old, new) => {
                debug!("Address of {} is unchanged", new);
            }
            Some(old) => {
                self.delete(&old, failures);
                self.create(new, failures);
            }
            None => self.create(new, failures),
        }
    }

    /// Reconstructs the binding currently recorded in the forward zone
    /// for the host name of `binding`. If the host has several addresses
    /// of the same family, the one matching `binding` is preferred.
    fn current_binding(&self, binding: &Binding) -> Option<Binding> {
        let host = parse_host(&binding.dns_name).ok()?;
        let zone = self.zones.get(&host.forward)?;
        let rr_type = match binding.family {
            Family::V4 => Type::A,
            Family::V6 => Type::AAAA,
        };
        let wanted = parse_address(binding).ok();
        let addresses: Vec<IpAddr> = zone
            .lookup(&host.name, rr_type)
            .into_iter()
            .filter_map(|record| match record.rdata {
                Rdata::A(address) => Some(IpAddr::V4(address)),
                Rdata::Aaaa(address) => Some(IpAddr::V6(address)),
                _ => None,
            })
            .collect();
        let address = addresses
            .iter()
            .find(|&&address| Some(address) == wanted)
            .or_else(|| addresses.first())?;
        Some(Binding {
            family: binding.family,
            address: address.to_string(),
            dns_name: binding.dns_name.clone(),
        })
    }

    fn forward_record(&self, host: &Host, address: IpAddr) -> Result<Record, Error> {
        let rr_type = if address.is_ipv4() { "A" } else { "AAAA" };
        let descriptor = format!("{} {} {}", host.name, rr_type, address);
        build_with_ttl(&host.forward, &descriptor, self.zones.defaults().ttl)
            .map_err(Error::MalformedRecord)
    }

    fn ptr_record(&self, host: &Host, address: IpAddr, ptr_zone: &Name) -> Result<Record, Error> {
        let owner = reverse::reverse_name(address).map_err(Error::ReverseName)?;
        let descriptor = format!("{} PTR {}", owner, host.name);
        build_with_ttl(ptr_zone, &descriptor, self.zones.defaults().ttl)
            .map_err(Error::MalformedRecord)
    }
}

/// Inserts `record` unless `zone` already holds a duplicate of it. Full
/// syncs and webhook retries replay `created` events for bindings that
/// are already present.
fn add_once(zone: &Zone, record: Record) -> Result<(), Error> {
    if zone.contains(&record) {
        debug!("Zone {} already holds {}", zone.origin(), record);
        Ok(())
    } else {
        Ok(zone.insert(Some(record))?)
    }
}

/// Records a failed step and lets the caller carry on without its
/// result.
fn note<T>(result: Result<T, Error>, failures: &mut Vec<Error>) -> Option<T> {
    result.map_err(|error| failures.push(error)).ok()
}

fn parse_host(dns_name: &str) -> Result<Host, Error> {
    let name: Name = dns_name.parse().map_err(|error| Error::InvalidName {
        dns_name: dns_name.to_owned(),
        error,
    })?;
    match name.parent() {
        Some(forward) if !forward.is_root() => Ok(Host { name, forward }),
        _ => Err(Error::NoForwardZone(dns_name.to_owned())),
    }
}

fn parse_address(binding: &Binding) -> Result<IpAddr, Error> {
    let address = strip_mask(&binding.address).map_err(Error::InvalidAddress)?;
    match (binding.family, address) {
        (Family::V4, IpAddr::V4(_)) | (Family::V6, IpAddr::V6(_)) => Ok(address),
        _ => Err(Error::FamilyMismatch {
            family: binding.family,
            address: binding.address.clone(),
        }),
    }
}

/// Returns whether two bindings name the same host and address, once
/// parsed. Unparsable bindings are never the same.
fn same_binding(a: &Binding, b: &Binding) -> bool {
    match (
        parse_host(&a.dns_name),
        parse_host(&b.dns_name),
        parse_address(a),
        parse_address(b),
    ) {
        (Ok(host_a), Ok(host_b), Ok(address_a), Ok(address_b)) => {
            host_a.name == host_b.name && address_a == address_b
        }
        _ => false,
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::{NameServer, ZoneDefaults};
    use lazy_static::lazy_static;

    lazy_static! {
        static ref FORWARD: Name = "if.lastmile.sk.".parse().unwrap();
        static ref HOST: Name = "test.if.lastmile.sk.".parse().unwrap();
        static ref REVERSE_ZONE: Name = "1.168.192.in-addr.arpa.".parse().unwrap();
        static ref REVERSE_NAME: Name = "1.1.168.192.in-addr.arpa.".parse().unwrap();
    }

    fn synchronizer() -> Synchronizer {
        let defaults = ZoneDefaults {
            name_servers: vec![NameServer {
                name: "ns1".to_owned(),
                address: Some("172.16.5.90".parse().unwrap()),
            }],
            ..ZoneDefaults::default()
        };
        Synchronizer::new(Arc::new(ZoneSet::new(defaults)))
    }

    fn binding(family: Family, address: &str, dns_name: &str) -> Binding {
        Binding {
            family,
            address: address.to_owned(),
            dns_name: dns_name.to_owned(),
        }
    }

    fn event(kind: &str, address: &str) -> IpAddressEvent {
        IpAddressEvent::new(
            EventKind::from(kind),
            binding(Family::V4, address, "test.if.lastmile.sk"),
            "Active",
        )
    }

    fn forward_records(sync: &Synchronizer) -> Vec<Record> {
        sync.zones
            .get(&FORWARD)
            .map_or_else(Vec::new, |zone| zone.lookup(&HOST, Type::A))
    }

    fn ptr_records(sync: &Synchronizer, owner: &Name) -> Vec<Record> {
        sync.zones
            .find(owner)
            .map_or_else(Vec::new, |zone| zone.lookup(owner, Type::PTR))
    }

    #[test]
    fn created_adds_forward_and_ptr_records() {
        let sync = synchronizer();
        sync.apply(&event("created", "192.168.1.1/24")).unwrap();

        let forward = forward_records(&sync);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].rdata.to_string(), "192.168.1.1");

        let ptr = ptr_records(&sync, &REVERSE_NAME);
        assert_eq!(ptr.len(), 1);
        assert_eq!(ptr[0].rdata, Rdata::Ptr(HOST.clone()));

        let reverse_zone = sync.zones.get(&REVERSE_ZONE).unwrap();
        assert!(reverse_zone.has_apex_ns());
        assert!(reverse_zone.soa_serial().is_some());
        assert!(sync.zones.get(&FORWARD).unwrap().has_apex_ns());
    }

    #[test]
    fn created_handles_ipv6() {
        let sync = synchronizer();
        let event = IpAddressEvent::new(
            EventKind::Created,
            binding(Family::V6, "2001:db8::10/64", "v6.if.lastmile.sk."),
            "Active",
        );
        sync.apply(&event).unwrap();

        let host: Name = "v6.if.lastmile.sk.".parse().unwrap();
        let zone = sync.zones.get(&FORWARD).unwrap();
        assert_eq!(zone.lookup(&host, Type::AAAA).len(), 1);

        let ptr_zone: Name = "8.b.d.0.1.0.0.2.ip6.arpa.".parse().unwrap();
        assert!(sync.zones.get(&ptr_zone).is_some());
        let owner = reverse::reverse_name("2001:db8::10".parse().unwrap()).unwrap();
        assert_eq!(ptr_records(&sync, &owner).len(), 1);
    }

    #[test]
    fn repeated_creation_reuses_zones() {
        let sync = synchronizer();
        sync.apply(&event("created", "192.168.1.1/24")).unwrap();
        sync.apply(&event("created", "192.168.1.2/24")).unwrap();
        assert_eq!(sync.zones.len(), 2);
        let zone = sync.zones.get(&FORWARD).unwrap();
        assert_eq!(zone.lookup(&FORWARD, Type::SOA).len(), 1);
        assert_eq!(zone.lookup(&FORWARD, Type::NS).len(), 1);
        assert_eq!(forward_records(&sync).len(), 2);
    }

    #[test]
    fn deleted_removes_both_records() {
        let sync = synchronizer();
        sync.apply(&event("created", "192.168.1.1/24")).unwrap();
        sync.apply(&event("deleted", "192.168.1.1/24")).unwrap();
        assert!(forward_records(&sync).is_empty());
        assert!(ptr_records(&sync, &REVERSE_NAME).is_empty());
        // The zones themselves are kept.
        assert_eq!(sync.zones.len(), 2);
    }

    #[test]
    fn replayed_creation_does_not_duplicate_records() {
        let sync = synchronizer();
        sync.apply(&event("created", "192.168.1.1/24")).unwrap();
        sync.apply(&event("created", "192.168.1.1/24")).unwrap();
        assert_eq!(forward_records(&sync).len(), 1);
        assert_eq!(ptr_records(&sync, &REVERSE_NAME).len(), 1);

        sync.apply(&event("deleted", "192.168.1.1/24")).unwrap();
        assert!(forward_records(&sync).is_empty());
        assert!(ptr_records(&sync, &REVERSE_NAME).is_empty());
    }

    #[test]
    fn deleting_missing_records_is_a_no_op() {
        let sync = synchronizer();
        sync.apply(&event("deleted", "192.168.1.1/24")).unwrap();
        assert!(sync.zones.is_empty());

        sync.apply(&event("created", "192.168.1.1/24")).unwrap();
        sync.apply(&event("deleted", "192.168.1.7/24")).unwrap();
        assert_eq!(forward_records(&sync).len(), 1);
    }

    #[test]
    fn updated_moves_the_binding() {
        let sync = synchronizer();
        sync.apply(&event("created", "192.168.1.1/24")).unwrap();
        sync.apply(&event("updated", "10.0.0.5/8")).unwrap();

        let forward = forward_records(&sync);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].rdata.to_string(), "10.0.0.5");
        assert!(ptr_records(&sync, &REVERSE_NAME).is_empty());
        let new_ptr: Name = "5.0.0.10.in-addr.arpa.".parse().unwrap();
        assert_eq!(ptr_records(&sync, &new_ptr).len(), 1);
    }

    #[test]
    fn updated_uses_the_previous_binding_when_given() {
        let sync = synchronizer();
        let old_host = "old.if.lastmile.sk";
        sync.apply(&IpAddressEvent::new(
            EventKind::Created,
            binding(Family::V4, "192.168.1.1/24", old_host),
            "Active",
        ))
        .unwrap();

        let mut update = event("updated", "192.168.1.1/24");
        update.previous = Some(binding(Family::V4, "192.168.1.1/24", old_host));
        sync.apply(&update).unwrap();

        let zone = sync.zones.get(&FORWARD).unwrap();
        let old: Name = "old.if.lastmile.sk.".parse().unwrap();
        assert!(zone.lookup(&old, Type::A).is_empty());
        assert_eq!(forward_records(&sync).len(), 1);
        let ptr = ptr_records(&sync, &REVERSE_NAME);
        assert_eq!(ptr.len(), 1);
        assert_eq!(ptr[0].rdata, Rdata::Ptr(HOST.clone()));
    }

    #[test]
    fn updated_with_the_same_address_changes_nothing() {
        let sync = synchronizer();
        sync.apply(&event("created", "192.168.1.1/24")).unwrap();
        let forward_len = sync.zones.get(&FORWARD).unwrap().len();
        let reverse_len = sync.zones.get(&REVERSE_ZONE).unwrap().len();

        sync.apply(&event("updated", "192.168.1.1/16")).unwrap();
        assert_eq!(sync.zones.get(&FORWARD).unwrap().len(), forward_len);
        assert_eq!(sync.zones.get(&REVERSE_ZONE).unwrap().len(), reverse_len);
    }

    #[test]
    fn updated_without_history_creates() {
        let sync = synchronizer();
        sync.apply(&event("updated", "192.168.1.1/24")).unwrap();
        assert_eq!(forward_records(&sync).len(), 1);
        assert_eq!(ptr_records(&sync, &REVERSE_NAME).len(), 1);
    }

    #[test]
    fn unknown_events_are_reported_and_ignored() {
        let sync = synchronizer();
        assert_eq!(
            sync.apply(&event("archived", "192.168.1.1/24")),
            Err(Failures(vec![Error::UnsupportedEvent("archived".to_owned())]))
        );
        assert!(sync.zones.is_empty());
    }

    #[test]
    fn invalid_addresses_still_create_the_forward_zone() {
        let sync = synchronizer();
        let failures = sync.apply(&event("created", "192.168.1.300/24")).unwrap_err();
        assert!(matches!(failures.0[..], [Error::InvalidAddress(_)]));
        assert!(sync.zones.get(&FORWARD).is_some());
        assert!(forward_records(&sync).is_empty());
        assert_eq!(sync.zones.len(), 1);
    }

    #[test]
    fn family_mismatches_are_rejected() {
        let sync = synchronizer();
        let mismatched = IpAddressEvent::new(
            EventKind::Created,
            binding(Family::V6, "192.168.1.1/24", "test.if.lastmile.sk"),
            "Active",
        );
        let failures = sync.apply(&mismatched).unwrap_err();
        assert!(matches!(failures.0[..], [Error::FamilyMismatch { .. }]));
        assert!(forward_records(&sync).is_empty());
    }

    #[test]
    fn top_level_host_names_have_no_forward_zone() {
        let sync = synchronizer();
        let event = IpAddressEvent::new(
            EventKind::Created,
            binding(Family::V4, "192.168.1.1/24", "localhost"),
            "Active",
        );
        let failures = sync.apply(&event).unwrap_err();
        assert!(matches!(failures.0[..], [Error::NoForwardZone(_)]));
        assert!(sync.zones.is_empty());
    }
}
