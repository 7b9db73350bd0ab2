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

//! In-memory DNS zones and the set of zones served.

use std::fmt;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::name::Name;
use crate::rr::{Rdata, Record, Type};

mod error;
mod set;
pub use error::Error;
pub use set::{NameServer, ZoneDefaults, ZoneSet};

////////////////////////////////////////////////////////////////////////
// UPSTREAM LOOKUPS                                                   //
////////////////////////////////////////////////////////////////////////

/// A handle for resolving names that a zone refers to but does not
/// contain, such as the out-of-zone target of a CNAME record.
pub trait Upstream: Send + Sync {
    /// Looks up the records of type `rr_type` owned by `name`.
    fn lookup(&self, name: &Name, rr_type: Type) -> Result<Vec<Record>, UpstreamError>;
}

/// The error type returned by [`Upstream`] implementations.
pub type UpstreamError = Box<dyn std::error::Error + Send + Sync>;

////////////////////////////////////////////////////////////////////////
// ZONES                                                              //
////////////////////////////////////////////////////////////////////////

/// A DNS zone held in memory.
///
/// A `Zone` keeps its records in a flat list, in the order they were
/// inserted, behind a read-write lock: lookups and scans take the read
/// lock, while [`Zone::insert`] and [`Zone::remove`] take the write
/// lock. The lock also guards the zone's expired flag, which a zone
/// transfer subsystem may set when the zone's data can no longer be
/// trusted. Nothing in this crate's synchronization path sets it.
///
/// A zone holds exactly one SOA record, owned by its apex. This is
/// enforced by [`Zone::insert`]; the SOA is normally added once, when
/// the [`ZoneSet`] creates the zone.
pub struct Zone {
    origin: Name,
    data: RwLock<ZoneData>,
    upstream: Option<Arc<dyn Upstream>>,
}

struct ZoneData {
    records: Vec<Record>,
    expired: bool,
}

/// The result of [`Zone::scan`].
#[derive(Debug, Default)]
pub struct Scan {
    /// The zone's SOA record.
    pub soa: Option<Record>,

    /// Whether the scanned name exists in the zone. A name exists if it
    /// owns records or is an ancestor of a name that does.
    pub name_exists: bool,

    /// The records owned by the scanned name whose type matched.
    pub matches: Vec<Record>,

    /// A CNAME record owned by the scanned name, if any.
    pub cname: Option<Record>,

    /// The NS records of the highest zone cut at or above the scanned
    /// name, if the name lies in delegated space.
    pub cut: Vec<Record>,
}

impl Zone {
    /// Creates a new, empty zone.
    pub fn new(origin: Name) -> Self {
        Self::with_upstream(origin, None)
    }

    /// Creates a new, empty zone with an optional [`Upstream`] handle.
    pub fn with_upstream(origin: Name, upstream: Option<Arc<dyn Upstream>>) -> Self {
        Self {
            origin,
            data: RwLock::new(ZoneData {
                records: Vec::new(),
                expired: false,
            }),
            upstream,
        }
    }

    /// Returns the zone's name.
    pub fn origin(&self) -> &Name {
        &self.origin
    }

    /// Returns the zone's [`Upstream`] handle, if it has one.
    pub fn upstream(&self) -> Option<&dyn Upstream> {
        self.upstream.as_deref()
    }

    /// Appends a record to the zone. Records are never deduplicated.
    ///
    /// The record is passed as an [`Option`] so that the result of a
    /// failed build can be handed over directly; `None` is reported as
    /// [`Error::InvalidRecord`] and nothing is inserted. Records owned
    /// by names outside the zone are rejected, as are SOA records that
    /// would break the single-apex-SOA rule.
    pub fn insert(&self, record: Option<Record>) -> Result<(), Error> {
        let record = record.ok_or(Error::InvalidRecord)?;
        if !record.owner.eq_or_subdomain_of(&self.origin) {
            return Err(Error::NotInZone);
        }
        let mut data = self.data.write().unwrap();
        if record.rr_type() == Type::SOA
            && (record.owner != self.origin
                || data.records.iter().any(|r| r.rr_type() == Type::SOA))
        {
            return Err(Error::SoaConflict);
        }
        debug!("Zone {}: inserting {}", self.origin, record);
        data.records.push(record);
        Ok(())
    }

    /// Removes the first record that is a duplicate of `record` (see
    /// [`Record::is_duplicate_of`]) and returns whether one was found.
    ///
    /// The removal swaps the last record into the removed record's
    /// place and truncates the list, so insertion order is not
    /// preserved.
    pub fn remove(&self, record: &Record) -> bool {
        let mut data = self.data.write().unwrap();
        match data.records.iter().position(|r| r.is_duplicate_of(record)) {
            Some(index) => {
                let removed = data.records.swap_remove(index);
                debug!("Zone {}: removed {}", self.origin, removed);
                true
            }
            None => false,
        }
    }

    /// Returns whether the zone holds a duplicate of `record` (see
    /// [`Record::is_duplicate_of`]).
    pub fn contains(&self, record: &Record) -> bool {
        let data = self.data.read().unwrap();
        data.records.iter().any(|r| r.is_duplicate_of(record))
    }

    /// Returns copies of the records owned by `owner` with type
    /// `rr_type`.
    pub fn lookup(&self, owner: &Name, rr_type: Type) -> Vec<Record> {
        let data = self.data.read().unwrap();
        data.records
            .iter()
            .filter(|r| r.owner == *owner && r.rr_type() == rr_type)
            .cloned()
            .collect()
    }

    /// Returns whether the apex has at least one NS record.
    pub fn has_apex_ns(&self) -> bool {
        let data = self.data.read().unwrap();
        data.records
            .iter()
            .any(|r| r.owner == self.origin && r.rr_type() == Type::NS)
    }

    /// Returns the zone's SOA record.
    pub fn soa(&self) -> Option<Record> {
        let data = self.data.read().unwrap();
        data.records
            .iter()
            .find(|r| r.rr_type() == Type::SOA)
            .cloned()
    }

    /// Returns the serial number in the zone's SOA record.
    pub fn soa_serial(&self) -> Option<u32> {
        self.soa().and_then(|soa| match soa.rdata {
            Rdata::Soa(soa) => Some(soa.serial),
            _ => None,
        })
    }

    /// Returns whether the zone has been marked as expired.
    pub fn is_expired(&self) -> bool {
        self.data.read().unwrap().expired
    }

    /// Marks the zone as expired (or not).
    pub fn set_expired(&self, expired: bool) {
        self.data.write().unwrap().expired = expired;
    }

    /// Returns the number of records in the zone.
    pub fn len(&self) -> usize {
        self.data.read().unwrap().records.len()
    }

    /// Returns whether the zone has no records at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scans the zone once, under a single read lock, collecting what is
    /// needed to answer a query for `qname`. Records owned by `qname`
    /// are placed in [`Scan::matches`] when `type_matches` returns true
    /// for their type.
    pub fn scan(&self, qname: &Name, type_matches: impl Fn(Type) -> bool) -> Scan {
        let data = self.data.read().unwrap();
        let mut scan = Scan::default();
        let mut cut_owner: Option<&Name> = None;

        for record in &data.records {
            let rr_type = record.rr_type();
            if rr_type == Type::SOA && scan.soa.is_none() {
                scan.soa = Some(record.clone());
            }
            if record.owner == *qname {
                scan.name_exists = true;
                if type_matches(rr_type) {
                    scan.matches.push(record.clone());
                }
                if rr_type == Type::CNAME && scan.cname.is_none() {
                    scan.cname = Some(record.clone());
                }
            } else if !scan.name_exists && record.owner.eq_or_subdomain_of(qname) {
                scan.name_exists = true;
            }
            if rr_type == Type::NS
                && record.owner != self.origin
                && qname.eq_or_subdomain_of(&record.owner)
            {
                let higher = match cut_owner {
                    Some(owner) => record.owner.label_count() < owner.label_count(),
                    None => true,
                };
                if higher {
                    cut_owner = Some(&record.owner);
                    scan.cut.clear();
                }
                if cut_owner == Some(&record.owner) {
                    scan.cut.push(record.clone());
                }
            }
        }

        scan
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Zone")
            .field("origin", &self.origin)
            .field("records", &self.len())
            .field("upstream", &self.upstream.is_some())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
