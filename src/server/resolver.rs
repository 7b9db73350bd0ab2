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

//! Implementation of the [`Resolver`], which answers queries from a
//! [`ZoneSet`].

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use arrayvec::ArrayVec;
use log::{debug, warn};

use super::{NextHandler, RequestCounter, TransferAgent};
use crate::class::Class;
use crate::message::{Opcode, Qtype, Rcode};
use crate::name::Name;
use crate::rr::{Rdata, Record, Type};
use crate::zone::{Scan, Zone, ZoneSet};

////////////////////////////////////////////////////////////////////////
// QUERIES AND ANSWERS                                                //
////////////////////////////////////////////////////////////////////////

/// A query to resolve, independent of its wire encoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    pub qname: Name,
    pub qtype: Qtype,
    pub qclass: Class,
    pub opcode: Opcode,

    /// The address the query came from.
    pub source: IpAddr,

    /// For NOTIFY messages, the SOA serial carried in the answer
    /// section, if there was one.
    pub notify_serial: Option<u32>,
}

impl Query {
    /// Creates a standard query (opcode QUERY, class IN).
    pub fn new(qname: Name, qtype: Qtype, source: IpAddr) -> Self {
        Self {
            qname,
            qtype,
            qclass: Class::IN,
            opcode: Opcode::Query,
            source,
            notify_serial: None,
        }
    }
}

/// How a query was resolved.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Outcome {
    /// Records answering the query were found.
    Success,

    /// The name does not exist (NXDOMAIN).
    NameError,

    /// The name exists but has no records of the requested type.
    NoData,

    /// The name lies below a zone cut; the answer is a referral.
    Delegation,

    /// The query could not be answered (SERVFAIL).
    ServerFailure,

    /// The query was refused.
    Refused,

    /// No zone matched, and the next handler produced the answer.
    Fallthrough,

    /// A NOTIFY message was processed.
    Notify(NotifyOutcome),
}

/// What was done about a NOTIFY message. All of these are answered
/// with NOERROR.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NotifyOutcome {
    /// A pull of the zone was triggered.
    PullTriggered,

    /// The zone is already at least as new as the notified serial.
    UpToDate,

    /// The sender may not notify us about this zone.
    Unauthorized,

    /// There is no transfer subsystem to act on the NOTIFY.
    TransferUnavailable,
}

/// The answer to a [`Query`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Answer {
    pub rcode: Rcode,

    /// Whether the answer is authoritative (the AA bit).
    pub aa: bool,

    pub answer: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
    pub outcome: Outcome,
}

impl Answer {
    /// Creates an answer with empty sections.
    pub fn new(outcome: Outcome, rcode: Rcode, aa: bool) -> Self {
        Self {
            rcode,
            aa,
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            outcome,
        }
    }

    /// Creates a non-authoritative REFUSED answer.
    pub fn refused() -> Self {
        Self::new(Outcome::Refused, Rcode::Refused, false)
    }

    /// Creates a non-authoritative SERVFAIL answer.
    pub fn server_failure() -> Self {
        Self::new(Outcome::ServerFailure, Rcode::ServFail, false)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Problems that arise while resolving a query. These never escape the
/// [`Resolver`]: each is logged and turned into an RCODE.
#[derive(Debug)]
pub enum Error {
    /// A NOTIFY named something other than a zone we serve.
    ZoneNotFound(Name),

    /// A NOTIFY arrived, but there is no transfer subsystem.
    TransferUnavailable(Name),

    /// A CNAME chain loops back on itself.
    CnameLoop(Name),

    /// A CNAME chain is longer than [`MAX_CNAME_CHAIN_LEN`].
    CnameChainTooLong(Name),

    /// An upstream lookup for an out-of-zone CNAME target failed.
    Upstream(Name, crate::zone::UpstreamError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ZoneNotFound(name) => write!(f, "{name} is not a zone served here"),
            Self::TransferUnavailable(name) => {
                write!(f, "NOTIFY for {name} ignored: zone transfers are unavailable")
            }
            Self::CnameLoop(name) => write!(f, "CNAME chain for {name} contains a loop"),
            Self::CnameChainTooLong(name) => write!(f, "CNAME chain for {name} is too long"),
            Self::Upstream(name, error) => write!(f, "upstream lookup of {name} failed: {error}"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// RESOLVER                                                           //
////////////////////////////////////////////////////////////////////////

/// The maximum number of CNAME records followed while answering one
/// query. Chains longer than this (and chains with loops) produce
/// SERVFAIL.
pub const MAX_CNAME_CHAIN_LEN: usize = 8;

/// The owners already visited while following a CNAME chain, not
/// counting the QNAME itself.
type PreviousOwners = ArrayVec<Name, { MAX_CNAME_CHAIN_LEN - 1 }>;

/// Answers queries against a shared [`ZoneSet`].
///
/// For each query, the `Resolver`
///
/// 1. finds the zone that is the longest match for the QNAME, handing
///    the query to the [`NextHandler`] if there is none;
/// 2. refuses zone transfer requests (AXFR and IXFR);
/// 3. processes NOTIFY messages through the [`TransferAgent`], if any;
/// 4. answers SERVFAIL if the zone has expired; and otherwise
/// 5. scans the zone once and classifies the result as a successful
///    answer, NXDOMAIN, NODATA, or a referral. CNAME records are
///    followed within the zone, and out-of-zone targets are looked up
///    through the zone's [`Upstream`](crate::zone::Upstream) handle.
///
/// Every query answered here (as opposed to by the next handler) is
/// counted through the [`RequestCounter`], if one is set.
pub struct Resolver {
    zones: Arc<ZoneSet>,
    next: Arc<dyn NextHandler>,
    transfer: Option<Arc<dyn TransferAgent>>,
    counter: Option<Arc<dyn RequestCounter>>,
    server_label: String,
}

impl Resolver {
    /// Creates a `Resolver` for `zones` that hands unmatched queries to
    /// `next`.
    pub fn new(zones: Arc<ZoneSet>, next: Arc<dyn NextHandler>) -> Self {
        Self {
            zones,
            next,
            transfer: None,
            counter: None,
            server_label: String::new(),
        }
    }

    /// Sets the transfer subsystem used for NOTIFY processing.
    pub fn set_transfer_agent(&mut self, transfer: Option<Arc<dyn TransferAgent>>) {
        self.transfer = transfer;
    }

    /// Sets the counter for answered queries and the server label that
    /// is passed to it.
    pub fn set_request_counter(
        &mut self,
        counter: Option<Arc<dyn RequestCounter>>,
        server_label: impl Into<String>,
    ) {
        self.counter = counter;
        self.server_label = server_label.into();
    }

    /// Returns the zones this `Resolver` answers from.
    pub fn zones(&self) -> &Arc<ZoneSet> {
        &self.zones
    }

    /// Resolves `query`.
    pub fn resolve(&self, query: &Query) -> Answer {
        let zone = match self.zones.find(&query.qname) {
            Some(zone) => zone,
            None => {
                debug!("No zone for {}; falling through", query.qname);
                return self.next.resolve(query);
            }
        };

        let answer = self.resolve_in_zone(&zone, query);
        debug!(
            "{} {} {} from {}: {:?} ({})",
            query.qname, query.qclass, query.qtype, query.source, answer.outcome, answer.rcode
        );
        if let Some(ref counter) = self.counter {
            counter.increment(&self.server_label);
        }
        answer
    }

    fn resolve_in_zone(&self, zone: &Zone, query: &Query) -> Answer {
        if query.qtype.is_transfer() || !query.qclass.matches_in() {
            return Answer::refused();
        }
        if query.opcode == Opcode::Notify {
            return self.handle_notify(zone, query);
        }
        if zone.is_expired() {
            return Answer::server_failure();
        }

        let qtype = query.qtype;
        let scan = zone.scan(&query.qname, |t| qtype.matches(t));
        if !scan.matches.is_empty() {
            let mut answer = Answer::new(Outcome::Success, Rcode::NoError, true);
            answer.answer = scan.matches;
            answer
        } else if let Some(cname) = scan.cname {
            follow_cname(zone, &query.qname, cname, qtype)
        } else if !scan.cut.is_empty() {
            referral(zone, scan.cut)
        } else {
            negative(scan, Vec::new())
        }
    }

    fn handle_notify(&self, zone: &Zone, query: &Query) -> Answer {
        let notified = |outcome: NotifyOutcome| {
            debug!("NOTIFY for {} from {}: {:?}", query.qname, query.source, outcome);
            Answer::new(Outcome::Notify(outcome), Rcode::NoError, true)
        };

        if *zone.origin() != query.qname {
            warn!("{}", Error::ZoneNotFound(query.qname.clone()));
            return Answer::server_failure();
        }
        let transfer = match self.transfer {
            Some(ref transfer) => transfer,
            None => {
                debug!("{}", Error::TransferUnavailable(query.qname.clone()));
                return notified(NotifyOutcome::TransferUnavailable);
            }
        };
        if !transfer.is_authorized_notifier(zone.origin(), query.source) {
            warn!(
                "Ignoring unauthorized NOTIFY for {} from {}",
                query.qname, query.source
            );
            return notified(NotifyOutcome::Unauthorized);
        }

        let newer = match (query.notify_serial, zone.soa_serial()) {
            (Some(notified_serial), Some(current)) => serial_gt(notified_serial, current),
            _ => true,
        };
        if newer {
            transfer.pull_zone(zone.origin());
            notified(NotifyOutcome::PullTriggered)
        } else {
            notified(NotifyOutcome::UpToDate)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ANSWERING LOGIC                                                    //
////////////////////////////////////////////////////////////////////////

/// Builds the NXDOMAIN or NODATA answer for a scan that found nothing,
/// keeping any CNAME records already placed in the answer section.
fn negative(scan: Scan, answer_records: Vec<Record>) -> Answer {
    let mut answer = if scan.name_exists {
        Answer::new(Outcome::NoData, Rcode::NoError, true)
    } else {
        Answer::new(Outcome::NameError, Rcode::NxDomain, true)
    };
    answer.answer = answer_records;
    answer.authority.extend(scan.soa);
    answer
}

/// Builds a referral to the zone cut whose NS records are `cut`. Glue
/// addresses held by the zone are placed in the additional section.
fn referral(zone: &Zone, cut: Vec<Record>) -> Answer {
    let mut answer = Answer::new(Outcome::Delegation, Rcode::NoError, false);
    for ns in &cut {
        if let Rdata::Ns(ref target) = ns.rdata {
            answer.additional.extend(zone.lookup(target, Type::A));
            answer.additional.extend(zone.lookup(target, Type::AAAA));
        }
    }
    answer.authority = cut;
    answer
}

/// Follows the CNAME chain starting with `cname` (owned by `qname`).
///
/// The chain is followed within `zone`. A target outside the zone is
/// looked up through the zone's upstream handle when it has one, and is
/// otherwise left for the client to resolve. The RCODE reflects the
/// last lookup in the chain ([RFC 6604 § 3]).
///
/// [RFC 6604 § 3]: https://datatracker.ietf.org/doc/html/rfc6604#section-3
fn follow_cname(zone: &Zone, qname: &Name, cname: Record, qtype: Qtype) -> Answer {
    let mut owners_seen = PreviousOwners::new();
    let mut answer_records = Vec::new();
    let mut next = cname;

    loop {
        let target = match next.rdata {
            Rdata::Cname(ref target) => target.clone(),
            _ => return Answer::server_failure(),
        };
        answer_records.push(next);

        if target == *qname || owners_seen.contains(&target) {
            return cname_failure(Error::CnameLoop(qname.clone()), answer_records);
        }

        if !target.eq_or_subdomain_of(zone.origin()) {
            let mut answer = Answer::new(Outcome::Success, Rcode::NoError, true);
            if let Some(upstream) = zone.upstream() {
                match upstream.lookup(&target, Type::from(qtype)) {
                    Ok(records) => answer_records.extend(records),
                    Err(error) => {
                        return cname_failure(Error::Upstream(target, error), answer_records)
                    }
                }
            }
            answer.answer = answer_records;
            return answer;
        }

        let scan = zone.scan(&target, |t| qtype.matches(t));
        if !scan.matches.is_empty() {
            let mut answer = Answer::new(Outcome::Success, Rcode::NoError, true);
            answer_records.extend(scan.matches);
            answer.answer = answer_records;
            return answer;
        } else if let Some(cname) = scan.cname {
            if owners_seen.try_push(target).is_err() {
                return cname_failure(Error::CnameChainTooLong(qname.clone()), answer_records);
            }
            next = cname;
        } else if !scan.cut.is_empty() {
            let mut answer = referral(zone, scan.cut);
            // The first owner in the answer section is ours, so the
            // answer stays authoritative.
            answer.aa = true;
            answer.answer = answer_records;
            return answer;
        } else {
            return negative(scan, answer_records);
        }
    }
}

/// Logs a failure to follow a CNAME chain and builds a SERVFAIL answer
/// carrying the records gathered so far.
fn cname_failure(error: Error, answer_records: Vec<Record>) -> Answer {
    warn!("{}", error);
    let mut answer = Answer::server_failure();
    answer.answer = answer_records;
    answer
}

/// Compares SOA serial numbers using serial number arithmetic
/// ([RFC 1982]): returns whether `a` is greater than `b`.
///
/// [RFC 1982]: https://datatracker.ietf.org/doc/html/rfc1982
fn serial_gt(a: u32, b: u32) -> bool {
    a != b && (a.wrapping_sub(b) as i32) > 0
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
