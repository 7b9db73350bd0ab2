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

//! The processing logic of the authoritative DNS server.
//!
//! The [`Server`] structure decodes received messages, hands them to a
//! [`Resolver`] as [`Query`] values, and encodes the [`Answer`] that
//! comes back. The traits in this module are the seams through which
//! the [`Resolver`] reaches the rest of the system.

use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, warn};

use crate::message::{writer, Opcode, Rcode, Reader, Writer};
use crate::name::Name;

mod resolver;

pub use resolver::{Answer, NotifyOutcome, Outcome, Query, Resolver, MAX_CNAME_CHAIN_LEN};

////////////////////////////////////////////////////////////////////////
// COLLABORATOR TRAITS                                                //
////////////////////////////////////////////////////////////////////////

/// The handler to which queries for names outside every zone are
/// passed. Its [`Answer`] is returned to the client unchanged.
pub trait NextHandler: Send + Sync {
    fn resolve(&self, query: &Query) -> Answer;
}

/// The zone transfer subsystem, as seen by NOTIFY processing.
pub trait TransferAgent: Send + Sync {
    /// Starts pulling a new copy of `zone`. This must not block; the
    /// transfer itself happens elsewhere.
    fn pull_zone(&self, zone: &Name);

    /// Returns whether `sender` may send NOTIFY messages for `zone`.
    fn is_authorized_notifier(&self, zone: &Name, sender: IpAddr) -> bool;
}

/// A counter of the queries answered from a zone.
pub trait RequestCounter: Send + Sync {
    /// Counts one answered query for the server labeled `server`.
    fn increment(&self, server: &str);
}

////////////////////////////////////////////////////////////////////////
// SERVER PUBLIC API AND CORE MESSAGE-HANDLING LOGIC                  //
////////////////////////////////////////////////////////////////////////

/// The maximum size of a response sent over UDP.
pub const UDP_RESPONSE_LIMIT: usize = 512;

/// The maximum size of a response sent over TCP.
pub const TCP_RESPONSE_LIMIT: usize = u16::MAX as usize;

/// An authoritative DNS server, abstracted from any underlying network
/// I/O provider.
///
/// The [`Server`] receives, parses, and responds to DNS messages through
/// the [`Server::handle_message`] method. An I/O provider (see
/// [`crate::io`]) is responsible for receiving these messages from the
/// network and sending the responses that the [`Server`] produces.
pub struct Server {
    resolver: Arc<Resolver>,
}

impl Server {
    /// Creates a new `Server` that answers through `resolver`.
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    /// Returns the server's [`Resolver`].
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Handles a received DNS message. This is the API through which
    /// I/O providers submit messages.
    ///
    /// `received_buf` contains the message received, and `received_info`
    /// provides additional information about it (see [`ReceivedInfo`]).
    /// `response_buf` is a buffer into which a response message may be
    /// serialized. Responses are limited to [`UDP_RESPONSE_LIMIT`]
    /// octets over UDP and [`TCP_RESPONSE_LIMIT`] octets over TCP (or
    /// the size of `response_buf`, if smaller).
    ///
    /// A [`Response`] is returned, signifying whether a response is to
    /// be sent and, if so, how long the response message written into
    /// `response_buf` is.
    pub fn handle_message(
        &self,
        received_buf: &[u8],
        received_info: ReceivedInfo,
        response_buf: &mut [u8],
    ) -> Response {
        // Ignore messages that do not contain a full DNS header, as well
        // as messages that are responses.
        let mut received = match Reader::try_from(received_buf) {
            Ok(r) if !r.qr() => r,
            _ => return Response::None,
        };

        let response_size_limit = match received_info.transport {
            Transport::Tcp => TCP_RESPONSE_LIMIT,
            Transport::Udp => UDP_RESPONSE_LIMIT,
        };
        let mut response = match Writer::new(response_buf, response_size_limit) {
            Ok(w) => w,
            Err(e) => {
                warn!("Cannot write responses into the provided buffer: {}", e);
                return Response::None;
            }
        };
        response.set_id(received.id());
        response.set_qr(true);
        response.set_opcode(received.opcode());

        match received.opcode() {
            Opcode::Query => response.set_rd(received.rd()),
            Opcode::Notify => (),
            _ => {
                response.set_rcode(Rcode::NotImp);
                return Response::Single(response.finish());
            }
        }

        if received.qdcount() != 1 {
            response.set_rcode(Rcode::FormErr);
            return Response::Single(response.finish());
        }
        let question = match received.read_question() {
            Ok(q) => q,
            Err(_) => {
                response.set_rcode(Rcode::FormErr);
                return Response::Single(response.finish());
            }
        };
        if response.add_question(&question).is_err() {
            response.set_rcode(Rcode::ServFail);
            return Response::Single(response.finish());
        }

        let notify_serial = if received.opcode() == Opcode::Notify && received.ancount() > 0 {
            received
                .read_rr()
                .and_then(|rr| received.soa_serial(&rr))
                .ok()
        } else {
            None
        };

        let query = Query {
            qname: question.qname,
            qtype: question.qtype,
            qclass: question.qclass,
            opcode: received.opcode(),
            source: received_info.source,
            notify_serial,
        };
        let answer = self.resolver.resolve(&query);

        response.set_rcode(answer.rcode);
        response.set_aa(answer.aa);
        match write_sections(&mut response, &answer) {
            Ok(()) => (),
            Err(writer::Error::Truncation) if received_info.transport == Transport::Udp => {
                debug!("Truncating UDP response for {}", query.qname);
                response.clear_rrs();
                response.set_tc(true);
            }
            Err(e) => {
                warn!("Failed to write response for {}: {}", query.qname, e);
                response.clear_rrs();
            }
        }
        Response::Single(response.finish())
    }
}

/// Writes the sections of `answer` into `response`.
fn write_sections(response: &mut Writer, answer: &Answer) -> writer::Result<()> {
    for record in &answer.answer {
        response.add_answer(record)?;
    }
    for record in &answer.authority {
        response.add_authority(record)?;
    }
    for record in &answer.additional {
        response.add_additional(record)?;
    }
    Ok(())
}

/// Information about a received DNS message, used by
/// [`Server::handle_message`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReceivedInfo {
    source: IpAddr,
    transport: Transport,
}

impl ReceivedInfo {
    /// Creates a new [`ReceivedInfo`].
    ///
    /// IPv4-mapped IPv6 addresses of the kind that dual-stack sockets
    /// produce (e.g. `::ffff:127.0.0.1`) are interpreted as IPv4
    /// addresses, so that NOTIFY access checks see the address the
    /// sender actually used.
    pub fn new(source: IpAddr, transport: Transport) -> Self {
        Self {
            source: source.to_canonical(),
            transport,
        }
    }

    /// Returns the (canonicalized) source address.
    pub fn source(&self) -> IpAddr {
        self.source
    }

    /// Returns the transport the message arrived over.
    pub fn transport(&self) -> Transport {
        self.transport
    }
}

/// Indicates the transport through which a DNS message was received.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Indicates to the caller of [`Server::handle_message`] what kind of
/// response needs to be sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Response {
    /// A single response is to be sent. The response has been written
    /// into the provided buffer. The length of the response is
    /// included.
    Single(usize),

    /// No response is to be sent.
    None,
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::constants::*;
    use crate::rr::build;
    use crate::zone::{ZoneDefaults, ZoneSet};
    use lazy_static::lazy_static;
    use std::net::{Ipv4Addr, Ipv6Addr};

    lazy_static! {
        static ref ORIGIN: Name = "if.lastmile.sk.".parse().unwrap();
        static ref SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    }

    struct Refuser;

    impl NextHandler for Refuser {
        fn resolve(&self, _query: &Query) -> Answer {
            Answer::new(Outcome::Fallthrough, Rcode::Refused, false)
        }
    }

    /// Authorizes every sender and records the zones it is asked to
    /// pull.
    #[derive(Default)]
    struct RecordingAgent {
        pulls: std::sync::Mutex<Vec<Name>>,
    }

    impl TransferAgent for RecordingAgent {
        fn pull_zone(&self, zone: &Name) {
            self.pulls.lock().unwrap().push(zone.clone());
        }

        fn is_authorized_notifier(&self, _zone: &Name, _sender: IpAddr) -> bool {
            true
        }
    }

    fn server() -> Server {
        let zones = Arc::new(ZoneSet::new(ZoneDefaults::default()));
        let zone = zones.ensure_zone(&ORIGIN, None);
        zone.insert(Some(build(&ORIGIN, "test A 192.168.1.1").unwrap()))
            .unwrap();
        for i in 0..40 {
            let descriptor = format!("big AAAA 2001:db8::{i:x}");
            zone.insert(Some(build(&ORIGIN, &descriptor).unwrap()))
                .unwrap();
        }
        Server::new(Arc::new(Resolver::new(zones, Arc::new(Refuser))))
    }

    /// Builds a query message with the given header flags byte.
    fn message(flags: u8, qname: &str, qtype: u16) -> Vec<u8> {
        let mut buf = vec![0xab, 0xcd, flags, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        let qname: Name = qname.parse().unwrap();
        buf.extend_from_slice(qname.wire_repr());
        buf.extend_from_slice(&qtype.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf
    }

    fn handle(server: &Server, received: &[u8], transport: Transport) -> Option<Vec<u8>> {
        let mut buf = vec![0; TCP_RESPONSE_LIMIT];
        let info = ReceivedInfo::new(*SOURCE, transport);
        match server.handle_message(received, info, &mut buf) {
            Response::Single(len) => Some(buf[..len].to_vec()),
            Response::None => None,
        }
    }

    fn header(response: &[u8]) -> Reader {
        Reader::try_from(response).unwrap()
    }

    #[test]
    fn answers_queries() {
        let received = message(RD_MASK, "test.if.lastmile.sk.", 1);
        let response = handle(&server(), &received, Transport::Udp).unwrap();
        let reader = header(&response);
        assert_eq!(reader.id(), 0xabcd);
        assert!(reader.qr());
        assert!(reader.aa());
        assert!(reader.rd());
        assert_eq!(reader.rcode(), Rcode::NoError);
        assert_eq!(reader.qdcount(), 1);
        assert_eq!(reader.ancount(), 1);
    }

    #[test]
    fn nxdomain_carries_the_soa() {
        let received = message(0, "nope.if.lastmile.sk.", 1);
        let response = handle(&server(), &received, Transport::Udp).unwrap();
        let reader = header(&response);
        assert_eq!(reader.rcode(), Rcode::NxDomain);
        assert_eq!(reader.ancount(), 0);
        assert_eq!(reader.nscount(), 1);
    }

    #[test]
    fn fallthrough_answers_are_returned_as_given() {
        let response = handle(&server(), &message(0, "example.org.", 1), Transport::Udp).unwrap();
        let reader = header(&response);
        assert_eq!(reader.rcode(), Rcode::Refused);
        assert!(!reader.aa());
    }

    #[test]
    fn responses_and_short_messages_are_ignored() {
        let server = server();
        let response = message(QR_MASK, "test.if.lastmile.sk.", 1);
        assert_eq!(handle(&server, &response, Transport::Udp), None);
        assert_eq!(handle(&server, &[0; 11], Transport::Udp), None);
    }

    #[test]
    fn unknown_opcodes_are_not_implemented() {
        let update = message(5 << OPCODE_SHIFT, "if.lastmile.sk.", 6);
        let response = handle(&server(), &update, Transport::Udp).unwrap();
        assert_eq!(header(&response).rcode(), Rcode::NotImp);
    }

    #[test]
    fn missing_or_bad_questions_are_formerr() {
        let mut received = message(0, "test.if.lastmile.sk.", 1);
        received[QDCOUNT_START + 1] = 0;
        let response = handle(&server(), &received, Transport::Udp).unwrap();
        assert_eq!(header(&response).rcode(), Rcode::FormErr);

        let received = message(0, "test.if.lastmile.sk.", 1);
        let response = handle(&server(), &received[..received.len() - 2], Transport::Udp)
            .unwrap();
        assert_eq!(header(&response).rcode(), Rcode::FormErr);
    }

    #[test]
    fn oversized_udp_answers_are_truncated() {
        let server = server();
        let received = message(0, "big.if.lastmile.sk.", 28);

        let response = handle(&server, &received, Transport::Udp).unwrap();
        let reader = header(&response);
        assert!(reader.tc());
        assert_eq!(reader.qdcount(), 1);
        assert_eq!(reader.ancount(), 0);
        assert_eq!(reader.rcode(), Rcode::NoError);

        let response = handle(&server, &received, Transport::Tcp).unwrap();
        let reader = header(&response);
        assert!(!reader.tc());
        assert_eq!(reader.ancount(), 40);
    }

    #[test]
    fn notify_is_acknowledged() {
        let notify = message(4 << OPCODE_SHIFT, "if.lastmile.sk.", 6);
        let response = handle(&server(), &notify, Transport::Udp).unwrap();
        let reader = header(&response);
        assert_eq!(reader.opcode(), Opcode::Notify);
        assert_eq!(reader.rcode(), Rcode::NoError);
    }

    /// Builds a NOTIFY for the zone apex carrying an SOA answer whose
    /// owner and RDATA names are all compression pointers to the QNAME.
    fn notify_with_serial(serial: u32) -> Vec<u8> {
        let mut buf = message(4 << OPCODE_SHIFT, "if.lastmile.sk.", 6);
        buf[ANCOUNT_START + 1] = 1;
        buf.extend_from_slice(&[0xc0, 0x0c, 0, 6, 0, 1, 0, 0, 0, 0, 0, 24]);
        buf.extend_from_slice(&[0xc0, 0x0c, 0xc0, 0x0c]);
        buf.extend_from_slice(&serial.to_be_bytes());
        buf.extend_from_slice(&[0; 16]);
        buf
    }

    #[test]
    fn notify_serials_reach_the_resolver() {
        let zones = Arc::new(ZoneSet::new(ZoneDefaults::default()));
        let current = zones.ensure_zone(&ORIGIN, None).soa_serial().unwrap();
        let agent = Arc::new(RecordingAgent::default());
        let mut resolver = Resolver::new(zones, Arc::new(Refuser));
        resolver.set_transfer_agent(Some(agent.clone() as Arc<dyn TransferAgent>));
        let server = Server::new(Arc::new(resolver));

        let response = handle(&server, &notify_with_serial(current), Transport::Udp).unwrap();
        assert_eq!(header(&response).rcode(), Rcode::NoError);
        assert!(agent.pulls.lock().unwrap().is_empty());

        let newer = current.wrapping_add(1);
        let response = handle(&server, &notify_with_serial(newer), Transport::Udp).unwrap();
        let reader = header(&response);
        assert_eq!(reader.opcode(), Opcode::Notify);
        assert_eq!(reader.rcode(), Rcode::NoError);
        assert_eq!(*agent.pulls.lock().unwrap(), vec![ORIGIN.clone()]);
    }

    #[test]
    fn received_info_canonicalizes_mapped_addresses() {
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 0, 2, 1).to_ipv6_mapped());
        let info = ReceivedInfo::new(mapped, Transport::Udp);
        assert_eq!(info.source(), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));

        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(ReceivedInfo::new(v6, Transport::Tcp).source(), v6);
    }
}
