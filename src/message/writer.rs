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

//! Implementation of the [`Writer`] type to serialize DNS messages.

use std::fmt;

use super::constants::*;
use super::{Opcode, Question, Rcode};
use crate::rr::{Rdata, Record};

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer that serializes a DNS message into it.
///
/// A `Writer` is created with [`Writer::new`], which takes the buffer
/// and a message size limit (the smaller of the limit and the buffer
/// length is used). The header starts out zeroed, and its fields can
/// be set at any time. The question and the records of each section
/// are written sequentially, so they must be added in message order:
/// questions, then answers, then authority records, then additional
/// records. Adding them out of order fails with [`Error::OutOfOrder`].
///
/// Names are written uncompressed. Every `add_*` method is atomic: if
/// the item does not fit within the size limit, the method fails with
/// [`Error::Truncation`] and the message is left as it was.
pub struct Writer<'a> {
    octets: &'a mut [u8],
    cursor: usize,
    limit: usize,
    rr_start: usize,
    section: Section,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
}

/// The section of the message a [`Writer`] is currently writing.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

impl<'a> Writer<'a> {
    /// Creates a new `Writer` over `octets` whose messages are limited
    /// to `limit` octets (or `octets.len()`, if that is smaller). This
    /// fails if the limit leaves no room for the 12-octet header.
    pub fn new(octets: &'a mut [u8], limit: usize) -> Result<Self> {
        let limit = limit.min(octets.len());
        if limit < HEADER_SIZE {
            Err(Error::Truncation)
        } else {
            octets[0..HEADER_SIZE].fill(0);
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
                limit,
                rr_start: HEADER_SIZE,
                section: Section::Question,
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            })
        }
    }

    /// Sets the 16-bit ID of the message.
    pub fn set_id(&mut self, id: u16) {
        self.octets[ID_START..ID_END].copy_from_slice(&id.to_be_bytes());
    }

    /// Sets the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        self.set_flag(QR_MASK, qr);
    }

    /// Sets the message's opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        let raw = u8::from(opcode) << OPCODE_SHIFT;
        self.octets[FLAGS_BYTE] = (self.octets[FLAGS_BYTE] & !OPCODE_MASK) | raw;
    }

    /// Sets the AA (authoritative answer) bit.
    pub fn set_aa(&mut self, aa: bool) {
        self.set_flag(AA_MASK, aa);
    }

    /// Sets the TC (truncation) bit.
    pub fn set_tc(&mut self, tc: bool) {
        self.set_flag(TC_MASK, tc);
    }

    /// Sets the RD (recursion desired) bit.
    pub fn set_rd(&mut self, rd: bool) {
        self.set_flag(RD_MASK, rd);
    }

    /// Sets the RCODE of the message.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        let raw = u8::from(rcode);
        self.octets[RCODE_BYTE] = (self.octets[RCODE_BYTE] & !RCODE_MASK) | raw;
    }

    fn set_flag(&mut self, mask: u8, value: bool) {
        if value {
            self.octets[FLAGS_BYTE] |= mask;
        } else {
            self.octets[FLAGS_BYTE] &= !mask;
        }
    }

    /// Adds a question to the message. This must be used before any
    /// records are added.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        if self.section != Section::Question {
            return Err(Error::OutOfOrder);
        }
        let qdcount = self.qdcount.checked_add(1).ok_or(Error::CountOverflow)?;
        self.with_rollback(|this| {
            this.try_push(question.qname.wire_repr())?;
            this.try_push(&u16::from(question.qtype).to_be_bytes())?;
            this.try_push(&u16::from(question.qclass).to_be_bytes())
        })?;
        self.qdcount = qdcount;
        self.rr_start = self.cursor;
        Ok(())
    }

    /// Adds a record to the answer section.
    pub fn add_answer(&mut self, record: &Record) -> Result<()> {
        self.add_rr(Section::Answer, record)
    }

    /// Adds a record to the authority section.
    pub fn add_authority(&mut self, record: &Record) -> Result<()> {
        self.add_rr(Section::Authority, record)
    }

    /// Adds a record to the additional section.
    pub fn add_additional(&mut self, record: &Record) -> Result<()> {
        self.add_rr(Section::Additional, record)
    }

    fn add_rr(&mut self, section: Section, record: &Record) -> Result<()> {
        if section < self.section {
            return Err(Error::OutOfOrder);
        }
        let count = match section {
            Section::Answer => &self.ancount,
            Section::Authority => &self.nscount,
            _ => &self.arcount,
        };
        let new_count = count.checked_add(1).ok_or(Error::CountOverflow)?;

        self.with_rollback(|this| {
            this.try_push(record.owner.wire_repr())?;
            this.try_push(&u16::from(record.rr_type()).to_be_bytes())?;
            this.try_push(&u16::from(record.class).to_be_bytes())?;
            this.try_push(&u32::from(record.ttl).to_be_bytes())?;
            let rdlength_start = this.cursor;
            this.try_push(&[0, 0])?;
            this.push_rdata(&record.rdata)?;
            let rdlength = (this.cursor - rdlength_start - 2) as u16;
            this.octets[rdlength_start..rdlength_start + 2].copy_from_slice(&rdlength.to_be_bytes());
            Ok(())
        })?;

        self.section = section;
        match section {
            Section::Answer => self.ancount = new_count,
            Section::Authority => self.nscount = new_count,
            _ => self.arcount = new_count,
        }
        Ok(())
    }

    fn push_rdata(&mut self, rdata: &Rdata) -> Result<()> {
        match rdata {
            Rdata::A(address) => self.try_push(&address.octets()),
            Rdata::Aaaa(address) => self.try_push(&address.octets()),
            Rdata::Ns(name) | Rdata::Cname(name) | Rdata::Ptr(name) => {
                self.try_push(name.wire_repr())
            }
            Rdata::Soa(soa) => {
                self.try_push(soa.mname.wire_repr())?;
                self.try_push(soa.rname.wire_repr())?;
                for value in [soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum] {
                    self.try_push(&value.to_be_bytes())?;
                }
                Ok(())
            }
        }
    }

    /// Removes any records previously added to the message, keeping the
    /// header and question.
    pub fn clear_rrs(&mut self) {
        self.ancount = 0;
        self.nscount = 0;
        self.arcount = 0;
        self.cursor = self.rr_start;
        self.section = Section::Question;
    }

    /// Finishes writing the message. The final length of the message
    /// is returned.
    pub fn finish(self) -> usize {
        let counts = [
            (QDCOUNT_START, self.qdcount),
            (ANCOUNT_START, self.ancount),
            (NSCOUNT_START, self.nscount),
            (ARCOUNT_START, self.arcount),
        ];
        for (start, count) in counts {
            self.octets[start..start + 2].copy_from_slice(&count.to_be_bytes());
        }
        self.cursor
    }

    /// Runs `f`, restoring the cursor if it fails.
    fn with_rollback(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let saved_cursor = self.cursor;
        let result = f(self);
        if result.is_err() {
            self.cursor = saved_cursor;
        }
        result
    }

    /// Appends `data` at the cursor if it fits within the limit.
    fn try_push(&mut self, data: &[u8]) -> Result<()> {
        let end = self.cursor + data.len();
        if end > self.limit {
            Err(Error::Truncation)
        } else {
            self.octets[self.cursor..end].copy_from_slice(data);
            self.cursor = end;
            Ok(())
        }
    }
}

impl fmt::Debug for Writer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Writer")
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .field("section", &self.section)
            .field("qdcount", &self.qdcount)
            .field("ancount", &self.ancount)
            .field("nscount", &self.nscount)
            .field("arcount", &self.arcount)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Writer`] operation could not be
/// performed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// Adding the question or record would overflow the corresponding
    /// 16-bit counter in the DNS header.
    CountOverflow,

    /// There is not enough room left within the size limit.
    Truncation,

    /// A question or record was added in the wrong place in the
    /// message (e.g., a question after an answer record).
    OutOfOrder,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CountOverflow => f.write_str("record count would overflow"),
            Self::Truncation => f.write_str("message would be truncated"),
            Self::OutOfOrder => f.write_str("question or record serialized out of order"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
