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

//! Implementation of the [`Reader`] type to read on-the-wire DNS
//! messages.

use std::convert::TryInto;
use std::fmt;

use super::constants::*;
use super::{Opcode, Question, Rcode};
use crate::class::Class;
use crate::name::{self, Name};
use crate::rr::{Ttl, Type};

////////////////////////////////////////////////////////////////////////
// READER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer containing a DNS message that enables
/// reading the message data.
///
/// A `Reader` is constructed using its [`TryFrom`] implementation,
/// which fails unless the buffer holds at least the 12-octet header.
/// Header fields can then be read at any time. Questions and records
/// are read sequentially with [`Reader::read_question`] and
/// [`Reader::read_rr`], from a cursor that starts right after the
/// header.
#[derive(Eq, PartialEq)]
pub struct Reader<'a> {
    octets: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Returns the 16-bit ID of the message.
    pub fn id(&self) -> u16 {
        self.u16_at(ID_START)
    }

    /// Returns whether the QR (query response) bit is set.
    pub fn qr(&self) -> bool {
        (self.octets[FLAGS_BYTE] & QR_MASK) != 0
    }

    /// Returns the message's opcode.
    pub fn opcode(&self) -> Opcode {
        Opcode::from((self.octets[FLAGS_BYTE] & OPCODE_MASK) >> OPCODE_SHIFT)
    }

    /// Returns whether the AA (authoritative answer) bit is set.
    pub fn aa(&self) -> bool {
        (self.octets[FLAGS_BYTE] & AA_MASK) != 0
    }

    /// Returns whether the TC (truncation) bit is set.
    pub fn tc(&self) -> bool {
        (self.octets[FLAGS_BYTE] & TC_MASK) != 0
    }

    /// Returns whether the RD (recursion desired) bit is set.
    pub fn rd(&self) -> bool {
        (self.octets[FLAGS_BYTE] & RD_MASK) != 0
    }

    /// Returns the RCODE of the message.
    pub fn rcode(&self) -> Rcode {
        Rcode::from(self.octets[RCODE_BYTE] & RCODE_MASK)
    }

    /// Returns the number of questions in the message.
    pub fn qdcount(&self) -> u16 {
        self.u16_at(QDCOUNT_START)
    }

    /// Returns the number of answers in the message.
    pub fn ancount(&self) -> u16 {
        self.u16_at(ANCOUNT_START)
    }

    /// Returns the number of authority records in the message.
    pub fn nscount(&self) -> u16 {
        self.u16_at(NSCOUNT_START)
    }

    /// Returns the number of additional records in the message.
    pub fn arcount(&self) -> u16 {
        self.u16_at(ARCOUNT_START)
    }

    fn u16_at(&self, start: usize) -> u16 {
        u16::from_be_bytes(self.octets[start..start + 2].try_into().unwrap())
    }

    /// Reads a [`Question`] starting at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_question(&mut self) -> Result<Question> {
        let (qname, qname_len) =
            Name::try_from_compressed(self.octets, self.cursor).map_err(Error::InvalidName)?;
        let qname_end = self.cursor + qname_len;
        let qtype = read_u16(self.octets, qname_end)?.into();
        let qclass = read_u16(self.octets, qname_end + 2)?.into();
        self.cursor = qname_end + 4;
        Ok(Question {
            qname,
            qtype,
            qclass,
        })
    }

    /// Reads a resource record at the current cursor. The RDATA is not
    /// interpreted; see [`Reader::soa_serial`].
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_rr(&mut self) -> Result<ReadRr<'a>> {
        let (owner, owner_len) =
            Name::try_from_compressed(self.octets, self.cursor).map_err(Error::InvalidName)?;
        let owner_end = self.cursor + owner_len;
        let rr_type = read_u16(self.octets, owner_end)?.into();
        let class = read_u16(self.octets, owner_end + 2)?.into();
        let ttl = read_u32(self.octets, owner_end + 4)?.into();
        let rdlength = read_u16(self.octets, owner_end + 8)? as usize;
        let rdata_start = owner_end + 10;
        let rdata = self
            .octets
            .get(rdata_start..rdata_start + rdlength)
            .ok_or(Error::UnexpectedEomInField)?;
        self.cursor = rdata_start + rdlength;
        Ok(ReadRr {
            owner,
            rr_type,
            class,
            ttl,
            rdata,
            rdata_start,
        })
    }

    /// Extracts the serial number from an SOA record previously read
    /// from this message. (SOA RDATA may contain compression pointers,
    /// so the whole message is needed to parse it.)
    pub fn soa_serial(&self, rr: &ReadRr) -> Result<u32> {
        if rr.rr_type != Type::SOA {
            return Err(Error::NotSoa);
        }
        let (_, mname_len) =
            Name::try_from_compressed(self.octets, rr.rdata_start).map_err(Error::InvalidName)?;
        let (_, rname_len) = Name::try_from_compressed(self.octets, rr.rdata_start + mname_len)
            .map_err(Error::InvalidName)?;
        let serial_start = mname_len + rname_len;
        if serial_start + 20 > rr.rdata.len() {
            return Err(Error::UnexpectedEomInField);
        }
        read_u32(rr.rdata, serial_start)
    }

    /// Returns whether the `Reader`'s cursor has reached the end of the
    /// message.
    pub fn at_eom(&self) -> bool {
        self.cursor >= self.octets.len()
    }
}

impl<'a> TryFrom<&'a [u8]> for Reader<'a> {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self> {
        if octets.len() >= HEADER_SIZE {
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
            })
        } else {
            Err(Error::HeaderTooShort)
        }
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.id())
            .field("qr", &self.qr())
            .field("opcode", &self.opcode())
            .field("rcode", &self.rcode())
            .field("qdcount", &self.qdcount())
            .field("ancount", &self.ancount())
            .field("nscount", &self.nscount())
            .field("arcount", &self.arcount())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Reads a network-byte-order `u16` at `start` in `octets`.
fn read_u16(octets: &[u8], start: usize) -> Result<u16> {
    let array = octets
        .get(start..start + 2)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u16::from_be_bytes(array))
}

/// Reads a network-byte-order `u32` at `start` in `octets`.
fn read_u32(octets: &[u8], start: usize) -> Result<u32> {
    let array = octets
        .get(start..start + 4)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u32::from_be_bytes(array))
}

////////////////////////////////////////////////////////////////////////
// READ RR STRUCTURE                                                  //
////////////////////////////////////////////////////////////////////////

/// A resource record as returned by [`Reader::read_rr`], with its RDATA
/// left uninterpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadRr<'a> {
    pub owner: Name,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: &'a [u8],
    rdata_start: usize,
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Question`] or resource record could not
/// be read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    HeaderTooShort,
    UnexpectedEomInField,
    InvalidName(name::Error),
    NotSoa,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::HeaderTooShort => f.write_str("header too short"),
            Self::UnexpectedEomInField => f.write_str("unexpected end of message in field"),
            Self::InvalidName(err) => write!(f, "invalid name: {err}"),
            Self::NotSoa => f.write_str("record is not an SOA record"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Reader`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::Qtype;
    use super::*;

    /// A NOTIFY for example.org. carrying the zone's SOA in the answer
    /// section, with compression pointers in the SOA data.
    const NOTIFY_MESSAGE: &[u8] = b"\x12\x34\x20\x00\x00\x01\x00\x01\x00\x00\x00\x00\
          \x07example\x03org\x00\x00\x06\x00\x01\
          \xc0\x0c\x00\x06\x00\x01\x00\x00\x0e\x10\x00\x22\
          \x03ns1\xc0\x0c\x05admin\xc0\x0c\
          \x00\x00\x00\x2a\x00\x00\x1c\x20\x00\x00\x0e\x10\x00\x12\x75\x00\x00\x00\x0e\x10";

    #[test]
    fn reader_reads_header_question_and_soa_serial() {
        let mut reader = Reader::try_from(NOTIFY_MESSAGE).unwrap();
        assert_eq!(reader.id(), 0x1234);
        assert!(!reader.qr());
        assert_eq!(reader.opcode(), Opcode::Notify);
        assert!(!reader.rd());
        assert_eq!(reader.qdcount(), 1);
        assert_eq!(reader.ancount(), 1);

        let question = reader.read_question().unwrap();
        assert_eq!(question.qname.to_string(), "example.org.");
        assert_eq!(question.qtype, Qtype::from(Type::SOA));
        assert_eq!(question.qclass, Class::IN);

        let soa = reader.read_rr().unwrap();
        assert_eq!(soa.owner, question.qname);
        assert_eq!(soa.rr_type, Type::SOA);
        assert_eq!(soa.ttl, Ttl::from(3600));
        assert_eq!(reader.soa_serial(&soa), Ok(42));
        assert!(reader.at_eom());
    }

    #[test]
    fn reader_rejects_truncated_records() {
        let truncated = &NOTIFY_MESSAGE[..NOTIFY_MESSAGE.len() - 4];
        let mut reader = Reader::try_from(truncated).unwrap();
        reader.read_question().unwrap();
        assert_eq!(reader.read_rr(), Err(Error::UnexpectedEomInField));
    }

    #[test]
    fn reader_constructor_rejects_short_message() {
        for size in 0..HEADER_SIZE {
            let buf = vec![0; size];
            assert_eq!(Reader::try_from(buf.as_slice()), Err(Error::HeaderTooShort));
        }
    }
}
