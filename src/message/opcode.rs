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

//! Implementation of the [`Opcode`] type.

/// The opcode of a DNS message ([RFC 1035 § 4.1.1]).
///
/// Only the opcodes this server deals with get their own variants. The
/// opcode field is four bits wide, so [`Opcode::from`] masks off
/// anything above that.
///
/// [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Opcode {
    Query,
    Notify, // RFC 1996
    Update, // RFC 2136
    Other(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value & 0x0f {
            0 => Self::Query,
            4 => Self::Notify,
            5 => Self::Update,
            other => Self::Other(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Other(v) => v & 0x0f,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Opcode;

    #[test]
    fn opcodes_convert_both_ways() {
        for raw in 0..16 {
            assert_eq!(u8::from(Opcode::from(raw)), raw);
        }
        assert_eq!(Opcode::from(4), Opcode::Notify);
        assert_eq!(Opcode::from(2), Opcode::Other(2));
    }
}
