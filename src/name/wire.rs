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

//! Reading names out of DNS messages.

use super::{Error, Name, MAX_LABEL_LEN, MAX_WIRE_LEN};

impl Name {
    /// Parses a possibly-compressed name starting at index `start` of
    /// `message`, following pointers ([RFC 1035 § 4.1.4]). Pointer
    /// targets are indices into `message`, so the whole DNS message
    /// should be passed in. On success, returns the name and the number
    /// of octets it occupies at `start`.
    ///
    /// [RFC 1035 § 4.1.4]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.4
    pub fn try_from_compressed(message: &[u8], start: usize) -> Result<(Name, usize), Error> {
        let mut wire = Vec::with_capacity(32);
        let mut chunk_start = start;
        let mut index = start;
        let mut consumed = None;

        loop {
            let len = *message.get(index).ok_or(Error::UnexpectedEom)?;
            if len & 0xc0 == 0xc0 {
                let low = *message.get(index + 1).ok_or(Error::UnexpectedEom)?;
                let pointer = u16::from_be_bytes([len & 0x3f, low]) as usize;
                // Pointers must refer to a prior occurrence of the
                // name, which also rules out loops.
                if pointer >= chunk_start {
                    return Err(Error::InvalidPointer);
                }
                consumed.get_or_insert_with(|| index + 2 - start);
                chunk_start = pointer;
                index = pointer;
            } else if len as usize > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong);
            } else {
                let end = index + 1 + len as usize;
                let label = message.get(index..end).ok_or(Error::UnexpectedEom)?;
                if wire.len() + label.len() > MAX_WIRE_LEN {
                    return Err(Error::NameTooLong);
                }
                wire.extend(label.iter().map(u8::to_ascii_lowercase));
                index = end;
                if len == 0 {
                    consumed.get_or_insert_with(|| index - start);
                    break;
                }
            }
        }

        let consumed = consumed.unwrap_or(index - start);
        Ok((Name { wire: wire.into() }, consumed))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_from_compressed_follows_pointers_and_folds_case() {
        let message = b"\x07EXAMPLE\x04test\x00\x03www\xc0\x00";
        let (name, len) = Name::try_from_compressed(message, 14).unwrap();
        assert_eq!(name.to_string(), "www.example.test.");
        assert_eq!(len, 6);
        let (name, len) = Name::try_from_compressed(message, 0).unwrap();
        assert_eq!(name.to_string(), "example.test.");
        assert_eq!(len, 14);
    }

    #[test]
    fn try_from_compressed_handles_backward_pointers_after_start() {
        // The name at index 23 is a bare pointer to the one at index
        // 16, which ends in a pointer to the start of the message. Its
        // terminating label lies before index 23.
        let message = b"\x02if\x08lastmile\x02sk\x00\x04test\xc0\x00\xc0\x10";
        let (name, len) = Name::try_from_compressed(message, 16).unwrap();
        assert_eq!(name.to_string(), "test.if.lastmile.sk.");
        assert_eq!(len, 7);
        let (name, len) = Name::try_from_compressed(message, 23).unwrap();
        assert_eq!(name.to_string(), "test.if.lastmile.sk.");
        assert_eq!(len, 2);
    }

    #[test]
    fn try_from_compressed_rejects_forward_pointers() {
        let message = b"\xc0\x02\x00";
        assert_eq!(
            Name::try_from_compressed(message, 0),
            Err(Error::InvalidPointer)
        );
    }

    #[test]
    fn try_from_compressed_rejects_truncated_names() {
        assert_eq!(
            Name::try_from_compressed(b"\x07exam", 0),
            Err(Error::UnexpectedEom)
        );
        assert_eq!(
            Name::try_from_compressed(b"\x03www\xc0", 0),
            Err(Error::UnexpectedEom)
        );
    }
}
