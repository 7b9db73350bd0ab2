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

//! Implementation of the [`Error`] type for zone-related errors.

use std::fmt;

/// Errors that arise during operations on a [`Zone`](super::Zone).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// There was no record to insert, because building it failed.
    InvalidRecord,

    /// The record's owner is not within the zone.
    NotInZone,

    /// The record is an SOA record that is not at the apex, or the
    /// zone already has its SOA record.
    SoaConflict,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::InvalidRecord => f.write_str("no valid record was provided"),
            Self::NotInZone => f.write_str("the record's owner is not within the zone"),
            Self::SoaConflict => {
                f.write_str("a zone has exactly one SOA record, which is owned by the apex")
            }
        }
    }
}

impl std::error::Error for Error {}
