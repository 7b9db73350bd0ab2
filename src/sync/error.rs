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

//! Error types for the [`Synchronizer`](super::Synchronizer).

use std::fmt;

use super::Family;
use crate::rr::BuildError;
use crate::{name, zone};

/// A problem with one step of applying an IPAM event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The event kind is not one the synchronizer handles.
    UnsupportedEvent(String),

    /// The host name could not be parsed.
    InvalidName { dns_name: String, error: name::Error },

    /// The host name has no parent, so there is no forward zone for it.
    NoForwardZone(String),

    /// The address could not be parsed.
    InvalidAddress(BuildError),

    /// The address does not belong to the family the event claims.
    FamilyMismatch { family: Family, address: String },

    /// A forward or PTR record could not be built.
    MalformedRecord(BuildError),

    /// A reverse-mapping name could not be derived from the address.
    ReverseName(name::Error),

    /// A zone refused a record.
    Zone(zone::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedEvent(kind) => write!(f, "unsupported event {kind:?}"),
            Self::InvalidName { dns_name, error } => {
                write!(f, "invalid host name {dns_name:?}: {error}")
            }
            Self::NoForwardZone(dns_name) => {
                write!(f, "host name {dns_name:?} has no parent zone")
            }
            Self::InvalidAddress(error) | Self::MalformedRecord(error) => write!(f, "{error}"),
            Self::FamilyMismatch { family, address } => {
                write!(f, "address {address:?} is not an {family} address")
            }
            Self::ReverseName(error) => write!(f, "could not derive reverse name: {error}"),
            Self::Zone(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<zone::Error> for Error {
    fn from(error: zone::Error) -> Self {
        Self::Zone(error)
    }
}

/// The failures that occurred while applying one event. Steps that did
/// not fail were still applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failures(pub Vec<Error>);

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} step(s) failed:", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            write!(f, "\n[{}] {}", i + 1, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failures {}
