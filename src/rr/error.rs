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

//! Implementation of the [`BuildError`] type.

use std::fmt;

/// An error signaling that a record or address could not be built from
/// its textual form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildError {
    /// A record descriptor could not be parsed.
    MalformedRecord {
        descriptor: String,
        reason: &'static str,
    },

    /// An address (optionally in CIDR notation) could not be parsed.
    InvalidAddress(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MalformedRecord { descriptor, reason } => {
                write!(f, "malformed record {descriptor:?}: {reason}")
            }
            Self::InvalidAddress(address) => write!(f, "invalid address {address:?}"),
        }
    }
}

impl std::error::Error for BuildError {}
