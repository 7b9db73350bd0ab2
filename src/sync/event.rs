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

//! The change events consumed by the [`Synchronizer`](super::Synchronizer).

use std::fmt;

/// The kind of change an IPAM event reports.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,

    /// Any other event name. These are reported as unsupported.
    Unknown(String),
}

impl From<&str> for EventKind {
    fn from(text: &str) -> Self {
        match text {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "deleted" => Self::Deleted,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Updated => f.write_str("updated"),
            Self::Deleted => f.write_str("deleted"),
            Self::Unknown(other) => f.write_str(other),
        }
    }
}

/// An IP address family.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Family {
    V4,
    V6,
}

impl TryFrom<u8> for Family {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Self::V4),
            6 => Ok(Self::V6),
            other => Err(other),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("IPv4"),
            Self::V6 => f.write_str("IPv6"),
        }
    }
}

/// The association between a host name and an address that an IPAM
/// system records, and that becomes a forward record plus a PTR record.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Binding {
    pub family: Family,

    /// The address, normally in CIDR notation (`192.0.2.10/24`).
    pub address: String,

    /// The fully-qualified host name; a trailing dot is optional.
    pub dns_name: String,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} ({})", self.dns_name, self.address, self.family)
    }
}

/// A change notification from the IPAM system.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpAddressEvent {
    pub kind: EventKind,
    pub binding: Binding,

    /// The IPAM system's status for the address (e.g. `Active`). It is
    /// carried for logging only.
    pub status: String,

    /// For updates, the binding as it was before the change, when the
    /// IPAM system supplies it.
    pub previous: Option<Binding>,
}

impl IpAddressEvent {
    /// Creates an event with no previous binding.
    pub fn new(kind: EventKind, binding: Binding, status: impl Into<String>) -> Self {
        Self {
            kind,
            binding,
            status: status.into(),
            previous: None,
        }
    }
}

impl fmt::Display for IpAddressEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} [{}]", self.kind, self.binding, self.status)?;
        if let Some(previous) = &self.previous {
            write!(f, " (was {previous})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_parse_from_ipam_names() {
        assert_eq!(EventKind::from("created"), EventKind::Created);
        assert_eq!(EventKind::from("deleted"), EventKind::Deleted);
        assert_eq!(
            EventKind::from("archived"),
            EventKind::Unknown("archived".to_owned())
        );
    }

    #[test]
    fn families_are_4_or_6() {
        assert_eq!(Family::try_from(4), Ok(Family::V4));
        assert_eq!(Family::try_from(6), Ok(Family::V6));
        assert_eq!(Family::try_from(5), Err(5));
    }
}
