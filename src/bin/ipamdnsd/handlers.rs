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

//! The daemon's implementations of the resolver's collaborator traits.

use std::collections::HashMap;
use std::net::IpAddr;

use log::debug;
use tokio::sync::mpsc;

use ipamdns::name::Name;
use ipamdns::server::{Answer, NextHandler, Query, TransferAgent};

/// The handler for names outside every zone: the daemon is purely
/// authoritative, so these are refused.
#[derive(Debug, Default)]
pub struct Refuser;

impl NextHandler for Refuser {
    fn resolve(&self, _query: &Query) -> Answer {
        Answer::refused()
    }
}

/// The NOTIFY access list.
///
/// Zone contents come from the IPAM system, so "pulling" a zone means
/// requesting a full IPAM sync. Requests are coalesced: while one is
/// pending, further requests are dropped.
#[derive(Debug)]
pub struct NotifyAcl {
    notifiers: HashMap<Name, Vec<IpAddr>>,
    sync_requests: mpsc::Sender<()>,
}

impl NotifyAcl {
    pub fn new(notifiers: HashMap<Name, Vec<IpAddr>>, sync_requests: mpsc::Sender<()>) -> Self {
        Self {
            notifiers,
            sync_requests,
        }
    }
}

impl TransferAgent for NotifyAcl {
    fn pull_zone(&self, zone: &Name) {
        match self.sync_requests.try_send(()) {
            Ok(()) => debug!("NOTIFY for {} requested a full sync", zone),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("NOTIFY for {}: a full sync is already pending", zone)
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("NOTIFY for {}: no IPAM API is configured", zone)
            }
        }
    }

    fn is_authorized_notifier(&self, zone: &Name, sender: IpAddr) -> bool {
        self.notifiers
            .get(zone)
            .map_or(false, |allowed| allowed.contains(&sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl() -> (NotifyAcl, mpsc::Receiver<()>) {
        let zone: Name = "if.lastmile.sk.".parse().unwrap();
        let (sender, receiver) = mpsc::channel(1);
        let notifiers = HashMap::from([(zone, vec!["192.0.2.1".parse().unwrap()])]);
        (NotifyAcl::new(notifiers, sender), receiver)
    }

    #[test]
    fn only_listed_senders_may_notify() {
        let (acl, _) = acl();
        let zone: Name = "if.lastmile.sk.".parse().unwrap();
        let other: Name = "example.org.".parse().unwrap();
        assert!(acl.is_authorized_notifier(&zone, "192.0.2.1".parse().unwrap()));
        assert!(!acl.is_authorized_notifier(&zone, "192.0.2.2".parse().unwrap()));
        assert!(!acl.is_authorized_notifier(&other, "192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn pulls_are_coalesced_into_one_sync_request() {
        let (acl, mut receiver) = acl();
        let zone: Name = "if.lastmile.sk.".parse().unwrap();
        acl.pull_zone(&zone);
        acl.pull_zone(&zone);
        assert_eq!(receiver.try_recv(), Ok(()));
        assert!(receiver.try_recv().is_err());
    }
}
