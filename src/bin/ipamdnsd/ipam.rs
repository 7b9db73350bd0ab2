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

//! The IPAM system's JSON formats and the full sync through its API.

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tokio::sync::mpsc;

use ipamdns::sync::{Binding, EventKind, Family, IpAddressEvent};

use crate::config::IpamConfig;
use crate::run::describe_error;

////////////////////////////////////////////////////////////////////////
// JSON STRUCTURES                                                    //
////////////////////////////////////////////////////////////////////////

/// A `{"value": ...}` choice field.
#[derive(Clone, Debug, Deserialize)]
pub struct Choice<T> {
    pub value: T,
}

/// An IP address object, as found in webhook payloads and API results.
/// Fields other than these are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct IpAddressData {
    pub family: Choice<u8>,
    pub address: String,
    #[serde(default)]
    pub status: Option<Choice<String>>,
    #[serde(default)]
    pub dns_name: String,
}

impl IpAddressData {
    /// Converts the object into a [`Binding`].
    pub fn binding(&self) -> Result<Binding> {
        let family = Family::try_from(self.family.value)
            .map_err(|family| anyhow!("unknown address family {}", family))?;
        Ok(Binding {
            family,
            address: self.address.clone(),
            dns_name: self.dns_name.clone(),
        })
    }

    fn status(&self) -> &str {
        self.status.as_ref().map_or("", |status| status.value.as_str())
    }
}

/// The body of a webhook request.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub data: IpAddressData,
    #[serde(default)]
    pub snapshots: Option<Snapshots>,
}

/// The before-and-after snapshots attached to webhook requests. Their
/// shape varies between IPAM versions, so they are decoded leniently.
#[derive(Debug, Deserialize)]
pub struct Snapshots {
    #[serde(default)]
    pub prechange: Option<serde_json::Value>,
}

impl WebhookPayload {
    /// Converts the payload into an [`IpAddressEvent`]. For updates,
    /// the prechange snapshot (if it can be decoded) becomes the
    /// previous binding.
    pub fn into_event(self) -> Result<IpAddressEvent> {
        let mut event = IpAddressEvent::new(
            EventKind::from(self.event.as_str()),
            self.data.binding()?,
            self.data.status(),
        );
        if event.kind == EventKind::Updated {
            event.previous = self
                .snapshots
                .and_then(|snapshots| snapshots.prechange)
                .and_then(|prechange| serde_json::from_value::<IpAddressData>(prechange).ok())
                .and_then(|data| data.binding().ok());
        }
        Ok(event)
    }
}

/// One page of the IP address list.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub count: usize,
    pub results: Vec<IpAddressData>,
    #[serde(default)]
    pub next: Option<String>,
}

////////////////////////////////////////////////////////////////////////
// FULL SYNC                                                          //
////////////////////////////////////////////////////////////////////////

/// Runs a full sync each time a request arrives on `requests`, until
/// the channel closes.
pub async fn run_full_syncs(
    client: reqwest::Client,
    config: IpamConfig,
    events: mpsc::Sender<IpAddressEvent>,
    mut requests: mpsc::Receiver<()>,
) {
    while requests.recv().await.is_some() {
        info!("Starting a full sync from {}.", config.url);
        match full_sync(&client, &config, &events).await {
            Ok(queued) => info!("Full sync queued {} addresses.", queued),
            Err(e) => error!("{}", describe_error("Full sync failed:", &e)),
        }
    }
}

/// Fetches every IP address from the IPAM API, following `next` links,
/// and queues each one as a `created` event. Returns the number of
/// events queued.
pub async fn full_sync(
    client: &reqwest::Client,
    config: &IpamConfig,
    events: &mpsc::Sender<IpAddressEvent>,
) -> Result<usize> {
    let mut queued = 0;
    let mut pages = 0;
    let mut next_url = Some(config.url.clone());

    while let Some(url) = next_url {
        let page: Page = client
            .get(&url)
            .header(AUTHORIZATION, format!("Token {}", config.token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()
            .context("the IPAM API returned an error")?
            .json()
            .await
            .with_context(|| format!("failed to decode the response from {url}"))?;
        if pages == 0 {
            info!("The IPAM API reports {} addresses.", page.count);
        }
        pages += 1;

        for data in &page.results {
            let binding = match data.binding() {
                Ok(binding) => binding,
                Err(e) => {
                    warn!("Skipping {} from the IPAM API: {}", data.address, e);
                    continue;
                }
            };
            let event = IpAddressEvent::new(EventKind::Created, binding, data.status());
            events
                .send(event)
                .await
                .map_err(|_| anyhow!("the synchronizer has stopped"))?;
            queued += 1;
        }
        next_url = page.next;
    }

    Ok(queued)
}
