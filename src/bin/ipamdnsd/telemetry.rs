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

//! Request metrics and their Prometheus exporter.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use log::info;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;

use ipamdns::server::RequestCounter;

/// The name of the answered-requests counter.
pub const REQUESTS_TOTAL: &str = "ipamdns_requests_total";

/// Counts answered queries in the `metrics` registry, labeled by
/// server.
#[derive(Debug, Default)]
pub struct MetricsCounter;

impl RequestCounter for MetricsCounter {
    fn increment(&self, server: &str) {
        counter!(REQUESTS_TOTAL, "server" => server.to_owned()).increment(1);
    }
}

/// Installs the Prometheus exporter as the global metrics recorder,
/// serving it over HTTP on `addr`. This must be called from within a
/// Tokio runtime.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install the Prometheus exporter")?;
    describe_counter!(REQUESTS_TOTAL, "Count of DNS requests answered from a zone.");
    info!("Serving Prometheus metrics on {}.", addr);
    Ok(())
}
