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

//! Implements the server configuration file.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::Path;

use anyhow::{Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use ipamdns::name::Name;
use ipamdns::rr::Ttl;
use ipamdns::zone::{NameServer, ZoneDefaults};

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let config = parse(&raw_config).context("failed to parse the configuration file")?;
    log_config_summary(&config);
    Ok(config)
}

/// Parses a configuration from TOML text.
pub fn parse(raw_config: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(raw_config)
}

/// Loads the server configuration from the parsed command line
/// arguments given by `args`.
pub fn load_from_args(args: RunArgs) -> Config {
    let zones = ZonesConfig {
        name_servers: args
            .name_servers
            .into_iter()
            .map(|arg| (arg.0.name, arg.0.address))
            .collect(),
        ..ZonesConfig::default()
    };
    let ipam = match (args.ipam_url, args.ipam_token) {
        (Some(url), Some(token)) => Some(IpamConfig { url, token }),
        _ => None,
    };

    let config = Config {
        bind: args.bind.unwrap_or_else(default_bind),
        webhook: args.webhook,
        server_label: args.server_label.unwrap_or_else(default_server_label),
        zones,
        ipam,
        notify: HashMap::new(),
        metrics: MetricsConfig {
            prometheus: args.prometheus,
        },
    };
    log_config_summary(&config);
    config
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let optional = |addr: Option<SocketAddr>| match addr {
        Some(addr) => addr.to_string(),
        None => "disabled".to_owned(),
    };
    let mut message = format!(
        "Configuration loaded:\n\
         Bind address:  {}\n\
         Webhook:       {}\n\
         IPAM API:      {}\n\
         Prometheus:    {}\n\
         Server label:  {}\n\
         Notify ACLs:   {}\n\
         Name servers:  ",
        config.bind,
        optional(config.webhook),
        config.ipam.as_ref().map_or("disabled", |ipam| ipam.url.as_str()),
        optional(config.metrics.prometheus),
        config.server_label,
        config.notify.len(),
    );
    if config.zones.name_servers.is_empty() {
        message.push_str("none");
    }
    for (name, address) in &config.zones.name_servers {
        write!(message, "\n  {name}").unwrap();
        if let Some(address) = address {
            write!(message, " ({address})").unwrap();
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    pub webhook: Option<SocketAddr>,
    #[serde(default = "default_server_label")]
    pub server_label: String,
    #[serde(default)]
    pub zones: ZonesConfig,
    pub ipam: Option<IpamConfig>,
    #[serde(default)]
    pub notify: HashMap<ConfigName, Vec<IpAddr>>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V6(Ipv6Addr::LOCALHOST);
const DEFAULT_BIND_PORT: u16 = 53;

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

fn default_server_label() -> String {
    format!("dns://:{DEFAULT_BIND_PORT}")
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ZONES                                       //
////////////////////////////////////////////////////////////////////////

/// The parameters for generated zone apexes. Name servers are sorted
/// by name; the first one is the SOA MNAME.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZonesConfig {
    pub ttl: u32,
    pub admin: String,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
    pub name_servers: BTreeMap<String, Option<IpAddr>>,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        let defaults = ZoneDefaults::default();
        Self {
            ttl: u32::from(defaults.ttl),
            admin: defaults.admin,
            refresh: defaults.refresh,
            retry: defaults.retry,
            expire: defaults.expire,
            minimum: defaults.minimum,
            name_servers: BTreeMap::new(),
        }
    }
}

impl From<ZonesConfig> for ZoneDefaults {
    fn from(config: ZonesConfig) -> Self {
        Self {
            ttl: Ttl::from(config.ttl),
            admin: config.admin,
            refresh: config.refresh,
            retry: config.retry,
            expire: config.expire,
            minimum: config.minimum,
            name_servers: config
                .name_servers
                .into_iter()
                .map(|(name, address)| NameServer { name, address })
                .collect(),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTIONS: IPAM AND METRICS                           //
////////////////////////////////////////////////////////////////////////

/// Access to the IPAM system's IP address list.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpamConfig {
    pub url: String,
    pub token: String,
}

impl fmt::Debug for IpamConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IpamConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    pub prometheus: Option<SocketAddr>,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER IPAMDNS TYPES FOR SERDE                              //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`ipamdns`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over an [`ipamdns`]
        /// type.
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
        bind = "[::]:5353"
        webhook = "127.0.0.1:9002"
        server_label = "dns://:5353"

        [zones]
        ttl = 300
        name_servers = { "ns1" = "172.16.5.90", "ns2" = "172.16.5.76" }

        [ipam]
        url = "https://ipam.test/api/ipam/ip-addresses/"
        token = "0123456789abcdef"

        [notify]
        "Example.ORG." = ["192.0.2.1", "2001:db8::1"]

        [metrics]
        prometheus = "127.0.0.1:9153"
    "#;

    #[test]
    fn full_config_parses() {
        let config = parse(FULL_CONFIG).unwrap();
        assert_eq!(config.bind, "[::]:5353".parse().unwrap());
        assert_eq!(config.webhook, Some("127.0.0.1:9002".parse().unwrap()));
        assert_eq!(config.server_label, "dns://:5353");
        assert_eq!(config.ipam.unwrap().token, "0123456789abcdef");
        assert_eq!(
            config.metrics.prometheus,
            Some("127.0.0.1:9153".parse().unwrap())
        );

        let notify_zone = ConfigName("example.org.".parse().unwrap());
        assert_eq!(config.notify[&notify_zone].len(), 2);

        let defaults = ZoneDefaults::from(config.zones);
        assert_eq!(defaults.ttl, Ttl::from(300));
        assert_eq!(defaults.admin, "dns-admin");
        assert_eq!(defaults.refresh, 7200);
        let names: Vec<_> = defaults.name_servers.iter().map(|ns| ns.name.as_str()).collect();
        assert_eq!(names, ["ns1", "ns2"]);
        assert_eq!(
            defaults.name_servers[0].address,
            Some("172.16.5.90".parse().unwrap())
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.bind, default_bind());
        assert_eq!(config.server_label, "dns://:53");
        assert!(config.webhook.is_none());
        assert!(config.ipam.is_none());
        assert!(config.notify.is_empty());
        assert_eq!(ZoneDefaults::from(config.zones), ZoneDefaults::default());
    }

    #[test]
    fn unknown_or_missing_fields_are_rejected() {
        assert!(parse("bnid = \"[::1]:53\"").is_err());
        assert!(parse("[zones]\nserial = 1").is_err());
        assert!(parse("[ipam]\nurl = \"https://ipam.test/\"").is_err());
    }

    #[test]
    fn invalid_notify_zone_names_are_rejected() {
        let error = parse("[notify]\n\"a..b\" = []").unwrap_err();
        assert!(error.to_string().contains("invalid domain name"));
    }

    #[test]
    fn ipam_token_is_not_printed() {
        let config = parse(FULL_CONFIG).unwrap();
        assert!(!format!("{:?}", config).contains("0123456789abcdef"));
    }
}
