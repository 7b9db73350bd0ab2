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

//! Implements command-line argument parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use clap::{Parser, Subcommand};

use ipamdns::zone::NameServer;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// An authoritative DNS server kept in sync with an IPAM system
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server
    Run(RunArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Set the configuration file to use
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = [
            "bind",
            "webhook",
            "name_servers",
            "ipam_url",
            "ipam_token",
            "prometheus",
            "server_label",
        ],
    )]
    pub config: Option<PathBuf>,

    /// Set the DNS server bind IP address and port
    #[arg(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Listen for IPAM webhooks on this address
    #[arg(long, value_name = "IP:PORT")]
    pub webhook: Option<SocketAddr>,

    /// Add a name server to list at every zone apex
    #[arg(long = "name-server", value_name = "NAME[=IP]")]
    pub name_servers: Vec<NameServerArg>,

    /// Fetch every IP address from this IPAM API endpoint at startup
    #[arg(long, value_name = "URL", requires = "ipam_token")]
    pub ipam_url: Option<String>,

    /// Set the token for the IPAM API
    #[arg(long, value_name = "TOKEN", requires = "ipam_url")]
    pub ipam_token: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "IP:PORT")]
    pub prometheus: Option<SocketAddr>,

    /// Set the server label attached to request metrics
    #[arg(long, value_name = "LABEL")]
    pub server_label: Option<String>,
}

/// A name server given on the command line with the `--name-server`
/// option, in the form `NAME=IP` or just `NAME`. Without an address, no
/// glue record is generated for the server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NameServerArg(pub NameServer);

impl FromStr for NameServerArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, address) = match s.split_once('=') {
            Some((name, address)) => {
                let address: IpAddr = address
                    .parse()
                    .map_err(|e| anyhow!("invalid name server address: {}", e))?;
                (name, Some(address))
            }
            None => (s, None),
        };
        if name.is_empty() {
            Err(anyhow!("the name server name is empty"))
        } else {
            Ok(Self(NameServer {
                name: name.to_owned(),
                address,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> Result<RunArgs, clap::Error> {
        let args = Args::try_parse_from(["ipamdnsd", "run"].iter().chain(args))?;
        match args.command {
            Command::Run(run_args) => Ok(run_args),
        }
    }

    #[test]
    fn name_server_args_parse() {
        let arg: NameServerArg = "ns1=172.16.5.90".parse().unwrap();
        assert_eq!(arg.0.name, "ns1");
        assert_eq!(arg.0.address, Some("172.16.5.90".parse().unwrap()));

        let arg: NameServerArg = "ns.example.org.".parse().unwrap();
        assert_eq!(arg.0.name, "ns.example.org.");
        assert_eq!(arg.0.address, None);

        assert!("ns1=not-an-ip".parse::<NameServerArg>().is_err());
        assert!("=172.16.5.90".parse::<NameServerArg>().is_err());
    }

    #[test]
    fn repeated_name_servers_accumulate() {
        let args = run_args(&[
            "--bind",
            "127.0.0.1:5353",
            "--name-server",
            "ns1=172.16.5.90",
            "--name-server",
            "ns2=172.16.5.76",
        ])
        .unwrap();
        assert_eq!(args.bind, Some("127.0.0.1:5353".parse().unwrap()));
        assert_eq!(args.name_servers.len(), 2);
        assert_eq!(args.name_servers[1].0.name, "ns2");
    }

    #[test]
    fn config_conflicts_with_inline_options() {
        assert!(run_args(&["--config", "ipamdns.toml"]).is_ok());
        assert!(run_args(&["--config", "ipamdns.toml", "--bind", "[::1]:53"]).is_err());
    }

    #[test]
    fn ipam_url_and_token_go_together() {
        assert!(run_args(&["--ipam-url", "https://ipam.test/api/"]).is_err());
        assert!(run_args(&["--ipam-url", "https://ipam.test/api/", "--ipam-token", "x"]).is_ok());
    }
}
