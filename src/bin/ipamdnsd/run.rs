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

//! Implements the `run` command (i.e., running the server).

use std::fmt::Write;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info, warn};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};

use ipamdns::io::TokioIoProvider;
use ipamdns::server::{Resolver, Server};
use ipamdns::sync::{IpAddressEvent, Synchronizer};
use ipamdns::zone::ZoneSet;

use crate::args::RunArgs;
use crate::config::{self, Config};
use crate::handlers::{NotifyAcl, Refuser};
use crate::{ipam, telemetry, webhook};

/// How many events may wait for the synchronizer before senders block.
const EVENT_QUEUE_LEN: usize = 1024;

/// How long to wait for stray tasks when the runtime shuts down.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the server.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = describe_error("Failed to run:", &e);
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

/// Formats an error and its chain of causes under `heading`, one
/// numbered cause per line.
pub fn describe_error(heading: &str, e: &anyhow::Error) -> String {
    let mut message = String::from(heading);
    for (i, cause) in e.chain().enumerate() {
        write!(message, "\n[{}] {}", i + 1, cause).unwrap();
    }
    message
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "ipamdns daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let config = if let Some(ref config_path) = run_args.config {
        info!("Loading the configuration from {}.", config_path.display());
        config::load_from_path(config_path).context("failed to load the configuration")?
    } else {
        info!("Loading the configuration from the command line.");
        config::load_from_args(run_args)
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the Tokio runtime")?;
    let runtime_guard = runtime.enter();

    // Bind everything before doing anything else, so that we fail fast.
    let io_provider = runtime
        .block_on(TokioIoProvider::bind([config.bind], [config.bind]))
        .with_context(|| format!("failed to bind DNS sockets to {}", config.bind))?;
    let webhook_listener = match config.webhook {
        Some(addr) => Some(
            runtime
                .block_on(TcpListener::bind(addr))
                .with_context(|| format!("failed to bind the webhook listener to {addr}"))?,
        ),
        None => None,
    };
    if let Some(addr) = config.metrics.prometheus {
        telemetry::install_prometheus_exporter(addr)?;
    }

    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;
    let Started {
        io_provider_controller,
        sync_requests,
        webhook_shutdown,
    } = start(&runtime, config, io_provider, webhook_listener)?;

    // Process incoming signals.
    for signal in signals.forever() {
        match signal {
            s @ (SIGINT | SIGTERM) => {
                let name = if s == SIGINT { "SIGINT" } else { "SIGTERM" };
                info!("Received {}; shutting down.", name);
                break;
            }
            SIGHUP => {
                info!("Received SIGHUP; requesting a full sync.");
                match sync_requests.try_send(()) {
                    Ok(()) => (),
                    Err(mpsc::error::TrySendError::Full(())) => {
                        info!("A full sync is already pending.")
                    }
                    Err(mpsc::error::TrySendError::Closed(())) => {
                        warn!("Ignoring SIGHUP: no IPAM API is configured.")
                    }
                }
            }
            _ => unreachable!(),
        }
    }

    // Shut down the server.
    runtime.block_on(io_provider_controller.shut_down());
    if let Some(webhook_shutdown) = webhook_shutdown {
        let _ = webhook_shutdown.send(());
    }
    drop(runtime_guard);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    info!("Shutdown complete.");
    Ok(())
}

/// Handles to the parts of a started server that are needed after
/// start-up.
struct Started {
    io_provider_controller: ipamdns::io::TokioShutdownController,
    sync_requests: mpsc::Sender<()>,
    webhook_shutdown: Option<oneshot::Sender<()>>,
}

/// Builds the shared zones and starts every task: the synchronizer, the
/// full sync (if configured), the webhook listener (if configured), and
/// the DNS transport.
fn start(
    runtime: &Runtime,
    config: Config,
    io_provider: TokioIoProvider,
    webhook_listener: Option<TcpListener>,
) -> Result<Started> {
    let zones = Arc::new(ZoneSet::new(config.zones.into()));
    let (event_sender, event_receiver) = mpsc::channel(EVENT_QUEUE_LEN);
    let (sync_request_sender, sync_request_receiver) = mpsc::channel(1);

    runtime.spawn(run_synchronizer(
        Synchronizer::new(zones.clone()),
        event_receiver,
    ));

    if let Some(ipam_config) = config.ipam {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ipamdnsd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create the IPAM API client")?;
        runtime.spawn(ipam::run_full_syncs(
            client,
            ipam_config,
            event_sender.clone(),
            sync_request_receiver,
        ));
        // The initial full sync.
        let _ = sync_request_sender.try_send(());
    }

    let webhook_shutdown = webhook_listener.map(|listener| {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();
        runtime.spawn(webhook::serve(listener, event_sender.clone(), async move {
            let _ = shutdown_receiver.await;
        }));
        shutdown_sender
    });

    let mut resolver = Resolver::new(zones, Arc::new(Refuser));
    resolver.set_request_counter(
        Some(Arc::new(telemetry::MetricsCounter)),
        config.server_label,
    );
    if !config.notify.is_empty() {
        let notifiers = config
            .notify
            .into_iter()
            .map(|(zone, senders)| (zone.0, senders))
            .collect();
        resolver.set_transfer_agent(Some(Arc::new(NotifyAcl::new(
            notifiers,
            sync_request_sender.clone(),
        ))));
    }

    info!("Set-up is complete; starting the server.");
    let server = Arc::new(Server::new(Arc::new(resolver)));
    Ok(Started {
        io_provider_controller: io_provider.start(&server),
        sync_requests: sync_request_sender,
        webhook_shutdown,
    })
}

/// Applies queued events to the zones, one at a time, in arrival
/// order. ([`Synchronizer::apply`] logs the outcome of each.)
async fn run_synchronizer(
    synchronizer: Synchronizer,
    mut events: mpsc::Receiver<IpAddressEvent>,
) {
    while let Some(event) = events.recv().await {
        let _ = synchronizer.apply(&event);
    }
}

fn set_up_signal_handling() -> Result<Signals> {
    let all_signals = &[SIGHUP, SIGINT, SIGTERM];
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // Exit immediately if a second termination signal arrives before
    // the process finishes shutting down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(all_signals).map_err(Into::into)
}
