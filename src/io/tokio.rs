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

//! Implementation of the Tokio I/O provider.

// NOTE: I/O errors generally end the task in which they occur. The
// run_with_respawning supervisor respawns the TCP acceptors and UDP
// receivers, possibly after a delay, if they exit with an error or a
// panic.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

use super::shutdown::{self, ShutdownHandle};
use super::{TokioShutdownController, READ_MESSAGE_TIMEOUT, TASK_RESPAWN_DELAY};
use crate::server::{ReceivedInfo, Response, Server, Transport, UDP_RESPONSE_LIMIT};

/// The largest UDP datagram we accept.
const UDP_RECEIVE_BUFFER_SIZE: usize = 4096;

/// The size of a TCP message buffer: the two-octet length prefix plus
/// the largest possible DNS message.
const TCP_BUFFER_SIZE: usize = 2 + u16::MAX as usize;

/// A Tokio I/O provider.
///
/// This provider uses asynchronous I/O and runs the server by spawning
/// tasks on a Tokio runtime. UDP queries are each handled in their own
/// task; TCP connections are handled one per task, with any number of
/// (length-prefixed) messages per connection.
///
/// The `TokioIoProvider` supports graceful shutdown. To initiate a
/// graceful shutdown, use the [`TokioShutdownController`] returned by
/// [`TokioIoProvider::start`].
pub struct TokioIoProvider {
    tcp_listeners: Vec<TcpListener>,
    udp_sockets: Vec<UdpSocket>,
}

impl TokioIoProvider {
    /// Creates a new `TokioIoProvider`. This call binds TCP and UDP
    /// sockets in preparation, but does not start the server. This
    /// function requires that the Tokio runtime be active.
    pub async fn bind<T, U>(tcp_addrs: T, udp_addrs: U) -> io::Result<Self>
    where
        T: IntoIterator<Item = SocketAddr>,
        U: IntoIterator<Item = SocketAddr>,
    {
        let mut tcp_listeners = Vec::new();
        for addr in tcp_addrs {
            tcp_listeners.push(TcpListener::bind(addr).await?);
        }

        let mut udp_sockets = Vec::new();
        for addr in udp_addrs {
            udp_sockets.push(UdpSocket::bind(addr).await?);
        }

        Ok(Self {
            tcp_listeners,
            udp_sockets,
        })
    }

    /// Returns the local addresses of the bound TCP listeners.
    pub fn tcp_local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.tcp_listeners.iter().map(TcpListener::local_addr).collect()
    }

    /// Returns the local addresses of the bound UDP sockets.
    pub fn udp_local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.udp_sockets.iter().map(UdpSocket::local_addr).collect()
    }

    /// Starts the server on the active Tokio runtime.
    ///
    /// This spawns tasks on the active Tokio runtime and then returns
    /// a [`TokioShutdownController`] that can be used to shut down the
    /// tasks at a later time. (The [`TokioShutdownController`] must be
    /// held as long as the server should be running, since dropping it
    /// will trigger shutdown.)
    pub fn start(self, server: &Arc<Server>) -> TokioShutdownController {
        let (shutdown_controller, shutdown_handle) = shutdown::channels();

        for tcp_listener in self.tcp_listeners {
            if let Ok(addr) = tcp_listener.local_addr() {
                info!("Serving DNS over TCP on {}", addr);
            }
            tokio::spawn(run_with_respawning(
                run_tcp_listener,
                shutdown_handle.clone(),
                server.clone(),
                Arc::new(tcp_listener),
            ));
        }

        for udp_socket in self.udp_sockets {
            if let Ok(addr) = udp_socket.local_addr() {
                info!("Serving DNS over UDP on {}", addr);
            }
            tokio::spawn(run_with_respawning(
                run_udp_receiver,
                shutdown_handle.clone(),
                server.clone(),
                Arc::new(udp_socket),
            ));
        }

        shutdown_controller
    }
}

/// Runs a Tokio task, respawning it if it returns an I/O error, is
/// cancelled, or panics.
async fn run_with_respawning<F, G, S>(
    f: F,
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    socket: Arc<S>,
) where
    F: Fn(ShutdownHandle, Arc<Server>, Arc<S>) -> G,
    G: Future<Output = io::Result<()>> + Send + 'static,
{
    loop {
        let last_spawn_time = Instant::now();
        match tokio::spawn(f(shutdown.clone(), server.clone(), socket.clone())).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => log_io_error(e),
            Err(_) => (), // The task panicked or was cancelled.
        }

        // If necessary, wait before respawning, but receive shutdown
        // requests immediately.
        let since_last_spawn = last_spawn_time.elapsed();
        if let Some(duration_to_wait) = TASK_RESPAWN_DELAY.checked_sub(since_last_spawn) {
            tokio::select! {
                _ = shutdown.requested() => return,
                _ = tokio::time::sleep(duration_to_wait) => (),
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TCP                                                                //
////////////////////////////////////////////////////////////////////////

/// The TCP listener/accept loop.
async fn run_tcp_listener(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    listener: Arc<TcpListener>,
) -> io::Result<()> {
    loop {
        let (client, client_socket_addr) = tokio::select! {
            _ = shutdown.requested() => return Ok(()),
            res = listener.accept() => res?,
        };
        let shutdown = shutdown.clone();
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) =
                handle_tcp_connection(shutdown, &server, client, client_socket_addr.ip()).await
            {
                log_io_error(e);
            }
        });
    }
}

/// Handles a TCP connection, answering messages until the client
/// closes it, falls silent, or sends something unanswerable.
async fn handle_tcp_connection(
    mut shutdown: ShutdownHandle,
    server: &Server,
    mut socket: TcpStream,
    client_ip: IpAddr,
) -> io::Result<()> {
    let mut received_buf = vec![0; TCP_BUFFER_SIZE];
    let mut response_buf = vec![0; TCP_BUFFER_SIZE];
    let mut n_read = 0;

    loop {
        let received_len = match timeout(
            READ_MESSAGE_TIMEOUT,
            read_message_over_tcp(&mut socket, &mut received_buf, &mut n_read),
        )
        .await
        {
            Ok(Ok(Some(len))) => len,
            Ok(Ok(None)) => return Ok(()), // The connection was closed.
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(()), // Timed out.
        };

        match server.handle_message(
            &received_buf[2..received_len + 2],
            ReceivedInfo::new(client_ip, Transport::Tcp),
            &mut response_buf[2..],
        ) {
            Response::Single(response_len) => {
                response_buf[0..2].copy_from_slice(&(response_len as u16).to_be_bytes());
                socket.write_all(&response_buf[0..2 + response_len]).await?;
            }

            // Response::None means the message was badly malformed, so
            // close the connection.
            Response::None => return Ok(()),
        }

        if shutdown.is_requested() {
            return Ok(());
        }

        // Any leftover data is the start of the next message.
        if n_read > received_len + 2 {
            received_buf.copy_within(received_len + 2..n_read, 0);
            n_read -= received_len + 2;
        } else {
            n_read = 0;
        }
    }
}

/// Reads a single length-prefixed DNS message from a [`TcpStream`].
///
/// `*n_read` octets are assumed to be in the buffer already (clients
/// may pipeline messages), and `*n_read` is updated as more data is
/// read, possibly past the end of the message. The returned length is
/// that of the message itself, without the two-octet prefix. `Ok(None)`
/// means the connection was closed before a whole message arrived.
async fn read_message_over_tcp(
    socket: &mut TcpStream,
    buf: &mut [u8],
    n_read: &mut usize,
) -> io::Result<Option<usize>> {
    loop {
        if *n_read >= 2 {
            let received_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
            if *n_read >= received_len + 2 {
                return Ok(Some(received_len));
            }
        }

        let n_read_this_time = socket.read(&mut buf[*n_read..]).await?;
        if n_read_this_time == 0 {
            return Ok(None);
        }
        *n_read += n_read_this_time;
    }
}

////////////////////////////////////////////////////////////////////////
// UDP                                                                //
////////////////////////////////////////////////////////////////////////

/// The UDP receiver loop.
async fn run_udp_receiver(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    socket: Arc<UdpSocket>,
) -> io::Result<()> {
    loop {
        let mut received_buf = vec![0; UDP_RECEIVE_BUFFER_SIZE];
        let (received_len, src) = tokio::select! {
            _ = shutdown.requested() => return Ok(()),
            res = socket.recv_from(&mut received_buf) => res?,
        };

        // Process the message and send the response (if any) in a new
        // task, which holds up shutdown until it is done.
        let wait_guard = shutdown.wait_guard();
        let server = server.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            let mut response_buf = vec![0; UDP_RESPONSE_LIMIT];
            if let Response::Single(response_len) = server.handle_message(
                &received_buf[..received_len],
                ReceivedInfo::new(src.ip(), Transport::Udp),
                &mut response_buf,
            ) {
                if let Err(e) = socket.send_to(&response_buf[..response_len], src).await {
                    log_io_error(e);
                }
            }
            drop(wait_guard);
        });
    }
}

/// Logs an I/O error.
fn log_io_error(e: io::Error) {
    error!("I/O error: {e}");
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Rcode, Reader};
    use crate::name::Name;
    use crate::rr::build;
    use crate::server::{Answer, NextHandler, Query, Resolver};
    use crate::zone::{ZoneDefaults, ZoneSet};

    struct Refuser;

    impl NextHandler for Refuser {
        fn resolve(&self, _query: &Query) -> Answer {
            Answer::refused()
        }
    }

    fn server() -> Arc<Server> {
        let origin: Name = "if.lastmile.sk.".parse().unwrap();
        let zones = Arc::new(ZoneSet::new(ZoneDefaults::default()));
        zones
            .ensure_zone(&origin, None)
            .insert(Some(build(&origin, "test A 192.168.1.1").unwrap()))
            .unwrap();
        let resolver = Resolver::new(zones, Arc::new(Refuser));
        Arc::new(Server::new(Arc::new(resolver)))
    }

    /// A query for test.if.lastmile.sk. IN A.
    fn query() -> Vec<u8> {
        let mut buf = vec![0x12, 0x34, 0x01, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        let qname: Name = "test.if.lastmile.sk.".parse().unwrap();
        buf.extend_from_slice(qname.wire_repr());
        buf.extend_from_slice(&[0, 1, 0, 1]);
        buf
    }

    fn check_answer(response: &[u8]) {
        let reader = Reader::try_from(response).unwrap();
        assert_eq!(reader.id(), 0x1234);
        assert!(reader.qr());
        assert_eq!(reader.rcode(), Rcode::NoError);
        assert_eq!(reader.ancount(), 1);
    }

    #[tokio::test]
    async fn serves_udp() {
        let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let provider = TokioIoProvider::bind([], [loopback]).await.unwrap();
        let addr = provider.udp_local_addrs().unwrap()[0];
        let controller = provider.start(&server());

        let client = UdpSocket::bind(loopback).await.unwrap();
        client.send_to(&query(), addr).await.unwrap();
        let mut buf = [0; 512];
        let (len, _) = timeout(READ_MESSAGE_TIMEOUT, client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        check_answer(&buf[..len]);

        controller.shut_down().await;
    }

    #[tokio::test]
    async fn serves_pipelined_tcp() {
        let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let provider = TokioIoProvider::bind([loopback], []).await.unwrap();
        let addr = provider.tcp_local_addrs().unwrap()[0];
        let controller = provider.start(&server());

        let mut client = TcpStream::connect(addr).await.unwrap();
        let query = query();
        let mut framed = Vec::new();
        for _ in 0..2 {
            framed.extend_from_slice(&(query.len() as u16).to_be_bytes());
            framed.extend_from_slice(&query);
        }
        client.write_all(&framed).await.unwrap();

        for _ in 0..2 {
            let len = client.read_u16().await.unwrap() as usize;
            let mut buf = vec![0; len];
            client.read_exact(&mut buf).await.unwrap();
            check_answer(&buf);
        }

        drop(client);
        controller.shut_down().await;
    }

    #[tokio::test]
    async fn unanswerable_tcp_messages_close_the_connection() {
        let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let provider = TokioIoProvider::bind([loopback], []).await.unwrap();
        let addr = provider.tcp_local_addrs().unwrap()[0];
        let controller = provider.start(&server());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[0, 3, 1, 2, 3]).await.unwrap();
        let mut buf = [0; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);

        controller.shut_down().await;
    }
}
