//! Operator end of the command channel.
//!
//! Commands go out as single JSON datagrams. Responses come back on a
//! separate port and are read by a background task that hands them to the
//! consumer through a bounded channel.

use hexapod_shared::protocol::{Command, MAX_DATAGRAM, Response};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sends commands to a bridge.
#[derive(Debug)]
pub struct CommandClient {
    socket: UdpSocket,
    bridge: SocketAddr,
}

impl CommandClient {
    pub async fn connect(bridge: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = match bridge {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self { socket, bridge })
    }

    pub fn bridge(&self) -> SocketAddr {
        self.bridge
    }

    pub async fn send(&self, command: &Command) -> io::Result<()> {
        let bytes = command.encode();
        self.socket.send_to(&bytes, self.bridge).await?;
        tracing::debug!("Sent {} to {}", String::from_utf8_lossy(&bytes), self.bridge);
        Ok(())
    }
}

/// Receives responses on a background task.
///
/// The task stops when the poller is dropped.
#[derive(Debug)]
pub struct ResponsePoller {
    responses: mpsc::Receiver<Response>,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ResponsePoller {
    /// Bind the response socket and start reading. At most `capacity`
    /// responses are buffered before the reader waits for the consumer.
    pub async fn bind(addr: SocketAddr, capacity: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let (tx, responses) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(read_responses(socket, tx));
        tracing::info!("Listening for responses on {}", local_addr);
        Ok(Self {
            responses,
            local_addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn recv(&mut self) -> Option<Response> {
        self.responses.recv().await
    }

    /// Like [`ResponsePoller::recv`], giving up after `wait`.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<Response> {
        tokio::time::timeout(wait, self.responses.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for ResponsePoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_responses(socket: UdpSocket, tx: mpsc::Sender<Response>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!("Response receive failed: {}", e);
                continue;
            }
        };
        match Response::decode(&buf[..len]) {
            Ok(response) => {
                if tx.send(response).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Ignoring undecodable response from {}: {}", from, e),
        }
    }
}
