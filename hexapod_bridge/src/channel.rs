//! Bridge end of the command channel.
//!
//! Commands arrive as UDP datagrams on the command port. Responses are sent
//! from a second socket to the sender's address at the response port, so
//! the operator can listen for them independently of sending.

use hexapod_shared::protocol::{MAX_DATAGRAM, Response};
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

pub struct BridgeChannel {
    commands: UdpSocket,
    responses: UdpSocket,
    response_port: u16,
}

impl BridgeChannel {
    pub async fn bind(listen: SocketAddr, response_port: u16) -> io::Result<Self> {
        let commands = UdpSocket::bind(listen).await?;
        let unspecified: SocketAddr = match listen {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };
        let responses = UdpSocket::bind(unspecified).await?;
        tracing::info!(
            "Listening for commands on {} (responses to port {})",
            commands.local_addr()?,
            response_port
        );
        Ok(Self {
            commands,
            responses,
            response_port,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.commands.local_addr()
    }

    /// Wait for the next command datagram.
    pub async fn recv(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, from) = self.commands.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }

    /// Send `response` to whoever sent `to_sender`'s command.
    pub async fn respond(&self, to_sender: SocketAddr, response: &Response) -> io::Result<()> {
        let bytes = response.encode().map_err(io::Error::other)?;
        let target = SocketAddr::new(to_sender.ip(), self.response_port);
        self.responses.send_to(&bytes, target).await?;
        tracing::debug!("Response sent to {} ({} bytes)", target, bytes.len());
        Ok(())
    }
}
