use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, error};

/// Where and how outgoing datagrams leave this host.
#[derive(Debug, Clone)]
pub struct MulticastConfig {
    /// the multicast group and port that receivers listen on
    pub destination: SocketAddrV4,

    /// name of the egress network interface, or `None` to let the routing table decide
    pub interface: Option<String>,

    /// IP TTL of outgoing multicast datagrams, 1..=255. The default of 1 keeps
    ///  traffic on the local segment.
    pub ttl: u32,
}

/// This is an abstraction for sending a batch of framed packets, introduced to
///  facilitate mocking the I/O part away for testing.
///
/// NB: Implementations send the packets in the given order - receivers do not
///      reorder fragments.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PacketSink: Send + Sync + 'static {
    /// Sends each packet as one discrete datagram. Delivery is best-effort: a
    ///  failed send is logged and does not abort the remaining packets.
    async fn send_packets(&self, packets: Vec<Bytes>);
}


pub struct MulticastSender {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl MulticastSender {
    pub fn open(config: &MulticastConfig) -> anyhow::Result<MulticastSender> {
        if config.ttl == 0 || config.ttl > 255 {
            bail!("multicast TTL must be in 1..=255, got {}", config.ttl);
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.destination.port()).into())?;

        if let Some(interface) = &config.interface {
            socket.bind_device(Some(interface.as_bytes()))?;
        }

        socket.set_multicast_ttl_v4(config.ttl)?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        debug!("sending datagrams to {} via {:?}, ttl {}", config.destination, config.interface, config.ttl);

        Ok(MulticastSender {
            socket,
            destination: SocketAddr::V4(config.destination),
        })
    }
}

#[async_trait]
impl PacketSink for MulticastSender {
    async fn send_packets(&self, packets: Vec<Bytes>) {
        for (i, packet) in packets.iter().enumerate() {
            match self.socket.send_to(packet, self.destination).await {
                Ok(_) => {
                    debug!("sent packet {} - {} bytes", i, packet.len());
                }
                Err(e) => {
                    // best-effort link: skip this datagram, keep going with the rest
                    error!("error sending packet {} to {}: {}", i, self.destination, e);
                }
            }
        }
    }
}
