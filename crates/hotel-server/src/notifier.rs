//! UDP multicast notifications for ranking changes.

use std::net::{Ipv4Addr, SocketAddr};

use hotel_ranking::TopChange;
use tokio::net::UdpSocket;

use crate::config::MulticastSection;

pub struct Notifier {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Notifier {
    /// Socket for sending to the configured multicast group, loopback enabled.
    pub async fn bind(cfg: &MulticastSection) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(cfg.ttl)?;
        socket.set_multicast_loop_v4(true)?;
        Ok(Self {
            socket,
            target: SocketAddr::from((cfg.group, cfg.port)),
        })
    }

    /// Send to an arbitrary address instead of a group.
    pub async fn unicast(target: SocketAddr) -> std::io::Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Ok(Self {
            socket: UdpSocket::bind(local).await?,
            target,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn message(city: &str, hotel_name: &str) -> String {
        format!("New best Hotel for {city}: '{hotel_name}'.")
    }

    /// One datagram per changed city. Returns how many were sent.
    pub async fn announce(&self, changes: &[TopChange]) -> usize {
        let mut sent = 0;
        for change in changes {
            let text = Self::message(&change.city, &change.hotel_name);
            match self.socket.send_to(text.as_bytes(), self.target).await {
                Ok(_) => {
                    tracing::info!(city = %change.city, hotel = %change.hotel_name, "new best hotel announced");
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(city = %change.city, group = %self.target, "notification failed: {e}");
                }
            }
        }
        sent
    }
}
