use crate::{
    dns::DNSPacket,
    error::{DnsError, Result},
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Default time allowed for one upstream exchange, TCP fallback included
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// One request/response exchange with an upstream resolver.
///
/// The server talks to a single configured resolver; strategies with
/// several resolvers or retries plug in here.
#[async_trait]
pub trait UpstreamExchange: Send + Sync {
    async fn exchange(&self, query: &DNSPacket) -> Result<DNSPacket>;
}

/// Plain DNS over UDP to one `host:port`, retried over TCP when the answer
/// comes back truncated.
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    server: String,
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    async fn resolve_server(&self) -> Result<SocketAddr> {
        lookup_host(self.server.as_str())
            .await?
            .next()
            .ok_or_else(|| DnsError::Io(format!("No address for resolver {}", self.server)))
    }

    async fn exchange_inner(&self, query: &DNSPacket) -> Result<DNSPacket> {
        let upstream_addr = self.resolve_server().await?;
        let query_bytes = query.serialize()?;

        let response = self.send_udp_query(&query_bytes, query.header.id, upstream_addr).await?;
        if response.header.tc {
            debug!("UDP response from {} truncated, retrying with TCP", upstream_addr);
            return self.send_tcp_query(&query_bytes, query.header.id, upstream_addr).await;
        }
        Ok(response)
    }

    async fn send_udp_query(
        &self,
        query_bytes: &[u8],
        id: u16,
        upstream_addr: SocketAddr,
    ) -> Result<DNSPacket> {
        let local = if upstream_addr.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(upstream_addr).await?;
        socket.send(query_bytes).await?;

        let mut response_buf = vec![0u8; 4096];
        loop {
            let response_len = socket.recv(&mut response_buf).await?;
            trace!(
                "Raw UDP response data ({} bytes): {:02x?}",
                response_len,
                &response_buf[..response_len.min(64)]
            );

            let response = match DNSPacket::parse(&response_buf[..response_len]) {
                Ok(response) => response,
                Err(e) => {
                    debug!("Failed to parse UDP response from {}: {}", upstream_addr, e);
                    return Err(DnsError::Parse(e.to_string()));
                }
            };

            // Stray datagrams for other ids are skipped until the timeout fires
            if response.header.id != id {
                debug!(
                    "Ignoring response id {} from {} (expected {})",
                    response.header.id, upstream_addr, id
                );
                continue;
            }
            return Ok(response);
        }
    }

    async fn send_tcp_query(
        &self,
        query_bytes: &[u8],
        id: u16,
        upstream_addr: SocketAddr,
    ) -> Result<DNSPacket> {
        let query_length = u16::try_from(query_bytes.len()).map_err(|_| {
            DnsError::InvalidPacket(format!("query of {} bytes exceeds a TCP frame", query_bytes.len()))
        })?;
        let mut stream = TcpStream::connect(upstream_addr).await?;

        stream.write_all(&query_length.to_be_bytes()).await?;
        stream.write_all(query_bytes).await?;
        stream.flush().await?;

        let mut length_buf = [0u8; 2];
        stream.read_exact(&mut length_buf).await?;
        let response_length = u16::from_be_bytes(length_buf) as usize;

        let mut response_buf = vec![0; response_length];
        stream.read_exact(&mut response_buf).await?;

        let response =
            DNSPacket::parse(&response_buf).map_err(|e| DnsError::Parse(e.to_string()))?;
        if response.header.id != id {
            return Err(DnsError::IdMismatch {
                expected: id,
                got: response.header.id,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl UpstreamExchange for UdpUpstream {
    async fn exchange(&self, query: &DNSPacket) -> Result<DNSPacket> {
        let response = timeout(self.timeout, self.exchange_inner(query))
            .await
            .map_err(|_| DnsError::Timeout)??;

        debug!(
            "Upstream {} answered: rcode={}, answers={}",
            self.server,
            response.header.rcode,
            response.answers.len()
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::DNSResourceType;

    #[tokio::test]
    async fn test_exchange_with_local_responder() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = responder.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = responder.recv_from(&mut buf).await.unwrap();
            let query = DNSPacket::parse(&buf[..len]).unwrap();

            // A reply for someone else first, then the real one
            let mut stray = DNSPacket::reply_to(&query);
            stray.header.id = query.header.id.wrapping_add(1);
            responder
                .send_to(&stray.serialize().unwrap(), peer)
                .await
                .unwrap();

            let reply = DNSPacket::reply_to(&query);
            responder
                .send_to(&reply.serialize().unwrap(), peer)
                .await
                .unwrap();
        });

        let upstream = UdpUpstream::new(addr.to_string());
        let query = DNSPacket::query(4242, "def.com.", DNSResourceType::A, true);
        let response = upstream.exchange(&query).await.unwrap();
        assert_eq!(response.header.id, 4242);
        assert!(response.header.qr);
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = UdpUpstream::new(silent.local_addr().unwrap().to_string())
            .with_timeout(Duration::from_millis(100));

        let query = DNSPacket::query(1, "def.com.", DNSResourceType::A, true);
        assert!(matches!(
            upstream.exchange(&query).await,
            Err(DnsError::Timeout)
        ));
    }
}
