use crate::{
    dns::{DNSPacket, MAX_UDP_PAYLOAD},
    metrics::ServerMetrics,
    zone::AuthoritativeResponder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Parse and answer one wire message. `None` means no reply is sent.
async fn handle_dns_query(
    query_data: &[u8],
    peer: SocketAddr,
    responder: &AuthoritativeResponder,
    metrics: &ServerMetrics,
    protocol: &str,
) -> Option<Vec<u8>> {
    let started = Instant::now();

    let query = match DNSPacket::parse(query_data) {
        Ok(query) => query,
        Err(e) => {
            metrics.record_request();
            metrics.record_error();
            debug!("Malformed {} packet from {}: {}", protocol, peer, e);
            return None;
        }
    };

    let response = responder.respond(&query, peer).await?;
    metrics.observe_query_duration(protocol, started.elapsed());

    // TCP frames carry a 16-bit length
    let max_size = if protocol == "udp" {
        MAX_UDP_PAYLOAD
    } else {
        u16::MAX as usize
    };

    match response.serialize() {
        Ok(bytes) if bytes.len() > max_size => {
            debug!(
                "Response too large for {} ({}>{} bytes), sending truncated response",
                protocol,
                bytes.len(),
                max_size
            );
            metrics.record_truncated_response(protocol);
            match response.truncated().serialize() {
                Ok(truncated) => Some(truncated),
                Err(e) => {
                    error!("Failed to serialize truncated response: {}", e);
                    None
                }
            }
        }
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to serialize response for {}: {}", peer, e);
            None
        }
    }
}

/// Serve DNS over UDP on an already bound socket
pub async fn run_udp_server(
    sock: UdpSocket,
    responder: Arc<AuthoritativeResponder>,
    metrics: Arc<ServerMetrics>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sock = Arc::new(sock);
    info!("UDP DNS server listening on {}", sock.local_addr()?);

    let mut buf = vec![0u8; 4096];
    loop {
        let (read_bytes, src_addr) = match sock.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP errors from earlier sends surface here on some platforms
                warn!("UDP receive error: {}", e);
                continue;
            }
        };

        let query_data = buf[..read_bytes].to_vec();
        let sock_clone = sock.clone();
        let responder_clone = responder.clone();
        let metrics_clone = metrics.clone();

        tokio::spawn(async move {
            let Some(response) =
                handle_dns_query(&query_data, src_addr, &responder_clone, &metrics_clone, "udp").await
            else {
                return;
            };

            if let Err(e) = sock_clone.send_to(&response, src_addr).await {
                error!("Failed to send UDP response to {}: {:?}", src_addr, e);
            }
        });
    }
}

/// Serve DNS over TCP on an already bound listener
pub async fn run_tcp_server(
    listener: TcpListener,
    responder: Arc<AuthoritativeResponder>,
    metrics: Arc<ServerMetrics>,
    idle_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("TCP DNS server listening on {}", listener.local_addr()?);

    loop {
        let (stream, src_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept TCP connection: {}", e);
                continue;
            }
        };
        trace!("TCP connection from {}", src_addr);

        let responder_clone = responder.clone();
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_tcp_connection(
                stream,
                src_addr,
                &responder_clone,
                &metrics_clone,
                idle_timeout,
            )
            .await
            {
                debug!("TCP connection from {} ended: {}", src_addr, e);
            }
        });
    }
}

/// Serve length-prefixed messages until the client closes the connection
/// or stays idle for `idle_timeout`.
async fn handle_tcp_connection(
    mut stream: TcpStream,
    src_addr: SocketAddr,
    responder: &AuthoritativeResponder,
    metrics: &ServerMetrics,
    idle_timeout: Duration,
) -> std::io::Result<()> {
    loop {
        let mut length_buf = [0u8; 2];
        match timeout(idle_timeout, stream.read_exact(&mut length_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                trace!("Closing idle TCP connection from {}", src_addr);
                return Ok(());
            }
        }

        let query_length = u16::from_be_bytes(length_buf) as usize;
        let mut query_buf = vec![0u8; query_length];
        timeout(idle_timeout, stream.read_exact(&mut query_buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "partial message"))??;

        let Some(response) = handle_dns_query(&query_buf, src_addr, responder, metrics, "tcp").await
        else {
            continue;
        };

        let Ok(response_length) = u16::try_from(response.len()) else {
            error!("Response to {} does not fit a TCP frame, dropping", src_addr);
            continue;
        };
        stream.write_all(&response_length.to_be_bytes()).await?;
        stream.write_all(&response).await?;
        stream.flush().await?;
    }
}
