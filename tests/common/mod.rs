//! Shared fixtures for the BucketDNS integration tests

#![allow(dead_code)] // Each test binary uses a different subset

use bucketdns::{
    dns::{
        DNSPacket,
        enums::{DNSResourceType, ResponseCode},
    },
    flatten::CnameFlattener,
    metrics::ServerMetrics,
    query::QueryEngine,
    resolver::UdpUpstream,
    zone::{AuthoritativeResponder, ResourceRecord, ZoneStore},
};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

pub const ABC_ZONE: &str = "$TTL    300
$ORIGIN .
abc.com \t86400    IN      SOA     nsa.abc.com. admin.abc.com. ( 2014121700 10800 1200 864000 7200 )
        \tIN      NS      nsa.abc.com.
        \tIN      NS      nsb.abc.com.
        \tIN      MX\t10 mail.abc.com.
$ORIGIN abc.com.
\t\tIN\tA\t127.0.0.1
www\t\tIN\tCNAME\tabc.com.
";

pub const DEF_ZONE: &str = "$TTL    300
$ORIGIN .
def.com \t86400    IN      SOA     nsa.def.com. admin.def.com. ( 2014121700 10800 1200 864000 7200 )
        \tIN      NS      nsa.def.com.
        \tIN      NS      nsb.def.com.
        \tIN      MX\t10 mail.def.com.
$ORIGIN def.com.
\t\tIN\tA\t127.0.0.2
www\t\tIN\tCNAME\tdef.com.
";

pub const FLAT_ZONE: &str = "$TTL    300
$ORIGIN .
flat.com \t86400    IN      SOA     nsa.flat.com. admin.flat.com. ( 2014121700 10800 1200 864000 7200 )
        \tIN      NS      nsa.flat.com.
        \tIN      NS      nsb.flat.com.
        \tIN      MX\t10 mail.flat.com.
$ORIGIN flat.com.
\t\tIN\tCNAME\tdef.com.
www\t\tIN\tCNAME\tflat.com.
";

/// Minimal recursive resolver stand-in: answers A queries from a fixed
/// table and NXDOMAIN for everything else.
pub async fn start_fake_upstream(table: &[(&str, Ipv4Addr)]) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let mut answers: HashMap<String, Vec<Ipv4Addr>> = HashMap::new();
    for (name, ip) in table {
        answers.entry(name.to_string()).or_default().push(*ip);
    }

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(query) = DNSPacket::parse(&buf[..len]) else {
                continue;
            };

            let mut reply = DNSPacket::reply_to(&query);
            reply.header.ra = true;
            let name = query.questions[0].name();
            match answers.get(&name) {
                Some(ips) if query.questions[0].qtype == DNSResourceType::A => {
                    for ip in ips {
                        reply
                            .answers
                            .push(ResourceRecord::a(&name, 60, *ip).to_dns_resource().unwrap());
                    }
                }
                _ => reply.header.rcode = ResponseCode::NXDomain.to_u8(),
            }
            let _ = socket.send_to(&reply.serialize().unwrap(), peer).await;
        }
    });

    addr
}

/// Query engine over `store`, flattening through `upstream`
pub fn engine_with_upstream(store: Arc<ZoneStore>, upstream: SocketAddr) -> Arc<QueryEngine> {
    let upstream = UdpUpstream::new(upstream.to_string()).with_timeout(Duration::from_secs(2));
    Arc::new(QueryEngine::new(
        store,
        CnameFlattener::new(Arc::new(upstream)),
    ))
}

pub fn responder(engine: Arc<QueryEngine>) -> (Arc<AuthoritativeResponder>, Arc<ServerMetrics>) {
    let metrics = Arc::new(ServerMetrics::new().unwrap());
    (
        Arc::new(AuthoritativeResponder::new(engine, metrics.clone())),
        metrics,
    )
}
