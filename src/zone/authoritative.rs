//! Authoritative DNS response generation
//!
//! Turns a decoded query into the reply the server sends, or into nothing
//! when the query has to be dropped.

use super::{RData, ResourceRecord, Zone};
use crate::dns::{
    DNSPacket,
    enums::{DNSResourceClass, DNSResourceType, ResponseCode},
    resource::DNSResource,
};
use crate::metrics::ServerMetrics;
use crate::query::{Answer, QueryEngine, Question};
use crate::{PRODUCT, VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Authoritative DNS responder
pub struct AuthoritativeResponder {
    engine: Arc<QueryEngine>,
    metrics: Arc<ServerMetrics>,
}

impl AuthoritativeResponder {
    pub fn new(engine: Arc<QueryEngine>, metrics: Arc<ServerMetrics>) -> Self {
        Self { engine, metrics }
    }

    /// Build the reply for `query`, or `None` if it is dropped.
    ///
    /// - zone found, name present: NOERROR, possibly without answers
    /// - zone found, name absent: NXDOMAIN
    /// - no zone: empty, non-authoritative NOERROR
    /// - `.` TXT: version probe
    pub async fn respond(&self, query: &DNSPacket, peer: SocketAddr) -> Option<DNSPacket> {
        self.metrics.record_request();

        // We only handle standard queries
        if query.header.qr || query.header.opcode != 0 {
            self.metrics.record_error();
            debug!("Dropping non-query message from {}", peer);
            return None;
        }

        let question = match Question::from_packet(query) {
            Ok(question) => question,
            Err(e) => {
                self.metrics.record_error();
                warn!("Dropping query from {}: {}", peer, e);
                return None;
            }
        };

        if question.name == "." && question.qtype == DNSResourceType::TXT {
            return version_response(query);
        }

        let (zone, answer) = match self.engine.lookup(&question).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!("Query [{}] {}[{}] -> no zone", peer, question.name, question.qtype);
                return Some(DNSPacket::reply_to(query));
            }
            Err(e) => {
                self.metrics.record_error();
                warn!("Skipping query from {}: {}", peer, e);
                return None;
            }
        };

        if !answer.flattened.is_empty() {
            self.metrics.record_flatten(true);
        } else if answer.flatten_failed {
            self.metrics.record_flatten(false);
        }

        debug!(
            "Query [{}] {}[{}] -> {}",
            peer,
            question.name,
            question.qtype,
            describe_answers(&answer)
        );

        let response = build_zone_response(query, &zone, &answer);
        self.metrics.record_answer();
        Some(response)
    }
}

fn build_zone_response(query: &DNSPacket, zone: &Zone, answer: &Answer) -> DNSPacket {
    let mut response = DNSPacket::reply_to(query);
    response.header.aa = true;

    response.answers = to_wire(&answer.records);
    if !answer.matched {
        response.header.rcode = ResponseCode::NXDomain.to_u8();
    }

    // Negative answers carry the zone SOA in the authority section
    if answer.records.is_empty() {
        let soa: Vec<ResourceRecord> = zone
            .records_named(zone.name())
            .filter(|r| matches!(r.rdata, RData::SOA(_)))
            .take(1)
            .cloned()
            .collect();
        response.authorities = to_wire(&soa);
    }

    response
}

fn to_wire(records: &[ResourceRecord]) -> Vec<DNSResource> {
    records
        .iter()
        .filter_map(|record| match record.to_dns_resource() {
            Ok(resource) => Some(resource),
            Err(e) => {
                error!("Cannot encode {}: {}", record, e);
                None
            }
        })
        .collect()
}

fn describe_answers(answer: &Answer) -> String {
    answer
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            if answer.flattened.contains(&i) {
                format!("(FLAT){}", record)
            } else {
                record.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Reply to `. TXT` with the running version and the product name
fn version_response(query: &DNSPacket) -> Option<DNSPacket> {
    let txt = |text: String| {
        ResourceRecord::new(".", DNSResourceClass::IN, 0, RData::TXT(vec![text])).to_dns_resource()
    };

    let mut response = DNSPacket::reply_to(query);
    response.header.aa = true;
    match (txt(format!("v{}", VERSION)), txt(PRODUCT.to_string())) {
        (Ok(version), Ok(product)) => {
            response.answers.push(version);
            response.resources.push(product);
            Some(response)
        }
        (Err(e), _) | (_, Err(e)) => {
            error!("Cannot encode version probe reply: {}", e);
            None
        }
    }
}
