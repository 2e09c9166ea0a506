//! Apex CNAME flattening.
//!
//! A zone apex cannot carry a CNAME next to its other records, so an A query
//! for an apex CNAME is answered with the target's addresses, looked up once
//! upstream and re-owned by the apex.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::dns::enums::{DNSResourceClass, DNSResourceType, ResponseCode};
use crate::dns::DNSPacket;
use crate::error::DnsError;
use crate::resolver::UpstreamExchange;
use crate::zone::ResourceRecord;

/// TTL of synthesized address records
pub const FLATTENED_TTL: u32 = 300;

#[derive(Error, Debug, Clone)]
pub enum FlattenError {
    #[error("Upstream exchange failed: {0}")]
    Upstream(#[from] DnsError),

    #[error("Upstream answered with rcode {0}")]
    Rcode(u8),

    #[error("Upstream returned no address records for {0}")]
    NoAnswers(String),

    #[error("Record {0} is not a CNAME")]
    NotCname(String),
}

pub struct CnameFlattener {
    upstream: Arc<dyn UpstreamExchange>,
}

impl CnameFlattener {
    pub fn new(upstream: Arc<dyn UpstreamExchange>) -> Self {
        Self { upstream }
    }

    /// Resolve `cname`'s target to A records owned by `cname`'s own name.
    ///
    /// One query, recursion desired, no retry. Only the addresses of the
    /// upstream answers are kept.
    pub async fn flatten(&self, cname: &ResourceRecord) -> Result<Vec<ResourceRecord>, FlattenError> {
        let target = cname
            .cname_target()
            .ok_or_else(|| FlattenError::NotCname(cname.name.clone()))?;

        let query = DNSPacket::query(rand::random::<u16>(), target, DNSResourceType::A, true);
        let response = self.upstream.exchange(&query).await?;

        if response.header.rcode != ResponseCode::NoError.to_u8() {
            return Err(FlattenError::Rcode(response.header.rcode));
        }

        let records: Vec<ResourceRecord> = response
            .answers
            .iter()
            .filter(|answer| answer.rclass == DNSResourceClass::IN)
            .filter_map(|answer| answer.ipv4())
            .map(|addr| ResourceRecord::a(&cname.name, FLATTENED_TTL, addr))
            .collect();

        if records.is_empty() {
            return Err(FlattenError::NoAnswers(target.to_string()));
        }

        debug!(
            "Flattened {} -> {} into {} address(es)",
            cname.name,
            target,
            records.len()
        );
        Ok(records)
    }
}
