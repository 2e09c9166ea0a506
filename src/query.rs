use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::dns::DNSPacket;
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::flatten::CnameFlattener;
use crate::zone::{ResourceRecord, Zone, ZoneStore, fqdn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unsupported query class {0}")]
    UnsupportedClass(DNSResourceClass),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),
}

/// The single question of an incoming query, name normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl Question {
    pub fn new(name: &str, qtype: DNSResourceType, qclass: DNSResourceClass) -> Self {
        Self {
            name: fqdn(name),
            qtype,
            qclass,
        }
    }

    /// Extract the question of a single-question query
    pub fn from_packet(packet: &DNSPacket) -> Result<Self, QueryError> {
        match packet.questions.as_slice() {
            [question] => Ok(Self::new(&question.name(), question.qtype, question.qclass)),
            questions => Err(QueryError::MalformedQuery(format!(
                "expected exactly one question, got {}",
                questions.len()
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    /// Answer records in zone order, flattened records in place of the CNAME
    pub records: Vec<ResourceRecord>,
    /// Whether the zone owns the question name at all
    pub matched: bool,
    /// Positions in `records` synthesized by flattening
    pub flattened: Vec<usize>,
    /// Flattening was attempted and failed
    pub flatten_failed: bool,
}

/// Answers questions against the zone store
pub struct QueryEngine {
    store: Arc<ZoneStore>,
    flattener: CnameFlattener,
}

impl QueryEngine {
    pub fn new(store: Arc<ZoneStore>, flattener: CnameFlattener) -> Self {
        Self { store, flattener }
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    /// Answer `question` from the named zone. An unknown zone yields an
    /// unmatched empty answer.
    pub async fn answer(&self, zone_name: &str, question: &Question) -> Result<Answer, QueryError> {
        check_class(question)?;
        // One snapshot for the whole question
        match self.store.get(zone_name) {
            Some(zone) => Ok(self.answer_from_zone(&zone, question).await),
            None => Ok(Answer::default()),
        }
    }

    /// Answer `question` from the zone whose apex is the longest suffix of
    /// the question name. Returns `None` when no loaded zone governs it.
    pub async fn lookup(&self, question: &Question) -> Result<Option<(Arc<Zone>, Answer)>, QueryError> {
        check_class(question)?;
        let Some(zone) = self.store.find_zone(&question.name) else {
            return Ok(None);
        };
        let answer = self.answer_from_zone(&zone, question).await;
        Ok(Some((zone, answer)))
    }

    async fn answer_from_zone(&self, zone: &Zone, question: &Question) -> Answer {
        let mut answer = Answer::default();

        for record in zone.records_named(&question.name) {
            answer.matched = true;

            if question.qtype == DNSResourceType::A
                && record.rtype() == DNSResourceType::CNAME
                && zone.is_apex(&question.name)
            {
                match self.flattener.flatten(record).await {
                    Ok(flattened) => {
                        let start = answer.records.len();
                        answer.flattened.extend(start..start + flattened.len());
                        answer.records.extend(flattened);
                    }
                    Err(e) => {
                        warn!("Failed to flatten {}: {}", record.name, e);
                        answer.flatten_failed = true;
                    }
                }
            } else if record.rtype() == question.qtype || question.qtype == DNSResourceType::ANY {
                answer.records.push(record.clone());
            }
        }

        debug!(
            "{}[{}] in {}: {} record(s), matched={}",
            question.name,
            question.qtype,
            zone.name(),
            answer.records.len(),
            answer.matched
        );
        answer
    }
}

fn check_class(question: &Question) -> Result<(), QueryError> {
    if question.qclass != DNSResourceClass::IN {
        return Err(QueryError::UnsupportedClass(question.qclass));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::question::DNSQuestion;
    use crate::error::{DnsError, Result as DnsResult};
    use crate::resolver::UpstreamExchange;
    use crate::zone::ZoneLoader;
    use async_trait::async_trait;
    use chrono::Utc;

    struct Unreachable;

    #[async_trait]
    impl UpstreamExchange for Unreachable {
        async fn exchange(&self, _query: &DNSPacket) -> DnsResult<DNSPacket> {
            Err(DnsError::Timeout)
        }
    }

    fn engine(zones: &[(&str, &str)]) -> QueryEngine {
        let loader = ZoneLoader::new();
        let store = Arc::new(ZoneStore::new());
        let batch = loader
            .load_batch(
                zones
                    .iter()
                    .map(|(name, text)| (name.to_string(), bytes::Bytes::from(text.to_string()))),
            )
            .unwrap();
        store.merge(batch, Utc::now());
        QueryEngine::new(store, CnameFlattener::new(Arc::new(Unreachable)))
    }

    #[tokio::test]
    async fn test_type_filter_and_any() {
        let engine = engine(&[(
            "abc.com",
            "@ 300 IN A 127.0.0.1\n@ 300 IN MX 10 mail\n@ 300 IN A 127.0.0.3\n",
        )]);

        let a = engine
            .answer("abc.com.", &Question::new("abc.com", DNSResourceType::A, DNSResourceClass::IN))
            .await
            .unwrap();
        assert_eq!(a.records.len(), 2);
        assert_eq!(a.records[0].rdata.to_string(), "127.0.0.1");
        assert_eq!(a.records[1].rdata.to_string(), "127.0.0.3");

        let any = engine
            .answer("abc.com.", &Question::new("abc.com", DNSResourceType::ANY, DNSResourceClass::IN))
            .await
            .unwrap();
        assert_eq!(any.records.len(), 3);
        assert_eq!(any.records[1].rtype(), DNSResourceType::MX);
    }

    #[tokio::test]
    async fn test_nodata_is_still_matched() {
        let engine = engine(&[("abc.com", "@ 300 IN A 127.0.0.1\n")]);
        let answer = engine
            .answer("abc.com.", &Question::new("abc.com", DNSResourceType::AAAA, DNSResourceClass::IN))
            .await
            .unwrap();
        assert!(answer.records.is_empty());
        assert!(answer.matched);

        let missing = engine
            .answer("abc.com.", &Question::new("nope.abc.com", DNSResourceType::A, DNSResourceClass::IN))
            .await
            .unwrap();
        assert!(!missing.matched);
    }

    #[tokio::test]
    async fn test_non_inet_class_is_rejected() {
        let engine = engine(&[("abc.com", "@ 300 IN A 127.0.0.1\n")]);
        let question = Question::new("abc.com", DNSResourceType::A, DNSResourceClass::CH);
        assert_eq!(
            engine.answer("abc.com.", &question).await,
            Err(QueryError::UnsupportedClass(DNSResourceClass::CH))
        );
        assert!(engine.lookup(&question).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_flattening_adds_nothing() {
        let engine = engine(&[("flat.com", "@ 300 IN CNAME def.com.\n")]);
        let answer = engine
            .answer("flat.com.", &Question::new("flat.com", DNSResourceType::A, DNSResourceClass::IN))
            .await
            .unwrap();
        assert!(answer.records.is_empty());
        assert!(answer.matched);
        assert!(answer.flatten_failed);
    }

    #[tokio::test]
    async fn test_lookup_uses_governing_zone() {
        let engine = engine(&[
            ("abc.com", "@ 300 IN A 127.0.0.1\nwww 300 IN A 127.0.0.5\n"),
            ("def.com", "@ 300 IN A 127.0.0.2\n"),
        ]);

        let question = Question::new("WWW.abc.com", DNSResourceType::A, DNSResourceClass::IN);
        let (zone, answer) = engine.lookup(&question).await.unwrap().unwrap();
        assert_eq!(zone.name(), "abc.com.");
        assert_eq!(answer.records[0].rdata.to_string(), "127.0.0.5");

        let stranger = Question::new("xyz.com", DNSResourceType::A, DNSResourceClass::IN);
        assert!(engine.lookup(&stranger).await.unwrap().is_none());
    }

    #[test]
    fn test_question_count_must_be_one() {
        let mut packet = DNSPacket::default();
        assert!(matches!(
            Question::from_packet(&packet),
            Err(QueryError::MalformedQuery(_))
        ));

        packet.questions.push(DNSQuestion::new("abc.com.", DNSResourceType::A, DNSResourceClass::IN));
        let question = Question::from_packet(&packet).unwrap();
        assert_eq!(question.name, "abc.com.");

        packet.questions.push(DNSQuestion::new("def.com.", DNSResourceType::A, DNSResourceClass::IN));
        assert!(Question::from_packet(&packet).is_err());
    }
}
