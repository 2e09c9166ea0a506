use super::{ResourceRecord, fqdn};
use crate::dns::enums::DNSResourceType;

/// A named zone and its records, in source-file order.
///
/// Every reload builds fresh `Zone` values; a zone is never edited in place
/// once it has been published to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    name: String,
    records: Vec<ResourceRecord>,
}

impl Zone {
    pub fn new(name: &str, records: Vec<ResourceRecord>) -> Self {
        Self {
            name: fqdn(name),
            records,
        }
    }

    /// Zone apex, lowercase with trailing dot
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_apex(&self, name: &str) -> bool {
        self.name == name
    }

    /// Records owned by `name`, in stored order
    pub fn records_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ResourceRecord> {
        self.records.iter().filter(move |r| r.name == name)
    }

    /// Whether any record in the zone is owned by `name`
    pub fn contains_name(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name)
    }

    /// Whether `name` is the apex or below it
    pub fn is_authoritative_for(&self, name: &str) -> bool {
        if self.name == "." {
            return true;
        }
        name == self.name || name.ends_with(&format!(".{}", self.name))
    }

    pub fn count_of(&self, rtype: DNSResourceType) -> usize {
        self.records.iter().filter(|r| r.rtype() == rtype).count()
    }
}
