use super::{Zone, fqdn};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One generation of the zone set. Readers hold an `Arc` to a snapshot for
/// the duration of a query, so they see either the old or the new version
/// of every zone, never a mix.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Zones indexed by apex (lowercase, trailing dot)
    zones: HashMap<String, Arc<Zone>>,
    /// When the generation was published
    synced_at: DateTime<Utc>,
}

impl StoreSnapshot {
    fn empty() -> Self {
        Self {
            zones: HashMap::new(),
            synced_at: DateTime::UNIX_EPOCH,
        }
    }

    pub fn get(&self, zone_name: &str) -> Option<&Arc<Zone>> {
        self.zones.get(&fqdn(zone_name))
    }

    /// The zone governing `name`: the registered apex that is the longest
    /// suffix of `name`.
    pub fn find_zone(&self, name: &str) -> Option<&Arc<Zone>> {
        let name = fqdn(name);
        let mut candidate = name.as_str();
        loop {
            if let Some(zone) = self.zones.get(candidate) {
                return Some(zone);
            }
            match candidate.split_once('.') {
                Some((_, "")) | None => break,
                Some((_, rest)) => candidate = rest,
            }
        }
        self.zones.get(".")
    }

    pub fn synced_at(&self) -> DateTime<Utc> {
        self.synced_at
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zone_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.zones.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Store holding the active zone set.
///
/// Copy-on-write: `merge` builds a new snapshot and swaps it in atomically,
/// so readers never take a lock and never block the reload task.
pub struct ZoneStore {
    current: ArcSwap<StoreSnapshot>,
}

impl ZoneStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(StoreSnapshot::empty()),
        }
    }

    /// The current generation
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.current.load_full()
    }

    /// Get a zone by apex name
    pub fn get(&self, zone_name: &str) -> Option<Arc<Zone>> {
        self.current.load().get(zone_name).cloned()
    }

    /// Find the zone that is authoritative for a given name
    pub fn find_zone(&self, name: &str) -> Option<Arc<Zone>> {
        self.current.load().find_zone(name).cloned()
    }

    /// Install every given zone under its name, replacing same-named zones.
    /// Zones not in `zones` are carried over untouched. Returns the number
    /// of zones installed.
    pub fn merge(&self, zones: HashMap<String, Zone>, synced_at: DateTime<Utc>) -> usize {
        let incoming: Vec<(String, Arc<Zone>)> = zones
            .into_iter()
            .map(|(name, zone)| (fqdn(&name), Arc::new(zone)))
            .collect();

        self.current.rcu(|current| {
            let mut next = StoreSnapshot::clone(current);
            for (name, zone) in &incoming {
                next.zones.insert(name.clone(), Arc::clone(zone));
            }
            next.synced_at = synced_at;
            next
        });

        for (name, zone) in &incoming {
            debug!("Installed zone {} ({} records)", name, zone.len());
        }
        info!(
            "Published {} zone(s), {} active",
            incoming.len(),
            self.zone_count()
        );
        incoming.len()
    }

    /// Publication time of the current generation
    pub fn snapshot_time(&self) -> DateTime<Utc> {
        self.current.load().synced_at
    }

    /// Get all zone names
    pub fn list_zones(&self) -> Vec<String> {
        self.current.load().zone_names()
    }

    /// Get zone count
    pub fn zone_count(&self) -> usize {
        self.current.load().len()
    }
}

impl Default for ZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ResourceRecord;
    use chrono::TimeZone;
    use std::net::Ipv4Addr;

    fn zone(name: &str, last_octet: u8) -> Zone {
        Zone::new(
            name,
            vec![ResourceRecord::a(
                name,
                300,
                Ipv4Addr::new(127, 0, 0, last_octet),
            )],
        )
    }

    fn batch(zones: Vec<Zone>) -> HashMap<String, Zone> {
        zones
            .into_iter()
            .map(|z| (z.name().to_string(), z))
            .collect()
    }

    #[test]
    fn test_merge_is_partial() {
        let store = ZoneStore::new();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        store.merge(batch(vec![zone("abc.com", 1), zone("def.com", 2)]), t1);
        let before = store.get("abc.com").unwrap();

        store.merge(batch(vec![zone("def.com", 3)]), t2);

        // Untouched zone is the very same allocation
        let after = store.get("abc.com").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(
            store.get("def.com.").unwrap().records()[0].rdata.to_string(),
            "127.0.0.3"
        );
        assert_eq!(store.zone_count(), 2);
        assert_eq!(store.snapshot_time(), t2);
    }

    #[test]
    fn test_old_snapshot_is_unaffected_by_merge() {
        let store = ZoneStore::new();
        store.merge(batch(vec![zone("abc.com", 1)]), Utc::now());

        let held = store.snapshot();
        store.merge(batch(vec![zone("abc.com", 9)]), Utc::now());

        assert_eq!(
            held.get("abc.com").unwrap().records()[0].rdata.to_string(),
            "127.0.0.1"
        );
        assert_eq!(
            store.get("abc.com").unwrap().records()[0].rdata.to_string(),
            "127.0.0.9"
        );
    }

    #[test]
    fn test_find_zone_prefers_longest_suffix() {
        let store = ZoneStore::new();
        store.merge(
            batch(vec![zone("example.com", 1), zone("sub.example.com", 2)]),
            Utc::now(),
        );

        assert_eq!(
            store.find_zone("www.sub.example.com.").unwrap().name(),
            "sub.example.com."
        );
        assert_eq!(
            store.find_zone("WWW.Example.com").unwrap().name(),
            "example.com."
        );
        assert!(store.find_zone("example.org.").is_none());
        assert!(store.find_zone("com.").is_none());
    }

    #[test]
    fn test_new_store_is_empty_at_epoch() {
        let store = ZoneStore::default();
        assert_eq!(store.zone_count(), 0);
        assert_eq!(store.snapshot_time(), DateTime::UNIX_EPOCH);
        assert!(store.list_zones().is_empty());
    }
}
