use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::{Result, SourceError, ZoneObject, ZoneSource, is_direct_child};

/// In-process zone catalog.
///
/// Used by tests and by embedders that generate zones themselves. It can be
/// switched unavailable to exercise failure handling, and it records which
/// keys were fetched.
#[derive(Default)]
pub struct MemorySource {
    objects: RwLock<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    unavailable: AtomicBool,
    fetched: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an object
    pub fn put(&self, key: &str, content: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        self.objects
            .write()
            .insert(key.to_string(), (content.into(), last_modified));
    }

    pub fn remove(&self, key: &str) {
        self.objects.write().remove(key);
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Keys fetched so far, in fetch order
    pub fn fetched_keys(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    pub fn clear_fetched(&self) {
        self.fetched.lock().clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(SourceError::SourceUnavailable(
                "memory source switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ZoneSource for MemorySource {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ZoneObject>> {
        self.check_available()?;
        let objects: Vec<ZoneObject> = self
            .objects
            .read()
            .iter()
            .filter(|(key, _)| is_direct_child(key, prefix))
            .map(|(key, (_, modified))| ZoneObject::new(key.clone(), *modified))
            .collect();

        if objects.is_empty() {
            return Err(SourceError::EmptyCatalog(prefix.to_string()));
        }
        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.check_available()?;
        let content = self
            .objects
            .read()
            .get(key)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| SourceError::ObjectNotFound(key.to_string()))?;
        trace!("Memory source served {} ({} bytes)", key, content.len());
        self.fetched.lock().push(key.to_string());
        Ok(content)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_and_fetching() {
        let source = MemorySource::new();
        let now = Utc::now();
        source.put("zones/abc.com", "@ IN A 127.0.0.1\n", now);
        source.put("other/def.com", "@ IN A 127.0.0.2\n", now);
        source.put("zones/archive/old.com", "@ IN A 127.0.0.9\n", now);

        let listed = source.list_objects("zones/").await.unwrap();
        assert_eq!(listed, vec![ZoneObject::new("zones/abc.com", now)]);

        let content = source.get_object("zones/abc.com").await.unwrap();
        assert_eq!(&content[..], b"@ IN A 127.0.0.1\n");
        assert_eq!(source.fetched_keys(), vec!["zones/abc.com"]);
    }

    #[tokio::test]
    async fn test_errors() {
        let source = MemorySource::new();
        assert_eq!(
            source.list_objects("").await,
            Err(SourceError::EmptyCatalog(String::new()))
        );
        assert!(matches!(
            source.get_object("missing").await,
            Err(SourceError::ObjectNotFound(_))
        ));

        source.put("abc.com", "", Utc::now());
        source.set_available(false);
        assert!(matches!(
            source.list_objects("").await,
            Err(SourceError::SourceUnavailable(_))
        ));
        source.set_available(true);
        assert_eq!(source.list_objects("").await.unwrap().len(), 1);
    }
}
