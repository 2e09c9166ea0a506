use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, trace};

use super::{Result, SourceError, ZoneObject, ZoneSource, is_direct_child};

/// Zone objects read from a local directory tree. Keys are paths relative
/// to the root using `/` separators; last-modified is the file mtime.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        // Keys may not climb out of the root
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(SourceError::ObjectNotFound(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> SourceError {
    SourceError::SourceUnavailable(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl ZoneSource for DirectorySource {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ZoneObject>> {
        let mut objects = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| unavailable(&dir, e))?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| unavailable(&dir, e))? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    debug!("Skipping non UTF-8 entry in {}", dir.display());
                    continue;
                };
                let key = format!("{}{}", key_prefix, name);
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| unavailable(&entry.path(), e))?;

                if metadata.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else if metadata.is_file() && is_direct_child(&key, prefix) {
                    let modified = metadata
                        .modified()
                        .map_err(|e| unavailable(&entry.path(), e))?;
                    objects.push(ZoneObject::new(key, DateTime::<Utc>::from(modified)));
                }
            }
        }

        if objects.is_empty() {
            return Err(SourceError::EmptyCatalog(prefix.to_string()));
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        trace!("Listed {} objects under {}", objects.len(), self.root.display());
        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SourceError::ObjectNotFound(key.to_string()))
            }
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_only_direct_children_of_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("zones/archive")).unwrap();
        std::fs::write(dir.path().join("zones/abc.com"), "@ IN A 127.0.0.1\n").unwrap();
        std::fs::write(dir.path().join("zones/archive/old.com"), "@ IN A 127.0.0.9\n").unwrap();
        std::fs::write(dir.path().join("abc.com"), "@ IN A 127.0.0.2\n").unwrap();

        let source = DirectorySource::new(dir.path());
        let listed = source.list_objects("zones/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "zones/abc.com");

        let top: Vec<String> = source
            .list_objects("")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(top, vec!["abc.com"]);

        let content = source.get_object("zones/abc.com").await.unwrap();
        assert_eq!(&content[..], b"@ IN A 127.0.0.1\n");
    }

    #[tokio::test]
    async fn test_missing_and_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path());

        assert!(matches!(
            source.list_objects("").await,
            Err(SourceError::EmptyCatalog(_))
        ));
        assert!(matches!(
            source.get_object("nope.com").await,
            Err(SourceError::ObjectNotFound(_))
        ));
        assert!(matches!(
            source.get_object("../etc/passwd").await,
            Err(SourceError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let source = DirectorySource::new("/nonexistent/bucketdns/zones");
        assert!(matches!(
            source.list_objects("").await,
            Err(SourceError::SourceUnavailable(_))
        ));
    }
}
