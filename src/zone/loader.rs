use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, warn};

use super::{Result, Zone, ZoneError, ZoneParser, constants, fqdn};
use crate::dns::common::{MAX_LABEL_LENGTH, MAX_NAME_LENGTH};

/// Turns raw zone objects into `Zone` values.
///
/// Batch policy: the first zone that fails to parse aborts the whole batch
/// and nothing from the batch is returned. A partially parsed zone is never
/// produced.
#[derive(Debug, Clone)]
pub struct ZoneLoader {
    max_zone_size: usize,
}

impl ZoneLoader {
    pub fn new() -> Self {
        Self {
            max_zone_size: constants::MAX_ZONE_FILE_SIZE,
        }
    }

    pub fn with_max_zone_size(max_zone_size: usize) -> Self {
        Self { max_zone_size }
    }

    /// Parse one zone's text with the zone name as initial origin
    pub fn load(&self, zone_name: &str, raw: &[u8]) -> Result<Zone> {
        let origin = fqdn(zone_name);
        if !is_valid_zone_name(&origin) {
            return Err(ZoneError::InvalidDomainName(zone_name.to_string()));
        }
        if raw.len() > self.max_zone_size {
            return Err(ZoneError::TooLarge {
                zone: origin,
                size: raw.len(),
            });
        }

        let text = std::str::from_utf8(raw).map_err(|_| ZoneError::InvalidEncoding {
            zone: origin.clone(),
        })?;

        debug!("Parsing zone {}", origin);
        let records = ZoneParser::new(&origin).parse(text)?;
        if records.is_empty() {
            warn!("Zone {} has no records", origin);
        }

        Ok(Zone::new(&origin, records))
    }

    /// Parse a batch of `(zone name, raw text)` pairs, all or nothing
    pub fn load_batch<I>(&self, objects: I) -> Result<HashMap<String, Zone>>
    where
        I: IntoIterator<Item = (String, Bytes)>,
    {
        let mut zones = HashMap::new();
        for (name, raw) in objects {
            let zone = self.load(&name, &raw)?;
            zones.insert(zone.name().to_string(), zone);
        }
        Ok(zones)
    }
}

/// Hostname-style labels (letters, digits, `-`, `_`) within wire limits
fn is_valid_zone_name(name: &str) -> bool {
    if name == "." {
        return true;
    }
    name.len() <= MAX_NAME_LENGTH
        && name.trim_end_matches('.').split('.').all(|label| {
            !label.is_empty()
                && label.len() <= MAX_LABEL_LENGTH
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

impl Default for ZoneLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_uses_zone_name_as_origin() {
        let zone = ZoneLoader::new()
            .load("abc.com", b"@ 300 IN A 127.0.0.1\nwww IN CNAME @\n")
            .unwrap();
        assert_eq!(zone.name(), "abc.com.");
        assert_eq!(zone.len(), 2);
        assert_eq!(zone.records()[1].name, "www.abc.com.");
    }

    #[test]
    fn test_oversized_and_binary_zones_are_rejected() {
        let loader = ZoneLoader::with_max_zone_size(8);
        assert!(matches!(
            loader.load("abc.com", b"@ 300 IN A 127.0.0.1\n"),
            Err(ZoneError::TooLarge { .. })
        ));
        assert!(matches!(
            ZoneLoader::new().load("abc.com", &[0xff, 0xfe, 0x00]),
            Err(ZoneError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_zone_names_must_be_domain_names() {
        let loader = ZoneLoader::new();
        let long_label = format!("{}.com", "x".repeat(64));
        for bad in ["archive/old.com", "a..com", "spaced name.com", long_label.as_str()] {
            assert!(
                matches!(
                    loader.load(bad, b"@ IN A 127.0.0.1\n"),
                    Err(ZoneError::InvalidDomainName(_))
                ),
                "{} accepted",
                bad
            );
        }
        assert!(loader.load("_dmarc.abc-1.com.", b"@ IN TXT \"v=DMARC1\"\n").is_ok());
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let loader = ZoneLoader::new();
        let batch = vec![
            ("abc.com".to_string(), Bytes::from_static(b"@ IN A 127.0.0.1\n")),
            ("bad.com".to_string(), Bytes::from_static(b"@ IN A 999.0.0.1\n")),
        ];
        let err = loader.load_batch(batch).unwrap_err();
        assert!(matches!(err, ZoneError::Syntax { ref zone, .. } if zone == "bad.com."));

        let good = vec![
            ("abc.com".to_string(), Bytes::from_static(b"@ IN A 127.0.0.1\n")),
            ("def.com".to_string(), Bytes::from_static(b"@ IN A 127.0.0.2\n")),
        ];
        let zones = loader.load_batch(good).unwrap();
        assert_eq!(zones.len(), 2);
        assert!(zones.contains_key("abc.com."));
        assert!(zones.contains_key("def.com."));
    }
}
