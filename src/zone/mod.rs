pub mod authoritative;
pub mod errors;
pub mod loader;
pub mod parser;
pub mod record;
pub mod store;
#[allow(clippy::module_inception)]
pub mod zone;

pub use authoritative::AuthoritativeResponder;
pub use errors::{Result, ZoneError};
pub use loader::ZoneLoader;
pub use parser::ZoneParser;
pub use record::{RData, ResourceRecord, Soa};
pub use store::{StoreSnapshot, ZoneStore};
pub use zone::Zone;

/// Zone constants
pub mod constants {
    /// Default TTL if neither `$TTL` nor an earlier record set one (1 hour)
    pub const DEFAULT_TTL: u32 = 3600;

    /// Maximum zone object size (10MB)
    pub const MAX_ZONE_FILE_SIZE: usize = 10 * 1024 * 1024;
}

/// Lowercase a name and make sure it ends with a dot. Empty input is the root.
pub fn fqdn(name: &str) -> String {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() || name == "." {
        return ".".to_string();
    }
    if name.ends_with('.') {
        name
    } else {
        format!("{}.", name)
    }
}
