use std::fmt;
use std::path::{Path, PathBuf};

/// Filesystem-safe directory name for one cluster host.
///
/// Collisions are possible (`a:1` and `a_1` share a key) but harmless: the
/// worst case is a stale discovery answer until the cache TTL runs out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryCacheKey(String);

impl DiscoveryCacheKey {
    pub fn from_host(host: &str) -> Self {
        let schemeless = host.replacen("https://", "", 1).replacen("http://", "", 1);
        let safe = schemeless
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '/' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self(safe)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn dir_under(&self, parent: &Path) -> PathBuf {
        parent.join(&self.0)
    }
}

impl fmt::Display for DiscoveryCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
