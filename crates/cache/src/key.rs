use std::fmt;
use std::path::Path;

/// Cache key for a destination path: the configured prefix followed by the
/// path with forward slashes.
///
/// ```
/// use kiln_cache::CacheKey;
/// use std::path::Path;
///
/// let key = CacheKey::new("assets.", Path::new("/web/compiled/app.css"));
/// assert_eq!(key.as_str(), "assets./web/compiled/app.css");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(prefix: &str, path: &Path) -> Self {
        let path = path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>();
        let mut key = String::from(prefix);
        for (i, component) in path.iter().enumerate() {
            if i > 0 && !key.ends_with('/') {
                key.push('/');
            }
            key.push_str(component);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
