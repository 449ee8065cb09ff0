use crate::commands::CommandSet;
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identifier of one (path, commands, configuration) combination.
///
/// 64 lowercase hex characters of SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request.
    ///
    /// Each component is length-prefixed before hashing so that no two
    /// distinct inputs serialize to the same byte stream. Commands are
    /// consumed in name order, which makes the key independent of the
    /// order parameters appeared in the query.
    pub fn build(path: &str, commands: &CommandSet, fingerprint: &str) -> Self {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, normalize_path(path).as_bytes());
        hasher.update((commands.len() as u64).to_le_bytes());
        for (name, value) in commands.iter() {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }
        update_field(&mut hasher, fingerprint.as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Ensure a single leading slash and collapse repeated separators.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmds(pairs: &[(&str, &str)]) -> CommandSet {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("img//a.jpg"), "/img/a.jpg");
        assert_eq!(normalize_path("/img/a.jpg/"), "/img/a.jpg");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn equivalent_paths_share_a_key() {
        let c = cmds(&[("width", "10")]);
        assert_eq!(CacheKey::build("/a//b.png", &c, "f"), CacheKey::build("a/b.png", &c, "f"));
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = CacheKey::build("/a.png", &cmds(&[("width", "10")]), "f");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = CacheKey::build("/a.png", &cmds(&[("w", "1h"), ("x", "2")]), "f");
        let b = CacheKey::build("/a.png", &cmds(&[("w", "1"), ("hx", "2")]), "f");
        assert_ne!(a, b);
    }
}
