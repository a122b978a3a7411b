//! BLAKE3 naming of journal files, one per template instance.

use std::path::{Path, PathBuf};

/// Hex digest of the template description followed by the endpoint URL.
pub fn journal_name(description: &str, endpoint: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(description.as_bytes());
    hasher.update(endpoint.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Journal location under `cache_dir`.
pub fn journal_path(cache_dir: &Path, description: &str, endpoint: &str) -> PathBuf {
    cache_dir.join(journal_name(description, endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_name_is_stable_hex() {
        let a = journal_name("demo cluster", "http://10.0.0.1:8056/v1");
        let b = journal_name("demo cluster", "http://10.0.0.1:8056/v1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hasher_matches_concatenation() {
        let direct = blake3::hash(b"descurl").to_hex().to_string();
        assert_eq!(journal_name("desc", "url"), direct);
    }

    #[test]
    fn test_hasher_differs_by_endpoint() {
        assert_ne!(journal_name("d", "http://a"), journal_name("d", "http://b"));
    }

    #[test]
    fn test_hasher_path_under_cache_dir() {
        let p = journal_path(Path::new("formation_cache"), "d", "u");
        assert!(p.starts_with("formation_cache"));
    }
}
