//! Build manifest and application shell set.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Logical key under which the site root document is recorded.
pub const ROOT_KEY: &str = "/";

/// Mapping from logical resource path to content fingerprint for one build.
///
/// Produced externally at build time and immutable for the life of a worker
/// version. The serialized form is a plain JSON object, which is exactly the
/// payload persisted in the manifest partition after a completed activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: HashMap<String, String>,
}

impl Manifest {
    /// Build a manifest from path/fingerprint pairs.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Fingerprint recorded for a logical path.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether a logical path is part of this build.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over the logical paths of this build.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of resources in this build.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from the persisted JSON form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Ordered list of logical paths making up the application shell: the
/// minimal set of resources staged before the worker is considered ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreSet {
    paths: Vec<String>,
}

impl CoreSet {
    /// Build a core set from an ordered list of logical paths.
    pub fn new<P, I>(paths: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = P>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// The shell paths, in staging order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Number of shell resources.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the shell is empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Shell paths the given manifest does not know about.
    pub fn missing_from<'a>(&'a self, manifest: &Manifest) -> Vec<&'a str> {
        self.paths
            .iter()
            .map(String::as_str)
            .filter(|path| !manifest.contains(path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest::from_entries([("a.js", "h1"), ("assets/logo.png", "h2"), (ROOT_KEY, "h3")])
    }

    #[test]
    fn test_manifest_lookup() {
        let manifest = sample();
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.get("a.js"), Some("h1"));
        assert!(manifest.contains(ROOT_KEY));
        assert!(!manifest.contains("missing.css"));
    }

    #[test]
    fn test_manifest_json_round_trip() {
        let manifest = sample();
        let bytes = manifest.to_json().unwrap();
        let decoded = Manifest::from_json(&bytes).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_manifest_serializes_as_plain_object() {
        let manifest = Manifest::from_entries([("a.js", "h1")]);
        let json: serde_json::Value =
            serde_json::from_slice(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "a.js": "h1" }));
    }

    #[test]
    fn test_manifest_decode_rejects_garbage() {
        assert!(Manifest::from_json(b"not-json").is_err());
    }

    #[test]
    fn test_core_set_order_preserved() {
        let core = CoreSet::new(["main.js", "index.html", ROOT_KEY]);
        assert_eq!(core.paths(), &["main.js", "index.html", ROOT_KEY]);
    }

    #[test]
    fn test_core_set_missing_from() {
        let core = CoreSet::new(["a.js", "ghost.js"]);
        assert_eq!(core.missing_from(&sample()), vec!["ghost.js"]);
    }
}
