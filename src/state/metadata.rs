//! Namespaced key-value metadata attached to users and channels.

use std::collections::BTreeMap;

/// Recognized metadata namespaces.
pub const METADATA_NAMESPACES: [&str; 5] = ["server", "user", "client", "ext", "private"];

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl Metadata {
    pub fn get(&self, namespace: &str, key: &str) -> Option<&str> {
        self.entries
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .map(String::as_str)
    }

    /// Set or delete a key. Returns `false` for an unknown namespace or when
    /// nothing changed.
    pub fn set(&mut self, namespace: &str, key: &str, value: Option<String>) -> bool {
        if !METADATA_NAMESPACES.contains(&namespace) {
            return false;
        }
        match value {
            Some(value) => {
                let ns = self.entries.entry(namespace.to_string()).or_default();
                if ns.get(key) == Some(&value) {
                    return false;
                }
                ns.insert(key.to_string(), value);
                true
            }
            None => {
                let Some(ns) = self.entries.get_mut(namespace) else {
                    return false;
                };
                let removed = ns.remove(key).is_some();
                if ns.is_empty() {
                    self.entries.remove(namespace);
                }
                removed
            }
        }
    }

    /// Every `(namespace, key, value)` triple.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.entries.iter().flat_map(|(ns, data)| {
            data.iter()
                .map(move |(k, v)| (ns.as_str(), k.as_str(), v.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_namespace() {
        let mut meta = Metadata::default();
        assert!(!meta.set("bogus", "k", Some("v".into())));
        assert!(meta.set("ext", "k", Some("v".into())));
        assert!(!meta.set("ext", "k", Some("v".into())));
        assert_eq!(meta.get("ext", "k"), Some("v"));
        assert!(meta.set("ext", "k", None));
        assert_eq!(meta.iter().count(), 0);
    }
}
