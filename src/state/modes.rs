//! Mode storage shared by channels and users.

use std::collections::BTreeMap;

/// An entry in a list mode (bans and similar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub param: String,
    pub set_by: String,
    pub set_at: i64,
}

/// Current mode values of one channel or user.
///
/// Flag and single-value modes live in `values` (`None` for flags); list
/// modes live in `lists` and never hold an empty vector.
#[derive(Debug, Clone, Default)]
pub struct ModeStore {
    pub values: BTreeMap<char, Option<String>>,
    pub lists: BTreeMap<char, Vec<ListEntry>>,
}

impl ModeStore {
    /// Whether the mode is currently set.
    pub fn has(&self, mode: char) -> bool {
        self.values.contains_key(&mode) || self.lists.contains_key(&mode)
    }

    /// Parameter of a single-value mode.
    pub fn value(&self, mode: char) -> Option<&str> {
        self.values.get(&mode).and_then(|v| v.as_deref())
    }

    /// Entries of a list mode, empty when unset.
    pub fn list(&self, mode: char) -> &[ListEntry] {
        self.lists.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.lists.clear();
    }

    /// Flatten into a `+modes` string and parameters.
    pub fn to_mode_string(&self) -> (String, Vec<String>) {
        let mut modes = String::from("+");
        let mut params = Vec::new();
        for (mode, value) in &self.values {
            modes.push(*mode);
            if let Some(value) = value {
                params.push(value.clone());
            }
        }
        for (mode, entries) in &self.lists {
            for entry in entries {
                modes.push(*mode);
                params.push(entry.param.clone());
            }
        }
        (modes, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_values_then_lists() {
        let mut store = ModeStore::default();
        store.values.insert('n', None);
        store.values.insert('l', Some("10".into()));
        store.lists.insert(
            'b',
            vec![ListEntry {
                param: "*!*@foo".into(),
                set_by: "alice".into(),
                set_at: 0,
            }],
        );
        assert!(store.has('b'));
        assert_eq!(store.value('l'), Some("10"));
        assert_eq!(
            store.to_mode_string(),
            ("+lnb".to_string(), vec!["10".to_string(), "*!*@foo".to_string()])
        );
    }
}
