//! Tag-to-handler dispatch tables.
//!
//! Each format front end maps 16-bit unit tags onto a closed enum of
//! handler kinds. The table is assembled once by a [`RegistryBuilder`],
//! frozen into a [`Registry`], and from then on only read, so a single
//! table can be shared by reference across any number of parses.

use log::warn;
use std::collections::{HashMap, HashSet};

/// Immutable mapping from unit tag to handler kind.
pub struct Registry<K> {
    name: &'static str,
    map: HashMap<u16, K>,
}

/// Collects registrations, rejecting duplicates.
pub struct RegistryBuilder<K> {
    name: &'static str,
    map: HashMap<u16, K>,
}

impl<K: Copy> RegistryBuilder<K> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            map: HashMap::new(),
        }
    }

    /// Register a handler kind for `tag`. A second registration for the
    /// same tag is refused and logged; the first one stays.
    pub fn register(&mut self, tag: u16, kind: K) -> &mut Self {
        if self.map.contains_key(&tag) {
            warn!(
                "{}: tag {:#06x} registered twice, keeping the first handler",
                self.name, tag
            );
        } else {
            self.map.insert(tag, kind);
        }
        self
    }

    pub fn build(self) -> Registry<K> {
        Registry {
            name: self.name,
            map: self.map,
        }
    }
}

impl<K: Copy> Registry<K> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, tag: u16) -> Option<K> {
        self.map.get(&tag).copied()
    }

    pub fn contains(&self, tag: u16) -> bool {
        self.map.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-parse memory of tags with no registered handler.
///
/// An unhandled tag is interesting exactly once per parse; after that the
/// unit is skipped silently. This lives in parse state, not the registry,
/// so the shared table stays immutable.
#[derive(Default)]
pub struct UnknownTags {
    seen: HashSet<u16>,
}

impl UnknownTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tag`; logs and returns true only on first sight.
    pub fn note(&mut self, registry_name: &str, tag: u16) -> bool {
        if self.seen.insert(tag) {
            warn!(
                "{registry_name}: no handler for tag {tag:#06x}, skipping (further occurrences not reported)"
            );
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Alpha,
        Beta,
    }

    #[test]
    fn test_register_and_get() {
        let mut b = RegistryBuilder::new("test");
        b.register(1, Kind::Alpha).register(2, Kind::Beta);
        let reg = b.build();

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(1), Some(Kind::Alpha));
        assert_eq!(reg.get(2), Some(Kind::Beta));
        assert_eq!(reg.get(3), None);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut b = RegistryBuilder::new("test");
        b.register(7, Kind::Alpha).register(7, Kind::Beta);
        let reg = b.build();

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(7), Some(Kind::Alpha));
    }

    #[test]
    fn test_unknown_tags_note_once() {
        let mut unknown = UnknownTags::new();

        assert!(unknown.note("test", 0x1234));
        assert!(!unknown.note("test", 0x1234));
        assert!(unknown.note("test", 0x5678));
        assert_eq!(unknown.count(), 2);
    }
}
