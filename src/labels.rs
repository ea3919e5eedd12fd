//! Label sets: provenance and user-configured attributes attached to every
//! forwarded line, plus the canonical serialization used for stream grouping.

use std::collections::BTreeMap;

/// Tenant label forwarded to the backend but excluded from grouping keys.
pub const RESERVED_TENANT_LABEL: &str = "__tenant_id__";

/// An immutable-once-attached mapping from label name to value. Keys are
/// unique and kept sorted so serialization is canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Right-biased merge: values from `other` override same-named labels.
    pub fn merge(mut self, other: &LabelSet) -> LabelSet {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
        self
    }

    /// Canonical serialization for grouping: `{k1="v1", k2="v2"}` with keys in
    /// sorted order and values quoted. Labels named in `without` are omitted
    /// from the key while remaining in the set.
    pub fn serialized_key(&self, without: &[&str]) -> String {
        let parts: Vec<String> = self
            .iter()
            .filter(|(k, _)| !without.contains(k))
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }

    /// Grouping key with the reserved tenant label excluded.
    pub fn grouping_key(&self) -> String {
        self.serialized_key(&[RESERVED_TENANT_LABEL])
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ls = LabelSet::new();
        for (k, v) in iter {
            ls.insert(k, v);
        }
        ls
    }
}

/// Attach the configured extra attributes to a base label set (extras win on
/// name collisions), then delete every attribute on the drop list.
pub fn apply_resource_attributes(
    base: LabelSet,
    extra: &LabelSet,
    drop: &[String],
) -> LabelSet {
    let mut merged = base.merge(extra);
    for name in drop {
        merged.remove(name);
    }
    merged
}
