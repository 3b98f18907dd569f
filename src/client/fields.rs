//! Ordered upstream field lists for query strings and form bodies

use std::fmt::Display;

/// Upstream field names paired with their values, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamFields(Vec<(String, String)>);

impl UpstreamFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field that is always sent
    pub fn push(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    /// Add a field only when it has a non-empty value
    pub fn push_opt<V: Display>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value.map(|v| v.to_string()).filter(|v| !v.trim().is_empty()) {
            Some(value) => self.push(key, value),
            None => self,
        }
    }

    /// Append every field of `other`
    pub fn merge(mut self, other: UpstreamFields) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for UpstreamFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |fields, (k, v)| fields.push(k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_opt_drops_absent_and_blank() {
        let fields = UpstreamFields::new()
            .push("firstname", "John")
            .push_opt("email", None::<&str>)
            .push_opt("city", Some(""))
            .push_opt("limit", Some(10));

        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["firstname", "limit"]);
        assert_eq!(fields.get("limit"), Some("10"));
    }

    #[test]
    fn test_collects_indexed_keys() {
        let fields: UpstreamFields = ["aspirin", "warfarin"]
            .iter()
            .enumerate()
            .map(|(i, med)| (format!("medications[{i}]"), med))
            .collect();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("medications[1]"), Some("warfarin"));
    }
}
