//! Typed field values and field-level diffs.
//!
//! Each entity lists its fields once, in schema order, as
//! `(name, FieldValue)` pairs. Comparing two entities walks both lists
//! side by side, so a diff contains exactly the fields that changed.

use crate::directory::Gecos;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of one entity field. `Null` means absent, and as a diff value it
/// means "clear".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Number(u64),
    Text(String),
    List(Vec<String>),
    Gecos(Gecos),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Text(value.clone())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Number(u64::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&[String]> for FieldValue {
    fn from(value: &[String]) -> Self {
        FieldValue::List(value.to_vec())
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

impl From<&Gecos> for FieldValue {
    fn from(value: &Gecos) -> Self {
        FieldValue::Gecos(value.clone())
    }
}

/// Entities that can be compared field by field.
pub trait Diffable {
    /// Entity class name used in logs and errors.
    const CLASS: &'static str;

    /// Natural key of the entity.
    fn key(&self) -> &str;

    /// All fields in schema order.
    fn fields(&self) -> Vec<(&'static str, FieldValue)>;
}

/// Changed fields mapped to their desired values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldDiff(BTreeMap<String, FieldValue>);

impl FieldDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against `desired`, optionally restricted to `allowed`
    /// field names.
    pub fn between<E: Diffable>(current: &E, desired: &E, allowed: Option<&[&str]>) -> Self {
        let mut diff = Self::new();
        let desired_fields = desired.fields();
        for ((name, current_value), (_, desired_value)) in
            current.fields().into_iter().zip(desired_fields)
        {
            if allowed.is_some_and(|allowed| !allowed.contains(&name)) {
                continue;
            }
            if current_value != desired_value {
                diff.insert(name, desired_value);
            }
        }
        diff
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for FieldDiff {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        key: String,
        a: Option<u64>,
        b: String,
    }

    impl Diffable for Pair {
        const CLASS: &'static str = "pair";

        fn key(&self) -> &str {
            &self.key
        }

        fn fields(&self) -> Vec<(&'static str, FieldValue)> {
            vec![("a", self.a.into()), ("b", (&self.b).into())]
        }
    }

    fn pair(a: Option<u64>, b: &str) -> Pair {
        Pair {
            key: "k".to_string(),
            a,
            b: b.to_string(),
        }
    }

    #[test]
    fn diff_contains_only_changed_fields_with_desired_values() {
        let diff = FieldDiff::between(&pair(Some(1), "x"), &pair(None, "x"), None);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get("a"), Some(&FieldValue::Null));
        assert!(!diff.contains("b"));
    }

    #[test]
    fn diff_respects_allow_list() {
        let diff = FieldDiff::between(&pair(Some(1), "x"), &pair(Some(2), "y"), Some(&["b"]));
        assert_eq!(diff.fields().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn equal_entities_have_empty_diff() {
        assert!(FieldDiff::between(&pair(Some(1), "x"), &pair(Some(1), "x"), None).is_empty());
    }
}
