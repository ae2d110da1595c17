//! Metric identity: a name plus safe and unsafe tags.

use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::Peekable;

/// Rendered in place of unsafe tag values.
pub const REDACTED: &str = "{REDACTED}";

/// Identifies a metric within a registry.
///
/// Equality and hashing cover the name and the union of all tags; whether a
/// tag is safe or unsafe only affects how it is rendered.
#[derive(Debug, Clone)]
pub struct MetricName {
    safe_name: String,
    safe_tags: BTreeMap<String, String>,
    unsafe_tags: BTreeMap<String, String>,
}

impl MetricName {
    pub fn builder() -> MetricNameBuilder {
        MetricNameBuilder::default()
    }

    /// Shorthand for a name without tags.
    pub fn of(safe_name: impl Into<String>) -> Self {
        Self::builder().safe_name(safe_name).build()
    }

    pub fn safe_name(&self) -> &str {
        &self.safe_name
    }

    pub fn safe_tags(&self) -> &BTreeMap<String, String> {
        &self.safe_tags
    }

    pub fn unsafe_tags(&self) -> &BTreeMap<String, String> {
        &self.unsafe_tags
    }

    /// Look up a tag value regardless of its classification.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.safe_tags
            .get(key)
            .or_else(|| self.unsafe_tags.get(key))
            .map(String::as_str)
    }

    /// All tags in key order.
    pub fn tags(&self) -> Tags<'_> {
        Tags {
            safe: self.safe_tags.iter().peekable(),
            unsafe_: self.unsafe_tags.iter().peekable(),
        }
    }

    /// Tags in key order with unsafe values redacted.
    pub fn redacted_tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags().map(|(key, value)| {
            if self.unsafe_tags.contains_key(key) {
                (key, REDACTED)
            } else {
                (key, value)
            }
        })
    }

    /// A builder seeded with this name's contents.
    pub fn to_builder(&self) -> MetricNameBuilder {
        MetricNameBuilder {
            safe_name: Some(self.safe_name.clone()),
            safe_tags: self.safe_tags.clone(),
            unsafe_tags: self.unsafe_tags.clone(),
        }
    }
}

impl PartialEq for MetricName {
    fn eq(&self, other: &Self) -> bool {
        self.safe_name == other.safe_name && self.tags().eq(other.tags())
    }
}

impl Eq for MetricName {}

impl Hash for MetricName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.safe_name.hash(state);
        for (key, value) in self.tags() {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.safe_name)?;
        let mut tags = self.redacted_tags().peekable();
        if tags.peek().is_none() {
            return Ok(());
        }
        f.write_str("{")?;
        let mut first = true;
        for (key, value) in tags {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

impl Serialize for MetricName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct RedactedTags<'a>(&'a MetricName);

        impl Serialize for RedactedTags<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(None)?;
                for (key, value) in self.0.redacted_tags() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }

        let mut state = serializer.serialize_struct("MetricName", 2)?;
        state.serialize_field("name", &self.safe_name)?;
        state.serialize_field("tags", &RedactedTags(self))?;
        state.end()
    }
}

/// Merged, key-ordered view over the safe and unsafe tag maps.
pub struct Tags<'a> {
    safe: Peekable<btree_map::Iter<'a, String, String>>,
    unsafe_: Peekable<btree_map::Iter<'a, String, String>>,
}

impl<'a> Iterator for Tags<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let take_safe = match (self.safe.peek(), self.unsafe_.peek()) {
            (Some((a, _)), Some((b, _))) => a.cmp(b) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        let next = if take_safe {
            self.safe.next()
        } else {
            self.unsafe_.next()
        };
        next.map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Builds a [`MetricName`] one tag at a time. Later puts overwrite earlier
/// ones for the same key, including across safe/unsafe.
#[derive(Debug, Default, Clone)]
pub struct MetricNameBuilder {
    safe_name: Option<String>,
    safe_tags: BTreeMap<String, String>,
    unsafe_tags: BTreeMap<String, String>,
}

impl MetricNameBuilder {
    pub fn safe_name(mut self, name: impl Into<String>) -> Self {
        self.safe_name = Some(name.into());
        self
    }

    pub fn put_safe_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.unsafe_tags.remove(&key);
        self.safe_tags.insert(key, value.into());
        self
    }

    pub fn put_unsafe_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.safe_tags.remove(&key);
        self.unsafe_tags.insert(key, value.into());
        self
    }

    pub fn put_all_safe_tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in tags {
            self = self.put_safe_tag(key, value);
        }
        self
    }

    pub fn build(self) -> MetricName {
        MetricName {
            safe_name: self.safe_name.unwrap_or_default(),
            safe_tags: self.safe_tags,
            unsafe_tags: self.unsafe_tags,
        }
    }
}
