//! Packet field values and the ordered key-path record that holds a packet body.
//!
//! Nested application data is flattened into dotted key paths before it is
//! put on the wire:
//!
//! ```text
//! owner.id = 7            scalar under its literal path
//! games.[] = 2            list count ...
//! games.0 = first         ... followed by one entry per index
//! games.1.gid = 12        (list elements may be records themselves)
//! props.{} = 1            bag arity ...
//! props.{resultType} = J  ... followed by one entry per member
//! ```
//!
//! The record keeps insertion order because clients read list and bag entries
//! positionally after the count marker.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

/// A single packet or ticket field value.
///
/// Equality and hashing follow the wire form: `Integer(1)` and `Text("1")`
/// are the same value, since nothing on the wire tells them apart.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Signed integer, written in canonical decimal.
    Integer(i64),
    /// Free text.
    Text(String),
}

impl FieldValue {
    /// Interpret a value read off the wire.
    ///
    /// Text that is exactly the canonical decimal rendering of an `i64`
    /// becomes [`FieldValue::Integer`]; everything else stays text.
    pub fn from_wire(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(n) if n.to_string() == text => FieldValue::Integer(n),
            _ => FieldValue::Text(text.to_string()),
        }
    }

    /// The textual form of this value, as it is written on the wire.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Integer(n) => Cow::Owned(n.to_string()),
            FieldValue::Text(s) => Cow::Borrowed(s),
        }
    }

    /// The integer form of this value. Text is parsed leniently (surrounding
    /// whitespace ignored).
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a == b,
            _ => self.as_text() == other.as_text(),
        }
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_text().hash(state);
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

/// Values above `i64::MAX` are kept as their decimal text, which is
/// identical on the wire.
impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(n) => FieldValue::Integer(n),
            Err(_) => FieldValue::Text(value.to_string()),
        }
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::from(value as u64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Text(value.clone())
    }
}

/// Builders for the flattened key-path grammar.
pub mod key {
    /// `<path>.[]`, the list count marker.
    pub fn list_count(path: &str) -> String {
        format!("{path}.[]")
    }

    /// `<path>.<index>`, a list element or the prefix of one.
    pub fn list_item(path: &str, index: usize) -> String {
        format!("{path}.{index}")
    }

    /// `<path>.{}`, the bag arity marker.
    pub fn bag_count(path: &str) -> String {
        format!("{path}.{{}}")
    }

    /// `<path>.{<member>}`, a bag member or the prefix of one.
    pub fn bag_member(path: &str, member: &str) -> String {
        format!("{path}.{{{member}}}")
    }
}

/// Insertion-ordered mapping from key path to [`FieldValue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketRecord {
    fields: IndexMap<String, FieldValue>,
}

impl PacketRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a field. An overwritten key keeps its first
    /// position.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.fields.insert(key.into(), value.into())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Field rendered as text, whatever its kind.
    pub fn text(&self, key: &str) -> Option<Cow<'_, str>> {
        self.fields.get(key).map(FieldValue::as_text)
    }

    /// Field interpreted as an integer, whatever its kind.
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(FieldValue::as_integer)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Remove a field, preserving the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Publish a list of scalars under `path`: the count marker followed by
    /// one entry per element.
    pub fn insert_list<I, V>(&mut self, path: &str, items: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let items: Vec<FieldValue> = items.into_iter().map(Into::into).collect();
        self.insert(key::list_count(path), items.len());
        for (index, item) in items.into_iter().enumerate() {
            self.insert(key::list_item(path, index), item);
        }
    }

    /// Declared element count of the list at `path`.
    pub fn list_len(&self, path: &str) -> Option<usize> {
        self.integer(&key::list_count(path))
            .and_then(|n| usize::try_from(n).ok())
    }

    /// Read back a list of scalars. Returns `None` if the count marker is
    /// absent or any declared element is missing.
    pub fn list(&self, path: &str) -> Option<Vec<&FieldValue>> {
        let len = self.list_len(path)?;
        (0..len)
            .map(|index| self.get(&key::list_item(path, index)))
            .collect()
    }

    /// Publish a bag of scalar members under `path`: the arity marker
    /// followed by one entry per member.
    pub fn insert_bag<I, K, V>(&mut self, path: &str, members: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let members: Vec<(K, FieldValue)> =
            members.into_iter().map(|(k, v)| (k, v.into())).collect();
        self.insert(key::bag_count(path), members.len());
        for (name, value) in members {
            self.insert(key::bag_member(path, name.as_ref()), value);
        }
    }

    /// Declared member count of the bag at `path`.
    pub fn bag_len(&self, path: &str) -> Option<usize> {
        self.integer(&key::bag_count(path))
            .and_then(|n| usize::try_from(n).ok())
    }

    /// Distinct member names of the bag at `path`, in first-seen order.
    ///
    /// Members holding nested data (`props.{games}.[]`) are reported once by
    /// their name.
    pub fn bag_members(&self, path: &str) -> Vec<&str> {
        let prefix = format!("{path}.{{");
        let mut names: Vec<&str> = Vec::new();
        for key in self.fields.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let Some(end) = rest.find('}') else {
                continue;
            };
            let name = &rest[..end];
            if name.is_empty() {
                continue;
            }
            let tail = &rest[end + 1..];
            if (tail.is_empty() || tail.starts_with('.')) && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl<K, V> FromIterator<(K, V)> for PacketRecord
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = PacketRecord::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}
