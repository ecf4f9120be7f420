//! Record and TypedOverlay: the field store and its lazily-typed shadow.

use indexmap::IndexMap;

use crate::value::Value;

/// An ordered mapping from field name to raw string value, insertion order
/// preserved. Duplicate keys are impossible: a put on an existing key
/// updates in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Insert at the end if new, else update the existing slot in place.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Insert a new field at the front of the record. No-op reposition if
    /// the key already exists (matches `put`'s update-in-place contract).
    pub fn put_head(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if self.fields.contains_key(&name) {
            self.fields.insert(name, value.into());
        } else {
            self.fields.shift_insert(0, name, value.into());
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.shift_remove(name)
    }

    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> bool {
        let Some(idx) = self.fields.get_index_of(old) else {
            return false;
        };
        let value = self.fields[idx].clone();
        self.fields.shift_remove_index(idx);
        self.fields.shift_insert(idx, new.into(), value);
        true
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A transient typed shadow of a [`Record`], consulted first on read and
/// flushed back to string form on record-exit.
#[derive(Debug, Clone, Default)]
pub struct TypedOverlay {
    values: IndexMap<String, Value>,
}

impl TypedOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a `$name` read resolves to before any numeric-inference policy is
/// applied; the policy itself is a DSL-runtime concern (`mlr-eval`), not a
/// core data-model one.
pub enum FieldRead<'a> {
    /// Already typed, from a prior write within this record's lifetime.
    Typed(&'a Value),
    /// Untouched record string, not yet promoted to a `Value`.
    Raw(&'a str),
    Absent,
}

/// A [`Record`] paired with its [`TypedOverlay`], enforcing the invariant
/// that every overlay key is present in the record.
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    pub record: Record,
    pub overlay: TypedOverlay,
}

impl RecordFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: Record) -> Self {
        Self {
            record,
            overlay: TypedOverlay::new(),
        }
    }

    pub fn read(&self, name: &str) -> FieldRead<'_> {
        if let Some(v) = self.overlay.get(name) {
            return FieldRead::Typed(v);
        }
        match self.record.get(name) {
            Some(s) => FieldRead::Raw(s),
            None => FieldRead::Absent,
        }
    }

    /// Write `$name = value`. An `Absent` value is a silent no-op, keeping
    /// the prior binding rather than overwriting it.
    pub fn write(&mut self, name: &str, value: Value) {
        if value.is_absent() {
            return;
        }
        if !self.record.contains_key(name) {
            // Sentinel placeholder: preserves field-count-observable
            // ordering until the overlay is flushed.
            self.record.put(name, String::new());
        }
        self.overlay.put(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.record.remove(name);
        self.overlay.remove(name);
    }

    pub fn clear(&mut self) {
        self.record.clear();
        self.overlay.clear();
    }

    /// Flush the overlay back to the record's string form and clear it.
    pub fn flush(&mut self, numeric_format: Option<&str>) {
        for (name, value) in self.overlay.values.drain(..) {
            let formatted = match &value {
                Value::String(s) => s.clone(),
                Value::Empty => String::new(),
                other => other.format_value(numeric_format),
            };
            self.record.put(name, formatted);
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.record.field_names()
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_updates_in_place() {
        let mut r = Record::new();
        r.put("a", "1");
        r.put("b", "2");
        r.put("a", "9");
        assert_eq!(r.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(r.get("a"), Some("9"));
    }

    #[test]
    fn overlay_write_installs_sentinel_then_flushes() {
        let mut rf = RecordFields::from_record(Record::new());
        rf.record.put("a", "1");
        rf.record.put("b", "2");
        rf.write("c", Value::Int(3));
        assert_eq!(rf.record.field_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        rf.flush(None);
        assert_eq!(rf.record.get("c"), Some("3"));
        assert!(rf.overlay.is_empty());
    }

    #[test]
    fn absent_write_is_noop() {
        let mut rf = RecordFields::new();
        rf.record.put("a", "1");
        rf.write("a", Value::Absent);
        assert_eq!(rf.record.get("a"), Some("1"));
        assert!(rf.overlay.is_empty());
    }

    #[test]
    fn typed_overlay_consulted_before_record() {
        let mut rf = RecordFields::new();
        rf.record.put("a", "1");
        rf.overlay.put("a", Value::Int(42));
        assert!(matches!(rf.read("a"), FieldRead::Typed(Value::Int(42))));
    }
}
