//! The recursive ordered `MultiLevelMap` backing out-of-stream variables.

use indexmap::IndexMap;

use crate::record::Record;
use crate::value::Value;

/// One entry's payload: leaves and submaps are mutually exclusive at a
/// given keypath.
#[derive(Debug, Clone)]
enum Node {
    Terminal(Value),
    Level(MultiLevelMap),
}

#[derive(Debug, Clone)]
struct Entry {
    key: Value,
    node: Node,
}

/// A single level-0 entry as seen by [`MultiLevelMap::iter`]: either a
/// terminal leaf or a nested level.
#[derive(Debug, Clone, Copy)]
pub enum LevelEntry<'a> {
    Terminal(&'a Value),
    Level(&'a MultiLevelMap),
}

/// A recursive ordered mapping where each entry holds either a terminal
/// `Value` or a nested `MultiLevelMap`. Used both for the process-lifetime
/// out-of-stream store (`@name[...]`) and for local map variables.
#[derive(Debug, Clone, Default)]
pub struct MultiLevelMap {
    entries: IndexMap<String, Entry>,
}

fn key_str(key: &Value) -> String {
    key.format_value(None)
}

impl MultiLevelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Ordered iteration over (key, is-terminal) at this level only.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|e| &e.key)
    }

    /// Ordered iteration over this level's (key, entry) pairs, distinguishing
    /// terminal leaves from nested levels (used by `for`/`emit`/`dump`).
    pub fn iter(&self) -> impl Iterator<Item = (&Value, LevelEntry<'_>)> {
        self.entries.values().map(|e| {
            let entry = match &e.node {
                Node::Terminal(v) => LevelEntry::Terminal(v),
                Node::Level(m) => LevelEntry::Level(m),
            };
            (&e.key, entry)
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn terminal_at(&self, key: &str) -> Option<&Value> {
        match &self.entries.get(key)?.node {
            Node::Terminal(v) => Some(v),
            Node::Level(_) => None,
        }
    }

    fn level_at(&self, key: &str) -> Option<&MultiLevelMap> {
        match &self.entries.get(key)?.node {
            Node::Level(m) => Some(m),
            Node::Terminal(_) => None,
        }
    }

    /// Returns `Some` only if the full path resolves and the final node is
    /// terminal.
    pub fn get_terminal(&self, keys: &[Value]) -> Option<&Value> {
        match keys.split_first() {
            None => None,
            Some((first, [])) => self.terminal_at(&key_str(first)),
            Some((first, rest)) => self.level_at(&key_str(first))?.get_terminal(rest),
        }
    }

    /// Returns a reference to the non-terminal at that path.
    pub fn get_level(&self, keys: &[Value]) -> Option<&MultiLevelMap> {
        match keys.split_first() {
            None => Some(self),
            Some((first, rest)) => self.level_at(&key_str(first))?.get_level(rest),
        }
    }

    /// Get-or-create the level at `keys`, creating intermediate levels as
    /// needed. If an intermediate key currently addresses a terminal, that
    /// value is discarded and replaced with an empty level.
    pub fn get_or_create_level(&mut self, keys: &[Value]) -> &mut MultiLevelMap {
        let mut cur = self;
        for key in keys {
            let ks = key_str(key);
            let needs_replace = !matches!(
                cur.entries.get(&ks).map(|e| &e.node),
                Some(Node::Level(_))
            );
            if needs_replace {
                cur.entries.insert(
                    ks.clone(),
                    Entry {
                        key: key.clone(),
                        node: Node::Level(MultiLevelMap::new()),
                    },
                );
            }
            cur = match &mut cur.entries.get_mut(&ks).unwrap().node {
                Node::Level(m) => m,
                Node::Terminal(_) => unreachable!("just replaced with a level"),
            };
        }
        cur
    }

    /// Creates intermediate levels as needed; if the final key currently
    /// addresses a non-terminal, that whole subtree is discarded.
    pub fn put_terminal(&mut self, keys: &[Value], value: Value) {
        let Some((last, prefix)) = keys.split_last() else {
            return;
        };
        let level = self.get_or_create_level(prefix);
        let ks = key_str(last);
        level.entries.insert(
            ks,
            Entry {
                key: last.clone(),
                node: Node::Terminal(value),
            },
        );
    }

    /// Creates intermediate levels as needed, then installs `level` whole
    /// at the final key (used by `@a[...] = @b[...]` deep-copy-submap
    /// assignment). If `keys` is empty, replaces `self` in place.
    pub fn put_level(&mut self, keys: &[Value], level: MultiLevelMap) {
        let Some((last, prefix)) = keys.split_last() else {
            *self = level;
            return;
        };
        let parent = self.get_or_create_level(prefix);
        let ks = key_str(last);
        parent.entries.insert(ks, Entry { key: last.clone(), node: Node::Level(level) });
    }

    /// Deletes the addressed subtree (terminal or non-terminal); empty
    /// ancestors are NOT pruned.
    pub fn remove(&mut self, keys: &[Value]) -> bool {
        let Some((last, prefix)) = keys.split_last() else {
            return false;
        };
        let Some(level) = self.get_level_mut(prefix) else {
            return false;
        };
        level.entries.shift_remove(&key_str(last)).is_some()
    }

    fn get_level_mut(&mut self, keys: &[Value]) -> Option<&mut MultiLevelMap> {
        let mut cur = self;
        for key in keys {
            cur = match &mut cur.entries.get_mut(&key_str(key))?.node {
                Node::Level(m) => m,
                Node::Terminal(_) => return None,
            };
        }
        Some(cur)
    }

    /// Ordered list of key `Value`s at the level addressed by `keys`.
    pub fn copy_keys_from_level(&self, keys: &[Value]) -> Vec<Value> {
        self.get_level(keys)
            .map(|level| level.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Deep copy of the submap addressed by `keys`.
    pub fn copy_submap(&self, keys: &[Value]) -> Option<MultiLevelMap> {
        self.get_level(keys).cloned()
    }

    /// Flatten this map's contents into zero or more output [`Record`]s.
    ///
    /// `top_names[i]` becomes the field name for the i-th level of keys
    /// consumed on the way down; `leaf_name` names the field holding a
    /// terminal value reached before `top_names` is exhausted (the common
    /// case: the oosvar's own name). Beyond `top_names`, remaining
    /// structure is flattened into the same record: with `with_prefix`,
    /// compound field names are joined by `sep`; without it, only the
    /// innermost key names the field.
    pub fn flatten_to_records(
        &self,
        leaf_name: &str,
        top_names: &[String],
        with_prefix: bool,
        sep: &str,
    ) -> Vec<Record> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.flatten_walk(0, &mut path, leaf_name, top_names, with_prefix, sep, &mut out);
        out
    }

    fn flatten_walk(
        &self,
        depth: usize,
        path: &mut Vec<Value>,
        leaf_name: &str,
        top_names: &[String],
        with_prefix: bool,
        sep: &str,
        out: &mut Vec<Record>,
    ) {
        if depth == top_names.len() {
            let mut rec = Record::new();
            for (name, key) in top_names.iter().zip(path.iter()) {
                rec.put(name.clone(), key_str(key));
            }
            flatten_remaining(self, leaf_name, with_prefix, sep, &mut rec);
            out.push(rec);
            return;
        }
        for entry in self.entries.values() {
            path.push(entry.key.clone());
            match &entry.node {
                Node::Terminal(v) => {
                    let mut rec = Record::new();
                    for (name, key) in top_names.iter().zip(path.iter()) {
                        rec.put(name.clone(), key_str(key));
                    }
                    rec.put(leaf_name.to_string(), v.format_value(None));
                    out.push(rec);
                }
                Node::Level(sub) => {
                    sub.flatten_walk(depth + 1, path, leaf_name, top_names, with_prefix, sep, out);
                }
            }
            path.pop();
        }
    }
}

fn flatten_remaining(
    node: &MultiLevelMap,
    leaf_name: &str,
    with_prefix: bool,
    sep: &str,
    rec: &mut Record,
) {
    if node.entries.is_empty() {
        return;
    }
    fn walk(node: &MultiLevelMap, prefix: &[String], with_prefix: bool, sep: &str, rec: &mut Record) {
        for entry in node.entries.values() {
            let this_key = key_str(&entry.key);
            match &entry.node {
                Node::Terminal(v) => {
                    let field_name = if with_prefix && !prefix.is_empty() {
                        format!("{}{}{}", prefix.join(sep), sep, this_key)
                    } else {
                        this_key
                    };
                    rec.put(field_name, v.format_value(None));
                }
                Node::Level(sub) => {
                    let mut next_prefix = prefix.to_vec();
                    next_prefix.push(this_key);
                    walk(sub, &next_prefix, with_prefix, sep, rec);
                }
            }
        }
    }
    let _ = leaf_name; // leaf naming only applies above top_names depth
    walk(node, &[], with_prefix, sep, rec);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn put_and_get_terminal() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[v("a"), v("b")], Value::Int(1));
        assert!(matches!(m.get_terminal(&[v("a"), v("b")]), Some(Value::Int(1))));
        assert!(m.get_terminal(&[v("a")]).is_none());
        assert!(m.get_level(&[v("a")]).is_some());
    }

    #[test]
    fn put_terminal_discards_existing_level() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[v("a"), v("b")], Value::Int(1));
        m.put_terminal(&[v("a")], Value::Int(9));
        assert!(matches!(m.get_terminal(&[v("a")]), Some(Value::Int(9))));
        assert!(m.get_level(&[v("a")]).is_none());
    }

    #[test]
    fn remove_does_not_prune_ancestors() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[v("a"), v("b")], Value::Int(1));
        assert!(m.remove(&[v("a"), v("b")]));
        assert!(m.get_level(&[v("a")]).is_some());
        assert!(m.get_level(&[v("a")]).unwrap().is_empty());
    }

    #[test]
    fn copy_submap_is_deep() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[v("a"), v("b")], Value::Int(1));
        let mut copy = m.copy_submap(&[v("a")]).unwrap();
        copy.put_terminal(&[v("b")], Value::Int(2));
        assert!(matches!(m.get_terminal(&[v("a"), v("b")]), Some(Value::Int(1))));
        assert!(matches!(copy.get_terminal(&[v("b")]), Some(Value::Int(2))));
    }

    #[test]
    fn flatten_with_exact_depth_match() {
        // emit @s, "g" where @s[g] is a terminal sum.
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[v("a")], Value::Int(4));
        m.put_terminal(&[v("b")], Value::Int(2));
        let recs = m.flatten_to_records("s", &["g".to_string()], false, ":");
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].get("g"), Some("a"));
        assert_eq!(recs[0].get("s"), Some("4"));
        assert_eq!(recs[1].get("g"), Some("b"));
        assert_eq!(recs[1].get("s"), Some("2"));
    }

    #[test]
    fn flatten_deeper_than_top_names_without_prefix() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[v("a"), v("x")], Value::Int(1));
        m.put_terminal(&[v("a"), v("y")], Value::Int(2));
        let recs = m.flatten_to_records("s", &["g".to_string()], false, ":");
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].get("g"), Some("a"));
        assert_eq!(recs[0].get("x"), Some("1"));
        assert_eq!(recs[0].get("y"), Some("2"));
    }

    #[test]
    fn flatten_deeper_than_top_names_with_prefix() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[v("a"), v("x")], Value::Int(1));
        let recs = m.flatten_to_records("s", &["g".to_string()], true, ":");
        assert_eq!(recs[0].get("x"), Some("1"));
    }
}
