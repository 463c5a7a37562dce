//! Shared configuration value tree.
//!
//! A [`ConfigTree`] is a window onto one node of a document's value tree. All
//! trees derived from the same document share a single backing root, so a
//! mutation made through any one of them is immediately visible through every
//! other and through the owning [`ConfigDocument`](crate::ConfigDocument).
//! Reads never hand out references into the backing store; they yield cloned
//! values or further `ConfigTree` windows.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, ConfigResult};

/// One step in the path from the document root to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A path-addressed view of a node in a shared configuration document.
///
/// Cloning a `ConfigTree` clones the handle, not the data. Nodes are
/// addressed by path, so a tree obtained before a structural change (or a
/// [`reload`](crate::ConfigDocument::reload)) simply resolves against the
/// current state of the document; if its node no longer exists, reads return
/// `None`/defaults and keyed writes report a type mismatch.
#[derive(Clone)]
pub struct ConfigTree {
    root: Arc<RwLock<Value>>,
    dirty: Arc<AtomicBool>,
    path: Vec<Segment>,
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn resolve<'a>(mut node: &'a Value, path: &[Segment]) -> Option<&'a Value> {
    for segment in path {
        node = match segment {
            Segment::Key(key) => {
                let key = Value::String(key.clone());
                match node {
                    Value::Mapping(map) => map.get(&key)?,
                    _ => return None,
                }
            }
            Segment::Index(index) => match node {
                Value::Sequence(items) => items.get(*index)?,
                _ => return None,
            },
        };
    }
    Some(node)
}

fn resolve_mut<'a>(mut node: &'a mut Value, path: &[Segment]) -> Option<&'a mut Value> {
    for segment in path {
        node = match segment {
            Segment::Key(key) => {
                let key = Value::String(key.clone());
                match node {
                    Value::Mapping(map) => map.get_mut(&key)?,
                    _ => return None,
                }
            }
            Segment::Index(index) => match node {
                Value::Sequence(items) => items.get_mut(*index)?,
                _ => return None,
            },
        };
    }
    Some(node)
}

impl ConfigTree {
    pub(crate) fn new(root: Arc<RwLock<Value>>, dirty: Arc<AtomicBool>) -> Self {
        Self {
            root,
            dirty,
            path: Vec::new(),
        }
    }

    fn child(&self, segment: Segment) -> Self {
        let mut path = self.path.clone();
        path.push(segment);
        Self {
            root: Arc::clone(&self.root),
            dirty: Arc::clone(&self.dirty),
            path,
        }
    }

    fn read_root(&self) -> RwLockReadGuard<'_, Value> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_root(&self) -> RwLockWriteGuard<'_, Value> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    fn with_node<R>(&self, f: impl FnOnce(&Value) -> R) -> Option<R> {
        let guard = self.read_root();
        resolve(&guard, &self.path).map(f)
    }

    /// Renders the path for error messages, `$.section.sub` style.
    fn path_string(&self) -> String {
        let mut rendered = String::from("$");
        for segment in &self.path {
            match segment {
                Segment::Key(key) => {
                    rendered.push('.');
                    rendered.push_str(key);
                }
                Segment::Index(index) => {
                    rendered.push_str(&format!("[{index}]"));
                }
            }
        }
        rendered
    }

    /// Keyed lookup on a mapping node.
    ///
    /// Returns `None` for an absent key or when this node is not a mapping;
    /// lenient reads are the norm for configuration access. Keys compare
    /// case-sensitively, exactly as written in the document.
    pub fn get(&self, key: &str) -> Option<Self> {
        let exists = self.with_node(|node| {
            let wanted = Value::String(key.to_string());
            matches!(node, Value::Mapping(map) if map.contains_key(&wanted))
        })?;
        exists.then(|| self.child(Segment::Key(key.to_string())))
    }

    /// Element lookup on a sequence node.
    pub fn index(&self, index: usize) -> Option<Self> {
        let exists = self.with_node(|node| {
            matches!(node, Value::Sequence(items) if index < items.len())
        })?;
        exists.then(|| self.child(Segment::Index(index)))
    }

    /// Dotted-path lookup, the deep-access idiom: `tree.at("database.testing")`.
    ///
    /// Resolves over the same storage as [`get`](Self::get); a mutation made
    /// through one idiom is immediately visible through the other.
    pub fn at(&self, path: &str) -> Option<Self> {
        let mut node = self.clone();
        for part in path.split('.') {
            node = node.get(part)?;
        }
        Some(node)
    }

    /// Insert or replace an entry under this mapping node.
    ///
    /// Mappings are open: setting a new key always succeeds. Fails with
    /// [`ConfigError::TypeMismatch`] when this node is not a mapping.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> ConfigResult<()> {
        let mut guard = self.write_root();
        let node = resolve_mut(&mut guard, &self.path).ok_or_else(|| ConfigError::TypeMismatch {
            at: self.path_string(),
            expected: "mapping",
            found: "absent node",
        })?;
        match node {
            Value::Mapping(map) => {
                map.insert(Value::String(key.to_string()), value.into());
                drop(guard);
                self.mark_dirty();
                Ok(())
            }
            other => Err(ConfigError::TypeMismatch {
                at: self.path_string(),
                expected: "mapping",
                found: kind(other),
            }),
        }
    }

    /// Dotted-path insert: `tree.set_at("database.testing.adapter", "mysql")`.
    ///
    /// Absent intermediate segments are created as empty mappings. Reaching
    /// through a scalar or sequence segment fails with
    /// [`ConfigError::TypeMismatch`] at the offending path.
    pub fn set_at(&self, path: &str, value: impl Into<Value>) -> ConfigResult<()> {
        let mut guard = self.write_root();
        let mut node = resolve_mut(&mut guard, &self.path).ok_or_else(|| ConfigError::TypeMismatch {
            at: self.path_string(),
            expected: "mapping",
            found: "absent node",
        })?;

        let mut value = Some(value.into());
        let mut walked = self.path_string();
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            let Value::Mapping(map) = node else {
                return Err(ConfigError::TypeMismatch {
                    at: walked,
                    expected: "mapping",
                    found: kind(node),
                });
            };
            let key = Value::String(part.to_string());
            if parts.peek().is_none() {
                map.insert(key, value.take().unwrap_or(Value::Null));
                break;
            }
            node = map
                .entry(key)
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            walked.push('.');
            walked.push_str(part);
        }
        drop(guard);
        self.mark_dirty();
        Ok(())
    }

    /// Append to this sequence node.
    pub fn push(&self, value: impl Into<Value>) -> ConfigResult<()> {
        let mut guard = self.write_root();
        let node = resolve_mut(&mut guard, &self.path).ok_or_else(|| ConfigError::TypeMismatch {
            at: self.path_string(),
            expected: "sequence",
            found: "absent node",
        })?;
        match node {
            Value::Sequence(items) => {
                items.push(value.into());
                drop(guard);
                self.mark_dirty();
                Ok(())
            }
            other => Err(ConfigError::TypeMismatch {
                at: self.path_string(),
                expected: "sequence",
                found: kind(other),
            }),
        }
    }

    /// Remove an entry from this mapping node, returning the removed value.
    ///
    /// Lenient like [`get`](Self::get): returns `None` when the key is absent
    /// or this node is not a mapping.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut guard = self.write_root();
        let node = resolve_mut(&mut guard, &self.path)?;
        let removed = match node {
            Value::Mapping(map) => map.remove(&Value::String(key.to_string())),
            _ => None,
        };
        drop(guard);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    /// A cloned snapshot of this subtree. Mutating the snapshot does not
    /// affect the document. An absent node snapshots as `Null`.
    pub fn value(&self) -> Value {
        self.with_node(Clone::clone).unwrap_or(Value::Null)
    }

    /// Deserialize this subtree into a typed value.
    pub fn extract<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        serde_yaml::from_value(self.value()).map_err(|source| ConfigError::Extract {
            at: self.path_string(),
            source,
        })
    }

    /// Scalar coercion to an owned string.
    pub fn as_str(&self) -> Option<String> {
        self.with_node(|node| node.as_str().map(str::to_string))
            .flatten()
    }

    /// Scalar coercion to an integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.with_node(Value::as_i64).flatten()
    }

    /// Scalar coercion to a float.
    pub fn as_f64(&self) -> Option<f64> {
        self.with_node(Value::as_f64).flatten()
    }

    /// Scalar coercion to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        self.with_node(Value::as_bool).flatten()
    }

    /// True when the node exists and is explicitly null.
    pub fn is_null(&self) -> bool {
        self.with_node(Value::is_null).unwrap_or(false)
    }

    /// True when the node exists and is a mapping.
    pub fn is_mapping(&self) -> bool {
        self.with_node(Value::is_mapping).unwrap_or(false)
    }

    /// True when the node exists and is a sequence.
    pub fn is_sequence(&self) -> bool {
        self.with_node(Value::is_sequence).unwrap_or(false)
    }

    /// Mapping keys in document order. Empty for non-mapping nodes.
    pub fn keys(&self) -> Vec<String> {
        self.with_node(|node| match node {
            Value::Mapping(map) => map
                .keys()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default()
    }

    /// Entry count for mappings and sequences; zero for scalars.
    pub fn len(&self) -> usize {
        self.with_node(|node| match node {
            Value::Mapping(map) => map.len(),
            Value::Sequence(items) => items.len(),
            _ => 0,
        })
        .unwrap_or(0)
    }

    /// True when [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigTree")
            .field("path", &self.path_string())
            .field("node", &self.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_from(yaml: &str) -> ConfigTree {
        let value: Value = serde_yaml::from_str(yaml).expect("test YAML should parse");
        ConfigTree::new(
            Arc::new(RwLock::new(value)),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_keyed_and_path_access_resolve_the_same_entry() {
        let root = tree_from("database:\n  host: localhost\n  port: 5432\n");
        let keyed = root.get("database").unwrap().get("host").unwrap();
        let pathed = root.at("database.host").unwrap();
        assert_eq!(keyed.as_str().as_deref(), Some("localhost"));
        assert_eq!(pathed.as_str().as_deref(), Some("localhost"));
        assert_eq!(root.at("database.port").unwrap().as_i64(), Some(5432));
    }

    #[test]
    fn test_absent_key_reads_leniently() {
        let root = tree_from("database:\n  host: localhost\n");
        assert!(root.get("missing").is_none());
        assert!(root.at("database.missing").is_none());
        assert!(root.at("missing.deeper.still").is_none());
    }

    #[test]
    fn test_mutation_is_visible_through_both_idioms() {
        let root = tree_from("database:\n  testing: {}\n");
        root.set_at("database.testing.adapter", "mysql").unwrap();

        let keyed = root
            .get("database")
            .unwrap()
            .get("testing")
            .unwrap()
            .get("adapter")
            .unwrap();
        assert_eq!(keyed.as_str().as_deref(), Some("mysql"));
        assert_eq!(
            root.at("database.testing.adapter").unwrap().as_str().as_deref(),
            Some("mysql")
        );
    }

    #[test]
    fn test_mutation_through_wrapper_is_shared_not_copied() {
        let root = tree_from("section: {}\n");
        let section = root.get("section").unwrap();
        section.set("value", 7).unwrap();
        assert_eq!(root.at("section.value").unwrap().as_i64(), Some(7));
    }

    #[test]
    fn test_set_at_creates_intermediate_mappings() {
        let root = tree_from("{}");
        root.set_at("a.b.c", true).unwrap();
        assert_eq!(root.at("a.b.c").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_set_through_scalar_is_a_type_mismatch() {
        let root = tree_from("name: confab\n");
        let err = root.set_at("name.nested", 1).unwrap_err();
        match err {
            ConfigError::TypeMismatch { at, found, .. } => {
                assert_eq!(at, "$.name");
                assert_eq!(found, "string");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_set_on_scalar_node_fails() {
        let root = tree_from("name: confab\n");
        let scalar = root.get("name").unwrap();
        assert!(matches!(
            scalar.set("key", 1),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_sequence_index_and_push() {
        let root = tree_from("servers:\n  - alpha\n  - beta\n");
        let servers = root.get("servers").unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers.index(1).unwrap().as_str().as_deref(), Some("beta"));
        assert!(servers.index(5).is_none());

        servers.push("gamma").unwrap();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers.index(2).unwrap().as_str().as_deref(), Some("gamma"));
    }

    #[test]
    fn test_remove_returns_the_removed_value() {
        let root = tree_from("a: 1\nb: 2\n");
        let removed = root.remove("a").unwrap();
        assert_eq!(removed.as_i64(), Some(1));
        assert!(root.get("a").is_none());
        assert!(root.remove("a").is_none());
    }

    #[test]
    fn test_snapshot_is_detached_from_backing_store() {
        let root = tree_from("section:\n  value: 1\n");
        let mut snapshot = root.value();
        if let Value::Mapping(map) = &mut snapshot {
            map.insert(Value::String("extra".into()), Value::Bool(true));
        }
        assert!(root.get("extra").is_none());
    }

    #[test]
    fn test_keys_preserve_document_order() {
        let root = tree_from("zeta: 1\nalpha: 2\nmid: 3\n");
        assert_eq!(root.keys(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_extract_typed_section() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Database {
            host: String,
            port: u16,
        }

        let root = tree_from("database:\n  host: localhost\n  port: 5432\n");
        let database: Database = root.get("database").unwrap().extract().unwrap();
        assert_eq!(
            database,
            Database {
                host: "localhost".to_string(),
                port: 5432
            }
        );
    }

    #[test]
    fn test_stale_wrapper_resolves_against_current_state() {
        let root = tree_from("section:\n  value: 1\n");
        let section = root.get("section").unwrap();
        root.remove("section");
        assert!(section.get("value").is_none());
        assert_eq!(section.value(), Value::Null);
    }
}
