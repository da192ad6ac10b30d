//! Core memory: a durable, hierarchical fact tree
//!
//! Facts are addressed by dotted paths (`preferences.color`). The tree is a
//! nest of JSON objects; leaves are arbitrary document values. Reads take a
//! short synchronous lock and never suspend. Mutations are serialized by an
//! async write gate: the new tree is built on a copy, written through to
//! disk, and only then published to readers. A failed write leaves the
//! visible tree untouched.

use crate::error::{Error, Result};
use crate::storage::JsonDocument;
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};
use tokio::sync::Mutex;

/// A fact value: null, bool, number, string, list or nested mapping.
pub type FactValue = Value;

/// The whole fact tree.
pub type FactTree = Map<String, Value>;

/// Durable dotted-path key/value store.
pub struct CoreMemory {
    tree: RwLock<FactTree>,
    write_gate: Mutex<()>,
    document: Option<JsonDocument>,
}

impl CoreMemory {
    /// Create a volatile core memory (nothing is written to disk).
    pub fn in_memory() -> Self {
        Self {
            tree: RwLock::new(FactTree::new()),
            write_gate: Mutex::new(()),
            document: None,
        }
    }

    /// Open a core memory backed by `document`, loading any existing tree.
    pub async fn open(document: JsonDocument) -> Result<Self> {
        let tree = match document.load::<Value>().await? {
            None => FactTree::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(Error::Storage(format!(
                    "{} must hold an object, found {}",
                    document.path().display(),
                    type_name(&other)
                )))
            }
        };

        Ok(Self {
            tree: RwLock::new(tree),
            write_gate: Mutex::new(()),
            document: Some(document),
        })
    }

    /// Read a fact.
    ///
    /// `None` returns the whole tree. A dotted key descends into nested
    /// mappings; a missing segment or a path through a non-mapping is absent.
    pub fn get(&self, key: Option<&str>) -> Option<FactValue> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        match key {
            None => Some(Value::Object(tree.clone())),
            Some(key) => {
                let segments = split_key(key).ok()?;
                lookup(&tree, &segments).cloned()
            }
        }
    }

    /// Snapshot of the whole tree.
    pub fn snapshot(&self) -> FactTree {
        self.tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write a fact, creating intermediate mappings and preserving siblings.
    pub async fn set(&self, key: &str, value: FactValue) -> Result<()> {
        let segments = split_key(key)?;
        self.mutate(|tree| {
            insert_path(tree, &segments, value);
            true
        })
        .await?;
        tracing::debug!(key = key, "Core fact set");
        Ok(())
    }

    /// Apply several writes as one durable update.
    ///
    /// Either every write is persisted and published, or none is.
    /// Returns the number of writes that changed the tree.
    pub async fn set_many(&self, updates: Vec<(String, FactValue)>) -> Result<usize> {
        let mut parsed = Vec::with_capacity(updates.len());
        for (key, value) in &updates {
            parsed.push((split_key(key)?, value.clone()));
        }

        let mut changed = 0;
        self.mutate(|tree| {
            for (segments, value) in parsed {
                if lookup(tree, &segments) != Some(&value) {
                    insert_path(tree, &segments, value);
                    changed += 1;
                }
            }
            changed > 0
        })
        .await?;
        Ok(changed)
    }

    /// Remove a leaf or sub-tree. Deleting a missing key is a no-op.
    ///
    /// Returns whether anything was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let segments = split_key(key)?;
        let mut removed = false;
        self.mutate(|tree| {
            removed = remove_path(tree, &segments).is_some();
            removed
        })
        .await?;
        if removed {
            tracing::debug!(key = key, "Core fact deleted");
        }
        Ok(removed)
    }

    /// Number of leaf values in the tree.
    pub fn count(&self) -> usize {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        count_leaves(&tree)
    }

    /// Run `f` on a copy of the tree; if it reports a change, persist then publish.
    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut FactTree) -> bool,
    {
        let _gate = self.write_gate.lock().await;

        let mut next = self.snapshot();
        if !f(&mut next) {
            return Ok(());
        }

        if let Some(ref document) = self.document {
            document.save(&next).await?;
        }

        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }
}

/// Split a dotted key into non-empty segments.
pub fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::Validation(format!("invalid fact key '{key}'")));
    }
    Ok(segments)
}

fn lookup<'a>(tree: &'a FactTree, segments: &[&str]) -> Option<&'a Value> {
    let (last, parents) = segments.split_last()?;
    let mut node = tree;
    for segment in parents {
        node = node.get(*segment)?.as_object()?;
    }
    node.get(*last)
}

fn insert_path(tree: &mut FactTree, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = tree;
    for segment in parents {
        let slot = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        node = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    node.insert(last.to_string(), value);
}

fn remove_path(tree: &mut FactTree, segments: &[&str]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let mut node = tree;
    for segment in parents {
        node = node.get_mut(*segment)?.as_object_mut()?;
    }
    node.remove(*last)
}

fn count_leaves(tree: &FactTree) -> usize {
    tree.values()
        .map(|v| match v {
            Value::Object(map) => count_leaves(map),
            _ => 1,
        })
        .sum()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
