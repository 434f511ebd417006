//! Change-tracked field bag
//!
//! A [`Container`] holds an arbitrary, insertion-ordered set of fields and
//! remembers which of them currently differ from their value when it was
//! built or last reset. Nesting, diffing and merging live in [`crate::tree`].

use crate::lazy::RootLink;
use crate::tree::Node;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::cell::{Ref, RefCell};

/// Dynamic, change-tracked record of JSON-shaped fields
#[derive(Clone, Default)]
pub struct Container {
    pub(crate) values: IndexMap<String, Node>,
    pub(crate) changed: IndexSet<String>,
    /// Value of each changed field before its first tracked assignment,
    /// `None` when the field did not exist
    pub(crate) baseline: IndexMap<String, Option<Node>>,
    pub(crate) last_diff: RefCell<Map<String, Value>>,
    pub(crate) reserved: &'static [&'static str],
    pub(crate) root: Option<RootLink>,
}

impl Container {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty container whose `reserved` field names can never be
    /// written through [`Container::set`] or [`Container::merge`].
    pub fn with_reserved(reserved: &'static [&'static str]) -> Self {
        Self {
            reserved,
            ..Self::default()
        }
    }

    /// Whether `field` may not be written from outside
    pub fn is_reserved(&self, field: &str) -> bool {
        field.is_empty() || self.reserved.contains(&field)
    }

    /// Current value of `field`, if any
    pub fn get(&self, field: &str) -> Option<&Node> {
        self.values.get(field)
    }

    pub(crate) fn get_mut(&mut self, field: &str) -> Option<&mut Node> {
        self.values.get_mut(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Field names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Assign `value` to `field` and track the change.
    ///
    /// Returns `false` without touching anything when the field is reserved
    /// or malformed, or when the stored value is already equal to `value`.
    /// Assigning back the value the field had before its first change
    /// untracks it again.
    pub fn set(&mut self, field: &str, value: impl Into<Node>) -> bool {
        if self.is_reserved(field) {
            return false;
        }

        let mut value = value.into();
        if self.values.get(field) == Some(&value) {
            return false;
        }

        if !self.changed.contains(field) {
            self.baseline
                .insert(field.to_string(), self.values.get(field).cloned());
        }

        let reverted = matches!(self.baseline.get(field), Some(Some(old)) if *old == value);
        self.adopt(&mut value);
        self.values.insert(field.to_string(), value);

        if reverted {
            self.changed.shift_remove(field);
            self.baseline.shift_remove(field);
        } else {
            self.changed.insert(field.to_string());
        }
        true
    }

    /// Write a value without recording a change
    pub(crate) fn insert_untracked(&mut self, field: &str, value: impl Into<Node>) -> bool {
        if self.is_reserved(field) {
            return false;
        }

        let mut value = value.into();
        self.adopt(&mut value);
        self.values.insert(field.to_string(), value);
        self.baseline.shift_remove(field);
        true
    }

    /// Fields whose value differs from the one they had at the last reset,
    /// in order of their first assignment
    pub fn changed_keys(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    pub fn is_changed(&self, field: &str) -> bool {
        self.changed.contains(field)
    }

    /// Forget the tracked changes of this container only.
    ///
    /// Nested containers keep theirs; see [`Container::recursive_reset`].
    pub fn reset_changes(&mut self) {
        self.changed.clear();
        self.baseline.clear();
    }

    /// Diff of everything changed since the last reset, nested containers
    /// included. The result is cached and available through
    /// [`Container::last_diff`]; tracking is left untouched.
    pub fn diff(&self) -> Map<String, Value> {
        self.recursive_diff(false)
    }

    /// The diff computed by the most recent call to [`Container::diff`].
    ///
    /// The returned guard must be dropped before this container is diffed
    /// again.
    pub fn last_diff(&self) -> Ref<'_, Map<String, Value>> {
        self.last_diff.borrow()
    }

    /// Whether [`Container::diff`] would currently be non-empty
    pub fn has_changes(&self) -> bool {
        let own = self
            .changed
            .iter()
            .any(|field| !matches!(self.values.get(field), Some(Node::Record(_)) | None));

        own || self.values.iter().any(|(field, node)| match node {
            Node::Tree(child) => !self.changed.contains(field) && child.has_changes(),
            _ => false,
        })
    }

    /// Full JSON rendering of the current values
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("values", &self.values)
            .field("changed", &self.changed)
            .finish()
    }
}
