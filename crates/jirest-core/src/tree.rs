//! Nested containers
//!
//! Field values are [`Node`]s: a scalar, a nested [`Container`], a list (one
//! level deep) or an embedded issue record. This module builds trees from
//! raw JSON and implements the recursive operations: diff, reset, merge and
//! root stamping.
//!
//! Lists are not correlated element by element between the local and the
//! remote side. A merge overwrites them wholesale and the list diff is best
//! effort.

use crate::container::Container;
use crate::issue::Issue;
use crate::lazy::RootLink;
use serde_json::{Map, Value};

/// A field value inside a [`Container`]
#[derive(Debug, Clone)]
pub enum Node {
    /// Any JSON value that is not an object. Arrays nested inside a list
    /// are kept here untouched.
    Scalar(Value),
    /// Nested container owned by its parent field
    Tree(Container),
    /// Ordered list of scalars and containers
    List(Vec<Node>),
    /// Embedded root entity; keeps its own tracking and hydration
    Record(Issue),
}

/// Build a [`Node`] from raw JSON.
///
/// Objects become containers, arrays become lists whose object elements
/// become containers. Arrays of arrays are not descended into.
pub fn transform(value: Value) -> Node {
    match value {
        Value::Object(map) => Node::Tree(Container::from_map(map)),
        Value::Array(items) => Node::List(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Node::Tree(Container::from_map(map)),
                    other => Node::Scalar(other),
                })
                .collect(),
        ),
        other => Node::Scalar(other),
    }
}

impl Node {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_tree(&self) -> Option<&Container> {
        match self {
            Node::Tree(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tree_mut(&mut self) -> Option<&mut Container> {
        match self {
            Node::Tree(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Issue> {
        match self {
            Node::Record(issue) => Some(issue),
            _ => None,
        }
    }

    /// Full JSON rendering of this value
    pub fn to_json(&self) -> Value {
        match self {
            Node::Scalar(v) => v.clone(),
            Node::Tree(c) => c.to_json(),
            Node::List(items) => Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Record(issue) => issue.to_json(),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Scalar(a), Node::Scalar(b)) => a == b,
            (Node::Tree(a), Node::Tree(b)) => a == b,
            (Node::List(a), Node::List(b)) => a == b,
            (Node::Record(a), Node::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        transform(value)
    }
}

impl From<Container> for Node {
    fn from(container: Container) -> Self {
        Node::Tree(container)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::List(items)
    }
}

impl From<Issue> for Node {
    fn from(issue: Issue) -> Self {
        Node::Record(issue)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Scalar(Value::String(s.to_string()))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Scalar(Value::String(s))
    }
}

impl From<&String> for Node {
    fn from(s: &String) -> Self {
        Node::Scalar(Value::String(s.clone()))
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Scalar(Value::Bool(b))
    }
}

impl From<i32> for Node {
    fn from(n: i32) -> Self {
        Node::Scalar(Value::from(n))
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Scalar(Value::from(n))
    }
}

impl From<u64> for Node {
    fn from(n: u64) -> Self {
        Node::Scalar(Value::from(n))
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::Scalar(Value::from(n))
    }
}

/// Result of resolving a dotted path without side effects
pub(crate) enum Lookup {
    Found(Node),
    /// Nothing at the path; carries the root link of the deepest container
    /// that was reached.
    Missing(Option<RootLink>),
    /// The path runs into an embedded record; the rest of the path must be
    /// read from the record itself.
    Delegate(Issue, String),
}

/// Split a dotted path, rejecting empty segments
pub(crate) fn split_path(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

impl Container {
    /// Build a container from a JSON object; `None` for any other value
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from_map(map)),
            _ => None,
        }
    }

    /// Build a container from a JSON object map, without tracking
    pub fn from_map(map: Map<String, Value>) -> Self {
        let mut container = Self::new();
        for (field, value) in map {
            container.values.insert(field, transform(value));
        }
        container
    }

    /// Attach an owned sub-container at `field`.
    ///
    /// The attachment itself is not tracked. When the field already holds a
    /// container that one is returned and `subtree` is dropped; when it
    /// holds anything else, nothing is replaced and `None` is returned.
    pub fn add_child(&mut self, field: &str, subtree: Option<Container>) -> Option<&mut Container> {
        if self.is_reserved(field) {
            return None;
        }

        if !self.values.contains_key(field) {
            let mut node = Node::Tree(subtree.unwrap_or_default());
            self.adopt(&mut node);
            self.values.insert(field.to_string(), node);
        }

        self.values.get_mut(field).and_then(Node::as_tree_mut)
    }

    /// Attach an empty, untracked list at `field`. Fails if the field exists.
    pub fn add_list(&mut self, field: &str) -> bool {
        if self.is_reserved(field) || self.values.contains_key(field) {
            return false;
        }
        self.values.insert(field.to_string(), Node::List(Vec::new()));
        true
    }

    /// Mutable access to the list stored at `field`
    pub fn list_mut(&mut self, field: &str) -> Option<&mut Vec<Node>> {
        match self.values.get_mut(field) {
            Some(Node::List(items)) => Some(items),
            _ => None,
        }
    }

    /// Nested container at a dotted path
    pub fn child(&self, path: &str) -> Option<&Container> {
        let mut current = self;
        for segment in split_path(path)? {
            current = current.values.get(segment)?.as_tree()?;
        }
        Some(current)
    }

    pub fn child_mut(&mut self, path: &str) -> Option<&mut Container> {
        let mut current = self;
        for segment in split_path(path)? {
            current = current.values.get_mut(segment)?.as_tree_mut()?;
        }
        Some(current)
    }

    /// Value at a dotted path, without any remote access
    pub fn get_path(&self, path: &str) -> Option<&Node> {
        let segments = split_path(path)?;
        let (last, parents) = segments.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.values.get(*segment)?.as_tree()?;
        }
        current.values.get(*last)
    }

    /// [`Container::set`] the last segment of a dotted path, creating the
    /// intermediate containers as needed.
    pub fn set_path(&mut self, path: &str, value: impl Into<Node>) -> bool {
        let Some(segments) = split_path(path) else {
            return false;
        };
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };

        let mut current = self;
        for segment in parents {
            match current.add_child(segment, None) {
                Some(child) => current = child,
                None => return false,
            }
        }
        current.set(last, value)
    }

    /// Diff of every change below this container.
    ///
    /// A nested container is included only when its own diff is non-empty,
    /// unless the container itself was reassigned, in which case it is
    /// included in full. Other fields are included when they were changed.
    /// With `traverse_arrays`, every list is included and rebuilt from the
    /// diffs of its containers. Records never appear in the diff.
    pub fn recursive_diff(&self, traverse_arrays: bool) -> Map<String, Value> {
        let mut diff = Map::new();

        for (field, node) in &self.values {
            let changed = self.changed.contains(field);

            match node {
                Node::Record(_) => {}
                Node::Tree(child) => {
                    let sub = child.recursive_diff(traverse_arrays);
                    if changed {
                        diff.insert(field.clone(), child.to_json());
                    } else if !sub.is_empty() {
                        diff.insert(field.clone(), Value::Object(sub));
                    }
                }
                Node::List(items) => {
                    if changed {
                        diff.insert(field.clone(), Value::Array(items.iter().map(Node::to_json).collect()));
                    } else if traverse_arrays {
                        diff.insert(field.clone(), Value::Array(diff_list(items, traverse_arrays)));
                    }
                }
                Node::Scalar(value) => {
                    if changed {
                        diff.insert(field.clone(), value.clone());
                    }
                }
            }
        }

        self.last_diff.replace(diff.clone());
        diff
    }

    /// Clear tracking here and in every nested container, lists included
    pub fn recursive_reset(&mut self) {
        self.reset_changes();

        for node in self.values.values_mut() {
            match node {
                Node::Tree(child) => child.recursive_reset(),
                Node::List(items) => {
                    for item in items.iter_mut() {
                        if let Node::Tree(child) = item {
                            child.recursive_reset();
                        }
                    }
                }
                Node::Scalar(_) | Node::Record(_) => {}
            }
        }
    }

    /// Reconcile `incoming` into this container.
    ///
    /// Containers present on both sides are merged recursively, every other
    /// incoming field overwrites the local one. Local fields missing from
    /// `incoming` are kept. Nothing is tracked, and an overwritten field no
    /// longer counts as reverted when set back to its earlier value.
    pub fn merge(&mut self, incoming: Container) {
        for (field, node) in incoming.values {
            if self.is_reserved(&field) {
                continue;
            }

            match node {
                Node::Tree(theirs) => match self.values.get_mut(&field) {
                    Some(Node::Tree(mine)) => mine.merge(theirs),
                    _ => self.overwrite(field, Node::Tree(theirs)),
                },
                other => self.overwrite(field, other),
            }
        }
    }

    fn overwrite(&mut self, field: String, mut node: Node) {
        self.adopt(&mut node);
        self.baseline.shift_remove(&field);
        self.values.insert(field, node);
    }

    /// Link this container and every nested one to `root`.
    ///
    /// Embedded records keep their own root and are not entered.
    pub fn stamp_root(&mut self, root: &RootLink) {
        self.root = Some(root.clone());

        for node in self.values.values_mut() {
            match node {
                Node::Tree(child) => child.stamp_root(root),
                Node::List(items) => {
                    for item in items.iter_mut() {
                        if let Node::Tree(child) = item {
                            child.stamp_root(root);
                        }
                    }
                }
                Node::Scalar(_) | Node::Record(_) => {}
            }
        }
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    /// Propagate this container's root link into a value about to be stored
    pub(crate) fn adopt(&self, node: &mut Node) {
        let Some(root) = &self.root else {
            return;
        };

        match node {
            Node::Tree(child) => child.stamp_root(root),
            Node::List(items) => {
                for item in items.iter_mut() {
                    if let Node::Tree(child) = item {
                        child.stamp_root(root);
                    }
                }
            }
            Node::Scalar(_) | Node::Record(_) => {}
        }
    }

    pub(crate) fn lookup(&self, path: &str) -> Lookup {
        let Some(segments) = split_path(path) else {
            return Lookup::Missing(None);
        };

        let mut current = self;
        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            match current.values.get(*segment) {
                None => return Lookup::Missing(current.root.clone()),
                Some(node) if last => return Lookup::Found(node.clone()),
                Some(Node::Tree(child)) => current = child,
                Some(Node::Record(issue)) => {
                    return Lookup::Delegate(issue.clone(), segments[index + 1..].join("."));
                }
                Some(_) => return Lookup::Missing(current.root.clone()),
            }
        }

        Lookup::Missing(current.root.clone())
    }
}

fn diff_list(items: &[Node], traverse_arrays: bool) -> Vec<Value> {
    let mut rebuilt = Vec::with_capacity(items.len());

    for item in items {
        match item {
            Node::Tree(child) => {
                let sub = child.recursive_diff(traverse_arrays);
                if !sub.is_empty() {
                    rebuilt.push(Value::Object(sub));
                }
            }
            Node::Record(_) => {}
            other => rebuilt.push(other.to_json()),
        }
    }

    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn tree(value: Value) -> Container {
        Container::from_json(value).unwrap()
    }

    #[test]
    fn test_transform_nesting() {
        let c = tree(json!({
            "key": "PRJ-1",
            "fields": {"project": {"key": "PRJ"}},
            "labels": ["a", "b"],
            "components": [{"name": "core"}, "loose", [{"deep": true}]]
        }));

        assert!(c.get("fields").and_then(Node::as_tree).is_some());
        assert_eq!(c.child("fields.project").unwrap().get("key").unwrap().as_str(), Some("PRJ"));

        let components = c.get("components").and_then(Node::as_list).unwrap();
        assert!(matches!(components[0], Node::Tree(_)));
        assert!(matches!(components[1], Node::Scalar(Value::String(_))));
        // arrays of arrays stay raw
        assert!(matches!(components[2], Node::Scalar(Value::Array(_))));
        assert_eq!(c.changed_keys().count(), 0);
    }

    #[test]
    fn test_transform_roundtrips_shape() {
        let raw = json!({"a": {"b": [1, {"c": null}]}, "d": 1.5});
        assert_eq!(tree(raw.clone()).to_json(), raw);
    }

    #[test]
    fn test_nested_diff_omits_empty_subtrees() {
        let mut c = tree(json!({
            "fields": {"summary": "old", "project": {"key": "PRJ"}},
            "other": {"x": 1}
        }));

        c.set_path("fields.summary", "new");

        assert_eq!(c.recursive_diff(false), object(json!({"fields": {"summary": "new"}})));
    }

    #[test]
    fn test_reassigned_subtree_is_sent_in_full() {
        let mut c = Container::new();
        c.set("project", tree(json!({"key": "PRJ"})));
        assert_eq!(c.diff(), object(json!({"project": {"key": "PRJ"}})));
    }

    #[test]
    fn test_scalar_array_needs_own_change() {
        let mut c = tree(json!({"labels": ["a"]}));
        assert!(c.diff().is_empty());

        c.set("labels", json!(["a", "b"]));
        assert_eq!(c.diff(), object(json!({"labels": ["a", "b"]})));
    }

    #[test]
    fn test_traverse_arrays_rebuilds_from_sub_diffs() {
        let mut c = Container::new();
        let update = c.add_child("update", None).unwrap();
        assert!(update.add_list("comment"));

        let mut comment = Container::new();
        comment.set_path("add.body", "hello");
        update.list_mut("comment").unwrap().push(Node::Tree(comment));
        update.list_mut("comment").unwrap().push(Node::Tree(Container::new()));

        assert!(c.recursive_diff(false).is_empty());
        assert_eq!(
            c.recursive_diff(true),
            object(json!({"update": {"comment": [{"add": {"body": "hello"}}]}}))
        );
    }

    #[test]
    fn test_recursive_reset_clears_everything() {
        let mut c = tree(json!({"a": {"b": {"c": 1}}, "list": [{"x": 1}]}));
        c.set_path("a.b.c", 2);
        c.set_path("a.new", true);
        if let Some(Node::Tree(item)) = c.list_mut("list").unwrap().first_mut() {
            item.set("x", 2);
        }

        assert!(!c.recursive_diff(true).is_empty());
        c.recursive_reset();
        assert!(c.recursive_diff(false).is_empty());
        assert_eq!(c.recursive_diff(true), object(json!({"list": []})));
        assert!(!c.has_changes());
    }

    #[test]
    fn test_merge_reconciles_nested_containers() {
        let mut c = tree(json!({"a": {"y": 2}, "keep": true}));
        c.merge(tree(json!({"a": {"x": 1}})));

        assert_eq!(c.to_json(), json!({"a": {"y": 2, "x": 1}, "keep": true}));
        assert!(c.diff().is_empty());
    }

    #[test]
    fn test_merge_overwrites_scalars_and_lists() {
        let mut c = tree(json!({"s": 1, "l": [1, 2], "t": {"v": 1}}));
        c.merge(tree(json!({"s": "two", "l": [3], "t": 5, "n": null})));

        assert_eq!(c.to_json(), json!({"s": "two", "l": [3], "t": 5, "n": null}));
    }

    #[test]
    fn test_merge_skips_reserved_fields() {
        let mut c = Container::with_reserved(&["id"]);
        c.merge(tree(json!({"id": "1", "self": "url"})));
        assert!(!c.contains("id"));
        assert!(c.contains("self"));
    }

    #[test]
    fn test_nested_revert_leaves_nothing_to_send() {
        let mut c = tree(json!({"fields": {"summary": "old", "status": {"name": "Open"}}}));
        c.set_path("fields.summary", "new");
        c.set_path("fields.status.name", "Done");
        c.set_path("fields.summary", "old");

        assert_eq!(c.diff(), object(json!({"fields": {"status": {"name": "Done"}}})));

        c.set_path("fields.status.name", "Open");
        assert!(c.diff().is_empty());
        assert!(!c.has_changes());
    }

    #[test]
    fn test_merged_value_is_no_revert_target() {
        let mut c = tree(json!({"s": 1}));
        c.set("s", 2);
        c.merge(tree(json!({"s": 3})));

        c.set("s", 1);
        assert!(c.is_changed("s"));
        assert_eq!(c.diff(), object(json!({"s": 1})));
    }

    #[test]
    fn test_add_child_never_replaces_values() {
        let mut c = tree(json!({"summary": "x", "fields": {"a": 1}}));

        assert!(c.add_child("summary", None).is_none());
        assert_eq!(c.get("summary").unwrap().as_str(), Some("x"));

        let fields = c.add_child("fields", Some(tree(json!({"b": 2})))).unwrap();
        assert!(fields.contains("a"));
        assert!(!fields.contains("b"));

        assert!(c.add_child("fresh", None).is_some());
        assert!(c.diff().is_empty());
    }

    #[test]
    fn test_set_path_through_scalar_fails() {
        let mut c = tree(json!({"summary": "x"}));
        assert!(!c.set_path("summary.inner", 1));
        assert!(!c.set_path("a..b", 1));
        assert_eq!(c.to_json(), json!({"summary": "x"}));
    }

    #[test]
    fn test_get_path() {
        let c = tree(json!({"fields": {"status": {"name": "Open"}}}));
        assert_eq!(c.get_path("fields.status.name").and_then(Node::as_str), Some("Open"));
        assert!(c.get_path("fields.status.id").is_none());
        assert!(c.get_path("fields.status.name.x").is_none());
    }
}
