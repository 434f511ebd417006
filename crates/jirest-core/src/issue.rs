//! Issue records and their lifecycle
//!
//! An [`Issue`] is a shared handle over a change-tracked body plus typed
//! identity and state. It moves through three states:
//!
//! - [`Lifecycle::Stub`]: created locally, not saved yet
//! - [`Lifecycle::Unloaded`]: exists remotely, only partially known
//! - [`Lifecycle::Loaded`]: the full remote representation was merged
//!
//! An unloaded issue hydrates itself the first time a read misses.

use crate::container::Container;
use crate::lazy::{self, Hydrate, RootLink};
use crate::outcome::{Rejection, SaveOutcome};
use crate::service::IssueService;
use crate::tree::Node;
use crate::{Error, Result};
use serde_json::{Map, Value, json};
use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, warn};

/// Body fields held as typed identity instead
pub const RESERVED_FIELDS: &[&str] = &["id", "key"];

/// Where an issue stands relative to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stub,
    Unloaded,
    Loaded,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Stub => write!(f, "stub"),
            Lifecycle::Unloaded => write!(f, "unloaded"),
            Lifecycle::Loaded => write!(f, "loaded"),
        }
    }
}

/// Shared handle to an issue; clones point at the same record
#[derive(Clone)]
pub struct Issue {
    inner: Rc<IssueCell>,
}

struct IssueCell {
    me: Weak<IssueCell>,
    service: IssueService,
    state: RefCell<IssueState>,
    body: RefCell<Container>,
}

#[derive(Default)]
struct IssueState {
    id: Option<String>,
    key: Option<String>,
    persistent: bool,
    loaded: bool,
    /// Set once a create succeeded remotely without returning an identifier
    orphaned: bool,
    parent: Option<ParentLink>,
    children: Vec<Issue>,
}

impl IssueState {
    fn identifier(&self) -> Option<String> {
        self.key.clone().or_else(|| self.id.clone())
    }
}

enum ParentLink {
    /// The parent owns this issue as one of its children
    Owner(Weak<IssueCell>),
    /// Parent referenced by this issue's own data
    Reference(Issue),
}

impl ParentLink {
    fn resolve(&self) -> Option<Issue> {
        match self {
            ParentLink::Owner(weak) => weak.upgrade().map(|inner| Issue { inner }),
            ParentLink::Reference(issue) => Some(issue.clone()),
        }
    }
}

/// Key or id carried by a scalar node
pub(crate) fn identifier(node: &Node) -> Option<String> {
    node.as_value().and_then(value_identifier)
}

pub(crate) fn value_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whether a container carries a usable `key` or `id`
fn is_identified(container: &Container) -> bool {
    container.get("key").and_then(identifier).is_some()
        || container.get("id").and_then(identifier).is_some()
}

fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Number(_)) => true,
    }
}

fn has_required_create_fields(diff: &Map<String, Value>) -> bool {
    let fields = diff.get("fields");
    let at = |path: &[&str]| {
        let mut value = fields;
        for segment in path {
            value = value.and_then(|v| v.get(segment));
        }
        is_filled(value)
    };

    (at(&["project", "key"]) || at(&["project", "id"]))
        && at(&["summary"])
        && (at(&["issuetype", "name"]) || at(&["issuetype", "id"]))
}

impl Issue {
    fn with_state(service: &IssueService, state: IssueState) -> Self {
        let inner = Rc::new_cyclic(|me| IssueCell {
            me: me.clone(),
            service: service.clone(),
            state: RefCell::new(state),
            body: RefCell::new(Container::with_reserved(RESERVED_FIELDS)),
        });
        Self { inner }
    }

    /// A new local issue with empty placeholders for the create fields
    pub fn stub(service: &IssueService) -> Self {
        Self::stub_with_parent(service, None)
    }

    fn stub_with_parent(service: &IssueService, parent: Option<ParentLink>) -> Self {
        let issue = Self::with_state(
            service,
            IssueState {
                parent,
                ..IssueState::default()
            },
        );

        let skeleton = json!({
            "fields": {
                "project": {"key": "", "id": ""},
                "summary": "",
                "description": "",
                "issuetype": {"name": "", "id": ""}
            }
        });
        if let Some(skeleton) = Container::from_json(skeleton) {
            issue.inner.body.borrow_mut().merge(skeleton);
        }

        issue
    }

    /// An issue known to exist remotely, built from server data.
    ///
    /// `loaded` tells whether `seed` is the complete representation. Fails
    /// when the seed carries neither `id` nor `key`.
    pub fn from_seed(service: &IssueService, seed: Container, loaded: bool) -> Result<Self> {
        Self::from_seed_with_parent(service, seed, loaded, None)
    }

    fn from_seed_with_parent(
        service: &IssueService,
        seed: Container,
        loaded: bool,
        parent: Option<ParentLink>,
    ) -> Result<Self> {
        let has_parent = parent.is_some();
        let issue = Self::with_state(
            service,
            IssueState {
                persistent: true,
                loaded,
                parent,
                ..IssueState::default()
            },
        );
        issue.inner.merge(seed);

        if issue.identifier().is_none() {
            return Err(Error::MissingIdentity(
                "loaded issue does not provide any key or id".to_string(),
            ));
        }

        if !has_parent {
            let parent_seed = issue
                .inner
                .body
                .borrow()
                .child("fields.parent")
                .filter(|parent| is_identified(parent))
                .cloned();

            if let Some(parent_seed) = parent_seed {
                let parent = Issue::from_seed(service, parent_seed, false)?;
                issue.inner.state.borrow_mut().parent = Some(ParentLink::Reference(parent));
            }
        }

        Ok(issue)
    }

    pub fn service(&self) -> &IssueService {
        &self.inner.service
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let state = self.inner.state.borrow();
        match (state.persistent, state.loaded) {
            (false, _) => Lifecycle::Stub,
            (true, false) => Lifecycle::Unloaded,
            (true, true) => Lifecycle::Loaded,
        }
    }

    /// Whether the issue exists remotely
    pub fn is_persistent(&self) -> bool {
        self.inner.state.borrow().persistent
    }

    /// Whether the full remote representation has been merged
    pub fn is_loaded(&self) -> bool {
        self.inner.state.borrow().loaded
    }

    pub fn id(&self) -> Option<String> {
        self.inner.state.borrow().id.clone()
    }

    pub fn key(&self) -> Option<String> {
        self.inner.state.borrow().key.clone()
    }

    /// Key if known, otherwise id
    pub fn identifier(&self) -> Option<String> {
        self.inner.state.borrow().identifier()
    }

    pub fn parent(&self) -> Option<Issue> {
        self.inner.state.borrow().parent.as_ref().and_then(ParentLink::resolve)
    }

    pub fn has_parent(&self) -> bool {
        self.inner.state.borrow().parent.is_some()
    }

    /// Sub-issues created or loaded through this issue
    pub fn children(&self) -> Vec<Issue> {
        self.inner.state.borrow().children.clone()
    }

    /// Read a dotted path, hydrating the issue first if the value is
    /// missing and the issue is not fully loaded yet.
    pub fn get(&self, path: &str) -> Option<Node> {
        match path {
            "id" => self.id().map(Node::from),
            "key" => self.key().map(Node::from),
            _ => lazy::read_through(&self.inner.body, path),
        }
    }

    /// [`Issue::get`] for string values
    pub fn get_str(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|node| node.as_str().map(str::to_string))
    }

    /// Assign a tracked value at a dotted path; never touches the server
    pub fn set(&self, path: &str, value: impl Into<Node>) -> bool {
        self.inner.body.borrow_mut().set_path(path, value)
    }

    /// Borrow the body without hydrating
    pub fn body(&self) -> Ref<'_, Container> {
        self.inner.body.borrow()
    }

    pub fn with_body<R>(&self, f: impl FnOnce(&Container) -> R) -> R {
        f(&self.inner.body.borrow())
    }

    pub fn with_body_mut<R>(&self, f: impl FnOnce(&mut Container) -> R) -> R {
        f(&mut self.inner.body.borrow_mut())
    }

    /// Identity plus the current body as JSON
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(id) = self.id() {
            map.insert("id".to_string(), Value::String(id));
        }
        if let Some(key) = self.key() {
            map.insert("key".to_string(), Value::String(key));
        }
        if let Value::Object(body) = self.inner.body.borrow().to_json() {
            map.extend(body);
        }
        Value::Object(map)
    }

    /// Fetch and merge the full remote representation once.
    ///
    /// Returns `true` when new data was merged.
    pub fn hydrate(&self) -> bool {
        self.inner.hydrate()
    }

    /// Pending changes as they would be sent by [`Issue::save`]
    pub fn diff(&self) -> Map<String, Value> {
        self.inner.body.borrow().recursive_diff(false)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.diff().is_empty()
    }

    /// Create or update the issue remotely.
    ///
    /// Expected failures come back as [`SaveOutcome::Rejected`]. An `Err`
    /// means the issue was created remotely but could not be linked; the
    /// object must not be saved again.
    pub fn save(&self) -> Result<SaveOutcome> {
        let (persistent, orphaned, parent) = {
            let state = self.inner.state.borrow();
            (
                state.persistent,
                state.orphaned,
                state.parent.as_ref().map(ParentLink::resolve),
            )
        };

        if orphaned {
            return Err(Error::OrphanedWrite("issue"));
        }

        if let Some(parent) = parent {
            if !parent.is_some_and(|p| p.is_persistent()) {
                return Ok(SaveOutcome::Rejected(Rejection::ParentNotPersistent));
            }
            if !persistent && !self.has_parent_reference() {
                return Ok(SaveOutcome::Rejected(Rejection::MissingParentReference));
            }
        }

        let diff = self.diff();
        if persistent {
            Ok(self.update(diff))
        } else {
            self.create(diff)
        }
    }

    fn has_parent_reference(&self) -> bool {
        let body = self.inner.body.borrow();
        body.child("fields.parent").is_some_and(is_identified)
    }

    fn update(&self, diff: Map<String, Value>) -> SaveOutcome {
        if diff.is_empty() {
            debug!(issue = ?self.identifier(), "nothing to save");
            return SaveOutcome::Unchanged;
        }

        let Some(identifier) = self.identifier() else {
            return SaveOutcome::Rejected(Rejection::MissingIdentifier);
        };

        let path = format!("issue/{identifier}");
        match self.inner.service.transport().put(&path, &Value::Object(diff)) {
            Some(_) => {
                self.inner.body.borrow_mut().recursive_reset();
                debug!(issue = %identifier, "updated issue");
                SaveOutcome::Updated
            }
            None => SaveOutcome::Rejected(Rejection::Transport),
        }
    }

    fn create(&self, diff: Map<String, Value>) -> Result<SaveOutcome> {
        if !has_required_create_fields(&diff) {
            return Ok(SaveOutcome::Rejected(Rejection::MissingRequiredFields));
        }

        let Some(response) = self.inner.service.transport().post("issue", &Value::Object(diff)) else {
            return Ok(SaveOutcome::Rejected(Rejection::Transport));
        };

        let response = Container::from_json(response).unwrap_or_default();
        if !is_identified(&response) {
            self.inner.state.borrow_mut().orphaned = true;
            error!("issue was created but the response carries no key or id");
            return Err(Error::OrphanedWrite("issue"));
        }

        self.inner.merge(response);
        self.inner.body.borrow_mut().recursive_reset();
        {
            let mut state = self.inner.state.borrow_mut();
            state.persistent = true;
            state.loaded = true;
        }
        info!(issue = ?self.identifier(), "created issue");

        self.backfill_children();
        Ok(SaveOutcome::Created)
    }

    /// Point every owned child at this issue's freshly learned identity
    fn backfill_children(&self) {
        let (key, id) = (self.key(), self.id());
        for child in self.children() {
            if let Some(key) = &key {
                child.set("fields.parent.key", key);
            } else if let Some(id) = &id {
                child.set("fields.parent.id", id);
            }
        }
    }

    /// Sub-issues listed in `fields.subtasks`, converted once into child
    /// issues. Issues that have a parent cannot have sub-issues.
    pub fn sub_issues(&self) -> Result<Vec<Issue>> {
        if self.has_parent() {
            return Ok(Vec::new());
        }

        let children = self.children();
        if !children.is_empty() {
            return Ok(children);
        }

        let Some(Node::List(raw)) = self.get("fields.subtasks") else {
            return Ok(Vec::new());
        };

        let mut children = Vec::with_capacity(raw.len());
        for node in raw {
            if let Node::Tree(seed) = node {
                let owner = ParentLink::Owner(self.inner.me.clone());
                children.push(Issue::from_seed_with_parent(
                    &self.inner.service,
                    seed,
                    false,
                    Some(owner),
                )?);
            }
        }

        if let Some(fields) = self.inner.body.borrow_mut().child_mut("fields") {
            fields.insert_untracked("subtasks", Node::List(Vec::new()));
        }
        self.inner.state.borrow_mut().children.extend(children.iter().cloned());

        Ok(children)
    }

    /// Create an unsaved sub-issue owned by this issue.
    ///
    /// The parent reference and the project are filled in when this issue
    /// already exists remotely. `None` if this issue is itself a sub-issue.
    pub fn create_sub_issue(&self) -> Option<Issue> {
        if self.has_parent() {
            return None;
        }

        let owner = ParentLink::Owner(self.inner.me.clone());
        let child = Issue::stub_with_parent(&self.inner.service, Some(owner));
        child.with_body_mut(|body| {
            if let Some(fields) = body.child_mut("fields") {
                fields.add_child("parent", None);
            }
        });

        if self.is_persistent() {
            if let Some(key) = self.key() {
                child.set("fields.parent.key", key);
            } else if let Some(id) = self.id() {
                child.set("fields.parent.id", id);
            }

            let project_key = self.get_str("fields.project.key").filter(|k| !k.is_empty());
            let project_id = self.get("fields.project.id").as_ref().and_then(identifier);
            if let Some(key) = project_key {
                child.set("fields.project.key", key);
            } else if let Some(id) = project_id {
                child.set("fields.project.id", id);
            }
        }

        self.inner.state.borrow_mut().children.push(child.clone());
        Some(child)
    }

    pub fn ptr_eq(a: &Issue, b: &Issue) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl IssueCell {
    /// Merge server data: identity into the typed fields, everything else
    /// into the body, then link every nested container to this issue.
    fn merge(&self, incoming: Container) {
        {
            let mut state = self.state.borrow_mut();
            if let Some(id) = incoming.get("id").and_then(identifier) {
                state.id = Some(id);
            }
            if let Some(key) = incoming.get("key").and_then(identifier) {
                state.key = Some(key);
            }
        }

        let root: RootLink = self.me.clone();
        let mut body = self.body.borrow_mut();
        body.merge(incoming);
        body.stamp_root(&root);
    }
}

impl Hydrate for IssueCell {
    fn hydrate(&self) -> bool {
        let identifier = {
            let mut state = self.state.borrow_mut();
            if !state.persistent || state.loaded {
                return false;
            }
            match state.identifier() {
                Some(identifier) => identifier,
                None => {
                    warn!("persistent issue has no key or id, treating it as unsaved");
                    state.persistent = false;
                    return false;
                }
            }
        };

        debug!(issue = %identifier, "hydrating issue");
        let Some(response) = self.service.transport().get(&format!("issue/{identifier}"), &[]) else {
            return false;
        };
        let Some(fetched) = Container::from_json(response) else {
            warn!(issue = %identifier, "issue response is not an object");
            return false;
        };

        self.merge(fetched);
        self.state.borrow_mut().loaded = true;
        true
    }
}

impl PartialEq for Issue {
    fn eq(&self, other: &Self) -> bool {
        Issue::ptr_eq(self, other)
    }
}

impl std::fmt::Debug for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Issue")
            .field("id", &state.id)
            .field("key", &state.key)
            .field("persistent", &state.persistent)
            .field("loaded", &state.loaded)
            .finish()
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary = self
            .inner
            .body
            .borrow()
            .get_path("fields.summary")
            .and_then(Node::as_str)
            .unwrap_or_default()
            .to_string();
        match self.identifier() {
            Some(identifier) => write!(f, "{identifier} - {summary}"),
            None => write!(f, "(new) - {summary}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use std::cell::Cell;

    /// Answers nothing and counts every request
    #[derive(Default)]
    struct Silent {
        requests: Cell<usize>,
    }

    impl Silent {
        fn hit(&self) {
            self.requests.set(self.requests.get() + 1);
        }
    }

    impl Transport for Silent {
        fn get(&self, _path: &str, _query: &[(&str, &str)]) -> Option<Value> {
            self.hit();
            None
        }

        fn post(&self, _path: &str, _body: &Value) -> Option<Value> {
            self.hit();
            None
        }

        fn put(&self, _path: &str, _body: &Value) -> Option<Value> {
            self.hit();
            None
        }

        fn delete(&self, _path: &str, _query: &[(&str, &str)]) -> bool {
            self.hit();
            false
        }
    }

    fn service() -> (Rc<Silent>, IssueService) {
        let transport = Rc::new(Silent::default());
        let service = IssueService::new(transport.clone());
        (transport, service)
    }

    #[test]
    fn test_persistent_issue_without_identity_is_demoted() {
        let (transport, service) = service();
        let issue = Issue::with_state(
            &service,
            IssueState {
                persistent: true,
                ..IssueState::default()
            },
        );
        assert_eq!(issue.lifecycle(), Lifecycle::Unloaded);

        assert!(!issue.hydrate());
        assert_eq!(issue.lifecycle(), Lifecycle::Stub);
        assert_eq!(transport.requests.get(), 0);

        assert!(!issue.hydrate());
        assert!(issue.get("fields.summary").is_none());
        assert_eq!(transport.requests.get(), 0);
    }

    #[test]
    fn test_diff_while_body_is_borrowed() {
        let (_transport, service) = service();
        let issue = Issue::stub(&service);
        issue.set("fields.summary", "held");

        let body = issue.body();
        assert!(issue.has_pending_changes());
        let diff = issue.diff();
        assert_eq!(*body.last_diff(), diff);
        assert_eq!(diff["fields"]["summary"], "held");
    }

    #[test]
    fn test_required_create_fields() {
        let diff = json!({
            "fields": {
                "project": {"key": "PRJ"},
                "summary": "A thing",
                "issuetype": {"id": "3"}
            }
        });
        assert!(has_required_create_fields(diff.as_object().unwrap()));

        let missing_type = json!({
            "fields": {"project": {"id": 1}, "summary": "A thing", "issuetype": {"name": ""}}
        });
        assert!(!has_required_create_fields(missing_type.as_object().unwrap()));

        assert!(!has_required_create_fields(&Map::new()));
    }

    #[test]
    fn test_identifier_from_scalars() {
        assert_eq!(identifier(&Node::from("PRJ-1")), Some("PRJ-1".to_string()));
        assert_eq!(identifier(&Node::from(10001_i64)), Some("10001".to_string()));
        assert_eq!(identifier(&Node::from("")), None);
        assert_eq!(identifier(&Node::Scalar(Value::Null)), None);
    }
}
