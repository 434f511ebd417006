//! Workflow transitions
//!
//! A [`Transition`] is built against one issue, optionally carries a
//! comment, and can be executed once.

use crate::container::Container;
use crate::issue::{Issue, value_identifier};
use crate::outcome::{Rejection, SaveOutcome};
use crate::tree::Node;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

/// A pending workflow transition of an issue
pub struct Transition {
    issue: Issue,
    body: Container,
    completed: bool,
}

impl Transition {
    /// Raw `transitions` response for the issue's current status
    pub fn available_raw(issue: &Issue) -> Option<Value> {
        let identifier = issue.identifier()?;
        issue
            .service()
            .transport()
            .get(&format!("issue/{identifier}/transitions"), &[])
    }

    /// Transitions available from the issue's current status, as
    /// transition id → target status
    pub fn available(issue: &Issue) -> Option<IndexMap<String, Value>> {
        let response = Self::available_raw(issue)?;
        let transitions = response.get("transitions")?.as_array()?;

        Some(
            transitions
                .iter()
                .filter_map(|transition| {
                    let id = transition.get("id").and_then(value_identifier)?;
                    let target = transition.get("to").cloned().unwrap_or(Value::Null);
                    Some((id, target))
                })
                .collect(),
        )
    }

    pub fn new(issue: &Issue, transition_id: Option<&str>) -> Self {
        let mut body = Container::new();
        body.add_child("fields", None);
        body.add_child("transition", None);
        if let Some(id) = transition_id {
            body.set_path("transition.id", id);
        }

        Self {
            issue: issue.clone(),
            body,
            completed: false,
        }
    }

    pub fn issue(&self) -> &Issue {
        &self.issue
    }

    pub fn id(&self) -> Option<String> {
        self.body
            .get_path("transition.id")
            .and_then(Node::as_value)
            .and_then(value_identifier)
    }

    pub fn set_id(&mut self, id: &str) -> bool {
        self.body.set_path("transition.id", id)
    }

    /// Set a field that is updated along with the transition
    pub fn set_field(&mut self, path: &str, value: impl Into<Node>) -> bool {
        match self.body.child_mut("fields") {
            Some(fields) => fields.set_path(path, value),
            None => false,
        }
    }

    /// Attach a comment added when the transition runs; replaces an earlier one
    pub fn add_comment(&mut self, message: &str) -> bool {
        if message.is_empty() {
            return false;
        }

        let Some(update) = self.body.add_child("update", None) else {
            return false;
        };
        update.add_list("comment");
        let Some(comments) = update.list_mut("comment") else {
            return false;
        };

        match comments.first_mut() {
            Some(Node::Tree(comment)) => comment.set_path("add.body", message),
            Some(_) => false,
            None => {
                let mut comment = Container::new();
                comment.set_path("add.body", message);
                comments.push(Node::Tree(comment));
                true
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Payload that [`Transition::execute`] would send
    pub fn payload(&self) -> Value {
        Value::Object(self.body.recursive_diff(true))
    }

    /// Run the transition and record the new status on the issue.
    ///
    /// Once completed, further calls do nothing and report
    /// [`SaveOutcome::Unchanged`].
    pub fn execute(&mut self) -> SaveOutcome {
        if self.completed {
            return SaveOutcome::Unchanged;
        }

        let Some(transition_id) = self.id() else {
            return SaveOutcome::Rejected(Rejection::MissingRequiredFields);
        };
        if !self.issue.is_persistent() {
            return SaveOutcome::Rejected(Rejection::NotPersistent);
        }
        let Some(identifier) = self.issue.identifier() else {
            return SaveOutcome::Rejected(Rejection::MissingIdentifier);
        };

        let Some(transitions) = Self::available(&self.issue) else {
            return SaveOutcome::Rejected(Rejection::Transport);
        };
        let Some(target) = transitions.get(&transition_id).cloned() else {
            return SaveOutcome::Rejected(Rejection::UnknownTransition);
        };

        let payload = self.payload();
        let path = format!("issue/{identifier}/transitions");
        if self.issue.service().transport().post(&path, &payload).is_none() {
            return SaveOutcome::Rejected(Rejection::Transport);
        }

        self.issue.with_body_mut(|body| {
            if let Some(fields) = body.add_child("fields", None) {
                fields.insert_untracked("status", target);
            }
        });
        debug!(issue = %identifier, transition = %transition_id, "transition executed");

        self.completed = true;
        SaveOutcome::Updated
    }
}
