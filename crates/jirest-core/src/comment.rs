//! Issue comments

use crate::issue::value_identifier;
use crate::outcome::{Rejection, SaveOutcome};
use crate::service::CommentService;
use crate::{Error, Result};
use serde_json::json;
use tracing::error;

/// A comment on one issue
pub struct Comment {
    service: CommentService,
    issue: String,
    body: String,
    id: Option<String>,
    saved_body: Option<String>,
    orphaned: bool,
}

impl Comment {
    pub(crate) fn new(service: CommentService, issue: &str) -> Self {
        Self {
            service,
            issue: issue.to_string(),
            body: String::new(),
            id: None,
            saved_body: None,
            orphaned: false,
        }
    }

    /// Key or id of the commented issue
    pub fn issue(&self) -> &str {
        &self.issue
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Server id, once created
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Create the comment, or update its body if it already exists
    pub fn save(&mut self) -> Result<SaveOutcome> {
        if self.orphaned {
            return Err(Error::OrphanedWrite("comment"));
        }
        if self.issue.is_empty() {
            return Ok(SaveOutcome::Rejected(Rejection::MissingIdentifier));
        }

        let payload = json!({ "body": self.body });

        let Some(id) = self.id.clone() else {
            let path = format!("issue/{}/comment", self.issue);
            let Some(response) = self.service.transport().post(&path, &payload) else {
                return Ok(SaveOutcome::Rejected(Rejection::Transport));
            };

            let Some(id) = response.get("id").and_then(value_identifier) else {
                self.orphaned = true;
                error!(issue = %self.issue, "comment was created but the response carries no id");
                return Err(Error::OrphanedWrite("comment"));
            };

            self.id = Some(id);
            self.saved_body = Some(self.body.clone());
            return Ok(SaveOutcome::Created);
        };

        if self.saved_body.as_deref() == Some(self.body.as_str()) {
            return Ok(SaveOutcome::Unchanged);
        }

        let path = format!("issue/{}/comment/{id}", self.issue);
        match self.service.transport().put(&path, &payload) {
            Some(_) => {
                self.saved_body = Some(self.body.clone());
                Ok(SaveOutcome::Updated)
            }
            None => Ok(SaveOutcome::Rejected(Rejection::Transport)),
        }
    }
}
