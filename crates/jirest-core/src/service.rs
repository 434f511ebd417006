//! Entry points that hand out issues, searches and comments
//!
//! Services are plain values wrapping a shared [`Transport`]. Build one per
//! transport and pass it to whatever needs it.

use crate::comment::Comment;
use crate::container::Container;
use crate::issue::Issue;
use crate::search::Search;
use crate::transport::Transport;
use crate::Result;
use std::rc::Rc;
use tracing::debug;

/// Factory for issues and searches
#[derive(Clone)]
pub struct IssueService {
    transport: Rc<dyn Transport>,
}

impl IssueService {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Load a fully populated issue by key or id.
    ///
    /// `Ok(None)` when the request fails or the issue does not exist.
    pub fn load(&self, key: &str) -> Result<Option<Issue>> {
        self.load_with(key, &[], &[])
    }

    /// Load an issue restricted to `fields` and with `expand` applied
    pub fn load_with(&self, key: &str, fields: &[&str], expand: &[&str]) -> Result<Option<Issue>> {
        let fields = fields.join(",");
        let expand = expand.join(",");
        let query = [("fields", fields.as_str()), ("expand", expand.as_str())];

        debug!(issue = key, "loading issue");
        let Some(response) = self.transport.get(&format!("issue/{key}"), &query) else {
            return Ok(None);
        };
        let Some(seed) = Container::from_json(response) else {
            return Ok(None);
        };

        Issue::from_seed(self, seed, true).map(Some)
    }

    /// A new, unsaved issue
    pub fn create(&self) -> Issue {
        Issue::stub(self)
    }

    /// A new search; set the query with [`Search::start`]
    pub fn search(&self) -> Search {
        Search::new(self.clone())
    }

    /// Comment service sharing this service's transport
    pub fn comments(&self) -> CommentService {
        CommentService::new(self.transport.clone())
    }
}

/// Factory for issue comments
#[derive(Clone)]
pub struct CommentService {
    transport: Rc<dyn Transport>,
}

impl CommentService {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// A new, unsaved comment on the issue with the given key or id
    pub fn create(&self, issue: &str) -> Comment {
        Comment::new(self.clone(), issue)
    }
}
