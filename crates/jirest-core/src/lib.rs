//! jirest-core: Change-tracked object model for the Jira REST API
//!
//! Issues are dynamic, nested field containers that remember which fields
//! were assigned since the last save, load themselves lazily on first
//! access, and send only the changed subset back to the server.

pub mod comment;
pub mod config;
pub mod container;
pub mod error;
pub mod issue;
pub mod lazy;
pub mod outcome;
pub mod search;
pub mod service;
pub mod transition;
pub mod transport;
pub mod tree;

pub use comment::Comment;
pub use config::Config;
pub use container::Container;
pub use error::Error;
pub use issue::{Issue, Lifecycle};
pub use lazy::Hydrate;
pub use outcome::{Rejection, SaveOutcome};
pub use search::Search;
pub use service::{CommentService, IssueService};
pub use transition::Transition;
pub use transport::{Credentials, HttpTransport, Transport};
pub use tree::{Node, transform};

/// Result type for jirest operations
pub type Result<T> = std::result::Result<T, Error>;
