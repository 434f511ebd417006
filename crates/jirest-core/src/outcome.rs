//! Results of write operations
//!
//! Writes that fail for an expected reason return a [`SaveOutcome::Rejected`]
//! value so callers can fix the object and try again.

/// What a save did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new remote record was created and linked
    Created,
    /// The pending changes were sent to an existing record
    Updated,
    /// Nothing to send
    Unchanged,
    /// Nothing was written
    Rejected(Rejection),
}

impl SaveOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SaveOutcome::Rejected(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            SaveOutcome::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Why a write was not attempted or did not go through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The parent issue does not exist remotely yet
    ParentNotPersistent,
    /// A new sub-issue does not reference its parent
    MissingParentReference,
    /// A create lacks project, summary or issue type
    MissingRequiredFields,
    /// No key or id to address the remote record
    MissingIdentifier,
    /// The issue does not exist remotely
    NotPersistent,
    /// The transition is not available from the current status
    UnknownTransition,
    /// The request failed
    Transport,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::ParentNotPersistent => write!(f, "parent issue is not saved"),
            Rejection::MissingParentReference => write!(f, "missing parent key or id"),
            Rejection::MissingRequiredFields => {
                write!(f, "project, summary and issue type are required")
            }
            Rejection::MissingIdentifier => write!(f, "missing key or id"),
            Rejection::NotPersistent => write!(f, "issue is not saved"),
            Rejection::UnknownTransition => write!(f, "transition not available"),
            Rejection::Transport => write!(f, "request failed"),
        }
    }
}

impl std::fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveOutcome::Created => write!(f, "created"),
            SaveOutcome::Updated => write!(f, "updated"),
            SaveOutcome::Unchanged => write!(f, "unchanged"),
            SaveOutcome::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}
