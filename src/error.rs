use crate::approval::Decision;
use crate::event::EventStatus;
use crate::registry::Role;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Unknown decision '{0}'. Must be one of: approved, rejected, revision")]
    UnknownDecision(String),
    #[error("Remarks are required when the decision is '{0}'")]
    MissingRemarks(Decision),
    #[error("Event name is required")]
    MissingName,
    #[error("Event name must be at most {max} characters, got {len}")]
    NameTooLong { max: usize, len: usize },
    #[error("Event description is required")]
    MissingDescription,
    #[error("Event type must be one of: online, onsite, outside")]
    MissingType,
    #[error("A location is required for onsite and outside events")]
    MissingLocation,
    #[error("A proposed date is required")]
    MissingProposedDate,
    #[error("The final date cannot be before today")]
    FinalDateInPast,
    #[error("Identity holds role '{found}', expected '{expected}'")]
    RoleMismatch { expected: Role, found: Role },
}

/// Outcomes of a workflow operation that the caller must be able to tell apart.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("You are not authorized to act on this step")]
    Unauthorized,
    #[error("You have already acted on this event")]
    AlreadyDecided,
    #[error("Previous approvers must approve first")]
    OutOfOrder,
    #[error("Event is already {status}; no further decisions are accepted")]
    EventClosed { status: EventStatus },
    #[error("The revision window for this event is closed")]
    RevisionWindowClosed,
    #[error("Event is {status}, not fully approved yet")]
    NotApproved { status: EventStatus },
    #[error("No approvers could be assigned to this event")]
    NoApprovers,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("record encoding failure: {0}")]
    Codec(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
