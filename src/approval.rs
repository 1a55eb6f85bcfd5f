//! Approval records and the rules that order them
use super::error::{ValidationError, WorkflowError};
use super::event::{EventStatus, TimeStamp};
use super::registry::Role;
use chrono::Utc;
use std::fmt;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Revision,
}

/// What an approver may do with their step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
    Revision,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::Revision => "revision",
        }
    }

    /// Rejections and revision requests end the current pass through the chain.
    pub fn halts_chain(&self) -> bool {
        !matches!(self, Decision::Approved)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            "revision" => Ok(Decision::Revision),
            other => Err(ValidationError::UnknownDecision(other.to_string())),
        }
    }
}

impl From<Decision> for ApprovalStatus {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
            Decision::Revision => ApprovalStatus::Revision,
        }
    }
}

/// One approver's step in an event's chain.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRecord {
    #[n(0)]
    pub event_id: String,
    #[n(1)]
    pub sequence: u32, // precedence, 0 acts first
    #[n(2)]
    pub approver_id: String,
    #[n(3)]
    pub role: Role,
    #[n(4)]
    pub status: ApprovalStatus,
    #[n(5)]
    pub remarks: Option<String>,
    #[n(6)]
    pub decided_at: Option<TimeStamp<Utc>>,
}

impl ApprovalRecord {
    pub fn new(event_id: String, sequence: u32, approver_id: String, role: Role) -> Self {
        Self {
            event_id,
            sequence,
            approver_id,
            role,
            status: ApprovalStatus::Pending,
            remarks: None,
            decided_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Records a decision. A record leaves `Pending` at most once per pass.
    pub fn apply(
        &mut self,
        decision: Decision,
        remarks: Option<String>,
        at: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        if !self.is_pending() {
            return Err(WorkflowError::AlreadyDecided);
        }
        self.status = decision.into();
        self.remarks = remarks;
        self.decided_at = Some(at);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.status = ApprovalStatus::Pending;
        self.remarks = None;
        self.decided_at = None;
    }
}

/// Index of the step `approver_id` holds, preferring the one matching `role`.
pub fn step_for(chain: &[ApprovalRecord], approver_id: &str, role: Role) -> Option<usize> {
    chain
        .iter()
        .position(|r| r.approver_id == approver_id && r.role == role)
        .or_else(|| chain.iter().position(|r| r.approver_id == approver_id))
}

/// Fails with `OutOfOrder` unless every step ahead of `sequence` has approved.
pub fn ensure_turn(chain: &[ApprovalRecord], sequence: u32) -> Result<(), WorkflowError> {
    let blocked = chain
        .iter()
        .filter(|r| r.sequence < sequence)
        .any(|r| r.status != ApprovalStatus::Approved);

    if blocked {
        return Err(WorkflowError::OutOfOrder);
    }
    Ok(())
}

/// The event status implied by its chain.
pub fn derive_status(chain: &[ApprovalRecord]) -> EventStatus {
    if chain.iter().any(|r| r.status == ApprovalStatus::Rejected) {
        return EventStatus::Rejected;
    }
    if chain.iter().any(|r| r.status == ApprovalStatus::Revision) {
        return EventStatus::Revision;
    }
    if !chain.is_empty() && chain.iter().all(|r| r.status == ApprovalStatus::Approved) {
        return EventStatus::Approved;
    }
    EventStatus::Pending
}

/// The step the chain is waiting on, if any.
pub fn current_step(chain: &[ApprovalRecord]) -> Option<&ApprovalRecord> {
    if derive_status(chain) != EventStatus::Pending {
        return None;
    }
    chain
        .iter()
        .filter(|r| r.is_pending())
        .min_by_key(|r| r.sequence)
}
