//! Property-based tests for the approval chain
//!
//! These drive arbitrary sequences of decisions through the service against
//! chains of every supported length, and compare the stored records with a
//! simple model of what the ordering rules allow. A second group checks the
//! status derivation on its own, away from storage.
//!
//! Each case opens a temporary in-memory sled instance, so the case count is
//! kept modest.

use anyhow::{bail, ensure};
use event_approval::{
    approval::{ApprovalRecord, ApprovalStatus, Decision, derive_status},
    error::WorkflowError,
    event::{EventDate, EventDetails, EventStatus, EventType},
    registry::{Directory, Identity, Role},
    service::{EventService, Resubmission},
};
use proptest::prelude::*;
use std::sync::Arc;

// Chain order for an outside event when every step has an identity.
const ROLES: [Role; 5] = [
    Role::OrgAdvisor,
    Role::Dean,
    Role::EventAdmin,
    Role::Admin,
    Role::CesdAdmin,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Applied,
    AlreadyDecided,
    EventClosed,
    OutOfOrder,
}

fn decision_strategy() -> impl Strategy<Value = Decision> {
    prop_oneof![
        // approvals dominate so chains regularly run to completion
        6 => Just(Decision::Approved),
        1 => Just(Decision::Rejected),
        1 => Just(Decision::Revision),
    ]
}

fn status_strategy() -> impl Strategy<Value = ApprovalStatus> {
    prop_oneof![
        Just(ApprovalStatus::Pending),
        Just(ApprovalStatus::Approved),
        Just(ApprovalStatus::Rejected),
        Just(ApprovalStatus::Revision),
    ]
}

fn attempts_strategy() -> impl Strategy<Value = Vec<(usize, Decision)>> {
    prop::collection::vec((0usize..5, decision_strategy()), 0..16)
}

fn details() -> EventDetails {
    EventDetails::new()
        .set_name("Coastal Cleanup")
        .set_description("Beach cleanup drive")
        .set_type(EventType::Outside)
        .set_location("Paliton Beach")
        .set_proposed_date(EventDate::from_ymd(2025, 11, 8).expect("valid calendar date"))
}

fn model_status(model: &[ApprovalStatus]) -> EventStatus {
    if model.contains(&ApprovalStatus::Rejected) {
        EventStatus::Rejected
    } else if model.contains(&ApprovalStatus::Revision) {
        EventStatus::Revision
    } else if model.iter().all(|s| *s == ApprovalStatus::Approved) {
        EventStatus::Approved
    } else {
        EventStatus::Pending
    }
}

/// Builds a chain of `len` approvers and replays `attempts` against it,
/// checking every outcome and the stored state after each step.
fn replay(len: usize, attempts: &[(usize, Decision)]) -> anyhow::Result<()> {
    let db = Arc::new(sled::Config::new().temporary(true).open()?);
    let directory = Directory::new(&db)?;
    let service = EventService::new(db, Arc::new(directory.clone()))?;

    let mut org = Identity::new(Role::StudentOrg, "Environmental Club")?;
    let mut approvers = vec![];
    for role in &ROLES[..len] {
        let approver = directory.register(Identity::new(*role, role.as_str())?)?;
        match role {
            Role::OrgAdvisor => org = org.with_advisor(&approver.id),
            Role::Dean => org = org.with_dean(&approver.id),
            _ => {}
        }
        approvers.push(approver);
    }
    let org = directory.register(org)?;

    let view = service.create_event(&org, details(), vec![])?;
    let event_id = view.event.id;
    ensure!(view.approvals.len() == len, "chain has {} steps", view.approvals.len());

    let mut model = vec![ApprovalStatus::Pending; len];
    for &(step, decision) in attempts {
        let k = step % len;
        let expected = if model[k] != ApprovalStatus::Pending {
            Expected::AlreadyDecided
        } else if model_status(&model) != EventStatus::Pending {
            Expected::EventClosed
        } else if model[..k].iter().any(|s| *s != ApprovalStatus::Approved) {
            Expected::OutOfOrder
        } else {
            Expected::Applied
        };

        let result = service.decide(&event_id, &approvers[k], decision, Some("noted".into()));
        match (expected, result) {
            (Expected::Applied, Ok(outcome)) => {
                model[k] = decision.into();
                ensure!(outcome.approval.status == model[k]);
            }
            (Expected::AlreadyDecided, Err(WorkflowError::AlreadyDecided))
            | (Expected::EventClosed, Err(WorkflowError::EventClosed { .. }))
            | (Expected::OutOfOrder, Err(WorkflowError::OutOfOrder)) => {}
            (expected, result) => bail!("step {k}: expected {expected:?}, got {result:?}"),
        }

        let shown = service.show(&event_id)?;
        let stored: Vec<ApprovalStatus> = shown.approvals.iter().map(|a| a.status).collect();
        ensure!(stored == model, "stored {stored:?} but model has {model:?}");
        ensure!(shown.event.status == model_status(&model));
        ensure!(
            (shown.event.status == EventStatus::Approved)
                == model.iter().all(|s| *s == ApprovalStatus::Approved)
        );
    }

    // a revision always starts the whole chain over, however far it got
    if model_status(&model) == EventStatus::Revision {
        let outcome = service.resubmit(&event_id, &org, Resubmission::new(details()))?;
        ensure!(outcome.event.status == EventStatus::Pending);

        let shown = service.show(&event_id)?;
        ensure!(shown.approvals.iter().all(|a| a.is_pending()
            && a.remarks.is_none()
            && a.decided_at.is_none()));
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Decisions apply only in precedence order, at most once per record,
    /// and the event approves exactly when every record has.
    #[test]
    fn decisions_follow_the_chain(len in 1usize..=5, attempts in attempts_strategy()) {
        if let Err(e) = replay(len, &attempts) {
            return Err(TestCaseError::fail(format!("{e:#}")));
        }
    }

    /// Approving every step in order always ends approved.
    #[test]
    fn in_order_approvals_always_complete(len in 1usize..=5) {
        let attempts: Vec<(usize, Decision)> = (0..len).map(|k| (k, Decision::Approved)).collect();
        if let Err(e) = replay(len, &attempts) {
            return Err(TestCaseError::fail(format!("{e:#}")));
        }
    }
}

proptest! {
    #[test]
    fn approved_iff_every_record_approved(
        statuses in prop::collection::vec(status_strategy(), 0..8)
    ) {
        let chain: Vec<ApprovalRecord> = statuses
            .iter()
            .zip(0u32..)
            .map(|(status, sequence)| {
                let mut record = ApprovalRecord::new(
                    "event_x".into(),
                    sequence,
                    format!("user_{sequence}"),
                    Role::Admin,
                );
                record.status = *status;
                record
            })
            .collect();

        let all_approved = !statuses.is_empty()
            && statuses.iter().all(|s| *s == ApprovalStatus::Approved);
        prop_assert_eq!(derive_status(&chain) == EventStatus::Approved, all_approved);

        if statuses.contains(&ApprovalStatus::Rejected) {
            prop_assert_eq!(derive_status(&chain), EventStatus::Rejected);
        }
    }
}
