mod common;

use common::{Campus, details};
use event_approval::{
    approval::{ApprovalStatus, Decision},
    error::WorkflowError,
    event::{EventStatus, EventType},
    registry::Role,
};
use std::sync::Barrier;
use std::thread;

/// Double-submitted decisions on one step: exactly one lands, the rest see it decided.
#[test]
fn racing_decisions_apply_once() -> anyhow::Result<()> {
    const RACERS: usize = 8;

    let campus = Campus::open("test_racing_decisions.db")?;
    let advisor = campus.register(Role::OrgAdvisor, "Advisor")?;
    let dean = campus.register(Role::Dean, "Dean")?;
    let org = campus.org("Chess Club", Some(&advisor), Some(&dean))?;
    let event_id = campus
        .service
        .create_event(&org, details(EventType::Online), vec![])?
        .event
        .id;

    let barrier = Barrier::new(RACERS);
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..RACERS)
            .map(|i| {
                let (barrier, service, event_id, advisor) =
                    (&barrier, &campus.service, &event_id, &advisor);
                let decision = if i % 2 == 0 {
                    Decision::Approved
                } else {
                    Decision::Rejected
                };
                s.spawn(move || {
                    barrier.wait();
                    service.decide(event_id, advisor, decision, Some(format!("attempt {i}")))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("decision thread panicked"))
            .collect()
    });

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, WorkflowError::AlreadyDecided))
    );

    let shown = campus.service.show(&event_id)?;
    let winner = &winners[0].approval;
    assert_eq!(shown.approvals[0], *winner);
    assert_ne!(shown.approvals[0].status, ApprovalStatus::Pending);
    let expected = match winner.status {
        ApprovalStatus::Rejected => EventStatus::Rejected,
        _ => EventStatus::Pending,
    };
    assert_eq!(shown.event.status, expected);

    Ok(())
}

/// Decisions on different events never block or fail each other.
#[test]
fn distinct_events_proceed_in_parallel() -> anyhow::Result<()> {
    let campus = Campus::open("test_parallel_events.db")?;
    let advisor = campus.register(Role::OrgAdvisor, "Advisor")?;

    let mut event_ids = vec![];
    for name in ["Chess Club", "Debate Club", "Film Society", "Robotics Team"] {
        let org = campus.org(name, Some(&advisor), None)?;
        let view = campus
            .service
            .create_event(&org, details(EventType::Online), vec![])?;
        event_ids.push(view.event.id);
    }

    let barrier = Barrier::new(event_ids.len());
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = event_ids
            .iter()
            .map(|event_id| {
                let (barrier, service, advisor) = (&barrier, &campus.service, &advisor);
                s.spawn(move || {
                    barrier.wait();
                    service.decide(event_id, advisor, Decision::Approved, None)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("decision thread panicked"))
            .collect()
    });

    for result in results {
        assert_eq!(result?.event.status, EventStatus::Approved);
    }
    assert_eq!(campus.service.approved_events()?.len(), event_ids.len());

    Ok(())
}
