//! Walks one onsite event through advisor, dean and admin approval.
//!
//! Run with `RUST_LOG=event_approval=debug` to see every step the service logs.
//! The database lives at `EVENT_APPROVAL_DB_PATH` (default `./event-approval.db`).
use event_approval::{
    approval::Decision,
    config::WorkflowConfig,
    event::{EventDate, EventDetails, EventType},
    registry::{Directory, Identity, Role},
    service::EventService,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "event_approval=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkflowConfig::from_env()?;
    let db = Arc::new(config.open_db()?);
    tracing::info!(path = %config.db_path.display(), "Opened event database");

    let directory = Directory::new(&db)?;
    let service = EventService::new(db, Arc::new(directory.clone()))?.with_config(config);

    let advisor = directory.register(Identity::new(Role::OrgAdvisor, "Prof. Santos")?)?;
    let dean = directory.register(Identity::new(Role::Dean, "Dean Reyes")?)?;
    let admin = directory.register(Identity::new(Role::Admin, "Student Affairs")?)?;
    // the database outlives a run, so an earlier run may already hold the role
    directory.designate(Role::Admin, &admin.id)?;
    let org = directory.register(
        Identity::new(Role::StudentOrg, "Computer Society")?
            .with_advisor(&advisor.id)
            .with_dean(&dean.id),
    )?;

    let proposed = EventDate::from_ymd(2027, 10, 6)
        .ok_or_else(|| anyhow::anyhow!("invalid proposed date"))?;
    let details = EventDetails::new()
        .set_name("Hackathon 2027")
        .set_description("Twenty-four hour coding marathon")
        .set_type(EventType::Onsite)
        .set_location("Engineering Building")
        .set_proposed_date(proposed);

    let view = service.create_event(&org, details, vec![])?;
    let event_id = view.event.id;

    for approver in [&advisor, &dean, &admin] {
        let outcome = service.decide(&event_id, approver, Decision::Approved, None)?;
        println!(
            "{:<12} approved -> event is {}",
            approver.role.as_str(),
            outcome.event.status
        );
    }

    let final_date = EventDate::from_ymd(2027, 10, 8)
        .ok_or_else(|| anyhow::anyhow!("invalid final date"))?;
    let event = service.set_final_date(&event_id, &admin, final_date)?;
    println!("final date set to {}", final_date);
    println!("{} is {}", event.details.name(), event.status);

    Ok(())
}
