//! Service layer API for event approval operations
use super::approval::{ApprovalRecord, Decision, derive_status, ensure_turn, step_for};
use super::assignment::{into_records, resolve_chain};
use super::config::WorkflowConfig;
use super::error::{ValidationError, WorkflowError};
use super::event::{Event, EventDate, EventDetails, EventFile, EventStatus, NewFile, TimeStamp};
use super::notify::{ChangeKind, NoopNotifier, Notifier, StateChange};
use super::registry::{ApproverRegistry, Identity, Role};
use super::store::{Store, settle, tx_load, tx_load_chain, tx_save, tx_save_chain};
use super::utils::{new_uuid_to_bech32, sequence_key};
use chrono::Utc;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, abort};
use std::sync::Arc;

/// An event with its chain in precedence order and its attached files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventView {
    pub event: Event,
    pub approvals: Vec<ApprovalRecord>,
    pub files: Vec<EventFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub event: Event,
    pub approval: ApprovalRecord,
}

/// A step waiting on the caller, with the event it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApproval {
    pub approval: ApprovalRecord,
    pub event: Event,
}

/// What the owner sends back after a revision request.
#[derive(Debug, Clone, Default)]
pub struct Resubmission {
    pub details: EventDetails,
    pub new_files: Vec<NewFile>,
    pub removed_file_ids: Vec<String>,
}

impl Resubmission {
    pub fn new(details: EventDetails) -> Self {
        Self {
            details,
            ..Default::default()
        }
    }
    pub fn add_file(mut self, file: NewFile) -> Self {
        self.new_files.push(file);
        self
    }
    pub fn remove_file(mut self, file_id: &str) -> Self {
        self.removed_file_ids.push(file_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubmitOutcome {
    pub event: Event,
    /// Detached files whose blobs the file store should now delete.
    pub removed_files: Vec<EventFile>,
}

pub struct EventService {
    store: Store,
    registry: Arc<dyn ApproverRegistry>,
    notifier: Arc<dyn Notifier>,
    config: WorkflowConfig,
}

impl EventService {
    pub fn new(
        instance: Arc<sled::Db>,
        registry: Arc<dyn ApproverRegistry>,
    ) -> Result<Self, WorkflowError> {
        Ok(Self {
            store: Store::open(&instance)?,
            registry,
            notifier: Arc::new(NoopNotifier),
            config: WorkflowConfig::default(),
        })
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Propose a new event and assign its approval chain
    pub fn create_event(
        &self,
        org: &Identity,
        details: EventDetails,
        files: Vec<NewFile>,
    ) -> Result<EventView, WorkflowError> {
        if org.role != Role::StudentOrg {
            tracing::warn!(actor = %org.id, role = %org.role, "Event creation refused");
            return Err(WorkflowError::Unauthorized);
        }

        let (details_hash, details_cbor) = details.validate_and_finalise()?;

        let chain = resolve_chain(org, details.event_type(), self.registry.as_ref())?;
        if chain.is_empty() && self.config.reject_empty_chain {
            tracing::warn!(org_id = %org.id, "No approvers available for new event");
            return Err(WorkflowError::NoApprovers);
        }

        let event_id = new_uuid_to_bech32("event_")?;
        let now = TimeStamp::new();
        let approvals = into_records(&event_id, chain);
        let files = attach_files(&event_id, files, &now)?;

        let mut event = Event::new(
            event_id,
            org.id.clone(),
            details,
            details_hash.clone(),
            approvals.len() as u32,
            now.clone(),
        );
        event.file_ids = files.iter().map(|f| f.id.clone()).collect();

        // details, chain, files and the event land together or not at all
        let store = &self.store;
        settle(
            (&store.events, &store.approvals, &store.details, &store.files).transaction(
                |(events, approvals_tx, details_tx, files_tx)| {
                    details_tx.insert(details_hash.as_bytes(), details_cbor.as_slice())?;
                    tx_save_chain(approvals_tx, &approvals)?;
                    for file in &files {
                        tx_save(files_tx, file.id.as_bytes(), file)?;
                    }
                    tx_save(events, event.id.as_bytes(), &event)?;
                    Ok(())
                },
            ),
        )?;

        tracing::info!(
            event_id = %event.id,
            org_id = %org.id,
            approvers = approvals.len(),
            files = files.len(),
            "Event created"
        );
        self.publish(&event, ChangeKind::Created, &org.id, &now);

        Ok(EventView {
            event,
            approvals,
            files,
        })
    }

    /// Record an approver's decision on their step of the chain
    pub fn decide(
        &self,
        event_id: &str,
        actor: &Identity,
        decision: Decision,
        remarks: Option<String>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        self.decide_at(event_id, actor, decision, remarks, TimeStamp::new())
    }

    pub fn decide_at(
        &self,
        event_id: &str,
        actor: &Identity,
        decision: Decision,
        remarks: Option<String>,
        now: TimeStamp<Utc>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let remarks = remarks
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if decision.halts_chain() && remarks.is_none() && self.config.require_remarks {
            return Err(ValidationError::MissingRemarks(decision).into());
        }

        let window = self.config.revision_window;
        let store = &self.store;
        let outcome = settle((&store.events, &store.approvals).transaction(|(events, approvals)| {
            let Some(mut event) = tx_load::<Event>(events, event_id.as_bytes())? else {
                return abort(WorkflowError::not_found("event", event_id));
            };
            let mut chain = tx_load_chain(approvals, &event)?;

            let Some(idx) = step_for(&chain, &actor.id, actor.role) else {
                let step = format!("{event_id}/{}", actor.id);
                return abort(WorkflowError::not_found("approval record", &step));
            };
            if chain[idx].role != actor.role {
                return abort(WorkflowError::Unauthorized);
            }
            if !chain[idx].is_pending() {
                return abort(WorkflowError::AlreadyDecided);
            }
            if event.status != EventStatus::Pending {
                return abort(WorkflowError::EventClosed {
                    status: event.status,
                });
            }
            ensure_turn(&chain, chain[idx].sequence).map_err(ConflictableTransactionError::Abort)?;

            let step = &mut chain[idx];
            step.apply(decision, remarks.clone(), now.clone())
                .map_err(ConflictableTransactionError::Abort)?;
            tx_save(approvals, &sequence_key(&event.id, step.sequence), step)?;
            let approval = step.clone();

            event.status = derive_status(&chain);
            match decision {
                Decision::Revision => {
                    event.revision_requested_at = Some(now.clone());
                    event.revision_expires_at = now.checked_add(window);
                    event.reason = remarks.clone();
                }
                Decision::Rejected => event.reason = remarks.clone(),
                Decision::Approved => {}
            }
            event.updated_at = now.clone();
            tx_save(events, event.id.as_bytes(), &event)?;

            Ok(DecisionOutcome { event, approval })
        }))
        .inspect_err(|e| {
            tracing::warn!(event_id, approver = %actor.id, %decision, error = %e, "Decision refused")
        })?;

        tracing::info!(
            event_id,
            approver = %actor.id,
            role = %actor.role,
            %decision,
            status = %outcome.event.status,
            "Approval recorded"
        );
        self.publish(&outcome.event, ChangeKind::Decided, &actor.id, &now);

        Ok(outcome)
    }

    /// Resubmit an event flagged for revision; the whole chain starts over
    pub fn resubmit(
        &self,
        event_id: &str,
        actor: &Identity,
        resubmission: Resubmission,
    ) -> Result<ResubmitOutcome, WorkflowError> {
        self.resubmit_at(event_id, actor, resubmission, TimeStamp::new())
    }

    pub fn resubmit_at(
        &self,
        event_id: &str,
        actor: &Identity,
        resubmission: Resubmission,
        now: TimeStamp<Utc>,
    ) -> Result<ResubmitOutcome, WorkflowError> {
        let Resubmission {
            details,
            new_files,
            removed_file_ids,
        } = resubmission;
        let new_files = attach_files(event_id, new_files, &now)?;

        let store = &self.store;
        let outcome = settle(
            (&store.events, &store.approvals, &store.details, &store.files).transaction(
                |(events, approvals, details_tx, files_tx)| {
                    let Some(mut event) = tx_load::<Event>(events, event_id.as_bytes())? else {
                        return abort(WorkflowError::not_found("event", event_id));
                    };
                    if event.org_id != actor.id {
                        return abort(WorkflowError::Unauthorized);
                    }
                    if !event.revision_window_open(&now) {
                        return abort(WorkflowError::RevisionWindowClosed);
                    }
                    let (hash, cbor) = details
                        .validate_and_finalise()
                        .map_err(ConflictableTransactionError::Abort)?;

                    let mut chain = tx_load_chain(approvals, &event)?;
                    chain.iter_mut().for_each(ApprovalRecord::reset);
                    tx_save_chain(approvals, &chain)?;

                    details_tx.insert(hash.as_bytes(), cbor)?;
                    event.details = details.clone();
                    event.revisions.push(hash);

                    // ids that never belonged to this event are ignored
                    let mut removed_files = vec![];
                    for id in &removed_file_ids {
                        if !event.file_ids.contains(id) {
                            continue;
                        }
                        if let Some(file) = tx_load::<EventFile>(files_tx, id.as_bytes())? {
                            removed_files.push(file);
                        }
                        files_tx.remove(id.as_bytes())?;
                    }
                    event.file_ids.retain(|id| !removed_file_ids.contains(id));
                    for file in &new_files {
                        tx_save(files_tx, file.id.as_bytes(), file)?;
                        event.file_ids.push(file.id.clone());
                    }

                    event.clear_revision();
                    event.status = derive_status(&chain);
                    event.updated_at = now.clone();
                    tx_save(events, event.id.as_bytes(), &event)?;

                    Ok(ResubmitOutcome {
                        event,
                        removed_files,
                    })
                },
            ),
        )
        .inspect_err(|e| {
            tracing::warn!(event_id, actor = %actor.id, error = %e, "Resubmission refused")
        })?;

        tracing::info!(
            event_id,
            org_id = %actor.id,
            added = new_files.len(),
            removed = outcome.removed_files.len(),
            "Event resubmitted, approval chain reset"
        );
        self.publish(&outcome.event, ChangeKind::Resubmitted, &actor.id, &now);

        Ok(outcome)
    }

    /// Set the date an approved event will actually take place
    pub fn set_final_date(
        &self,
        event_id: &str,
        actor: &Identity,
        final_date: EventDate,
    ) -> Result<Event, WorkflowError> {
        self.set_final_date_at(event_id, actor, final_date, TimeStamp::new())
    }

    pub fn set_final_date_at(
        &self,
        event_id: &str,
        actor: &Identity,
        final_date: EventDate,
        now: TimeStamp<Utc>,
    ) -> Result<Event, WorkflowError> {
        if final_date < now.date() {
            return Err(ValidationError::FinalDateInPast.into());
        }
        if actor.role != Role::Admin {
            return Err(WorkflowError::Unauthorized);
        }

        let event = settle(self.store.events.transaction(|events| {
            let Some(mut event) = tx_load::<Event>(events, event_id.as_bytes())? else {
                return abort(WorkflowError::not_found("event", event_id));
            };
            if event.status != EventStatus::Approved {
                return abort(WorkflowError::NotApproved {
                    status: event.status,
                });
            }
            event.final_date = Some(final_date);
            event.updated_at = now.clone();
            tx_save(events, event.id.as_bytes(), &event)?;
            Ok(event)
        }))?;

        tracing::info!(event_id, admin = %actor.id, %final_date, "Final date set");
        self.publish(&event, ChangeKind::FinalDateSet, &actor.id, &now);

        Ok(event)
    }

    /// Steps assigned to `actor` that are still waiting, on events still under review
    pub fn pending_for(&self, actor: &Identity) -> Result<Vec<PendingApproval>, WorkflowError> {
        let mut pending = vec![];
        for approval in self.store.all_approvals()? {
            if approval.approver_id != actor.id || !approval.is_pending() {
                continue;
            }
            let Some(event) = self.store.load_event(&approval.event_id)? else {
                continue;
            };
            if event.status == EventStatus::Pending {
                pending.push(PendingApproval { approval, event });
            }
        }
        Ok(pending)
    }

    /// Event with its full approval trail and files
    pub fn show(&self, event_id: &str) -> Result<EventView, WorkflowError> {
        let event = self
            .store
            .load_event(event_id)?
            .ok_or_else(|| WorkflowError::not_found("event", event_id))?;
        let approvals = self.store.load_chain(event_id)?;
        let files = self.store.load_files(&event)?;

        Ok(EventView {
            event,
            approvals,
            files,
        })
    }

    /// Events proposed by one organization, newest first
    pub fn events_for_org(&self, org_id: &str) -> Result<Vec<Event>, WorkflowError> {
        let mut events: Vec<Event> = self
            .store
            .all_events()?
            .into_iter()
            .filter(|e| e.org_id == org_id)
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    /// Organizations see their own events; approvers see every event
    pub fn list_events(&self, viewer: &Identity) -> Result<Vec<Event>, WorkflowError> {
        if viewer.role == Role::StudentOrg {
            return self.events_for_org(&viewer.id);
        }
        let mut events = self.store.all_events()?;
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    /// Fully approved events by proposed date, for checking availability
    pub fn approved_events(&self) -> Result<Vec<Event>, WorkflowError> {
        let mut events: Vec<Event> = self
            .store
            .all_events()?
            .into_iter()
            .filter(|e| e.status == EventStatus::Approved)
            .collect();
        events.sort_by_key(|e| e.details.proposed_date());
        Ok(events)
    }

    /// Every submitted version of an event's details, oldest first
    pub fn details_history(&self, event_id: &str) -> Result<Vec<EventDetails>, WorkflowError> {
        let event = self
            .store
            .load_event(event_id)?
            .ok_or_else(|| WorkflowError::not_found("event", event_id))?;

        event
            .revisions
            .iter()
            .map(|hash| {
                self.store.load_details(hash)?.ok_or_else(|| {
                    WorkflowError::Codec(format!("details version '{hash}' of '{event_id}' is missing"))
                })
            })
            .collect()
    }

    fn publish(&self, event: &Event, kind: ChangeKind, actor_id: &str, at: &TimeStamp<Utc>) {
        self.notifier.event_changed(&StateChange {
            event_id: event.id.clone(),
            org_id: event.org_id.clone(),
            kind,
            status: event.status,
            actor_id: actor_id.to_string(),
            at: at.clone(),
        });
    }
}

fn attach_files(
    event_id: &str,
    files: Vec<NewFile>,
    now: &TimeStamp<Utc>,
) -> Result<Vec<EventFile>, WorkflowError> {
    let mut attached = Vec::with_capacity(files.len());
    for file in files {
        let id = new_uuid_to_bech32("file_")?;
        attached.push(EventFile::attach(id, event_id, file, now.clone()));
    }
    Ok(attached)
}
