//! Resolves who approves a new event, and in which order
use super::approval::ApprovalRecord;
use super::error::WorkflowError;
use super::event::EventType;
use super::registry::{ApproverRegistry, Identity, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub approver_id: String,
    pub role: Role,
}

/// The ordered approvers for an event proposed by `org`.
///
/// Advisor and dean come from the organization's hierarchy links, the admin
/// roles from the registry's designated holders, and the CESD admin only
/// joins events held outside campus. Any step without an identity is skipped.
pub fn resolve_chain(
    org: &Identity,
    event_type: EventType,
    registry: &dyn ApproverRegistry,
) -> Result<Vec<Assignment>, WorkflowError> {
    let mut chain = vec![];

    let linked = [
        (org.org_advisor_id.as_deref(), Role::OrgAdvisor),
        (org.dean_id.as_deref(), Role::Dean),
    ];
    for (id, role) in linked {
        let Some(id) = id else { continue };
        match registry.identity(id)? {
            Some(identity) => {
                if identity.role != role {
                    // the step is kept, but its holder will be refused until the link is fixed
                    tracing::warn!(
                        org_id = %org.id,
                        approver = %identity.id,
                        expected = %role,
                        found = %identity.role,
                        "Linked approver holds a different role"
                    );
                }
                chain.push(Assignment {
                    approver_id: identity.id,
                    role,
                })
            }
            None => tracing::debug!(org_id = %org.id, missing = %id, role = %role, "Skipping unknown linked approver"),
        }
    }

    let mut system_roles = vec![Role::EventAdmin, Role::Admin];
    if event_type == EventType::Outside {
        system_roles.push(Role::CesdAdmin);
    }
    for role in system_roles {
        match registry.holder_of(role)? {
            Some(identity) => chain.push(Assignment {
                approver_id: identity.id,
                role,
            }),
            None => tracing::debug!(org_id = %org.id, role = %role, "No designated holder, skipping step"),
        }
    }

    Ok(chain)
}

/// Turns assignments into fresh pending records, sequenced in assignment order.
pub fn into_records(event_id: &str, chain: Vec<Assignment>) -> Vec<ApprovalRecord> {
    chain
        .into_iter()
        .zip(0u32..)
        .map(|(a, sequence)| ApprovalRecord::new(event_id.to_string(), sequence, a.approver_id, a.role))
        .collect()
}
