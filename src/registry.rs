//! Identities, their roles, and who holds each system-wide approver role
use super::error::{ValidationError, WorkflowError};
use super::store::{decode, encode};
use super::utils::new_uuid_to_bech32;
use sled::{Db, Tree};
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    StudentOrg,
    #[n(1)]
    OrgAdvisor,
    #[n(2)]
    Dean,
    #[n(3)]
    EventAdmin,
    #[n(4)]
    Admin,
    #[n(5)]
    CesdAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::StudentOrg => "student_org",
            Role::OrgAdvisor => "org_advisor",
            Role::Dean => "dean",
            Role::EventAdmin => "event_admin",
            Role::Admin => "admin",
            Role::CesdAdmin => "cesd_admin",
        }
    }

    /// Roles held by exactly one designated identity across the system.
    pub fn is_system_role(&self) -> bool {
        matches!(self, Role::EventAdmin | Role::Admin | Role::CesdAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    #[n(0)]
    pub id: String, // bech32 with the `user_` prefix
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub role: Role,
    #[n(3)]
    pub org_advisor_id: Option<String>,
    #[n(4)]
    pub dean_id: Option<String>,
}

impl Identity {
    pub fn new(role: Role, name: &str) -> anyhow::Result<Self> {
        Ok(Self {
            id: new_uuid_to_bech32("user_")?,
            name: name.to_string(),
            role,
            org_advisor_id: None,
            dean_id: None,
        })
    }
    pub fn with_advisor(mut self, advisor_id: &str) -> Self {
        self.org_advisor_id = Some(advisor_id.to_string());
        self
    }
    pub fn with_dean(mut self, dean_id: &str) -> Self {
        self.dean_id = Some(dean_id.to_string());
        self
    }
}

/// Lookup of approver identities, injected into the assignment resolver.
pub trait ApproverRegistry: Send + Sync {
    fn identity(&self, id: &str) -> Result<Option<Identity>, WorkflowError>;

    /// The identity designated for a system role, if one exists.
    fn holder_of(&self, role: Role) -> Result<Option<Identity>, WorkflowError>;
}

/// sled-backed registry of identities.
#[derive(Clone)]
pub struct Directory {
    identities: Tree,   // identity id -> Identity
    role_holders: Tree, // role tag -> identity id
}

impl Directory {
    pub fn new(instance: &Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            identities: instance.open_tree("identities")?,
            role_holders: instance.open_tree("role_holders")?,
        })
    }

    /// Stores an identity. The first identity registered with a system role
    /// becomes its designated holder.
    pub fn register(&self, identity: Identity) -> Result<Identity, WorkflowError> {
        self.identities
            .insert(identity.id.as_bytes(), encode(&identity)?)?;

        if identity.role.is_system_role() {
            let claimed = self.role_holders.compare_and_swap(
                identity.role.as_str(),
                None::<&[u8]>,
                Some(identity.id.as_bytes()),
            )?;
            if claimed.is_ok() {
                tracing::info!(
                    identity_id = %identity.id,
                    role = %identity.role,
                    "Designated system role holder"
                );
            }
        }

        tracing::debug!(identity_id = %identity.id, role = %identity.role, "Identity registered");
        Ok(identity)
    }

    /// Re-points a system role at another identity holding that role.
    pub fn designate(&self, role: Role, identity_id: &str) -> Result<(), WorkflowError> {
        let identity = self
            .identity(identity_id)?
            .ok_or_else(|| WorkflowError::not_found("identity", identity_id))?;

        if identity.role != role || !role.is_system_role() {
            return Err(ValidationError::RoleMismatch {
                expected: role,
                found: identity.role,
            }
            .into());
        }

        self.role_holders
            .insert(role.as_str(), identity.id.as_bytes())?;
        tracing::info!(identity_id = %identity.id, role = %role, "Designated system role holder");
        Ok(())
    }
}

impl ApproverRegistry for Directory {
    fn identity(&self, id: &str) -> Result<Option<Identity>, WorkflowError> {
        self.identities
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn holder_of(&self, role: Role) -> Result<Option<Identity>, WorkflowError> {
        let Some(id) = self.role_holders.get(role.as_str())? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id);
        self.identity(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Directory {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Directory::new(&db).unwrap()
    }

    #[test]
    fn first_system_role_holder_is_designated() {
        let dir = directory();
        let first = dir.register(Identity::new(Role::Admin, "Admin One").unwrap()).unwrap();
        dir.register(Identity::new(Role::Admin, "Admin Two").unwrap()).unwrap();

        assert_eq!(dir.holder_of(Role::Admin).unwrap(), Some(first));
        assert_eq!(dir.holder_of(Role::CesdAdmin).unwrap(), None);
    }

    #[test]
    fn hierarchy_roles_are_never_designated() {
        let dir = directory();
        dir.register(Identity::new(Role::Dean, "Dean").unwrap()).unwrap();
        assert_eq!(dir.holder_of(Role::Dean).unwrap(), None);
    }

    #[test]
    fn designate_requires_matching_role() {
        let dir = directory();
        dir.register(Identity::new(Role::EventAdmin, "Events").unwrap()).unwrap();
        let second = dir
            .register(Identity::new(Role::EventAdmin, "Events Backup").unwrap())
            .unwrap();
        let dean = dir.register(Identity::new(Role::Dean, "Dean").unwrap()).unwrap();

        dir.designate(Role::EventAdmin, &second.id).unwrap();
        assert_eq!(dir.holder_of(Role::EventAdmin).unwrap(), Some(second));

        let err = dir.designate(Role::EventAdmin, &dean.id).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::RoleMismatch { .. })
        ));
        assert!(matches!(
            dir.designate(Role::Admin, "user_missing"),
            Err(WorkflowError::NotFound { .. })
        ));
    }
}
