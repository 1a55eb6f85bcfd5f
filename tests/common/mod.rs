#![allow(dead_code)]

use event_approval::{
    config::WorkflowConfig,
    event::{EventDate, EventDetails, EventType},
    registry::{Directory, Identity, Role},
    service::EventService,
};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

/// A throwaway database with a directory and a service over it.
pub struct Campus {
    // Sled uses file-based locking, so every test gets its own database on temp
    // storage; dropping the TempDir cleans it up.
    _temp: TempDir,
    pub db: Arc<sled::Db>,
    pub directory: Directory,
    pub service: EventService,
}

impl Campus {
    pub fn open(name: &str) -> anyhow::Result<Self> {
        Self::open_with(name, WorkflowConfig::default())
    }

    pub fn open_with(name: &str, config: WorkflowConfig) -> anyhow::Result<Self> {
        let temp = tempdir()?;
        let db = Arc::new(sled::open(temp.path().join(name))?);
        let directory = Directory::new(&db)?;
        let service = EventService::new(db.clone(), Arc::new(directory.clone()))?.with_config(config);

        Ok(Self {
            _temp: temp,
            db,
            directory,
            service,
        })
    }

    pub fn register(&self, role: Role, name: &str) -> anyhow::Result<Identity> {
        Ok(self.directory.register(Identity::new(role, name)?)?)
    }

    /// A student organization linked to the given advisor and dean.
    pub fn org(
        &self,
        name: &str,
        advisor: Option<&Identity>,
        dean: Option<&Identity>,
    ) -> anyhow::Result<Identity> {
        let mut org = Identity::new(Role::StudentOrg, name)?;
        if let Some(advisor) = advisor {
            org = org.with_advisor(&advisor.id);
        }
        if let Some(dean) = dean {
            org = org.with_dean(&dean.id);
        }
        Ok(self.directory.register(org)?)
    }
}

pub fn date(year: i32, month: u32, day: u32) -> EventDate {
    EventDate::from_ymd(year, month, day).expect("valid calendar date")
}

pub fn details(event_type: EventType) -> EventDetails {
    let details = EventDetails::new()
        .set_name("Intramurals Opening")
        .set_description("Opening parade and program")
        .set_type(event_type)
        .set_proposed_date(date(2025, 10, 6))
        .set_optional_date(date(2025, 10, 13));

    match event_type {
        EventType::Online => details,
        _ => details.set_location("University Oval"),
    }
}
