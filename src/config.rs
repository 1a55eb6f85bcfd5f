use anyhow::Context;
use chrono::TimeDelta;
use std::path::PathBuf;
use std::str::FromStr;

/// Longest accepted revision window, one year.
pub const MAX_REVISION_WINDOW_HOURS: i64 = 24 * 365;

/// Workflow configuration loaded from environment variables.
///
/// Every field has a default suitable for local development.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Directory of the sled database (default: `./event-approval.db`).
    pub db_path: PathBuf,
    /// How long an owner has to resubmit after a revision request (default: 24h).
    pub revision_window: TimeDelta,
    /// Whether rejections and revision requests must carry remarks (default: `true`).
    pub require_remarks: bool,
    /// Whether creating an event with nobody to approve it fails (default: `false`).
    /// Such an event otherwise stays pending.
    pub reject_empty_chain: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./event-approval.db"),
            revision_window: TimeDelta::hours(24),
            require_remarks: true,
            reject_empty_chain: false,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from the process environment, reading `.env` first if present.
    ///
    /// | Env Var                      | Default                |
    /// |------------------------------|------------------------|
    /// | `EVENT_APPROVAL_DB_PATH`     | `./event-approval.db`  |
    /// | `REVISION_WINDOW_HOURS`      | `24`                   |
    /// | `REQUIRE_DECISION_REMARKS`   | `true`                 |
    /// | `REJECT_EMPTY_APPROVAL_CHAIN`| `false`                |
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = lookup("EVENT_APPROVAL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let hours: i64 = parse_or(&lookup, "REVISION_WINDOW_HOURS", 24)?;
        if hours <= 0 || hours > MAX_REVISION_WINDOW_HOURS {
            anyhow::bail!(
                "REVISION_WINDOW_HOURS must be between 1 and {MAX_REVISION_WINDOW_HOURS}, got {hours}"
            );
        }
        let revision_window = TimeDelta::try_hours(hours)
            .context("REVISION_WINDOW_HOURS is out of range")?;

        let require_remarks = parse_or(&lookup, "REQUIRE_DECISION_REMARKS", defaults.require_remarks)?;
        let reject_empty_chain =
            parse_or(&lookup, "REJECT_EMPTY_APPROVAL_CHAIN", defaults.reject_empty_chain)?;

        Ok(Self {
            db_path,
            revision_window,
            require_remarks,
            reject_empty_chain,
        })
    }

    /// Open the sled database at `db_path`.
    pub fn open_db(&self) -> anyhow::Result<sled::Db> {
        sled::open(&self.db_path)
            .with_context(|| format!("failed to open database at {}", self.db_path.display()))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
