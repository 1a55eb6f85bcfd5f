//! Event aggregate, its details and attached files
use super::error::{ValidationError, WorkflowError};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Utc};
use std::fmt;

/// Longest accepted event name, in characters.
pub const MAX_NAME_LEN: usize = 255;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum EventType {
    #[n(0)]
    Online,
    #[n(1)]
    Onsite,
    #[n(2)]
    Outside,
}

impl EventType {
    /// Onsite and outside events happen somewhere physical.
    pub fn requires_location(&self) -> bool {
        matches!(self, EventType::Onsite | EventType::Outside)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Revision,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Rejected => "rejected",
            EventStatus::Revision => "revision",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// Utc has no ordering of its own, so a derive would never apply
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn checked_add(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }
    pub fn date(&self) -> EventDate {
        EventDate(self.0.date_naive())
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

/// A calendar day, stored as days since the common era.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct EventDate(NaiveDate);

impl EventDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }
    pub fn to_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for EventDate {
    fn from(value: NaiveDate) -> Self {
        EventDate(value)
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

// Content of an event proposal. Every submitted version is stored under the hash of its CBOR encoding.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, Eq, PartialEq)]
pub struct EventDetails {
    #[n(0)]
    name: Option<String>,
    #[n(1)]
    description: Option<String>,
    #[n(2)]
    event_type: Option<EventType>,
    #[n(3)]
    location: Option<String>,
    #[n(4)]
    proposed_date: Option<EventDate>,
    #[n(5)]
    optional_date: Option<EventDate>,
}

impl EventDetails {
    /// Construct a new builder object, this becomes the basis for a proposal
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
    pub fn set_proposed_date(mut self, date: EventDate) -> Self {
        self.proposed_date = Some(date);
        self
    }
    pub fn set_optional_date(mut self, date: EventDate) -> Self {
        self.optional_date = Some(date);
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }
    // never unset on a stored event
    pub fn event_type(&self) -> EventType {
        self.event_type.unwrap_or(EventType::Online)
    }
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
    pub fn proposed_date(&self) -> Option<EventDate> {
        self.proposed_date
    }
    pub fn optional_date(&self) -> Option<EventDate> {
        self.optional_date
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong {
                max: MAX_NAME_LEN,
                len,
            });
        }
        if self.description.as_deref().is_none_or(|d| d.trim().is_empty()) {
            return Err(ValidationError::MissingDescription);
        }
        let Some(event_type) = self.event_type else {
            return Err(ValidationError::MissingType);
        };
        if event_type.requires_location() && self.location.as_deref().is_none_or(|l| l.trim().is_empty()) {
            return Err(ValidationError::MissingLocation);
        }
        if self.proposed_date.is_none() {
            return Err(ValidationError::MissingProposedDate);
        }
        Ok(())
    }

    // Validates the proposal then returns its hash and contents serialised into cbor
    pub fn validate_and_finalise(&self) -> Result<(String, Vec<u8>), WorkflowError> {
        self.validate()?;

        let contents = minicbor::to_vec(self).map_err(|e| WorkflowError::Codec(e.to_string()))?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }
}

/// The event aggregate. `status` always mirrors the approval chain.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    #[n(0)]
    pub id: String, // uuid7, bech32 with the `event_` prefix
    #[n(1)]
    pub org_id: String,
    #[n(2)]
    pub details: EventDetails,
    #[n(3)]
    pub final_date: Option<EventDate>,
    #[n(4)]
    pub status: EventStatus,
    #[n(5)]
    pub chain_len: u32,
    #[n(6)]
    pub revision_requested_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub revision_expires_at: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub reason: Option<String>,
    #[n(9)]
    pub revisions: Vec<String>, // details hashes, latest last
    #[n(10)]
    pub file_ids: Vec<String>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub updated_at: TimeStamp<Utc>,
}

impl Event {
    pub fn new(
        id: String,
        org_id: String,
        details: EventDetails,
        details_hash: String,
        chain_len: u32,
        created_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id,
            org_id,
            details,
            final_date: None,
            status: EventStatus::Pending,
            chain_len,
            revision_requested_at: None,
            revision_expires_at: None,
            reason: None,
            revisions: vec![details_hash],
            file_ids: vec![],
            created_at: created_at.clone(),
            updated_at: created_at,
        }
    }

    pub fn current_details_hash(&self) -> Option<&str> {
        self.revisions.last().map(String::as_str)
    }

    /// True while the owner may still resubmit a revision-flagged event.
    pub fn revision_window_open(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == EventStatus::Revision
            && self
                .revision_expires_at
                .as_ref()
                .is_some_and(|expires| now <= expires)
    }

    pub(crate) fn clear_revision(&mut self) {
        self.revision_requested_at = None;
        self.revision_expires_at = None;
        self.reason = None;
    }
}

/// A file handed over by the external file store, ready to be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub path: String,
    pub original_name: String,
    pub file_type: Option<String>,
    pub file_size: Option<u64>,
}

impl NewFile {
    pub fn new(path: &str, original_name: &str) -> Self {
        Self {
            path: path.to_string(),
            original_name: original_name.to_string(),
            file_type: None,
            file_size: None,
        }
    }
    pub fn with_type(mut self, file_type: &str) -> Self {
        self.file_type = Some(file_type.to_string());
        self
    }
    pub fn with_size(mut self, file_size: u64) -> Self {
        self.file_size = Some(file_size);
        self
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct EventFile {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub event_id: String,
    #[n(2)]
    pub path: String,
    #[n(3)]
    pub original_name: String,
    #[n(4)]
    pub file_type: Option<String>,
    #[n(5)]
    pub file_size: Option<u64>,
    #[n(6)]
    pub uploaded_at: TimeStamp<Utc>,
}

impl EventFile {
    pub fn attach(id: String, event_id: &str, file: NewFile, uploaded_at: TimeStamp<Utc>) -> Self {
        Self {
            id,
            event_id: event_id.to_string(),
            path: file.path,
            original_name: file.original_name,
            file_type: file.file_type,
            file_size: file.file_size,
            uploaded_at,
        }
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl<C> minicbor::Encode<C> for EventDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}
impl<'b, C> minicbor::Decode<'b, C> for EventDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(EventDate)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a calendar date",
            ))
    }
}
