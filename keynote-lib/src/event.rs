//! Event identity handed to the indexing pipeline
//!
//! Events are owned by the CRUD layer. This crate only reads the fields it
//! needs to build chunk headers and metadata, validated up front.
//!
//! ```ignore
//! use keynote_lib::event::{EventContext, EventRecord};
//!
//! let record: EventRecord = serde_json::from_str(payload)?;
//! let ctx = EventContext::try_from(record)?; // fails without an event id
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Event row as the owning service serializes it. Every field is optional
/// until converted into an [`EventContext`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default, alias = "id")]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default, alias = "organizer")]
    pub event_organizer: Option<String>,
    #[serde(default, alias = "chief_guest_name")]
    pub chief_guest: Option<String>,
    #[serde(default, alias = "event_venue")]
    pub venue: Option<String>,
    #[serde(default)]
    pub transcription: Option<String>,
}

/// Validated event identity used to label every chunk of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub id: Uuid,
    pub name: String,
    pub organizer: String,
    pub guest: String,
    pub venue: String,
}

impl EventContext {
    /// Start building a context; the id is checked in [`EventContextBuilder::build`].
    #[must_use]
    pub fn builder() -> EventContextBuilder {
        EventContextBuilder::default()
    }
}

impl TryFrom<&EventRecord> for EventContext {
    type Error = Error;

    fn try_from(record: &EventRecord) -> Result<Self> {
        let raw_id = record
            .event_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Validation("missing event id".to_string()))?;
        let id = Uuid::parse_str(raw_id)
            .map_err(|e| Error::Validation(format!("event id {raw_id:?} is not a UUID: {e}")))?;

        Ok(Self {
            id,
            name: field(&record.event_name),
            organizer: field(&record.event_organizer),
            guest: field(&record.chief_guest),
            venue: field(&record.venue),
        })
    }
}

impl TryFrom<EventRecord> for EventContext {
    type Error = Error;

    fn try_from(record: EventRecord) -> Result<Self> {
        Self::try_from(&record)
    }
}

fn field(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// Builder for [`EventContext`].
#[derive(Debug, Default)]
pub struct EventContextBuilder {
    id: Option<Uuid>,
    name: String,
    organizer: String,
    guest: String,
    venue: String,
}

impl EventContextBuilder {
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn organizer(mut self, organizer: impl Into<String>) -> Self {
        self.organizer = organizer.into();
        self
    }

    pub fn guest(mut self, guest: impl Into<String>) -> Self {
        self.guest = guest.into();
        self
    }

    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = venue.into();
        self
    }

    pub fn build(self) -> Result<EventContext> {
        let id = self
            .id
            .ok_or_else(|| Error::Validation("missing event id".to_string()))?;
        Ok(EventContext {
            id,
            name: self.name,
            organizer: self.organizer,
            guest: self.guest,
            venue: self.venue,
        })
    }
}
