use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

pub const DRAFT_ID: i64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub attendees: Option<String>,
}

impl Appointment {
    pub fn is_persisted(&self) -> bool {
        self.id != DRAFT_ID
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "appointment.title")?;
        validate_non_empty(&self.description, "appointment.description")?;
        validate_range(self.start_at, self.end_at)
    }

    pub fn with_bounds(&self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            start_at,
            end_at,
            ..self.clone()
        }
    }

    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.location = normalize_optional(self.location);
        self.attendees = normalize_optional(self.attendees);
        self
    }
}

/// A client-side appointment that the backend has not assigned an id to yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentDraft {
    pub title: String,
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub attendees: Option<String>,
}

impl AppointmentDraft {
    /// Blank draft for the "new appointment" form. This is the only place a
    /// time may default to the current instant.
    pub fn starting_at(now: DateTime<Utc>, default_duration: Duration) -> Self {
        let start_at = now
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(now);
        Self {
            title: String::new(),
            description: String::new(),
            start_at,
            end_at: start_at.checked_add_signed(default_duration).unwrap_or(start_at),
            is_all_day: false,
            location: None,
            attendees: None,
        }
    }

    pub fn into_appointment(self) -> Appointment {
        Appointment {
            id: DRAFT_ID,
            title: self.title,
            description: self.description,
            start_at: self.start_at,
            end_at: self.end_at,
            is_all_day: self.is_all_day,
            location: self.location,
            attendees: self.attendees,
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub is_all_day: Option<bool>,
    pub location: Option<Option<String>>,
    pub attendees: Option<Option<String>>,
}

impl AppointmentChanges {
    pub fn bounds(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            start_at: Some(start_at),
            end_at: Some(end_at),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, current: &Appointment) -> Appointment {
        Appointment {
            id: current.id,
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| current.description.clone()),
            start_at: self.start_at.unwrap_or(current.start_at),
            end_at: self.end_at.unwrap_or(current.end_at),
            is_all_day: self.is_all_day.unwrap_or(current.is_all_day),
            location: self
                .location
                .clone()
                .unwrap_or_else(|| current.location.clone()),
            attendees: self
                .attendees
                .clone()
                .unwrap_or_else(|| current.attendees.clone()),
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.username, "credentials.username")?;
        if self.password.is_empty() {
            return Err("credentials.password must not be empty".to_string());
        }
        Ok(())
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_range(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Result<(), String> {
    if end_at <= start_at {
        return Err("appointment.end_at must be after appointment.start_at".to_string());
    }
    Ok(())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
