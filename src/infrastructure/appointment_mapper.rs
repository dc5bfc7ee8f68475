use crate::domain::models::{Appointment, DRAFT_ID};
use crate::domain::time::{format_wire, parse_wire};
use crate::infrastructure::error::BackendError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<String>,
}

pub fn encode_appointment(appointment: &Appointment) -> AppointmentRecord {
    AppointmentRecord {
        id: appointment.is_persisted().then_some(appointment.id),
        title: appointment.title.clone(),
        description: Some(appointment.description.clone()),
        start_time: format_wire(appointment.start_at),
        end_time: format_wire(appointment.end_at),
        is_all_day: appointment.is_all_day,
        location: appointment.location.clone(),
        attendees: appointment.attendees.clone(),
    }
}

pub fn decode_appointment(record: &AppointmentRecord) -> Result<Appointment, BackendError> {
    let start_at = parse_wire(&record.start_time, "startTime")
        .map_err(|error| BackendError::Other(format!("invalid appointment record: {error}")))?;
    let end_at = parse_wire(&record.end_time, "endTime")
        .map_err(|error| BackendError::Other(format!("invalid appointment record: {error}")))?;
    if end_at <= start_at {
        return Err(BackendError::Other(format!(
            "invalid appointment record {}: end is not after start",
            record.id.unwrap_or(DRAFT_ID)
        )));
    }

    Ok(Appointment {
        id: record.id.unwrap_or(DRAFT_ID),
        title: record.title.clone(),
        description: record.description.clone().unwrap_or_default(),
        start_at,
        end_at,
        is_all_day: record.is_all_day,
        location: record.location.clone(),
        attendees: record.attendees.clone(),
    }
    .normalized())
}

/// Decodes a record the backend claims to have stored; it must carry an id.
pub fn decode_persisted_appointment(
    record: &AppointmentRecord,
) -> Result<Appointment, BackendError> {
    match record.id {
        Some(id) if id != DRAFT_ID => decode_appointment(record),
        _ => Err(BackendError::Other(format!(
            "invalid appointment record '{}': missing id",
            record.title
        ))),
    }
}

pub fn decode_appointments(
    records: &[AppointmentRecord],
) -> Result<Vec<Appointment>, BackendError> {
    records.iter().map(decode_persisted_appointment).collect()
}
