//! Conversion between storage instants (UTC, whole seconds) and the
//! wall-clock values shown to the user in a display zone.

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, SecondsFormat,
    SubsecRound, TimeZone, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid time: {0}")]
    InvalidTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self::Fixed(Utc.fix())
    }
}

impl DisplayZone {
    pub fn parse(value: &str) -> Result<Self, TimeError> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("utc") || value == "Z" {
            return Ok(Self::default());
        }
        if let Ok(offset) = value.parse::<FixedOffset>() {
            return Ok(Self::Fixed(offset));
        }
        value
            .parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| TimeError::InvalidTime(format!("unknown time zone '{value}'")))
    }

    pub fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        match self {
            Self::Fixed(offset) => *offset,
            Self::Named(zone) => zone.offset_from_utc_datetime(&instant.naive_utc()).fix(),
        }
    }

    /// Offset in effect for a wall-clock value. A repeated hour resolves to
    /// its earlier occurrence; a skipped hour does not exist and is rejected.
    pub fn offset_for_local(&self, local: NaiveDateTime) -> Result<FixedOffset, TimeError> {
        match self {
            Self::Fixed(offset) => Ok(*offset),
            Self::Named(zone) => match zone.offset_from_local_datetime(&local) {
                LocalResult::Single(offset) => Ok(offset.fix()),
                LocalResult::Ambiguous(earliest, _) => Ok(earliest.fix()),
                LocalResult::None => Err(TimeError::InvalidTime(format!(
                    "{local} does not exist in {}",
                    zone.name()
                ))),
            },
        }
    }

    pub fn to_storage(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, TimeError> {
        to_storage(local, self.offset_for_local(local)?)
    }

    pub fn to_display(&self, instant: DateTime<Utc>) -> Result<NaiveDateTime, TimeError> {
        to_display(instant, self.offset_at(instant))
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> Result<NaiveDate, TimeError> {
        self.to_display(instant).map(|local| local.date())
    }
}

pub fn to_storage(local: NaiveDateTime, offset: FixedOffset) -> Result<DateTime<Utc>, TimeError> {
    let naive_utc = local
        .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
        .ok_or_else(|| TimeError::InvalidTime(format!("{local} is out of range for {offset}")))?;
    Ok(Utc.from_utc_datetime(&naive_utc.trunc_subsecs(0)))
}

pub fn to_display(instant: DateTime<Utc>, offset: FixedOffset) -> Result<NaiveDateTime, TimeError> {
    instant
        .trunc_subsecs(0)
        .naive_utc()
        .checked_add_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
        .ok_or_else(|| TimeError::InvalidTime(format!("{instant} is out of range for {offset}")))
}

pub fn format_wire(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_wire(value: &str, field_name: &str) -> Result<DateTime<Utc>, TimeError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc).trunc_subsecs(0));
    }
    // the backend omits the designator on some payloads; those values are UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive.trunc_subsecs(0)));
        }
    }
    Err(TimeError::InvalidTime(format!(
        "{field_name} '{value}' is not an ISO-8601 instant"
    )))
}

/// Inclusive range of display dates touched by `[start, end)`.
pub fn day_span(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    zone: &DisplayZone,
) -> Result<(NaiveDate, NaiveDate), TimeError> {
    let first = zone.local_date(start)?;
    let last = zone.local_date((end - Duration::seconds(1)).max(start))?;
    Ok((first, last))
}
