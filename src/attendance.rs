//! Attendance reconciliation: type-label mapping, most-recent-event selection,
//! status classification and the time formatting used to present them.
//!
//! Nothing in here fails. Degenerate input (unknown labels, malformed
//! timestamps, missing flags, days without events) degrades to a passthrough,
//! `None` or `Absent`.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Serialize, Serializer};

use crate::models::AttendanceDay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceType {
    HomePickup,
    HomeDrop,
    InstitutePickup,
    InstituteDrop,
    Absent,
}

impl AttendanceType {
    /// The four timestamped events of a day, in declared order. Ties between
    /// identical timestamps resolve to the earliest entry of this list.
    pub const EVENTS: [AttendanceType; 4] = [
        AttendanceType::HomePickup,
        AttendanceType::HomeDrop,
        AttendanceType::InstitutePickup,
        AttendanceType::InstituteDrop,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            AttendanceType::HomePickup => "homePickup",
            AttendanceType::HomeDrop => "homeDrop",
            AttendanceType::InstitutePickup => "institutePickup",
            AttendanceType::InstituteDrop => "instituteDrop",
            AttendanceType::Absent => "absent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceType::HomePickup => "Home Pickup",
            AttendanceType::HomeDrop => "Home Drop",
            AttendanceType::InstitutePickup => "Institute Pickup",
            AttendanceType::InstituteDrop => "Institute Drop",
            AttendanceType::Absent => "Absent",
        }
    }

    /// Case-insensitive lookup by display label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "home pickup" => Some(AttendanceType::HomePickup),
            "home drop" => Some(AttendanceType::HomeDrop),
            "institute pickup" => Some(AttendanceType::InstitutePickup),
            "institute drop" => Some(AttendanceType::InstituteDrop),
            "absent" => Some(AttendanceType::Absent),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for AttendanceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Maps a display label to the backend code. Unknown labels come back
/// lower-cased, an empty label comes back empty.
pub fn canonicalize(label: &str) -> String {
    let lowered = label.to_lowercase();
    match AttendanceType::from_label(&lowered) {
        Some(kind) => kind.code().to_string(),
        None => lowered,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Attended,
    Absent,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Attended => "Attended",
            StatusLabel::Absent => "Absent",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StatusLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Completion flags travel as the literal strings "true"/"false".
/// Only an exact, case-sensitive "true" counts.
pub fn is_attended(flag: Option<&str>) -> bool {
    flag == Some("true")
}

/// The event kind does not influence the outcome; every sub-event uses the
/// same flag convention.
pub fn status_label(_kind: AttendanceType, flag: Option<&str>) -> StatusLabel {
    if is_attended(flag) {
        StatusLabel::Attended
    } else {
        StatusLabel::Absent
    }
}

/// Reads an event timestamp. RFC 3339 first, then an offset-less ISO form
/// or a bare date (midnight), both taken as UTC. Anything else is treated as
/// absent.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .map(|naive| naive.and_utc().fixed_offset())
}

/// 12-hour clock with a two-digit hour, e.g. "09:15 AM".
pub fn format_time<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    at.format("%I:%M %p").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentEvent {
    pub kind: AttendanceType,
    pub at: DateTime<FixedOffset>,
}

impl RecentEvent {
    pub fn display_time(&self) -> String {
        format_time(&self.at)
    }
}

pub fn most_recent_event(day: &AttendanceDay) -> Option<RecentEvent> {
    day.events()
        .filter_map(|event| event.at.map(|at| RecentEvent { kind: event.kind, at }))
        .fold(None, |latest, candidate| match latest {
            Some(current) if current.at >= candidate.at => Some(current),
            _ => Some(candidate),
        })
}

/// The `{type, time, date}` status shown next to a kid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceStatus {
    #[serde(rename = "type")]
    pub kind: AttendanceType,
    pub time: String,
    pub date: NaiveDate,
}

pub fn derive_status(day: &AttendanceDay, date: NaiveDate) -> Option<AttendanceStatus> {
    most_recent_event(day).map(|event| AttendanceStatus {
        kind: event.kind,
        time: event.display_time(),
        date,
    })
}

/// Combines the attendance date with a clock reading such as "07:45 AM".
/// 24-hour "HH:MM" is accepted too.
pub fn parse_clock_time(date: NaiveDate, clock: &str) -> Option<DateTime<Utc>> {
    let clock = clock.trim();
    ["%I:%M %p", "%I:%M:%S %p", "%H:%M", "%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(clock, format).ok())
        .map(|time| date.and_time(time).and_utc())
}
