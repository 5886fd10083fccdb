use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::attendance::{self, AttendanceType, StatusLabel};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self { latitude, longitude }),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// One of the four events of a kid's day, normalized at ingestion: the
/// completion flag is already a `bool` and the timestamp already parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    #[serde(rename = "type")]
    pub kind: AttendanceType,
    pub raw_time: String,
    /// `None` when `raw_time` could not be parsed.
    pub at: Option<DateTime<FixedOffset>>,
    pub attended: bool,
    pub location: Option<GeoPoint>,
}

impl AttendanceEvent {
    pub fn new(
        kind: AttendanceType,
        raw_time: String,
        attended: bool,
        location: Option<GeoPoint>,
    ) -> Self {
        let at = attendance::parse_timestamp(&raw_time);
        Self {
            kind,
            raw_time,
            at,
            attended,
            location,
        }
    }

    pub fn status(&self) -> StatusLabel {
        if self.attended {
            StatusLabel::Attended
        } else {
            StatusLabel::Absent
        }
    }

    pub fn display_time(&self) -> Option<String> {
        self.at.as_ref().map(attendance::format_time)
    }
}

/// A kid's attendance for one date. A slot is filled only when the upstream
/// record carried a non-null time for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDay {
    pub kid_name: Option<String>,
    pub home_pickup: Option<AttendanceEvent>,
    pub home_drop: Option<AttendanceEvent>,
    pub institute_pickup: Option<AttendanceEvent>,
    pub institute_drop: Option<AttendanceEvent>,
}

impl AttendanceDay {
    pub fn event(&self, kind: AttendanceType) -> Option<&AttendanceEvent> {
        match kind {
            AttendanceType::HomePickup => self.home_pickup.as_ref(),
            AttendanceType::HomeDrop => self.home_drop.as_ref(),
            AttendanceType::InstitutePickup => self.institute_pickup.as_ref(),
            AttendanceType::InstituteDrop => self.institute_drop.as_ref(),
            AttendanceType::Absent => None,
        }
    }

    /// Present events in declared order.
    pub fn events(&self) -> impl Iterator<Item = &AttendanceEvent> + '_ {
        AttendanceType::EVENTS
            .iter()
            .filter_map(move |kind| self.event(*kind))
    }

    pub fn is_empty(&self) -> bool {
        self.events().next().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl Photo {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: format!("attendance-{}.jpg", uuid::Uuid::new_v4()),
            content_type: "image/jpeg".to_string(),
        }
    }
}

/// What the caretaker fills in before marking a kid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceForm {
    #[serde(default)]
    pub user_profile_uuid: String,
    #[serde(default, rename = "type")]
    pub attendance_type: Option<String>,
    #[serde(default)]
    pub pickup_time: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(skip)]
    pub photo: Option<Photo>,
}

/// The multipart payload posted to the attendance endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSubmission {
    pub user_profile_uuid: String,
    pub date: NaiveDate,
    pub type_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pickup_time: DateTime<Utc>,
    pub photo: Option<Photo>,
}
