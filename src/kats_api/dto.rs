use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize};

use crate::attendance::AttendanceType;
use crate::models::{AttendanceDay, AttendanceEvent, GeoPoint};

/// Completion flag as sent by the API: the string "true"/"false". Any other
/// shape, a JSON boolean included, is not an attendance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Flag {
    Text(String),
    Other(serde_json::Value),
}

impl Flag {
    pub fn is_true(&self) -> bool {
        match self {
            Flag::Text(text) => crate::attendance::is_attended(Some(text.as_str())),
            Flag::Other(_) => false,
        }
    }
}

/// Coordinates arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Coordinate {
    pub fn value(&self) -> Option<f64> {
        match self {
            Coordinate::Number(value) => Some(*value),
            Coordinate::Text(text) => text.trim().parse().ok(),
            Coordinate::Other(_) => None,
        }
    }
}

/// Accepts any JSON scalar and keeps it as text, so an odd value in one
/// field never rejects the whole record.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// Event times are ISO strings; a JSON integer is read as epoch
/// milliseconds and rewritten as RFC 3339 UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) => Some(text),
        Some(serde_json::Value::Number(number)) => Some(
            number
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| number.to_string()),
        ),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePickup {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub pickup_time: Option<String>,
    #[serde(default)]
    pub home_onboard: Option<Flag>,
    #[serde(default)]
    pub latitude: Option<Coordinate>,
    #[serde(default)]
    pub longitude: Option<Coordinate>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeDrop {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub drop_time: Option<String>,
    #[serde(default)]
    pub home_offboard: Option<Flag>,
    #[serde(default)]
    pub latitude: Option<Coordinate>,
    #[serde(default)]
    pub longitude: Option<Coordinate>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutePickup {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub pickup_time: Option<String>,
    #[serde(default)]
    pub institute_onboard: Option<Flag>,
    #[serde(default)]
    pub latitude: Option<Coordinate>,
    #[serde(default)]
    pub longitude: Option<Coordinate>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstituteDrop {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub drop_time: Option<String>,
    #[serde(default)]
    pub institute_offboard: Option<Flag>,
    #[serde(default)]
    pub latitude: Option<Coordinate>,
    #[serde(default)]
    pub longitude: Option<Coordinate>,
}

/// Body of `GET /api/v1/kid-attendance/{kid}/date/{date}`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KidAttendanceResponse {
    #[serde(default)]
    pub kid_name: Option<String>,
    #[serde(default)]
    pub home_pickup: Option<HomePickup>,
    #[serde(default)]
    pub home_drop: Option<HomeDrop>,
    #[serde(default)]
    pub institute_pickup: Option<InstitutePickup>,
    #[serde(default)]
    pub institute_drop: Option<InstituteDrop>,
}

fn event(
    kind: AttendanceType,
    time: Option<String>,
    flag: Option<Flag>,
    latitude: Option<Coordinate>,
    longitude: Option<Coordinate>,
) -> Option<AttendanceEvent> {
    let time = time?;
    let location = GeoPoint::from_parts(
        latitude.as_ref().and_then(Coordinate::value),
        longitude.as_ref().and_then(Coordinate::value),
    );
    let attended = flag.as_ref().is_some_and(Flag::is_true);
    Some(AttendanceEvent::new(kind, time, attended, location))
}

impl From<KidAttendanceResponse> for AttendanceDay {
    fn from(record: KidAttendanceResponse) -> Self {
        Self {
            kid_name: record.kid_name,
            home_pickup: record.home_pickup.and_then(|e| {
                event(AttendanceType::HomePickup, e.pickup_time, e.home_onboard, e.latitude, e.longitude)
            }),
            home_drop: record.home_drop.and_then(|e| {
                event(AttendanceType::HomeDrop, e.drop_time, e.home_offboard, e.latitude, e.longitude)
            }),
            institute_pickup: record.institute_pickup.and_then(|e| {
                event(
                    AttendanceType::InstitutePickup,
                    e.pickup_time,
                    e.institute_onboard,
                    e.latitude,
                    e.longitude,
                )
            }),
            institute_drop: record.institute_drop.and_then(|e| {
                event(
                    AttendanceType::InstituteDrop,
                    e.drop_time,
                    e.institute_offboard,
                    e.latitude,
                    e.longitude,
                )
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kid {
    #[serde(default, deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub kid_name: Option<String>,
    #[serde(default)]
    pub kids_date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// One element of `GET /api/caretaker/route/{uuid}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaretakerRoute {
    #[serde(default)]
    pub route_info: Option<RouteInfo>,
    #[serde(default)]
    pub driver: Option<Person>,
    #[serde(default)]
    pub caretaker: Option<Person>,
    #[serde(default)]
    pub kids: Option<Vec<Kid>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    #[serde(default, rename = "_id", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub alternate_phone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub aadhar_no: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub aadhar_front_image: Option<String>,
    #[serde(default)]
    pub aadhar_back_image: Option<String>,
}

/// Envelope of `GET /api/caretaker/{uuid}`.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<ProfileData>,
}

/// Error bodies and plain acknowledgements share this shape.
#[derive(Debug, Default, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PasswordLinkRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordBody<'a> {
    pub identifier: &'a str,
    pub old_password: &'a str,
    pub new_password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPasswordBody<'a> {
    pub token: &'a str,
    pub new_password: &'a str,
    pub confirm_password: &'a str,
}
