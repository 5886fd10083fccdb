use chrono::NaiveDate;
use serde::Serialize;

pub const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub id: String,
    pub name: String,
    pub start: String,
    pub end: String,
    pub total_students: usize,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub uuid: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDetails {
    pub route_name: String,
    pub route_uuid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub location: Option<String>,
    pub driver: Contact,
    pub caretaker: Contact,
    pub students: Vec<Student>,
}
