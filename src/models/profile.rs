use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaretakerProfile {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub alternate_phone: String,
    pub aadhar: String,
    pub address: String,
    pub dob: Option<NaiveDate>,
    pub role: String,
    pub profile_picture: String,
    pub aadhar_front_image: String,
    pub aadhar_back_image: String,
}
