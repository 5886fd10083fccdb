pub mod dto;

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, SecondsFormat};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{
    AttendanceDay, AttendanceSubmission, CaretakerProfile, Contact, RouteDetails, RouteSummary,
    Student, route::NOT_AVAILABLE,
};
use crate::session::Credentials;

pub const DEFAULT_BASE_URL: &str = "https://api.katsapp.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let base_url = env::var("KATS_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::BadRequest(format!(
                "KATS_API_BASE_URL must be an http(s) URL, got {}",
                base_url
            )));
        }

        let timeout_secs = match env::var("KATS_HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                AppError::BadRequest(format!("KATS_HTTP_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// The remote KATS API as seen by the caretaker.
///
/// Calls taking `Credentials` are session bound: a 401 from them comes back
/// as `AppError::Unauthorized` so the caller can drop the stored token.
#[async_trait]
pub trait KatsClient: Send + Sync {
    async fn fetch_routes(&self, credentials: &Credentials) -> Result<Vec<dto::CaretakerRoute>, AppError>;
    async fn fetch_profile(&self, credentials: &Credentials) -> Result<CaretakerProfile, AppError>;
    /// `Ok(None)` when the API has nothing for that kid and date, a 404
    /// included.
    async fn fetch_attendance(
        &self,
        credentials: &Credentials,
        kid_uuid: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceDay>, AppError>;
    async fn submit_attendance(
        &self,
        credentials: &Credentials,
        submission: &AttendanceSubmission,
    ) -> Result<(), AppError>;
    async fn request_password_link(&self, email: &str) -> Result<Option<String>, AppError>;
    async fn reset_password(&self, body: &dto::ResetPasswordBody<'_>) -> Result<(), AppError>;
    async fn confirm_password(&self, body: &dto::ConfirmPasswordBody<'_>) -> Result<(), AppError>;
}

pub struct HttpKatsClient {
    client: Client,
    config: ApiConfig,
}

impl HttpKatsClient {
    pub fn new(config: ApiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Base URL plus `segments`, each percent-encoded as a single path
    /// segment so ids can never reshape the path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| AppError::BadRequest(format!("Invalid KATS API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                AppError::BadRequest(format!(
                    "KATS API base URL cannot carry a path: {}",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_authorized(&self, credentials: &Credentials, url: Url) -> Result<Response, AppError> {
        debug!("GET {} as {}", url.path(), credentials.masked_token());
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, credentials.bearer())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        Ok(response)
    }

    async fn post_public<T: serde::Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> Result<Response, AppError> {
        let response = self
            .client
            .post(self.endpoint(segments)?)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        check_status(response, false).await
    }
}

/// Turns non-success responses into errors. Only session-bound calls treat
/// 401 as an expired session; on the password endpoints it means a wrong
/// password.
async fn check_status(response: Response, session_bound: bool) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if session_bound && status == StatusCode::UNAUTHORIZED {
        warn!("KATS API rejected the session token");
        return Err(AppError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Upstream {
        status: status.as_u16(),
        message: upstream_message(&body),
    })
}

fn upstream_message(body: &str) -> String {
    serde_json::from_str::<dto::ApiMessage>(body)
        .ok()
        .and_then(|m| m.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

async fn parse_body<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, AppError> {
    let body_text = response.text().await?;
    serde_json::from_str::<T>(&body_text).map_err(|e| {
        tracing::error!("Failed to parse: {}", e);
        AppError::BadRequest(format!("Failed to parse KATS response: {}", e))
    })
}

/// Date part of an ISO date or datetime ("2015-04-02T00:00:00.000Z").
pub(crate) fn date_part(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().split('T').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn or_empty(value: Option<String>) -> String {
    value.unwrap_or_default()
}

pub fn route_summary(route: &dto::CaretakerRoute) -> RouteSummary {
    let info = route.route_info.as_ref();
    let start = info.and_then(|i| i.from.clone()).unwrap_or_default();
    let end = info.and_then(|i| i.to.clone()).unwrap_or_default();

    RouteSummary {
        id: info.and_then(|i| i.uuid.clone()).unwrap_or_default(),
        name: format!("{} to {}", start, end),
        start,
        end,
        total_students: route.kids.as_ref().map(Vec::len).unwrap_or(0),
        status: info
            .and_then(|i| i.status.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Pending".to_string()),
    }
}

fn contact(person: Option<&dto::Person>) -> Contact {
    let non_empty = |value: Option<&String>| value.filter(|v| !v.is_empty()).cloned();
    Contact {
        name: non_empty(person.and_then(|p| p.name.as_ref())).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        phone: non_empty(person.and_then(|p| p.phone_number.as_ref()))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        profile_picture: person.and_then(|p| p.profile_picture.clone()),
    }
}

pub fn route_details(route: dto::CaretakerRoute) -> RouteDetails {
    let info = route.route_info.unwrap_or_default();
    let students = route
        .kids
        .unwrap_or_default()
        .into_iter()
        .map(|kid| Student {
            uuid: or_empty(kid.uuid),
            name: kid.kid_name.filter(|n| !n.is_empty()).unwrap_or_else(|| "Unknown".to_string()),
            date_of_birth: kid.kids_date_of_birth.as_deref().and_then(date_part),
            gender: or_empty(kid.gender),
        })
        .collect();

    RouteDetails {
        route_name: format!(
            "{} to {}",
            info.from.as_deref().unwrap_or_default(),
            info.to.as_deref().unwrap_or_default()
        ),
        route_uuid: info.uuid,
        from: info.from,
        to: info.to,
        location: info.location,
        driver: contact(route.driver.as_ref()),
        caretaker: contact(route.caretaker.as_ref()),
        students,
    }
}

pub fn caretaker_profile(envelope: dto::ProfileResponse) -> Result<CaretakerProfile, AppError> {
    if !envelope.success {
        return Err(AppError::BadRequest(
            envelope
                .message
                .unwrap_or_else(|| "Failed to fetch profile data".to_string()),
        ));
    }
    let data = envelope
        .data
        .ok_or_else(|| AppError::BadRequest("No user data in response".to_string()))?;

    Ok(CaretakerProfile {
        id: or_empty(data.id),
        uuid: or_empty(data.uuid),
        name: or_empty(data.name),
        email: or_empty(data.email),
        phone: or_empty(data.phone_number),
        alternate_phone: or_empty(data.alternate_phone_number),
        aadhar: or_empty(data.aadhar_no),
        address: or_empty(data.address),
        dob: data.dob.as_deref().and_then(date_part),
        role: data
            .role
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "caretaker".to_string()),
        profile_picture: or_empty(data.profile_picture),
        aadhar_front_image: or_empty(data.aadhar_front_image),
        aadhar_back_image: or_empty(data.aadhar_back_image),
    })
}

fn submission_form(submission: &AttendanceSubmission) -> Result<Form, AppError> {
    let coordinate = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();

    let mut form = Form::new()
        .text("userProfileUuid", submission.user_profile_uuid.clone())
        .text("date", submission.date.format("%Y-%m-%d").to_string())
        .text("type", submission.type_code.clone())
        .text("latitude", coordinate(submission.latitude))
        .text("longitude", coordinate(submission.longitude))
        .text(
            "PickupTime",
            submission.pickup_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

    if let Some(photo) = &submission.photo {
        let part = Part::bytes(photo.bytes.clone())
            .file_name(photo.file_name.clone())
            .mime_str(&photo.content_type)?;
        form = form.part("photo", part);
    }

    Ok(form)
}

#[async_trait]
impl KatsClient for HttpKatsClient {
    async fn fetch_routes(&self, credentials: &Credentials) -> Result<Vec<dto::CaretakerRoute>, AppError> {
        let uuid = credentials.user_uuid.as_str();
        let mut url = self.endpoint(&["api", "caretaker", "route", uuid])?;
        url.query_pairs_mut().append_pair("uuid", uuid);
        let response = self.get_authorized(credentials, url).await?;
        let response = check_status(response, true).await?;
        let routes: Vec<dto::CaretakerRoute> = parse_body(response).await?;
        info!("Fetched {} routes for caretaker {}", routes.len(), uuid);
        Ok(routes)
    }

    async fn fetch_profile(&self, credentials: &Credentials) -> Result<CaretakerProfile, AppError> {
        let uuid = credentials.user_uuid.as_str();
        let mut url = self.endpoint(&["api", "caretaker", uuid])?;
        url.query_pairs_mut().append_pair("uuid", uuid);
        let response = self.get_authorized(credentials, url).await?;
        let response = check_status(response, true).await?;
        caretaker_profile(parse_body(response).await?)
    }

    async fn fetch_attendance(
        &self,
        credentials: &Credentials,
        kid_uuid: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceDay>, AppError> {
        let day = date.format("%Y-%m-%d").to_string();
        let url = self.endpoint(&["api", "v1", "kid-attendance", kid_uuid, "date", day.as_str()])?;
        let response = self.get_authorized(credentials, url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No attendance records for kid {} on {}", kid_uuid, date);
            return Ok(None);
        }

        let response = check_status(response, true).await?;
        let body_text = response.text().await?;
        let record = if body_text.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Option<dto::KidAttendanceResponse>>(&body_text).map_err(|e| {
                AppError::BadRequest(format!("Failed to parse attendance record: {}", e))
            })?
        };
        let day = record.map(AttendanceDay::from).filter(|day| !day.is_empty());
        if day.is_none() {
            debug!("Attendance record for kid {} on {} carries no events", kid_uuid, date);
        }
        Ok(day)
    }

    async fn submit_attendance(
        &self,
        credentials: &Credentials,
        submission: &AttendanceSubmission,
    ) -> Result<(), AppError> {
        let form = submission_form(submission)?;
        let response = self
            .client
            .post(self.endpoint(&["api", "v1", "kid-attendance"])?)
            .header(AUTHORIZATION, credentials.bearer())
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;

        let response = check_status(response, true).await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: "Failed to submit attendance".to_string(),
            });
        }

        info!(
            "Submitted {} for profile {} on {}",
            submission.type_code, submission.user_profile_uuid, submission.date
        );
        Ok(())
    }

    async fn request_password_link(&self, email: &str) -> Result<Option<String>, AppError> {
        let response = self
            .post_public(
                &["api", "forgot", "password", "link"],
                &dto::PasswordLinkRequest { email },
            )
            .await?;
        let body = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str::<dto::ApiMessage>(&body)
            .ok()
            .and_then(|m| m.message))
    }

    async fn reset_password(&self, body: &dto::ResetPasswordBody<'_>) -> Result<(), AppError> {
        self.post_public(&["api", "reset", "password"], body).await?;
        Ok(())
    }

    async fn confirm_password(&self, body: &dto::ConfirmPasswordBody<'_>) -> Result<(), AppError> {
        self.post_public(&["api", "forgot", "update", "password"], body).await?;
        Ok(())
    }
}

/// Stand-in used when no API is configured: nothing is assigned and every
/// write is accepted.
pub struct NoopKatsClient;

#[async_trait]
impl KatsClient for NoopKatsClient {
    async fn fetch_routes(&self, _credentials: &Credentials) -> Result<Vec<dto::CaretakerRoute>, AppError> {
        Ok(Vec::new())
    }

    async fn fetch_profile(&self, _credentials: &Credentials) -> Result<CaretakerProfile, AppError> {
        Err(AppError::NotFound)
    }

    async fn fetch_attendance(
        &self,
        _credentials: &Credentials,
        _kid_uuid: &str,
        _date: NaiveDate,
    ) -> Result<Option<AttendanceDay>, AppError> {
        Ok(None)
    }

    async fn submit_attendance(
        &self,
        _credentials: &Credentials,
        _submission: &AttendanceSubmission,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn request_password_link(&self, _email: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }

    async fn reset_password(&self, _body: &dto::ResetPasswordBody<'_>) -> Result<(), AppError> {
        Ok(())
    }

    async fn confirm_password(&self, _body: &dto::ConfirmPasswordBody<'_>) -> Result<(), AppError> {
        Ok(())
    }
}
