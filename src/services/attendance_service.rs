use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::attendance::{self, AttendanceStatus, canonicalize};
use crate::error::AppError;
use crate::kats_api::KatsClient;
use crate::models::{AttendanceDay, AttendanceForm, AttendanceSubmission};
use crate::session::Session;

pub struct AttendanceService {
    client: Arc<dyn KatsClient>,
    session: Session,
}

/// A kid's record for one date together with the status derived from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceLookup {
    pub kid_uuid: String,
    pub date: NaiveDate,
    pub record: Option<AttendanceDay>,
    pub status: Option<AttendanceStatus>,
}

impl AttendanceLookup {
    fn empty(kid_uuid: &str, date: NaiveDate) -> Self {
        Self {
            kid_uuid: kid_uuid.to_string(),
            date,
            record: None,
            status: None,
        }
    }
}

/// Validates the form and turns it into the payload the API expects.
/// An empty pickup time means the current time of day on `date`.
pub fn build_submission(form: AttendanceForm, date: NaiveDate) -> Result<AttendanceSubmission, AppError> {
    let type_label = form.attendance_type.as_deref().unwrap_or("").trim();
    if type_label.is_empty() || form.user_profile_uuid.trim().is_empty() {
        return Err(AppError::Validation(
            "Please fill in all required fields".to_string(),
        ));
    }

    let pickup_time = if form.pickup_time.trim().is_empty() {
        date.and_time(Utc::now().time()).and_utc()
    } else {
        attendance::parse_clock_time(date, &form.pickup_time).ok_or_else(|| {
            AppError::Validation(format!("Invalid pickup time: {}", form.pickup_time))
        })?
    };

    Ok(AttendanceSubmission {
        user_profile_uuid: form.user_profile_uuid.trim().to_string(),
        date,
        type_code: canonicalize(type_label),
        latitude: form.latitude,
        longitude: form.longitude,
        pickup_time,
        photo: form.photo,
    })
}

impl AttendanceService {
    pub fn new(client: Arc<dyn KatsClient>, session: Session) -> Self {
        Self { client, session }
    }

    pub async fn lookup(&self, kid_uuid: &str, date: NaiveDate) -> Result<AttendanceLookup, AppError> {
        if kid_uuid.trim().is_empty() {
            return Err(AppError::BadRequest("kid uuid is required".to_string()));
        }

        let credentials = self.session.require().await?;
        let record = self
            .session
            .guard(self.client.fetch_attendance(&credentials, kid_uuid, date).await)
            .await?;

        let status = record
            .as_ref()
            .and_then(|day| attendance::derive_status(day, date));

        Ok(AttendanceLookup {
            kid_uuid: kid_uuid.to_string(),
            date,
            record,
            status,
        })
    }

    /// Posts the attendance and re-reads the day. A failing re-read does not
    /// undo a successful submission; it just yields an empty lookup.
    pub async fn submit(
        &self,
        kid_uuid: &str,
        form: AttendanceForm,
        date: NaiveDate,
    ) -> Result<AttendanceLookup, AppError> {
        let submission = build_submission(form, date)?;
        let credentials = self.session.require().await?;

        self.session
            .guard(self.client.submit_attendance(&credentials, &submission).await)
            .await?;
        info!("Attendance {} recorded for kid {}", submission.type_code, kid_uuid);

        match self.lookup(kid_uuid, date).await {
            Ok(lookup) => Ok(lookup),
            Err(e) => {
                warn!("Failed to refresh attendance for kid {}: {}", kid_uuid, e);
                Ok(AttendanceLookup::empty(kid_uuid, date))
            }
        }
    }
}
