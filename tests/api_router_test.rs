use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use chrono::{NaiveDate, Timelike};
use kats::api::router;
use kats::db;
use kats::error::AppError;
use kats::kats_api::{KatsClient, dto};
use kats::models::{AttendanceDay, AttendanceSubmission, CaretakerProfile};
use kats::session::{Credentials, Session};
use kats::state::AppState;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Scripted KATS API: kid `kid-empty` has no record, every other kid has a
/// home pickup at 07:30 UTC. Flip `reject` to make every session-bound call
/// fail with 401.
#[derive(Default)]
struct ScriptedKats {
    reject: AtomicBool,
    submissions: Mutex<Vec<AttendanceSubmission>>,
}

impl ScriptedKats {
    fn check(&self) -> Result<(), AppError> {
        if self.reject.load(Ordering::SeqCst) {
            Err(AppError::Unauthorized)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KatsClient for ScriptedKats {
    async fn fetch_routes(&self, _credentials: &Credentials) -> Result<Vec<dto::CaretakerRoute>, AppError> {
        self.check()?;
        let route = serde_json::from_value(json!({
            "routeInfo": { "uuid": "route-1", "from": "Depot", "to": "School" },
            "kids": [{ "uuid": "kid-1", "kidName": "Asha" }]
        }))
        .unwrap();
        Ok(vec![route])
    }

    async fn fetch_profile(&self, _credentials: &Credentials) -> Result<CaretakerProfile, AppError> {
        self.check()?;
        Err(AppError::NotFound)
    }

    async fn fetch_attendance(
        &self,
        _credentials: &Credentials,
        kid_uuid: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceDay>, AppError> {
        self.check()?;
        if kid_uuid == "kid-empty" {
            return Ok(None);
        }
        let record: dto::KidAttendanceResponse = serde_json::from_value(json!({
            "kidName": "Asha",
            "homePickup": {
                "pickupTime": format!("{}T07:30:00Z", date),
                "homeOnboard": "true"
            }
        }))
        .unwrap();
        Ok(Some(record.into()))
    }

    async fn submit_attendance(
        &self,
        _credentials: &Credentials,
        submission: &AttendanceSubmission,
    ) -> Result<(), AppError> {
        self.check()?;
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(())
    }

    async fn request_password_link(&self, _email: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }

    async fn reset_password(&self, _body: &dto::ResetPasswordBody<'_>) -> Result<(), AppError> {
        Err(AppError::Upstream {
            status: 401,
            message: "Invalid credentials".to_string(),
        })
    }

    async fn confirm_password(&self, _body: &dto::ConfirmPasswordBody<'_>) -> Result<(), AppError> {
        Ok(())
    }
}

struct TestApp {
    state: AppState,
    session: Session,
    kats: Arc<ScriptedKats>,
}

impl TestApp {
    async fn new() -> Self {
        let pool = db::init_db("sqlite::memory:", 1)
            .await
            .expect("Failed to create database");
        let kats = Arc::new(ScriptedKats::default());
        let session = Session::in_memory();
        let state = AppState::new(pool, kats.clone(), session.clone());
        Self { state, session, kats }
    }

    fn with_photo_dir(mut self, dir: &Path) -> Self {
        self.state = self.state.with_photo_dir(dir);
        self
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        router(self.state.clone()).oneshot(request).await.unwrap()
    }

    async fn sign_in(&self) {
        let response = self
            .call(
                Method::POST,
                "/session",
                Some(json!({ "token": "abc", "uuid": "caretaker-1" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}

fn photo_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kats-photos-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(dir.join("route-1")).unwrap();
    std::fs::write(dir.join("route-1").join("kid-1.png"), b"\x89PNG-bytes").unwrap();
    dir
}

fn submission_with_photo(photo_path: &str) -> Value {
    json!({
        "userProfileUuid": "kid-1",
        "type": "Home Pickup",
        "pickupTime": "07:45 AM",
        "date": "2024-03-05",
        "photoPath": photo_path
    })
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let response = app.call(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_canonical_type() {
    let app = TestApp::new().await;

    let response = app
        .call(Method::GET, "/attendance/types/canonical?label=Institute%20Drop", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "label": "Institute Drop", "code": "instituteDrop" })
    );

    let response = app.call(Method::GET, "/attendance/types/canonical", None).await;
    assert_eq!(json_body(response).await, json!({ "label": "", "code": "" }));
}

#[tokio::test]
async fn test_reconcile_record() {
    let app = TestApp::new().await;

    let response = app
        .call(
            Method::POST,
            "/attendance/reconcile",
            Some(json!({
                "date": "2024-01-01",
                "record": {
                    "homePickup": { "pickupTime": "2024-01-01T08:00:00Z", "homeOnboard": "true" },
                    "instituteDrop": { "dropTime": "2024-01-01T09:15:00Z" }
                }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["mostRecent"]["type"], "Institute Drop");
    assert_eq!(body["mostRecent"]["displayTime"], "09:15 AM");
    assert_eq!(
        body["status"],
        json!({ "type": "Institute Drop", "time": "09:15 AM", "date": "2024-01-01" })
    );
    assert_eq!(body["record"]["homePickup"]["attended"], true);
    assert_eq!(body["record"]["instituteDrop"]["attended"], false);
}

#[tokio::test]
async fn test_reconcile_empty_record() {
    let app = TestApp::new().await;

    let response = app
        .call(Method::POST, "/attendance/reconcile", Some(json!({ "record": {} })))
        .await;
    let body = json_body(response).await;
    assert_eq!(body, json!({ "record": null, "mostRecent": null, "status": null }));
}

#[tokio::test]
async fn test_routes_require_a_session() {
    let app = TestApp::new().await;

    let response = app.call(Method::GET, "/routes", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["message"], "Authentication required");

    app.sign_in().await;
    let response = app.call(Method::GET, "/routes", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body[0]["name"], "Depot to School");
    assert_eq!(body[0]["totalStudents"], 1);
    assert_eq!(body[0]["status"], "Pending");
}

#[tokio::test]
async fn test_kid_attendance_goes_through_the_board() {
    let app = TestApp::new().await;
    app.sign_in().await;

    let response = app
        .call(Method::GET, "/kids/kid-1/attendance/2024-03-05", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = json_body(response).await;
    assert_eq!(snapshot["loading"], false);
    assert_eq!(snapshot["selection"], json!({ "kidUuid": "kid-1", "date": "2024-03-05" }));
    assert_eq!(snapshot["record"]["kidName"], "Asha");
    assert_eq!(
        snapshot["statuses"]["kid-1"],
        json!({ "type": "Home Pickup", "time": "07:30 AM", "date": "2024-03-05" })
    );

    let response = app
        .call(Method::GET, "/kids/kid-empty/attendance/2024-03-05", None)
        .await;
    let snapshot = json_body(response).await;
    assert_eq!(snapshot["record"], Value::Null);
    assert!(snapshot["statuses"].get("kid-empty").is_none());
    assert!(snapshot["statuses"].get("kid-1").is_some());

    let board = json_body(app.call(Method::GET, "/board", None).await).await;
    assert_eq!(board, snapshot);
}

#[tokio::test]
async fn test_rejected_token_clears_session() {
    let app = TestApp::new().await;
    app.sign_in().await;
    app.kats.reject.store(true, Ordering::SeqCst);

    let response = app
        .call(Method::GET, "/kids/kid-1/attendance/2024-03-05", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["message"],
        "Session expired. Please login again."
    );
    assert!(app.session.current().await.unwrap().is_none());

    let board = json_body(app.call(Method::GET, "/board", None).await).await;
    assert_eq!(board["loading"], false);
}

#[tokio::test]
async fn test_submit_attendance() {
    let app = TestApp::new().await;
    app.sign_in().await;

    let response = app
        .call(
            Method::POST,
            "/kids/kid-1/attendance",
            Some(json!({
                "userProfileUuid": "kid-1",
                "type": "Home Pickup",
                "pickupTime": "07:45 AM",
                "date": "2024-03-05",
                "latitude": 12.97,
                "longitude": 77.59
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let lookup = json_body(response).await;
    assert_eq!(lookup["kidUuid"], "kid-1");
    assert_eq!(lookup["status"]["type"], "Home Pickup");

    let submissions = app.kats.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    let sent = &submissions[0];
    assert_eq!(sent.type_code, "homePickup");
    assert_eq!(sent.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    assert_eq!((sent.pickup_time.hour(), sent.pickup_time.minute()), (7, 45));
    assert_eq!(sent.latitude, Some(12.97));
    assert!(sent.photo.is_none());
}

#[tokio::test]
async fn test_submit_attendance_requires_type() {
    let app = TestApp::new().await;
    app.sign_in().await;

    let response = app
        .call(
            Method::POST,
            "/kids/kid-1/attendance",
            Some(json!({ "userProfileUuid": "kid-1", "pickupTime": "07:45 AM" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["message"],
        "Please fill in all required fields"
    );
    assert!(app.kats.submissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_password_flows() {
    let app = TestApp::new().await;

    let response = app
        .call(Method::POST, "/password/forgot", Some(json!({ "email": "a@b.co" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["message"],
        "Password reset link has been sent to your email."
    );

    let response = app
        .call(
            Method::POST,
            "/password/reset",
            Some(json!({
                "email": "a@b.co",
                "currentPassword": "old-secret",
                "newPassword": "new-secret",
                "confirmPassword": "new-secret"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["message"],
        "Failed to reset password. Current password is incorrect."
    );

    let response = app
        .call(
            Method::POST,
            "/password/confirm",
            Some(json!({ "token": "t-1", "newPassword": "secret1", "confirmPassword": "secret1" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_submit_refreshes_board_status() {
    let app = TestApp::new().await;
    app.sign_in().await;

    let response = app
        .call(
            Method::POST,
            "/kids/kid-1/attendance",
            Some(json!({
                "userProfileUuid": "kid-1",
                "type": "Home Pickup",
                "pickupTime": "07:45 AM",
                "date": "2024-03-05"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let board = json_body(app.call(Method::GET, "/board", None).await).await;
    assert_eq!(board["loading"], false);
    assert_eq!(board["selection"], json!({ "kidUuid": "kid-1", "date": "2024-03-05" }));
    assert_eq!(board["record"]["kidName"], "Asha");
    assert_eq!(
        board["statuses"]["kid-1"],
        json!({ "type": "Home Pickup", "time": "07:30 AM", "date": "2024-03-05" })
    );
}

#[tokio::test]
async fn test_photo_path_must_stay_inside_upload_dir() {
    let dir = photo_dir();
    let app = TestApp::new().await.with_photo_dir(&dir);
    app.sign_in().await;

    let outside = std::env::temp_dir().join(format!("kats-secret-{}.txt", uuid::Uuid::new_v4()));
    std::fs::write(&outside, b"not a photo").unwrap();

    for path in ["/etc/passwd", "../secret.txt", "route-1/../../secret.txt", "./route-1/kid-1.png"] {
        let response = app
            .call(Method::POST, "/kids/kid-1/attendance", Some(submission_with_photo(path)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} was accepted", path);
    }

    let response = app
        .call(
            Method::POST,
            "/kids/kid-1/attendance",
            Some(submission_with_photo(outside.to_str().unwrap())),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.kats.submissions.lock().unwrap().is_empty());

    std::fs::remove_file(&outside).unwrap();
}

#[tokio::test]
async fn test_photo_path_inside_upload_dir_is_attached() {
    let dir = photo_dir();
    let app = TestApp::new().await.with_photo_dir(&dir);
    app.sign_in().await;

    let response = app
        .call(
            Method::POST,
            "/kids/kid-1/attendance",
            Some(submission_with_photo("route-1/kid-1.png")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let submissions = app.kats.submissions.lock().unwrap();
    let photo = submissions[0].photo.as_ref().expect("photo attached");
    assert_eq!(photo.file_name, "kid-1.png");
    assert_eq!(photo.content_type, "image/png");
    assert_eq!(photo.bytes, b"\x89PNG-bytes".to_vec());
}

#[tokio::test]
async fn test_photo_path_rejected_without_upload_dir() {
    let app = TestApp::new().await;
    app.sign_in().await;

    let response = app
        .call(
            Method::POST,
            "/kids/kid-1/attendance",
            Some(submission_with_photo("kid-1.png")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["message"],
        "Photo uploads are not enabled"
    );
}
