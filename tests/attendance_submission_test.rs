use chrono::{NaiveDate, Timelike};
use kats::error::AppError;
use kats::models::AttendanceForm;
use kats::services::attendance_service::build_submission;

fn form(kind: Option<&str>, pickup_time: &str) -> AttendanceForm {
    AttendanceForm {
        user_profile_uuid: " kid-1 ".to_string(),
        attendance_type: kind.map(str::to_string),
        pickup_time: pickup_time.to_string(),
        latitude: Some(12.97),
        longitude: None,
        photo: None,
    }
}

#[test]
fn test_clock_time_lands_on_submitted_date() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
    let submission = build_submission(form(Some("Institute Drop"), "03:10 PM"), date).unwrap();

    assert_eq!(submission.user_profile_uuid, "kid-1");
    assert_eq!(submission.type_code, "instituteDrop");
    assert_eq!(submission.date, date);
    assert_eq!(submission.pickup_time.date_naive(), date);
    assert_eq!((submission.pickup_time.hour(), submission.pickup_time.minute()), (15, 10));
}

#[test]
fn test_empty_pickup_time_keeps_past_date() {
    let date = NaiveDate::from_ymd_opt(2023, 11, 20).unwrap();
    let submission = build_submission(form(Some("Home Drop"), "  "), date).unwrap();

    assert_eq!(submission.date, date);
    assert_eq!(submission.pickup_time.date_naive(), date);
}

#[test]
fn test_unknown_label_passes_through_lower_cased() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
    let submission = build_submission(form(Some("Field Trip"), "08:00 AM"), date).unwrap();
    assert_eq!(submission.type_code, "field trip");
}

#[test]
fn test_required_fields() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

    let err = build_submission(form(None, "08:00 AM"), date).unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "Please fill in all required fields"));

    let mut missing_kid = form(Some("Home Pickup"), "08:00 AM");
    missing_kid.user_profile_uuid = String::new();
    assert!(matches!(
        build_submission(missing_kid, date),
        Err(AppError::Validation(_))
    ));

    let err = build_submission(form(Some("Home Pickup"), "breakfast"), date).unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "Invalid pickup time: breakfast"));
}
