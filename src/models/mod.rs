pub mod account;
pub mod attendance;
pub mod profile;
pub mod route;

pub use account::{ConfirmPasswordRequest, ForgotPasswordRequest, ResetPasswordRequest};
pub use attendance::{AttendanceDay, AttendanceEvent, AttendanceForm, AttendanceSubmission, GeoPoint, Photo};
pub use profile::CaretakerProfile;
pub use route::{Contact, RouteDetails, RouteSummary, Student};
