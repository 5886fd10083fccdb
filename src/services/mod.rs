pub mod account_service;
pub mod attendance_service;
pub mod route_service;

pub use account_service::AccountService;
pub use attendance_service::{AttendanceLookup, AttendanceService};
pub use route_service::RouteService;
