use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::board::AttendanceBoard;
use crate::kats_api::KatsClient;
use crate::services::{AccountService, AttendanceService, RouteService};
use crate::session::Session;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub kats: Arc<dyn KatsClient>,
    pub session: Session,
    pub board: Arc<Mutex<AttendanceBoard>>,
    /// Directory `photoPath` values are resolved in. `None` disables them.
    pub photo_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(db: SqlitePool, kats: Arc<dyn KatsClient>, session: Session) -> Self {
        Self {
            db,
            kats,
            session,
            board: Arc::new(Mutex::new(AttendanceBoard::new())),
            photo_dir: None,
        }
    }

    pub fn with_photo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.photo_dir = Some(dir.into());
        self
    }

    pub fn attendance(&self) -> AttendanceService {
        AttendanceService::new(self.kats.clone(), self.session.clone())
    }

    pub fn routes(&self) -> RouteService {
        RouteService::new(self.kats.clone(), self.session.clone())
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.kats.clone())
    }
}
