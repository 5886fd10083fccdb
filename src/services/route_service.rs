use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::kats_api::{self, KatsClient};
use crate::models::{CaretakerProfile, RouteDetails, RouteSummary};
use crate::session::Session;

pub struct RouteService {
    client: Arc<dyn KatsClient>,
    session: Session,
}

impl RouteService {
    pub fn new(client: Arc<dyn KatsClient>, session: Session) -> Self {
        Self { client, session }
    }

    pub async fn routes(&self) -> Result<Vec<RouteSummary>, AppError> {
        let credentials = self.session.require().await?;
        let routes = self
            .session
            .guard(self.client.fetch_routes(&credentials).await)
            .await?;
        Ok(routes.iter().map(kats_api::route_summary).collect())
    }

    /// Details of the first route assigned to the caretaker.
    pub async fn route_details(&self) -> Result<RouteDetails, AppError> {
        let credentials = self.session.require().await?;
        let routes = self
            .session
            .guard(self.client.fetch_routes(&credentials).await)
            .await?;

        let route = routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::BadRequest("No route data received from server".to_string()))?;

        let details = kats_api::route_details(route);
        info!(
            "Loaded route {} with {} students",
            details.route_name,
            details.students.len()
        );
        Ok(details)
    }

    pub async fn profile(&self) -> Result<CaretakerProfile, AppError> {
        let credentials = self.session.require().await?;
        self.session
            .guard(self.client.fetch_profile(&credentials).await)
            .await
    }
}
