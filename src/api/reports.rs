/// Admin report endpoints

use crate::{
    api::{AppState, AuthUser},
    error::AppResult,
};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

/// Missing fields fall back to the current month/year
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

pub fn create_report_routes() -> Router<AppState> {
    Router::new()
        .route("/reports/dashboard-stats", get(dashboard_stats))
        .route("/reports/monthly-enrollment", get(monthly_enrollment))
        .route("/reports/yearly-overview", get(yearly_overview))
}

/// GET /api/reports/dashboard-stats
async fn dashboard_stats(State(state): State<AppState>, caller: AuthUser) -> AppResult<Json<Value>> {
    let stats = state.reports.dashboard_stats(&caller.user, Utc::now()).await?;
    Ok(Json(json!({ "stats": stats })))
}

/// GET /api/reports/monthly-enrollment?month=3&year=2025
async fn monthly_enrollment(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<Value>> {
    let now = Utc::now();
    let report = state
        .reports
        .monthly_enrollment(
            &caller.user,
            query.year.unwrap_or(now.year()),
            query.month.unwrap_or(now.month()),
        )
        .await?;
    Ok(Json(json!({ "report": report })))
}

/// GET /api/reports/yearly-overview?year=2025
async fn yearly_overview(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<Value>> {
    let year = query.year.unwrap_or(Utc::now().year());
    let overview = state.reports.yearly_overview(&caller.user, year).await?;
    Ok(Json(json!({ "report": overview })))
}
