//! JSON endpoints behind the dashboard.
//!
//! Every body carries a `success` flag; store failures become HTTP 500 with
//! `success = false` and the error text.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use powerwatch_compute::drift_job::{load_report, DriftReport};
use powerwatch_compute::RoiReport;
use powerwatch_core::config::MAX_WINDOW_MINUTES;
use powerwatch_core::{Reading, ReadingStats};

use crate::state::AppState;

pub const DEFAULT_DATA_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;
pub const DEFAULT_ANOMALY_LIMIT: i64 = 20;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, e: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: e.to_string(),
        }),
    )
}

fn store_err(e: impl std::fmt::Display) -> ApiError {
    error!("Store query failed: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}

/// Start of a look-back window of `minutes`, clamped to `1..=MAX_WINDOW_MINUTES`.
fn window_start(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes.clamp(1, MAX_WINDOW_MINUTES))
}

// ── Health ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Server is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Readings ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
pub struct DataQuery {
    /// Number of rows (default 100, max 1000).
    pub limit: Option<i64>,
}

/// One chart point. Unscored rows report `is_anomaly = false`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DataPoint {
    pub timestamp: NaiveDateTime,
    pub global_active_power: Option<f64>,
    pub global_reactive_power: Option<f64>,
    pub voltage: Option<f64>,
    pub global_intensity: Option<f64>,
    pub sub_metering_1: Option<f64>,
    pub sub_metering_2: Option<f64>,
    pub sub_metering_3: Option<f64>,
    pub is_anomaly: bool,
    pub anomaly_score: Option<f64>,
}

impl From<Reading> for DataPoint {
    fn from(r: Reading) -> Self {
        Self {
            timestamp: r.ts,
            global_active_power: r.global_active_power_kw,
            global_reactive_power: r.global_reactive_power_kw,
            voltage: r.voltage_v,
            global_intensity: r.global_intensity_a,
            sub_metering_1: r.sub_metering_1_wh,
            sub_metering_2: r.sub_metering_2_wh,
            sub_metering_3: r.sub_metering_3_wh,
            is_anomaly: r.is_anomaly.unwrap_or(false),
            anomaly_score: r.anomaly_score,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DataResponse {
    pub success: bool,
    pub data: Vec<DataPoint>,
}

#[utoipa::path(
    get,
    path = "/api/data",
    tag = "Readings",
    params(DataQuery),
    responses(
        (status = 200, description = "Latest readings, newest first", body = DataResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn data(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DataQuery>,
) -> ApiResult<DataResponse> {
    let rows = state
        .store
        .latest(clamp_limit(q.limit, DEFAULT_DATA_LIMIT))
        .await
        .map_err(store_err)?;
    Ok(Json(DataResponse {
        success: true,
        data: rows.into_iter().map(DataPoint::from).collect(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: ReadingStats,
}

#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "Readings",
    responses(
        (status = 200, description = "Table aggregates (zeros when empty)", body = StatsResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsResponse> {
    let stats = state.store.stats().await.map_err(store_err)?;
    Ok(Json(StatsResponse { success: true, stats }))
}

// ── Anomalies ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
pub struct AnomaliesQuery {
    /// Look-back window on `scored_at`, in minutes (at most one year).
    pub minutes: Option<i64>,
    /// Maximum rows (default 20).
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnomalyEntry {
    pub timestamp: NaiveDateTime,
    pub power: Option<f64>,
    pub voltage: Option<f64>,
    pub score: Option<f64>,
    pub scored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnomaliesResponse {
    pub success: bool,
    pub anomalies: Vec<AnomalyEntry>,
}

#[utoipa::path(
    get,
    path = "/api/anomalies",
    tag = "Anomalies",
    params(AnomaliesQuery),
    responses(
        (status = 200, description = "Recently flagged rows, most recently scored first", body = AnomaliesResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn anomalies(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnomaliesQuery>,
) -> ApiResult<AnomaliesResponse> {
    let since = window_start(q.minutes.unwrap_or(state.dashboard.recent_anomaly_minutes));
    let rows = state
        .store
        .recent_anomalies(since, clamp_limit(q.limit, DEFAULT_ANOMALY_LIMIT))
        .await
        .map_err(store_err)?;

    let anomalies = rows
        .into_iter()
        .map(|r| AnomalyEntry {
            timestamp: r.ts,
            power: r.global_active_power_kw,
            voltage: r.voltage_v,
            score: r.anomaly_score,
            scored_at: r.scored_at,
        })
        .collect();
    Ok(Json(AnomaliesResponse {
        success: true,
        anomalies,
    }))
}

/// `has_alert = false` carries no other fields.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct AlertResponse {
    pub success: bool,
    pub has_alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scored_at: Option<DateTime<Utc>>,
}

#[utoipa::path(
    get,
    path = "/api/current_alert",
    tag = "Anomalies",
    responses(
        (status = 200, description = "Latest anomaly scored within the alert window", body = AlertResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn current_alert(State(state): State<Arc<AppState>>) -> ApiResult<AlertResponse> {
    let since = window_start(state.dashboard.alert_window_minutes);
    let latest = state
        .store
        .recent_anomalies(since, 1)
        .await
        .map_err(store_err)?
        .into_iter()
        .next();

    let body = match latest {
        Some(r) => AlertResponse {
            success: true,
            has_alert: true,
            timestamp: Some(r.ts),
            power: r.global_active_power_kw,
            voltage: r.voltage_v,
            intensity: r.global_intensity_a,
            score: r.anomaly_score,
            scored_at: r.scored_at,
        },
        None => AlertResponse {
            success: true,
            ..AlertResponse::default()
        },
    };
    Ok(Json(body))
}

// ── Reports ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct DriftResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub report: DriftReport,
}

#[utoipa::path(
    get,
    path = "/api/drift",
    tag = "Reports",
    responses(
        (status = 200, description = "Most recent drift report", body = DriftResponse),
        (status = 404, description = "No report written yet", body = ErrorResponse),
        (status = 500, description = "Unreadable report", body = ErrorResponse)
    )
)]
pub async fn drift(State(state): State<Arc<AppState>>) -> ApiResult<DriftResponse> {
    let path = state.drift_report.clone();
    if !path.exists() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("no drift report at {}", path.display()),
        ));
    }
    let report = tokio::task::spawn_blocking(move || load_report(&path))
        .await
        .map_err(store_err)?
        .map_err(store_err)?;
    Ok(Json(DriftResponse {
        success: true,
        report,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoiResponse {
    pub success: bool,
    /// `null` until at least one row has been scored.
    #[schema(value_type = Object, nullable)]
    pub roi: Option<RoiReport>,
}

#[utoipa::path(
    get,
    path = "/api/roi",
    tag = "Reports",
    responses(
        (status = 200, description = "ROI estimate over every scored row", body = RoiResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    )
)]
pub async fn roi(State(state): State<Arc<AppState>>) -> ApiResult<RoiResponse> {
    let summary = state.store.scoring_summary().await.map_err(store_err)?;
    let roi = RoiReport::compute(
        summary.scored.max(0) as u64,
        summary.anomalies.max(0) as u64,
        &state.roi,
    );
    Ok(Json(RoiResponse { success: true, roi }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, DEFAULT_DATA_LIMIT), 100);
        assert_eq!(clamp_limit(Some(5000), DEFAULT_DATA_LIMIT), MAX_LIMIT);
        assert_eq!(clamp_limit(Some(0), DEFAULT_DATA_LIMIT), 1);
        assert_eq!(clamp_limit(Some(-3), DEFAULT_ANOMALY_LIMIT), 1);
    }

    #[test]
    fn window_is_bounded_both_ways() {
        let before = Utc::now();
        let huge = window_start(i64::MAX);
        let tiny = window_start(-30);
        let after = Utc::now();

        assert!(before - huge <= Duration::minutes(MAX_WINDOW_MINUTES));
        assert!(after - huge >= Duration::minutes(MAX_WINDOW_MINUTES));
        assert!(before - tiny <= Duration::minutes(1));
        assert!(after - tiny >= Duration::minutes(1));
    }

    #[test]
    fn empty_alert_has_only_flags() {
        let body = serde_json::to_value(AlertResponse {
            success: true,
            ..AlertResponse::default()
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "has_alert": false}));
    }
}
