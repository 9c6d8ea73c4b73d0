//! OpenAPI documentation aggregator, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "powerwatch API",
        version = "0.1.0",
        description = "Household power consumption readings, anomaly scores, drift and ROI reports.",
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Readings", description = "Latest meter readings and table aggregates"),
        (name = "Anomalies", description = "Rows flagged by the Isolation Forest scoring loop"),
        (name = "Reports", description = "Drift report and ROI estimate"),
    ),
    paths(
        crate::api::health,
        crate::api::data,
        crate::api::stats,
        crate::api::anomalies,
        crate::api::current_alert,
        crate::api::drift,
        crate::api::roi,
    ),
    components(schemas(
        crate::api::ErrorResponse,
        crate::api::HealthResponse,
        crate::api::DataPoint,
        crate::api::DataResponse,
        crate::api::StatsResponse,
        crate::api::AnomalyEntry,
        crate::api::AnomaliesResponse,
        crate::api::AlertResponse,
        crate::api::DriftResponse,
        crate::api::RoiResponse,
        powerwatch_core::ReadingStats,
    ))
)]
pub struct ApiDoc;
