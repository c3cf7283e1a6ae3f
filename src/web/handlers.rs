//! HTTP request handlers.

use super::AppState;
use crate::aggregate::{history, summarize, Bucket, BucketWidth, OverallStatus, ProbeSummary};
use crate::now_ms;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::num::IntErrorKind;

const DEFAULT_HISTORY_DAYS: i64 = 1;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: error.into() })).into_response()
}

/// Epoch milliseconds as an ISO 8601 UTC timestamp, e.g. `2024-01-01T00:00:00.000Z`.
fn iso(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub now_iso: String,
    pub started_at_iso: String,
    pub scheduler_heartbeat_ms: i64,
    pub uptime_ms: i64,
}

pub async fn handle_healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = now_ms();
    let started_at = state.heartbeat.started_at_ms();

    Json(HealthResponse {
        status: "ok",
        now_iso: iso(now),
        started_at_iso: iso(started_at),
        scheduler_heartbeat_ms: state.heartbeat.last_tick_ms(),
        uptime_ms: now - started_at,
    })
}

// ============================================================================
// API: Summary
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub overall_status: OverallStatus,
    pub generated_at: String,
    pub probes: Vec<ProbeSummary>,
}

pub async fn handle_summary(State(state): State<AppState>) -> impl IntoResponse {
    match summarize(&state.store, now_ms()) {
        Ok(summary) => Json(SummaryResponse {
            overall_status: summary.overall_status,
            generated_at: iso(summary.generated_at_ms),
            probes: summary.probes,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Summary query failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ============================================================================
// API: History
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub days: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub component: String,
    pub from: String,
    pub to: String,
    pub bucket: BucketWidth,
    pub buckets: Vec<Bucket>,
}

fn parse_days(raw: Option<&str>) -> Result<i64, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_HISTORY_DAYS),
        Some(s) => match s.parse::<i64>() {
            Ok(days) => Ok(days),
            // out of range integers saturate and are clamped downstream
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => Ok(i64::MAX),
            Err(e) if *e.kind() == IntErrorKind::NegOverflow => Ok(i64::MIN),
            Err(_) => Err(format!("invalid query param: days must be an integer, got {:?}", s)),
        },
    }
}

pub async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let component = match query.component.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => {
            return error_response(StatusCode::BAD_REQUEST, "missing required query param: component")
        }
    };

    let days = match parse_days(query.days.as_deref()) {
        Ok(d) => d,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };

    match history(&state.store, &component, days, now_ms()) {
        Ok(h) => Json(HistoryResponse {
            component,
            from: iso(h.from_ms),
            to: iso(h.to_ms),
            bucket: h.width,
            buckets: h.buckets,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("History query for {} failed: {}", component, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::{RawSample, Store};
    use crate::scheduler::Heartbeat;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn state() -> (NamedTempFile, AppState) {
        let tmp = NamedTempFile::new().unwrap();
        let state = AppState {
            config: ServerConfig::default(),
            store: Arc::new(Store::new(tmp.path()).unwrap()),
            heartbeat: Arc::new(Heartbeat::new()),
        };
        (tmp, state)
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample(ts: i64, probe_id: &str, http_code: Option<u16>, latency_ms: u64) -> RawSample {
        RawSample {
            ts,
            probe_id: probe_id.to_string(),
            http_code,
            ok: http_code == Some(200),
            latency_ms,
            error: None,
        }
    }

    #[test]
    fn test_iso_format() {
        assert_eq!(iso(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso(3_600_123), "1970-01-01T01:00:00.123Z");
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days(None), Ok(1));
        assert_eq!(parse_days(Some("")), Ok(1));
        assert_eq!(parse_days(Some(" 14 ")), Ok(14));
        assert_eq!(parse_days(Some("-5")), Ok(-5));
        assert!(parse_days(Some("week")).is_err());
        assert!(parse_days(Some("2.5")).is_err());
        assert!(parse_days(Some("-")).is_err());
        assert_eq!(parse_days(Some("100000000000000000000")), Ok(i64::MAX));
        assert_eq!(parse_days(Some("-100000000000000000000")), Ok(i64::MIN));
    }

    #[tokio::test]
    async fn test_history_clamps_huge_days() {
        let (_tmp, state) = state();
        let query = HistoryQuery {
            component: Some("api-root".to_string()),
            days: Some("100000000000000000000".to_string()),
        };

        let resp = handle_history(State(state), Query(query)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["bucket"], "day");
    }

    #[tokio::test]
    async fn test_healthz() {
        let (_tmp, state) = state();
        let Json(health) = handle_healthz(State(state.clone())).await;

        assert_eq!(health.status, "ok");
        assert_eq!(health.scheduler_heartbeat_ms, state.heartbeat.started_at_ms());
        assert!(health.uptime_ms >= 0);
        assert!(health.now_iso.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_summary_response_shape() {
        let (_tmp, state) = state();
        let now = now_ms();
        state
            .store
            .insert_batch(&[sample(now - 1_000, "api-root", Some(200), 120), sample(now - 1_000, "docs", Some(503), 80)])
            .unwrap();

        let resp = handle_summary(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["overall_status"], "degraded");
        assert!(body["generated_at"].is_string());
        let probes = body["probes"].as_array().unwrap();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0]["id"], "api-root");
        assert_eq!(probes[0]["current_status"], "ok");
        assert_eq!(probes[0]["p95_latency_ms"], 120);
        assert_eq!(probes[1]["current_status"], "down");
        assert_eq!(probes[1]["http_code"], 503);
        assert_eq!(probes[1]["error"], Value::Null);
    }

    #[tokio::test]
    async fn test_history_requires_component() {
        let (_tmp, state) = state();

        let resp = handle_history(State(state.clone()), Query(HistoryQuery::default()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "missing required query param: component");

        let blank = HistoryQuery {
            component: Some("   ".to_string()),
            days: None,
        };
        let resp = handle_history(State(state), Query(blank)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_rejects_bad_days() {
        let (_tmp, state) = state();
        let query = HistoryQuery {
            component: Some("api-root".to_string()),
            days: Some("lots".to_string()),
        };

        let resp = handle_history(State(state), Query(query)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].as_str().unwrap().contains("days"));
    }

    #[tokio::test]
    async fn test_history_response_shape() {
        let (_tmp, state) = state();
        let now = now_ms();
        state
            .store
            .insert_batch(&[sample(now - 1_000, "api-root", Some(200), 120)])
            .unwrap();

        let query = HistoryQuery {
            component: Some("api-root".to_string()),
            days: Some("30".to_string()),
        };
        let resp = handle_history(State(state.clone()), Query(query)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["component"], "api-root");
        assert_eq!(body["bucket"], "day");
        let buckets = body["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0]["ok"], 1);
        assert_eq!(buckets[0]["down"], 0);
        assert_eq!(buckets[0]["p95_latency_ms"], 120);
        assert_eq!(buckets[0]["sample_count"], 1);

        // unknown probes are an empty history, not an error
        let query = HistoryQuery {
            component: Some("nobody".to_string()),
            days: None,
        };
        let resp = handle_history(State(state), Query(query)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["bucket"], "hour");
        assert!(body["buckets"].as_array().unwrap().is_empty());
    }
}
