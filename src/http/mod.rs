use std::collections::HashMap;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, get_service};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::app::AppContext;
use crate::poller::TELEMETRY_LOOP;
use crate::state::{ChannelKind, ChannelSnapshot, IntervalPoint, LampCommand, LampEvent};

const LOOP_NAMES: &[&str] = &[TELEMETRY_LOOP];

pub fn create_router(ctx: AppContext) -> Router {
    let static_dir = ctx.config.http.static_dir.clone();

    let asset_service = get_service(ServeDir::new(static_dir));

    let api = Router::new()
        .route("/overview", get(get_overview))
        .route("/channels", get(get_channels))
        .route("/channels/:channel", get(get_channel))
        .route("/channels/:channel/history", get(get_history))
        .route("/lamp", get(get_lamp))
        .route("/lamp/events", get(get_lamp_events));

    Router::new()
        .route("/healthz", get(get_healthz))
        .route("/metrics", get(get_metrics))
        .nest("/api/v1", api)
        .fallback_service(asset_service)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn get_healthz(State(ctx): State<AppContext>) -> StatusCode {
    // Allow up to six missed intervals before reporting unready.
    let staleness = ctx.config.sample.interval.saturating_mul(6);
    let is_ready = ctx.state.is_ready(LOOP_NAMES, staleness).await;

    if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn get_metrics(State(ctx): State<AppContext>) -> Response {
    match ctx.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn get_overview(State(ctx): State<AppContext>) -> Json<crate::state::OverviewSnapshot> {
    Json(ctx.state.overview().await)
}

async fn get_channels(State(ctx): State<AppContext>) -> Json<Vec<ChannelSnapshot>> {
    Json(ctx.state.channel_snapshots().await)
}

async fn get_channel(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
) -> Result<Json<ChannelSnapshot>, StatusCode> {
    let channel = ChannelKind::parse(&channel).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(ctx.state.channel_snapshot(channel).await))
}

#[derive(serde::Serialize)]
struct HistoryResponse {
    channel: ChannelKind,
    points: Vec<IntervalPoint>,
    downsampled: bool,
}

/// Returns the interval series for a channel.
/// Query params:
///   ?max_points=1000 (downsample target)
async fn get_history(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let channel = ChannelKind::parse(&channel).ok_or(StatusCode::NOT_FOUND)?;
    let max_points: usize = params
        .get("max_points")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000);

    let all_points = ctx.state.channel_history(channel).await;
    let (points, downsampled) = maybe_downsample(all_points, max_points);
    Ok(Json(HistoryResponse {
        channel,
        points,
        downsampled,
    }))
}

#[derive(serde::Serialize)]
struct LampResponse {
    state: LampCommand,
}

async fn get_lamp(State(ctx): State<AppContext>) -> Json<LampResponse> {
    Json(LampResponse {
        state: ctx.state.lamp_state().await,
    })
}

async fn get_lamp_events(
    State(ctx): State<AppContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<LampEvent>> {
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(200);
    let mut events = ctx.state.list_lamp_events().await;
    if events.len() > limit {
        let start = events.len() - limit;
        events = events[start..].to_vec();
    }
    Json(events)
}

pub fn maybe_downsample(
    points: Vec<IntervalPoint>,
    max_points: usize,
) -> (Vec<IntervalPoint>, bool) {
    if points.len() <= max_points || max_points == 0 {
        return (points, false);
    }
    let step = (points.len() as f64 / max_points as f64).ceil() as usize;
    if step <= 1 {
        return (points, false);
    }
    let mut sampled = Vec::with_capacity(max_points);
    for (idx, p) in points.into_iter().enumerate() {
        if idx % step == 0 {
            sampled.push(p);
        }
    }
    (sampled, true)
}
