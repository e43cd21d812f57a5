use anyhow::{anyhow, Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fraglog_clickhouse::ClickHouseClient;
use fraglog_config::AppConfig;
use fraglog_intake::{ClickHouseRoundStore, IntakePipeline};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<IntakePipeline>,
    clickhouse: ClickHouseClient,
    /// Precomputed `Basic <credentials>` value; `None` disables the guard.
    expected_auth: Option<String>,
}

pub async fn run(cfg: AppConfig) -> Result<()> {
    let clickhouse = ClickHouseClient::new(cfg.clickhouse.clone())?;
    clickhouse.ping().await.context("clickhouse ping failed")?;

    let executed = clickhouse
        .run_migrations()
        .await
        .context("failed to run migrations")?;
    if executed.is_empty() {
        info!("schema up to date");
    } else {
        info!("applied migrations: {}", executed.join(", "));
    }

    let store = Arc::new(ClickHouseRoundStore::new(clickhouse.clone()));
    let state = AppState {
        pipeline: Arc::new(IntakePipeline::new(store)),
        clickhouse,
        expected_auth: expected_auth(&cfg.server.auth_username, &cfg.server.auth_password),
    };

    let app = Router::new()
        .route("/intake/damagelog/round", post(intake_round))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(cfg.intake.max_body_bytes))
        .with_state(state);

    let bind = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse::<SocketAddr>()
        .map_err(|err| anyhow!("invalid bind address: {err}"))?;

    info!("fraglog-server listening on http://{}", bind);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn expected_auth(username: &str, password: &str) -> Option<String> {
    if username.is_empty() {
        return None;
    }
    Some(format!(
        "Basic {}",
        STANDARD.encode(format!("{username}:{password}"))
    ))
}

fn authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected)
}

fn unauthorized() -> Response {
    let mut response =
        Json(json!({"ok": false, "error": "unauthorized"})).into_response();
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Basic realm=\"fraglog\""),
    );
    response
}

async fn intake_round(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(state.expected_auth.as_deref(), &headers) {
        return unauthorized();
    }

    match state.pipeline.ingest(&body).await {
        Ok(summary) => {
            info!(
                round = %summary.round,
                events = summary.events_written,
                participants = summary.participants_upserted,
                "round ingested"
            );
            Json(json!({
                "ok": true,
                "round": summary.round.as_str(),
                "events": summary.events_written,
                "participants": summary.participants_upserted,
            }))
            .into_response()
        }
        Err(err) => {
            error!("failed to process round document: {err:#}");
            let mut response =
                Json(json!({"ok": false, "error": err.to_string()})).into_response();
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match state.clickhouse.ping().await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(err) => {
            let mut response =
                Json(json!({"ok": false, "error": err.to_string()})).into_response();
            *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
            response
        }
    }
}
