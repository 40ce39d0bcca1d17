use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use despesas_db::repositories::{outbox, OutboxStatus};
use despesas_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

impl HealthState {
    pub fn new(db_pool: DbPool) -> Self {
        Self { db_pool }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboxBacklog {
    pub pending: i64,
    pub failed: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub outbox: Option<OutboxBacklog>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState::new(db_pool))
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let outbox = if ready { outbox_backlog(&state.db_pool).await } else { None };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "despesas-server runtime initialized".to_string(),
        },
        database,
        outbox,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

// Informational only; a backlog never degrades the service status.
async fn outbox_backlog(pool: &DbPool) -> Option<OutboxBacklog> {
    let mut conn = pool.acquire().await.ok()?;
    let pending = outbox::count_by_status(&mut conn, OutboxStatus::Pending).await.ok()?;
    let failed = outbox::count_by_status(&mut conn, OutboxStatus::Failed).await.ok()?;
    Some(OutboxBacklog { pending, failed })
}
