use crate::services::audit::{AuditEvent, SYSTEM_ACTOR};
use crate::services::reconciler::{self, ReconcileReport};
use crate::state::SharedState;
use crate::web::error::{ok, ApiResult};
use crate::web::extract::Json;
use axum::{extract::State, routing::post, Router};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ReconcilePayload {
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub dry_run: bool,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/reconcile", post(run_reconcile))
        .with_state(state)
}

async fn run_reconcile(
    State(state): State<SharedState>,
    payload: Option<Json<ReconcilePayload>>,
) -> ApiResult<ReconcileReport> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let report = reconciler::run(
        &state.pool,
        payload.client_id,
        chrono::Utc::now(),
        state.config.overdue_grace(),
        payload.dry_run,
    )
    .await?;

    if !payload.dry_run && report.summary.total() > 0 {
        AuditEvent::new(
            SYSTEM_ACTOR,
            "admin.reconcile",
            "client",
            payload
                .client_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "all".to_string()),
        )
        .with_details(serde_json::to_value(&report.summary).unwrap_or_default())
        .record(&state.pool)
        .await;
    }
    ok(report)
}
