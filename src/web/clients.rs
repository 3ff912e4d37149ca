use crate::db::{self, assignments, ClientUpdate, NewClient};
use crate::domain::inventory::{build_inventory, ClientInventory};
use crate::domain::models::{Client, ClientStatus, FormResponse, Notice, ScoreThresholds};
use crate::services::audit::{coach_actor, AuditEvent};
use crate::services::checkins::{self, AssignmentView, CurrentCheckin};
use crate::state::SharedState;
use crate::time_utils::normalize_timezone;
use crate::web::error::{ok, ApiError, ApiResult};
use crate::web::extract::{Json, Path, Query};
use axum::{extract::State, routing::get, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ClientListQuery {
    pub coach_id: Uuid,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoachQuery {
    pub coach_id: Uuid,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_clients).post(create_client))
        .route("/inventory", get(client_inventory))
        .route(
            "/:id",
            get(get_client).patch(update_client).delete(archive_client),
        )
        .route("/:id/current-checkin", get(current_checkin))
        .route("/:id/assignments", get(list_assignments))
        .route("/:id/responses", get(list_responses))
        .route("/:id/notices", get(list_notices))
        .with_state(state)
}

fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}

fn check_thresholds(red_max: i16, orange_max: i16) -> Result<(), ApiError> {
    let thresholds = ScoreThresholds { red_max, orange_max };
    if thresholds.is_valid() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "thresholds must satisfy 0 <= red_max < orange_max <= 100".to_string(),
        ))
    }
}

fn normalize_tz_field(tz: &mut Option<String>) -> Result<(), ApiError> {
    if let Some(raw) = tz.as_deref() {
        let normalized = normalize_timezone(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown timezone: {raw}")))?;
        *tz = Some(normalized);
    }
    Ok(())
}

fn validate_new_client(payload: &mut NewClient) -> Result<(), ApiError> {
    if payload.first_name.trim().is_empty() {
        return Err(ApiError::BadRequest("first_name is required".to_string()));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::BadRequest("a valid email is required".to_string()));
    }
    normalize_tz_field(&mut payload.timezone)?;
    let defaults = ScoreThresholds::default();
    check_thresholds(
        payload.red_max.unwrap_or(defaults.red_max),
        payload.orange_max.unwrap_or(defaults.orange_max),
    )
}

fn validate_client_update(current: &Client, update: &mut ClientUpdate) -> Result<(), ApiError> {
    if matches!(update.first_name.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(ApiError::BadRequest("first_name cannot be empty".to_string()));
    }
    if matches!(update.email.as_deref(), Some(email) if !is_valid_email(email)) {
        return Err(ApiError::BadRequest("a valid email is required".to_string()));
    }
    normalize_tz_field(&mut update.timezone)?;
    check_thresholds(
        update.red_max.unwrap_or(current.red_max),
        update.orange_max.unwrap_or(current.orange_max),
    )
}

async fn load_client(state: &SharedState, id: Uuid) -> Result<Client, ApiError> {
    db::find_client(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("client"))
}

async fn list_clients(
    State(state): State<SharedState>,
    Query(query): Query<ClientListQuery>,
) -> ApiResult<Vec<Client>> {
    let status = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            ClientStatus::try_from(raw)
                .map_err(|_| ApiError::BadRequest(format!("unknown status: {raw}")))?,
        ),
    };
    ok(db::list_clients(&state.pool, query.coach_id, status).await?)
}

async fn create_client(
    State(state): State<SharedState>,
    Json(mut payload): Json<NewClient>,
) -> ApiResult<Client> {
    validate_new_client(&mut payload)?;

    if db::find_client_by_email(&state.pool, payload.coach_id, &payload.email)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "a client with this email already exists".to_string(),
        ));
    }

    let client = db::insert_client(&state.pool, &payload).await?;
    AuditEvent::new(coach_actor(client.coach_id), "client.create", "client", client.id)
        .with_details(json!({ "email": client.email }))
        .record(&state.pool)
        .await;
    ok(client)
}

async fn client_inventory(
    State(state): State<SharedState>,
    Query(query): Query<CoachQuery>,
) -> ApiResult<ClientInventory> {
    let clients = db::list_clients(&state.pool, query.coach_id, None).await?;
    let ids: Vec<Uuid> = clients.iter().map(|c| c.id).collect();
    let docs = assignments::list_assignments_for_clients(&state.pool, &ids).await?;
    let responses = assignments::list_responses_for_clients(&state.pool, &ids).await?;
    ok(build_inventory(&clients, &docs, &responses))
}

async fn get_client(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Client> {
    ok(load_client(&state, id).await?)
}

async fn update_client(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<ClientUpdate>,
) -> ApiResult<Client> {
    let current = load_client(&state, id).await?;
    validate_client_update(&current, &mut payload)?;

    if let Some(email) = payload.email.as_deref() {
        if let Some(other) = db::find_client_by_email(&state.pool, current.coach_id, email).await? {
            if other.id != id {
                return Err(ApiError::Conflict(
                    "a client with this email already exists".to_string(),
                ));
            }
        }
    }

    let client = db::update_client(&state.pool, id, &payload)
        .await?
        .ok_or_else(|| ApiError::not_found("client"))?;
    AuditEvent::new(coach_actor(client.coach_id), "client.update", "client", id)
        .record(&state.pool)
        .await;
    ok(client)
}

/// Clients are archived rather than deleted so their history stays intact.
async fn archive_client(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Client> {
    let update = ClientUpdate {
        status: Some(ClientStatus::Archived),
        can_start_checkins: Some(false),
        ..Default::default()
    };
    let client = db::update_client(&state.pool, id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("client"))?;
    AuditEvent::new(coach_actor(client.coach_id), "client.archive", "client", id)
        .record(&state.pool)
        .await;
    ok(client)
}

async fn current_checkin(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Option<CurrentCheckin>> {
    let client = load_client(&state, id).await?;
    if client.status == ClientStatus::Archived {
        return Err(ApiError::Conflict("client is archived".to_string()));
    }
    if !client.can_start_checkins {
        return Err(ApiError::Conflict(
            "check-ins have not been enabled for this client".to_string(),
        ));
    }

    let current =
        checkins::current_checkin(&state.pool, &state.config, &client, chrono::Utc::now()).await?;
    ok(current)
}

async fn list_assignments(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<AssignmentView>> {
    let client = load_client(&state, id).await?;
    let docs = assignments::list_client_assignments(&state.pool, client.id).await?;
    ok(checkins::with_resolved_weeks(docs))
}

async fn list_responses(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<FormResponse>> {
    let client = load_client(&state, id).await?;
    ok(assignments::list_client_responses(&state.pool, client.id).await?)
}

async fn list_notices(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Vec<Notice>> {
    let client = load_client(&state, id).await?;
    ok(db::list_client_notices(&state.pool, &client).await?)
}
