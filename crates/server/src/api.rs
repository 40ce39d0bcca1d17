use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use despesas_core::domain::actor::UserId;
use despesas_core::domain::quote::QuoteId;
use despesas_core::domain::requisition::{RequisitionId, RequisitionStatus};
use despesas_core::errors::{ApplicationError, InterfaceError};
use despesas_core::intake::{DepartmentShare, NewRequisition, SupplierOffer};
use despesas_db::repositories::{RequisitionFilter, RequisitionView};
use despesas_engine::{
    DirectorApprovalOutcome, Engine, ForceConsensusOutcome, ManagerApprovalOutcome,
    MasterRejectionOutcome, RejectionOutcome, RequestDetail, RequestSummary,
    SubstituteDirectorOutcome,
};

pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<Engine>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self { success: true, message: message.into(), data })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiErrorBody {
                error: message.into(),
                kind: "validation",
                correlation_id: Uuid::new_v4().to_string(),
            },
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(value: ApplicationError) -> Self {
        let kind = value.kind().as_str();
        let interface = value.into_interface(Uuid::new_v4().to_string());
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Server-side failures keep their detail in the log only.
        let error = if status.is_server_error() {
            error!(
                event_name = "server.api.request_failed",
                correlation_id = %interface.correlation_id(),
                kind,
                error = %interface.message(),
                "request failed"
            );
            interface.user_message().to_string()
        } else {
            info!(
                event_name = "server.api.request_refused",
                correlation_id = %interface.correlation_id(),
                kind,
                error = %interface.message(),
                "request refused"
            );
            interface.message().to_string()
        };

        Self {
            status,
            body: ApiErrorBody {
                error,
                kind,
                correlation_id: interface.correlation_id().to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// The acting user, taken from the `x-actor-id` header set by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActorId(pub UserId);

impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::bad_request(format!("missing `{ACTOR_HEADER}` header")))?;
        raw.trim().parse::<i64>().map(|id| Self(UserId(id))).map_err(|_| {
            ApiError::bad_request(format!("`{ACTOR_HEADER}` must be a numeric user id"))
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateRequisitionRequest {
    pub description: String,
    pub director_id: UserId,
    pub departments: Vec<DepartmentShare>,
    pub suppliers: Vec<SupplierOffer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedRequisition {
    pub requisition_id: RequisitionId,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/v1/requisitions", post(create_requisition))
        .route("/api/v1/requisitions/{id}", get(get_requisition))
        .route("/api/v1/requisitions/{id}/quotes/{quote_id}/manager-approve", post(manager_approve))
        .route("/api/v1/requisitions/{id}/quotes/{quote_id}/manager-reject", post(reject_quote))
        .route("/api/v1/requisitions/{id}/quotes/{quote_id}/director-approve", post(director_approve))
        .route("/api/v1/requisitions/{id}/quotes/{quote_id}/director-reject", post(reject_quote))
        .route(
            "/api/v1/requisitions/{id}/quotes/{quote_id}/master/force-consensus",
            post(force_consensus),
        )
        .route(
            "/api/v1/requisitions/{id}/quotes/{quote_id}/master/director-approve",
            post(substitute_director),
        )
        .route("/api/v1/requisitions/{id}/master/reject", post(master_reject))
        .route("/api/v1/modules/{module}/requests", get(list_requests))
        .route("/api/v1/modules/{module}/requests/{id}", get(request_detail))
        .with_state(ApiState { engine })
}

pub async fn create_requisition(
    State(state): State<ApiState>,
    ActorId(requester_id): ActorId,
    Json(request): Json<CreateRequisitionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedRequisition>>), ApiError> {
    let requisition_id = state
        .engine
        .intake()
        .create(NewRequisition {
            description: request.description,
            requester_id,
            director_id: request.director_id,
            departments: request.departments,
            suppliers: request.suppliers,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(
            format!("requisition {requisition_id} created"),
            CreatedRequisition { requisition_id },
        ),
    ))
}

pub async fn get_requisition(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<RequisitionView>>, ApiError> {
    let view = state.engine.view(RequisitionId(id), actor_id).await?;
    Ok(ApiResponse::ok(format!("requisition {id}"), view))
}

pub async fn manager_approve(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path((id, quote_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<ManagerApprovalOutcome>>, ApiError> {
    let outcome =
        state.engine.managers().approve_quote(RequisitionId(id), QuoteId(quote_id), actor_id).await?;
    let message = if outcome.consensus_reached {
        "manager consensus reached; director approval requested"
    } else {
        "manager approval recorded"
    };
    Ok(ApiResponse::ok(message, outcome))
}

/// Serves both the manager and the director rejection routes; the cascade
/// works out which role the actor is rejecting in.
pub async fn reject_quote(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path((id, quote_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<RejectionOutcome>>, ApiError> {
    let outcome =
        state.engine.rejections().reject_quote(RequisitionId(id), QuoteId(quote_id), actor_id).await?;
    let message = if outcome.requisition_rejected {
        "quote rejected; requisition rejected"
    } else {
        "quote rejected"
    };
    Ok(ApiResponse::ok(message, outcome))
}

pub async fn director_approve(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path((id, quote_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<DirectorApprovalOutcome>>, ApiError> {
    let outcome =
        state.engine.director().approve(RequisitionId(id), QuoteId(quote_id), actor_id).await?;
    Ok(ApiResponse::ok("requisition approved", outcome))
}

pub async fn force_consensus(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path((id, quote_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<ForceConsensusOutcome>>, ApiError> {
    let outcome =
        state.engine.master().force_consensus(RequisitionId(id), QuoteId(quote_id), actor_id).await?;
    Ok(ApiResponse::ok("manager consensus forced", outcome))
}

pub async fn substitute_director(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path((id, quote_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<SubstituteDirectorOutcome>>, ApiError> {
    let outcome = state
        .engine
        .master()
        .substitute_director(RequisitionId(id), QuoteId(quote_id), actor_id)
        .await?;
    Ok(ApiResponse::ok("requisition approved in place of the director", outcome))
}

pub async fn master_reject(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MasterRejectionOutcome>>, ApiError> {
    let outcome = state.engine.master().reject_unconditionally(RequisitionId(id), actor_id).await?;
    Ok(ApiResponse::ok("requisition rejected", outcome))
}

pub async fn list_requests(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path(module): Path<String>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<ApiResponse<Vec<RequestSummary>>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(RequisitionStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!(
                "unknown status `{raw}` (expected pending|approved|rejected)"
            ))
        })?),
    };

    let requests =
        state.engine.list_requests(actor_id, &module, &RequisitionFilter { status }).await?;
    Ok(ApiResponse::ok(format!("{} request(s)", requests.len()), requests))
}

pub async fn request_detail(
    State(state): State<ApiState>,
    ActorId(actor_id): ActorId,
    Path((module, id)): Path<(String, i64)>,
) -> Result<Json<ApiResponse<RequestDetail>>, ApiError> {
    let detail = state.engine.request_detail(actor_id, &module, id).await?;
    Ok(ApiResponse::ok(format!("{module} request {id}"), detail))
}
