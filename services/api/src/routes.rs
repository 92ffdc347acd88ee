//! API service routes

use access::models::{
    AccessCode, Actor, CodeQuery, CodeSpec, PaymentQuery, PaymentSubmission, QuotaUpdate,
    StatsRange,
};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{ApiError, ApiResult},
    extract::OptionalJson,
    middleware::auth_middleware,
    state::AppState,
};

/// Body of `PUT /payment-access-codes/{id}/approve`
#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub note: Option<String>,
}

/// Body of the reject and cancel endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/access-codes", post(create_access_code).get(list_access_codes))
        .route("/access-codes/mine", get(my_access_codes))
        .route("/access-codes/sweep", post(sweep_expired_codes))
        .route(
            "/access-codes/:code",
            get(get_access_code)
                .put(update_access_code)
                .delete(delete_access_code),
        )
        .route("/access-codes/:code/redeem", post(redeem_access_code))
        .route("/access-codes/:code/activate", post(activate_access_code))
        .route(
            "/payment-access-codes",
            post(submit_payment).get(list_payments),
        )
        .route("/payment-access-codes/mine", get(my_payments))
        .route("/payment-access-codes/stats", get(payment_stats))
        .route(
            "/payment-access-codes/:id",
            get(get_payment).delete(delete_payment),
        )
        .route("/payment-access-codes/:id/approve", put(approve_payment))
        .route("/payment-access-codes/:id/reject", put(reject_payment))
        .route("/payment-access-codes/:id/cancel", put(cancel_payment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/payment-access-codes/code/:code_pay", get(payment_status))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db_pool {
        Some(pool) => match common::database::health_check(pool).await {
            Ok(true) => "ok",
            _ => "unavailable",
        },
        None => "memory",
    };

    Json(json!({
        "status": "ok",
        "service": "scoreboard-api",
        "database": database,
    }))
}

/// Admins issue active codes; everyone else creates an inactive code to pay for
pub async fn create_access_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Json(spec), _): WithRejection<Json<CodeSpec>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let code: AccessCode = if actor.is_admin() {
        state.admin.issue_code(&actor, spec).await?
    } else {
        state.client.create_code(&actor, spec.max_uses).await?
    };

    Ok((StatusCode::CREATED, Json(code)))
}

pub async fn list_access_codes(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Query(query), _): WithRejection<Query<CodeQuery>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.admin.list_codes(&actor, query).await?))
}

pub async fn my_access_codes(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Query(query), _): WithRejection<Query<CodeQuery>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.client.my_codes(&actor, query).await?))
}

pub async fn get_access_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(code), _): WithRejection<Path<String>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.client.get_code(&actor, &code).await?))
}

pub async fn update_access_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(code), _): WithRejection<Path<String>, ApiError>,
    WithRejection(Json(update), _): WithRejection<Json<QuotaUpdate>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.admin.update_quota(&actor, &code, update).await?))
}

pub async fn delete_access_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(code), _): WithRejection<Path<String>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    state.admin.delete_code(&actor, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn redeem_access_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(code), _): WithRejection<Path<String>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.client.redeem(&actor, &code).await?))
}

pub async fn activate_access_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(code), _): WithRejection<Path<String>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.admin.activate_code(&actor, &code).await?))
}

/// Persist lazily-expired statuses now instead of waiting for the schedule
pub async fn sweep_expired_codes(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    let expired = state.admin.sweep_expired(&actor).await?;
    Ok(Json(json!({ "expired": expired })))
}

pub async fn submit_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Json(submission), _): WithRejection<Json<PaymentSubmission>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let request = state.client.submit_payment(&actor, submission).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Query(query), _): WithRejection<Query<PaymentQuery>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.admin.list_payments(&actor, query).await?))
}

pub async fn my_payments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Query(query), _): WithRejection<Query<PaymentQuery>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.client.my_payments(&actor, query).await?))
}

pub async fn payment_stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Query(range), _): WithRejection<Query<StatsRange>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.admin.payment_stats(&actor, range).await?))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.client.get_payment(&actor, id).await?))
}

/// Poll a payment by its reference; no login required
pub async fn payment_status(
    State(state): State<AppState>,
    WithRejection(Path(code_pay), _): WithRejection<Path<String>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.client.payment_status(&code_pay).await?))
}

pub async fn approve_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    OptionalJson(body): OptionalJson<ApproveRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.admin.approve_payment(&actor, id, body.note).await?))
}

pub async fn reject_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    OptionalJson(body): OptionalJson<ReasonRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.admin.reject_payment(&actor, id, body.reason).await?,
    ))
}

/// Owner or admin cancellation of a pending request
pub async fn cancel_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    OptionalJson(body): OptionalJson<ReasonRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.client.cancel_payment(&actor, id, body.reason).await?,
    ))
}

pub async fn delete_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    state.admin.delete_payment(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
