//! HTTP API

use axum::{
    extract::{
        rejection::JsonRejection, FromRequest, FromRequestParts, MatchedPath, Path, Request,
        State,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::auth::{AuthInfo, TokenVerifier};
use crate::badges;
use crate::database::Database;
use crate::entity::{properties as property_entity, user_badges, vote_responses};
use crate::error::{EstateError, Result};
use crate::portfolio::{self, Portfolio};
use crate::properties::{self, NewProperty, ReconcileReport};
use crate::purchase::{PurchaseOutcome, PurchaseRequest, PurchaseService};
use crate::votes::{self, NewVote, VoteTally, VoteWithOptions};

/// Shared handler state
pub struct AppState {
    pub db: Database,
    pub purchases: PurchaseService,
    pub verifier: TokenVerifier,
}

/// Caller authenticated from the `Authorization: Bearer` header
pub struct AuthUser(pub AuthInfo);

impl AuthUser {
    fn require_admin(&self) -> Result<()> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(EstateError::Forbidden("admin role required".to_string()))
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = EstateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| EstateError::Unauthorized("missing bearer token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                EstateError::Unauthorized("malformed authorization header".to_string())
            })?;

        state
            .verifier
            .verify_jwt(token.trim())
            .map(AuthUser)
            .map_err(|e| EstateError::Unauthorized(e.to_string()))
    }
}

/// JSON body whose parse failures surface as `validation_error`
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = EstateError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| EstateError::Validation(rejection.body_text()))
    }
}

#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    pub property_id: String,
    pub quantity: i64,
    pub paypal_transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignChipsBody {
    pub property_id: String,
    pub user_id: String,
    pub quantity: i64,
    pub paypal_transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteBody {
    pub option_id: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: PurchaseOutcome,
}

fn quantity_from(raw: i64) -> Result<u32> {
    u32::try_from(raw)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| EstateError::Validation("quantity must be a positive integer".to_string()))
}

async fn purchase(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ApiJson(body): ApiJson<PurchaseBody>,
) -> Result<Json<PurchaseResponse>> {
    let request = PurchaseRequest {
        buyer_id: caller.user_id,
        property_id: body.property_id,
        quantity: quantity_from(body.quantity)?,
        external_payment_ref: body.paypal_transaction_id,
    };
    let outcome = state.purchases.purchase(request).await?;
    Ok(Json(PurchaseResponse {
        success: true,
        outcome,
    }))
}

async fn assign_chips(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ApiJson(body): ApiJson<AssignChipsBody>,
) -> Result<Json<PurchaseResponse>> {
    let request = PurchaseRequest {
        buyer_id: body.user_id,
        property_id: body.property_id,
        quantity: quantity_from(body.quantity)?,
        external_payment_ref: body.paypal_transaction_id,
    };
    let outcome = state
        .purchases
        .assign_chips(&caller.user_id, caller.is_admin(), request)
        .await?;
    Ok(Json(PurchaseResponse {
        success: true,
        outcome,
    }))
}

async fn list_properties(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<property_entity::Model>>> {
    Ok(Json(properties::list_properties(state.db.connection()).await?))
}

async fn get_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<property_entity::Model>> {
    let property = properties::get_property(state.db.connection(), &id).await?;
    if !property.is_active || property.is_hidden {
        return Err(EstateError::NotFound(format!("property {}", id)));
    }
    Ok(Json(property))
}

async fn create_property(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<NewProperty>,
) -> Result<(StatusCode, Json<property_entity::Model>)> {
    user.require_admin()?;
    let property =
        properties::create_property(state.db.connection(), body, &user.0.user_id).await?;
    Ok((StatusCode::CREATED, Json(property)))
}

async fn reconcile_property(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ReconcileReport>> {
    user.require_admin()?;
    let report =
        properties::reconcile_available(state.db.connection(), &id, &user.0.user_id).await?;
    Ok(Json(report))
}

async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Portfolio>> {
    Ok(Json(
        portfolio::portfolio(state.db.connection(), &caller.user_id).await?,
    ))
}

async fn list_badges(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<user_badges::Model>>> {
    Ok(Json(
        badges::list_user_badges(state.db.connection(), &caller.user_id).await?,
    ))
}

async fn create_vote(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<NewVote>,
) -> Result<(StatusCode, Json<VoteWithOptions>)> {
    user.require_admin()?;
    let vote =
        votes::create_vote(state.db.connection(), body, &user.0.user_id, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

async fn cast_vote(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(vote_id): Path<String>,
    ApiJson(body): ApiJson<CastVoteBody>,
) -> Result<Json<vote_responses::Model>> {
    let response = votes::cast_vote(
        state.db.connection(),
        &vote_id,
        &caller.user_id,
        &body.option_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(response))
}

async fn vote_tally(
    State(state): State<Arc<AppState>>,
    Path(vote_id): Path<String>,
) -> Result<Json<VoteTally>> {
    Ok(Json(
        votes::tally(state.db.connection(), &vote_id, Utc::now()).await?,
    ))
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(request).await;
    monitoring::record_http_request(&route, response.status().as_u16());
    response
}

/// Build the application router, `/metrics` included
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/purchase", post(purchase))
        .route("/api/assign-chips", post(assign_chips))
        .route("/api/properties", get(list_properties))
        .route("/api/properties/{id}", get(get_property))
        .route("/api/admin/properties", post(create_property))
        .route(
            "/api/admin/properties/{id}/reconcile",
            post(reconcile_property),
        )
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/badges", get(list_badges))
        .route("/api/admin/votes", post(create_vote))
        .route("/api/votes/{id}/cast", post(cast_vote))
        .route("/api/votes/{id}/tally", get(vote_tally))
        .route("/health", get(health))
        .merge(monitoring::metrics_router::<Arc<AppState>>())
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}
