//! JSON API for storefront recommendations and interaction tracking.
//!
//! - `GET  /api/v1/users/{user_id}/recommendations?limit=`  ranked picks for a shopper
//! - `GET  /api/v1/products/{product_id}/similar?limit=`    "you may also like"
//! - `GET  /api/v1/products/trending?limit=`                storefront trending list
//! - `POST /api/v1/events`                                  fire-and-forget event ingestion

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use echoshop_core::analytics::InteractionTracker;
use echoshop_core::domain::interaction::{EventType, InteractionEvent, ResourceType};
use echoshop_core::domain::product::{Product, ProductId};
use echoshop_core::domain::user::UserId;
use echoshop_core::errors::{ApplicationError, DomainError, InterfaceError};
use echoshop_core::recommendations::{
    RecommendationEngine, RecommendationSet, RecommendationSettings, SignalSource,
};
use echoshop_db::{DbPool, SqlInteractionLog, SqlRecommendationStore};

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<RecommendationEngine<SqlRecommendationStore>>,
    tracker: InteractionTracker<SqlInteractionLog>,
}

impl ApiState {
    pub fn new(db_pool: DbPool, settings: RecommendationSettings) -> Self {
        Self {
            engine: Arc::new(RecommendationEngine::with_settings(
                SqlRecommendationStore::new(db_pool.clone()),
                settings,
            )),
            tracker: InteractionTracker::new(SqlInteractionLog::new(db_pool)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SimilarProductsResponse {
    pub product_id: String,
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub strategy: SignalSource,
    pub products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
pub struct TrackEventRequest {
    pub user_id: Option<String>,
    pub event_type: String,
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct TrackEventAccepted {
    pub event_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/users/{user_id}/recommendations", get(recommendations))
        .route("/api/v1/products/trending", get(trending))
        .route("/api/v1/products/{product_id}/similar", get(similar_products))
        .route("/api/v1/events", post(track_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn recommendations(
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
    State(state): State<ApiState>,
) -> Json<RecommendationSet> {
    let set = state.engine.recommend_detailed(&UserId(user_id), query.limit).await;

    debug!(
        event_name = "api.recommendations.served",
        user_id = %set.user_id.0,
        returned = set.items.len(),
        degraded = set.is_degraded(),
        "recommendations served"
    );

    Json(set)
}

async fn similar_products(
    Path(product_id): Path<String>,
    Query(query): Query<LimitQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<SimilarProductsResponse>> {
    let product_id = ProductId(product_id);
    let products = state
        .engine
        .similar_to_product(&product_id, query.limit)
        .await
        .map_err(|error| error_response(error, new_correlation_id()))?;

    Ok(Json(SimilarProductsResponse { product_id: product_id.0, products }))
}

async fn trending(
    Query(query): Query<LimitQuery>,
    State(state): State<ApiState>,
) -> Json<TrendingResponse> {
    let pool = state.engine.trending_products(query.limit).await;
    Json(TrendingResponse { strategy: pool.strategy, products: pool.products })
}

async fn track_event(
    State(state): State<ApiState>,
    Json(body): Json<TrackEventRequest>,
) -> ApiResult<(StatusCode, Json<TrackEventAccepted>)> {
    let correlation_id = new_correlation_id();
    let event = parse_event(body)
        .map_err(|error| error_response(ApplicationError::Domain(error), correlation_id))?;
    let event_id = event.id.0.clone();

    state.tracker.track_detached(event);

    Ok((StatusCode::ACCEPTED, Json(TrackEventAccepted { event_id, status: "accepted" })))
}

fn parse_event(body: TrackEventRequest) -> Result<InteractionEvent, DomainError> {
    let event_type = body.event_type.parse::<EventType>()?;
    let resource_type = body.resource_type.parse::<ResourceType>()?;
    let resource_id = body.resource_id.trim();
    if resource_id.is_empty() {
        return Err(DomainError::InvariantViolation("resource_id must not be empty".to_string()));
    }

    let user_id = body
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(UserId);

    let mut event = InteractionEvent::new(user_id, event_type, resource_type, resource_id);
    event.metadata = body.metadata;
    Ok(event)
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn error_response(error: ApplicationError, correlation_id: String) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let (status, detail) = match &interface {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message.clone()),
        InterfaceError::ServiceUnavailable { message, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, message.clone())
        }
        InterfaceError::Internal { message, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
        }
    };

    warn!(
        event_name = "api.request.failed",
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %interface,
        "api request failed"
    );

    (
        status,
        Json(ApiError {
            error: interface.user_message(),
            detail,
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}
