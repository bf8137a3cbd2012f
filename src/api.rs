use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    card_service::CardService,
    errors::{ApiError, ErrorContext, classify_database_error},
    forecast::Forecast,
    models::*,
    sm2_scheduler::Quality,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub card_service: CardService,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScopeParams {
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueParams {
    pub user_id: Option<String>,
    pub date: Option<String>,
    pub tag: Option<String>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

fn validation_error(operation: &str, message: &str) -> ErrorResponse {
    ApiError::ValidationError(message.to_string())
        .to_response_with_context(ErrorContext::new(operation, "card"))
}

fn card_not_found(operation: &str, id: Uuid) -> ErrorResponse {
    ApiError::NotFound(format!("Card with ID '{}' not found", id))
        .to_response_with_context(ErrorContext::new(operation, "card").with_id(&id.to_string()))
}

fn database_error(operation: &str, error: anyhow::Error) -> ErrorResponse {
    classify_database_error(&error).to_response_with_context(ErrorContext::new(operation, "card"))
}

fn require_user_id(operation: &str, user_id: Option<String>) -> Result<String, ErrorResponse> {
    match user_id {
        Some(user_id) if !user_id.trim().is_empty() => Ok(user_id),
        _ => Err(validation_error(operation, "userId query parameter is required")),
    }
}

// Card endpoints

pub async fn create_card(
    State(state): State<AppState>,
    Json(request): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Card>>), ErrorResponse> {
    log_api_start!("create_card");

    let front = request.front.as_deref().map(str::trim).unwrap_or_default();
    let back = request.back.as_deref().map(str::trim).unwrap_or_default();
    let user_id = request.user_id.as_deref().map(str::trim).unwrap_or_default();

    if front.is_empty() {
        return Err(validation_error("create_card", "front is required and must not be empty"));
    }
    if back.is_empty() {
        return Err(validation_error("create_card", "back is required and must not be empty"));
    }
    if user_id.is_empty() {
        return Err(validation_error("create_card", "userId is required and must not be empty"));
    }

    let new_card = NewCard {
        user_id: user_id.to_string(),
        front: front.to_string(),
        back: back.to_string(),
        tags: request.tags,
    };

    match state.card_service.create_card(new_card).await {
        Ok(card) => {
            info!(
                card_id = %card.id,
                user_id = %card.user_id,
                "Card created successfully"
            );
            Ok((StatusCode::CREATED, Json(ApiResponse::success(card))))
        }
        Err(e) => Err(database_error("create_card", e)),
    }
}

pub async fn list_cards(
    State(state): State<AppState>,
    Query(params): Query<UserScopeParams>,
) -> Result<Json<ApiResponse<Vec<Card>>>, ErrorResponse> {
    let user_id = require_user_id("list_cards", params.user_id)?;
    log_api_start!("list_cards", user_id = user_id);

    match state.card_service.list_cards(&user_id).await {
        Ok(cards) => {
            debug!(user_id = %user_id, card_count = cards.len(), "Cards listed successfully");
            Ok(Json(ApiResponse::success(cards)))
        }
        Err(e) => Err(database_error("list_cards", e)),
    }
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserScopeParams>,
) -> Result<Json<ApiResponse<Card>>, ErrorResponse> {
    log_api_start!("get_card", card_id = id);

    match state.card_service.get_card(id, params.user_id.as_deref()).await {
        Ok(Some(card)) => {
            log_api_success!("get_card", card_id = id, "card retrieved successfully");
            Ok(Json(ApiResponse::success(card)))
        }
        Ok(None) => {
            log_api_warn!("get_card", card_id = id, "card not found");
            Err(card_not_found("get_card", id))
        }
        Err(e) => Err(database_error("get_card", e)),
    }
}

pub async fn get_due_cards(
    State(state): State<AppState>,
    Query(params): Query<DueParams>,
) -> Result<Json<ApiResponse<Vec<Card>>>, ErrorResponse> {
    let user_id = require_user_id("get_due_cards", params.user_id)?;
    log_api_start!("get_due_cards", user_id = user_id);

    let as_of = match params.date.as_deref() {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(_) => {
                return Err(validation_error(
                    "get_due_cards",
                    "date must be a valid RFC 3339 timestamp",
                ));
            }
        },
        None => Utc::now(),
    };

    match state
        .card_service
        .due_cards(&user_id, as_of, params.tag.as_deref())
        .await
    {
        Ok(cards) => {
            log_api_success!("get_due_cards", count = cards.len(), "due cards selected");
            Ok(Json(ApiResponse::success(cards)))
        }
        Err(e) => Err(database_error("get_due_cards", e)),
    }
}

// Review endpoints

pub async fn submit_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ApiResponse<ReviewOutcome>>, ErrorResponse> {
    log_api_start!("submit_review", card_id = id);

    let quality_int = match request.quality {
        Some(quality) => quality,
        None => return Err(validation_error("submit_review", "quality is required")),
    };
    let quality = match Quality::from_int(quality_int) {
        Some(quality) => quality,
        None => {
            return Err(validation_error(
                "submit_review",
                "quality must be an integer between 0 and 5",
            ));
        }
    };

    match state
        .card_service
        .submit_review(id, quality, request.user_id.as_deref(), Utc::now())
        .await
    {
        Ok(Some(outcome)) => {
            info!(
                card_id = %id,
                quality = quality.as_int(),
                interval_days = outcome.card.interval_days,
                next_review = %outcome.card.next_review,
                "Review recorded successfully"
            );
            Ok(Json(ApiResponse::success(outcome)))
        }
        Ok(None) => {
            log_api_warn!("submit_review", card_id = id, "card not found");
            Err(card_not_found("submit_review", id))
        }
        Err(e) => Err(database_error("submit_review", e)),
    }
}

pub async fn reset_leech(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResetLeechRequest>,
) -> Result<Json<ApiResponse<Card>>, ErrorResponse> {
    log_api_start!("reset_leech", card_id = id);

    match state
        .card_service
        .reset_leech(id, request.user_id.as_deref())
        .await
    {
        Ok(Some(card)) => {
            log_api_success!("reset_leech", card_id = id, "leech flag cleared");
            Ok(Json(ApiResponse::success(card)))
        }
        Ok(None) => {
            log_api_warn!("reset_leech", card_id = id, "card not found");
            Err(card_not_found("reset_leech", id))
        }
        Err(e) => Err(database_error("reset_leech", e)),
    }
}

pub async fn get_review_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Review>>>, ErrorResponse> {
    log_api_start!("get_review_history", card_id = id);

    match state.card_service.review_history(id).await {
        Ok(Some(reviews)) => {
            debug!(card_id = %id, review_count = reviews.len(), "Review history retrieved");
            Ok(Json(ApiResponse::success(reviews)))
        }
        Ok(None) => {
            log_api_warn!("get_review_history", card_id = id, "card not found");
            Err(card_not_found("get_review_history", id))
        }
        Err(e) => Err(database_error("get_review_history", e)),
    }
}

// Dashboard endpoints

pub async fn get_forecast(
    State(state): State<AppState>,
    Query(params): Query<UserScopeParams>,
) -> Result<Json<ApiResponse<Forecast>>, ErrorResponse> {
    let user_id = require_user_id("get_forecast", params.user_id)?;
    log_api_start!("get_forecast", user_id = user_id);

    match state.card_service.forecast(&user_id, Utc::now()).await {
        Ok(forecast) => {
            debug!(
                user_id = %user_id,
                cards_due_now = forecast.cards_due_now,
                "Forecast built successfully"
            );
            Ok(Json(ApiResponse::success(forecast)))
        }
        Err(e) => Err(database_error("get_forecast", e)),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Card routes
        .route("/cards", post(create_card).get(list_cards))
        .route("/cards/due", get(get_due_cards))
        .route("/cards/:id", get(get_card))
        // Review routes
        .route("/cards/:id/review", post(submit_review))
        .route("/cards/:id/reset-leech", post(reset_leech))
        .route("/cards/:id/reviews", get(get_review_history))
        // Dashboard routes
        .route("/forecast", get(get_forecast))
        .route("/health", get(health))
        .with_state(state)
}
