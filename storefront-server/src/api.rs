use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use storefront::{
    CatalogPage, Notice, ReviewPage, ReviewSubmission, SearchPage, StorefrontError,
};

use crate::models::{
    InvalidateResponse, ReviewParams, SelectionRequest, SessionResponse, UploadParams,
};
use crate::state::{AppState, SessionHandle};

/// HTTP status for a failed interaction
pub fn status_for(err: &StorefrontError) -> StatusCode {
    match err {
        StorefrontError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorefrontError::Validation(_) => StatusCode::BAD_REQUEST,
        StorefrontError::NotFound(_) => StatusCode::NOT_FOUND,
        StorefrontError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        StorefrontError::Transient(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(context: &str, err: StorefrontError) -> StatusCode {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("{}: {}", context, err);
    } else {
        tracing::debug!("{}: {}", context, err);
    }
    status
}

async fn find_session(state: &AppState, id: &str) -> Result<SessionHandle, StatusCode> {
    state.session(id).await.ok_or(StatusCode::NOT_FOUND)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.storefront.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, StatusCode> {
    state
        .storefront
        .catalog()
        .list_categories()
        .await
        .map(Json)
        .map_err(|e| reject("Failed to list categories", e))
}

pub async fn list_genders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, StatusCode> {
    state
        .storefront
        .catalog()
        .list_genders()
        .await
        .map(Json)
        .map_err(|e| reject("Failed to list genders", e))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SessionResponse>) {
    let handle = state.create_session().await;
    let session = handle.lock().await;
    (StatusCode::CREATED, Json(SessionResponse::from(&*session)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, StatusCode> {
    let handle = find_session(&state, &id).await?;
    let session = handle.lock().await;
    Ok(Json(SessionResponse::from(&*session)))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.end_session(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn catalog_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CatalogPage>, StatusCode> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    state
        .storefront
        .catalog_page(&mut session)
        .await
        .map(Json)
        .map_err(|e| reject("Catalog page failed", e))
}

pub async fn update_selection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SelectionRequest>,
) -> Result<Json<SessionResponse>, StatusCode> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;

    if let Some(category) = &payload.category {
        state
            .storefront
            .select_category(&mut session, category)
            .await
            .map_err(|e| reject("Category selection failed", e))?;
    }
    if let Some(gender) = &payload.gender {
        state
            .storefront
            .select_gender(&mut session, Some(gender))
            .await
            .map_err(|e| reject("Gender selection failed", e))?;
    }
    if let Some(query) = &payload.query {
        state.storefront.set_query(&mut session, query);
    }

    Ok(Json(SessionResponse::from(&*session)))
}

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<SessionResponse>, StatusCode> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    state
        .storefront
        .upload_image(&mut session, &params.name, body.to_vec())
        .map_err(|e| reject("Image upload rejected", e))?;
    Ok(Json(SessionResponse::from(&*session)))
}

pub async fn search_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SearchPage>, StatusCode> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    state
        .storefront
        .search_text(&mut session)
        .await
        .map(Json)
        .map_err(|e| reject("Text search failed", e))
}

pub async fn search_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SearchPage>, StatusCode> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    state
        .storefront
        .search_image(&mut session)
        .await
        .map(Json)
        .map_err(|e| reject("Image search failed", e))
}

pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, StatusCode> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    state.storefront.reset(&mut session);
    Ok(Json(SessionResponse::from(&*session)))
}

pub async fn review_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReviewParams>,
) -> Result<Json<ReviewPage>, StatusCode> {
    state
        .storefront
        .review_page(params.review_item_id.as_deref())
        .await
        .map(Json)
        .map_err(|e| reject("Review page failed", e))
}

pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReviewParams>,
    Json(payload): Json<ReviewSubmission>,
) -> Result<Json<Notice>, StatusCode> {
    let id = params.review_item_id.ok_or(StatusCode::BAD_REQUEST)?;
    state
        .storefront
        .submit_review(&id, &payload)
        .await
        .map(Json)
        .map_err(|e| reject("Review submission failed", e))
}

pub async fn product_image(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Response, StatusCode> {
    let bytes = state
        .storefront
        .image(&product_id)
        .await
        .map_err(|e| reject("Image fetch failed", e))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

pub async fn invalidate_cache(State(state): State<Arc<AppState>>) -> Json<InvalidateResponse> {
    let removed = state.storefront.invalidate_caches().await;
    Json(InvalidateResponse { removed })
}
