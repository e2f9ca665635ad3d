// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::IngredientCategoryId;
use crate::error::StoreError;
use crate::extract::{ExtractError, RecipeExtractor};
use crate::recipes::RecipeService;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Request};
use axum::http::header::{InvalidHeaderValue, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

mod categories;
mod ingredients;
mod recipes;
#[cfg(test)]
mod tests;
mod types;

const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Everything a request handler needs.
pub struct AppContext {
    pub pool: database::Pool,
    pub recipes: RecipeService,
    pub default_category: IngredientCategoryId,
    pub extractor: Option<Arc<dyn RecipeExtractor>>,
}

pub type AppState = Arc<AppContext>;

impl AppContext {
    /// Runs blocking database work on a pooled connection off the async runtime.
    async fn with_connection<T, F>(self: &Arc<Self>, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&mut database::Connection, &AppContext) -> Result<T, StoreError> + Send + 'static,
    {
        let context = self.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = context.pool.get()?;
            work(&mut conn, &context)
        })
        .await?;
        Ok(result?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("image extraction is not configured")]
    ExtractionUnavailable,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::Validation(_)) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Store(StoreError::Storage(_) | StoreError::Pool(_)) | Self::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Extraction(_) => StatusCode::BAD_GATEWAY,
            Self::ExtractionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                log::error!("{self}");
                "Internal server error".to_owned()
            }
            Self::Extraction(_) => {
                log::warn!("{self}");
                "Image extraction failed".to_owned()
            }
            _ => self.to_string(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::BadRequest(error.body_text())
    }
}

/// `Json` whose rejections are reported as `{"error": ...}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejections are reported as `{"error": ...}`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    log::debug!("{method} {uri} -> {}", response.status());
    response
}

fn cors(origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true))
}

pub fn router(state: AppState, cors_origin: &str) -> Result<Router, InvalidHeaderValue> {
    Ok(Router::new()
        .route("/api/recipes", get(recipes::list_recipes))
        .route("/api/recipes/", get(recipes::list_recipes))
        .route("/api/recipes/{id}", get(recipes::get_recipe))
        .route("/api/recipes/add", post(recipes::add_recipe))
        .route("/api/recipes/edit/{id}", put(recipes::edit_recipe))
        .route("/api/recipes/delete/{id}", delete(recipes::delete_recipe))
        .route(
            "/api/recipes/process-image",
            post(recipes::process_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/api/ingredients", get(ingredients::list_ingredients))
        .route("/api/ingredients/", get(ingredients::list_ingredients))
        .route("/api/ingredients/add", post(ingredients::add_ingredient))
        .route("/api/ingredients/edit/{id}", put(ingredients::edit_ingredient))
        .route(
            "/api/ingredients/delete/{id}",
            delete(ingredients::delete_ingredient),
        )
        .route("/api/types", get(types::list_types))
        .route("/api/types/", get(types::list_types))
        .route("/api/types/{id}", get(types::get_type))
        .route("/api/types/add", post(types::add_type))
        .route("/api/types/delete/{id}", delete(types::delete_type))
        .route("/api/ingredient-categories", get(categories::list_categories))
        .route("/api/ingredient-categories/", get(categories::list_categories))
        .route("/api/ingredient-categories/add", post(categories::add_category))
        .layer(middleware::from_fn(log_request))
        .layer(cors(cors_origin)?)
        .with_state(state))
}
