// Copyright 2023 Remi Bernotavicius

use super::{ApiError, ApiJson, AppState};
use crate::database::models::IngredientCategory;
use crate::database::query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<IngredientCategory>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub category: IngredientCategory,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddCategoryRequest {
    pub name: String,
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let categories = state
        .with_connection(|conn, _| query::list_ingredient_categories(conn))
        .await?;
    Ok(Json(CategoriesResponse { categories }))
}

pub async fn add_category(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AddCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let category = state
        .with_connection(move |conn, _| query::add_ingredient_category(conn, &request.name))
        .await?;
    Ok((StatusCode::CREATED, Json(CategoryResponse { category })))
}
